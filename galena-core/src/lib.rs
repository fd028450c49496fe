//! Galena Core
//!
//! This crate provides a reactive state container for in-process Rust
//! programs. It implements:
//!
//! - A keyed notification primitive with unique subscription ids
//! - Named units of state with a controlled mutation protocol
//! - Middleware hooks around every state transition
//! - A registry that composes units created at any time
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: the notification primitive and the `State` unit
//! - `middleware`: the lifecycle hook contract plus a logger and a profiler
//! - `galena`: the registry of named slices and cross-slice subscriptions
//! - `value`: a dynamically shaped payload for heterogeneous registries
//!
//! # Example
//!
//! ```rust,ignore
//! use galena_core::{Galena, Logger, Value};
//!
//! let app = Galena::<Value>::new();
//! app.register_middleware(Logger::new());
//!
//! let counter = app.create_slice("counter", Value::record([("count", 0)]))?;
//!
//! app.subscribe(|app| {
//!     println!("{:?}", app.state());
//! });
//!
//! counter.update(|s| { s.get_mut("count").and_then(|c| c.increment(1)); }).await?;
//! // Subscriber runs once, Logger logs the transition.
//! ```

pub mod error;
pub mod galena;
pub mod middleware;
pub mod reactive;
pub mod value;

pub use error::{GalenaError, MutationError, Result};
pub use galena::Galena;
pub use middleware::{Logger, Middleware, Profiler, ProfilerConfig};
pub use reactive::{
    Emitter, IntoSettle, Keyed, Listener, Patch, Settle, Snapshot, State, SubscriptionId,
};
pub use value::{Key, Opaque, SharedValue, Value};
