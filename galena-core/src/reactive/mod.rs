//! Reactive Primitives
//!
//! This module implements the building blocks of the state container: the
//! notification primitive and the unit of state built on top of it.
//!
//! # Concepts
//!
//! ## Emitters
//!
//! An [`Emitter`] maps a topic name to an ordered list of listeners. Emitting
//! on a topic calls each listener once, synchronously, in subscription order.
//! Every listener is identified by a process-unique [`SubscriptionId`].
//!
//! ## States
//!
//! A [`State`] is a named unit of mutable data. It is changed only through
//! transitions (`update`, `reset`, or a wrapped `mutation`), each of which
//! runs the registered middleware around the change and notifies the unit's
//! subscribers exactly once.
//!
//! ## Settlements
//!
//! A mutator may finish synchronously or hand back pending work. [`Settle`]
//! captures both cases so that one `update` method covers them.
//!
//! # Implementation Notes
//!
//! Units keep a frozen initial value next to the live one. The two never
//! share top-level storage: the initial value is copied through
//! [`Snapshot`] whenever a live value is derived from it.

mod emitter;
mod mutation;
mod snapshot;
mod state;
mod subscription;

pub use emitter::Emitter;
pub use mutation::{IntoSettle, Patch, Settle};
pub use snapshot::{Keyed, Snapshot};
pub use state::State;
pub use subscription::{Listener, SubscriptionId};
