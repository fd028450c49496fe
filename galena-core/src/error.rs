//! Error types for the state container.
//!
//! Most operations on a [`State`](crate::State) or a [`Galena`](crate::Galena)
//! cannot fail. The exceptions are mutations whose body reports an error and
//! registry lookups or insertions keyed by a slice name.

use thiserror::Error;

/// Error produced by a failing mutator.
///
/// Mutators may fail with any error type; it is boxed so that `State<T>`
/// does not need to be generic over it.
pub type MutationError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by the state container.
#[derive(Debug, Error)]
pub enum GalenaError {
    /// A mutator (synchronous or asynchronous) returned an error.
    ///
    /// When this is returned no notification was emitted and no
    /// after-update hook ran.
    #[error("mutation of `{unit}` failed: {source}")]
    Mutation {
        /// Name of the unit being mutated.
        unit: String,
        /// The mutator's error.
        #[source]
        source: MutationError,
    },

    /// A slice with this name is already registered.
    #[error("slice `{0}` already exists")]
    DuplicateSlice(String),

    /// No slice with this name is registered.
    #[error("no slice named `{0}`")]
    UnknownSlice(String),
}

/// Result alias used throughout the crate.
pub type Result<T, E = GalenaError> = std::result::Result<T, E>;
