//! Mutation outcomes.
//!
//! A mutator is a closure `FnOnce(&mut T) -> R`. What it returns decides how
//! the mutation settles:
//!
//! - `()` settles immediately;
//! - `Result<(), E>` settles immediately and may fail;
//! - [`Settle::pending`] and friends settle once a future resolves. The
//!   future produces a [`Patch`], which is applied to the value once it is
//!   ready.
//!
//! All three shapes go through the same `State::update` entry point, so a
//! caller never has to pick a different method for asynchronous work.

use std::future::Future;

use futures_util::future::{BoxFuture, FutureExt};

use crate::error::MutationError;

/// A deferred in-place change produced by an asynchronous mutator.
pub type Patch<T> = Box<dyn FnOnce(&mut T) + Send + 'static>;

/// How a mutator's effect settles.
pub enum Settle<T> {
    /// The effect is already applied (or failed).
    Ready(Result<(), MutationError>),

    /// The effect is applied once this future resolves.
    Pending(BoxFuture<'static, Result<Patch<T>, MutationError>>),
}

impl<T: 'static> Settle<T> {
    /// A mutation that completed synchronously.
    pub fn ready() -> Self {
        Settle::Ready(Ok(()))
    }

    /// A mutation that failed synchronously.
    pub fn failed(error: impl Into<MutationError>) -> Self {
        Settle::Ready(Err(error.into()))
    }

    /// A mutation that settles when `future` resolves to a patch.
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<Patch<T>, MutationError>> + Send + 'static,
    {
        Settle::Pending(future.boxed())
    }

    /// An infallible asynchronous mutation.
    ///
    /// ```rust,ignore
    /// state.update(|_| Settle::after(async {
    ///     let fetched = load().await;
    ///     move |items: &mut Vec<u32>| items.extend(fetched)
    /// })).await?;
    /// ```
    pub fn after<F, P>(future: F) -> Self
    where
        F: Future<Output = P> + Send + 'static,
        P: FnOnce(&mut T) + Send + 'static,
    {
        Settle::Pending(future.map(|patch| Ok(Box::new(patch) as Patch<T>)).boxed())
    }

    /// A fallible asynchronous mutation.
    pub fn try_after<F, P, E>(future: F) -> Self
    where
        F: Future<Output = Result<P, E>> + Send + 'static,
        P: FnOnce(&mut T) + Send + 'static,
        E: Into<MutationError>,
    {
        Settle::Pending(
            future
                .map(|result| match result {
                    Ok(patch) => Ok(Box::new(patch) as Patch<T>),
                    Err(error) => Err(error.into()),
                })
                .boxed(),
        )
    }

    /// Whether the mutation still has asynchronous work to do.
    pub fn is_pending(&self) -> bool {
        matches!(self, Settle::Pending(_))
    }
}

/// Conversion from a mutator's return value into a [`Settle`].
pub trait IntoSettle<T> {
    /// Convert into a settlement.
    fn into_settle(self) -> Settle<T>;
}

impl<T: 'static> IntoSettle<T> for () {
    fn into_settle(self) -> Settle<T> {
        Settle::ready()
    }
}

impl<T: 'static, E> IntoSettle<T> for Result<(), E>
where
    E: Into<MutationError>,
{
    fn into_settle(self) -> Settle<T> {
        match self {
            Ok(()) => Settle::ready(),
            Err(error) => Settle::failed(error),
        }
    }
}

impl<T> IntoSettle<T> for Settle<T> {
    fn into_settle(self) -> Settle<T> {
        self
    }
}

impl<T> std::fmt::Debug for Settle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Settle::Ready(Ok(())) => f.write_str("Settle::Ready(Ok)"),
            Settle::Ready(Err(error)) => write!(f, "Settle::Ready(Err({error}))"),
            Settle::Pending(_) => f.write_str("Settle::Pending"),
        }
    }
}
