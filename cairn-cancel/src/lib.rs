//! # Cooperative cancellation
//!
//! Long-running operations in this workspace (graph builds, route searches)
//! periodically check a shared [`CancelToken`]. Cancellation is purely
//! cooperative: the owner of the token flips a flag, and the operation
//! observes it at its next documented checkpoint.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// The error produced when an operation observes a cancelled token.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("the operation was cancelled")]
pub struct Cancelled;

/// A cheaply cloneable cancellation flag.
///
/// All clones share the same underlying flag; cancelling any clone cancels
/// them all. The default token is never cancelled.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    ///
    /// This is idempotent and never blocks. Operations holding a clone of
    /// this token will observe the request at their next checkpoint.
    pub fn cancel(&self) {
        self.inner.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::Relaxed)
    }

    /// Returns an error if cancellation has been requested.
    ///
    /// # Errors
    ///
    /// Fails with [`Cancelled`] after [`CancelToken::cancel`] has been called
    /// on this token or any clone of it.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_not_cancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert_eq!(token.check(), Ok(()));
    }

    #[test]
    fn cancellation_is_shared_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.check(), Err(Cancelled));
    }
}
