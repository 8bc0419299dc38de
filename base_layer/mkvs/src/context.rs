// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use std::{
    fmt,
    fmt::{Display, Formatter},
    time::{Duration, Instant},
};

use tokio_util::sync::{CancellationToken, DropGuard};

use crate::syncer::SyncerError;

/// Why a call was aborted before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Cancelled,
    DeadlineExceeded,
}

impl Display for CancelReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Cancelled => f.write_str("context cancelled"),
            CancelReason::DeadlineExceeded => f.write_str("context deadline exceeded"),
        }
    }
}

/// The caller's context for one call: an optional cancellation token and an optional deadline.
///
/// Every operation that may block on node resolution checks its context before each dereference and aborts with
/// [`SyncerError::Cancelled`] as soon as the context is done. Dropping a token does not cancel it; use
/// [`Context::with_cancel_on_drop`] for a context that is cancelled when its scope ends.
#[derive(Clone, Debug, Default)]
pub struct Context {
    token: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: None,
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Returns a cancellable context together with the token that cancels it.
    pub fn with_cancel() -> (Self, CancellationToken) {
        let token = CancellationToken::new();
        (Self::with_token(token.clone()), token)
    }

    /// Returns a cancellable context and a guard that cancels it when dropped.
    pub fn with_cancel_on_drop() -> (Self, DropGuard) {
        let (ctx, token) = Self::with_cancel();
        (ctx, token.drop_guard())
    }

    /// A context observing `token`.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token: Some(token),
            deadline: None,
        }
    }

    /// Returns a child of this context which is cancelled with it, and additionally by the returned token.
    pub fn child(&self) -> (Self, CancellationToken) {
        let token = match &self.token {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        let ctx = Self {
            token: Some(token.clone()),
            deadline: self.deadline,
        };
        (ctx, token)
    }

    /// Returns a copy of this context which also expires at `deadline` (the earlier deadline wins).
    pub fn and_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        };
        Self {
            token: self.token.clone(),
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The reason this context is done, or `None` if it is still live.
    pub fn err(&self) -> Option<CancelReason> {
        if self.token.as_ref().map(CancellationToken::is_cancelled).unwrap_or(false) {
            return Some(CancelReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    pub fn check(&self) -> Result<(), SyncerError> {
        match self.err() {
            Some(reason) => Err(SyncerError::Cancelled(reason)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cancel() {
        let (ctx, token) = Context::with_cancel();
        let clone = ctx.clone();
        assert!(!ctx.is_done());
        assert!(ctx.check().is_ok());
        token.cancel();
        // Cancelling twice is harmless
        token.cancel();
        assert_eq!(ctx.err(), Some(CancelReason::Cancelled));
        assert_eq!(clone.err(), Some(CancelReason::Cancelled));
        assert!(matches!(
            ctx.check(),
            Err(SyncerError::Cancelled(CancelReason::Cancelled))
        ));
    }

    #[test]
    fn dropping_the_token_does_not_cancel() {
        let (ctx, token) = Context::with_cancel();
        drop(token);
        assert!(!ctx.is_done());
    }

    #[test]
    fn drop_guard_cancels_at_scope_exit() {
        let ctx = {
            let (ctx, _guard) = Context::with_cancel_on_drop();
            assert!(!ctx.is_done());
            ctx
        };
        assert_eq!(ctx.err(), Some(CancelReason::Cancelled));
    }

    #[test]
    fn children_follow_their_parent() {
        let (parent, token) = Context::with_cancel();
        let (child, child_token) = parent.child();
        child_token.cancel();
        assert!(child.is_done());
        assert!(!parent.is_done());

        let (child, _) = parent.child();
        token.cancel();
        assert_eq!(child.err(), Some(CancelReason::Cancelled));

        let (orphan, _) = Context::background().child();
        assert!(!orphan.is_done());
    }

    #[test]
    fn deadlines() {
        assert!(!Context::background().is_done());
        let expired = Context::with_deadline(Instant::now());
        assert_eq!(expired.err(), Some(CancelReason::DeadlineExceeded));
        let live = Context::with_timeout(Duration::from_secs(3600));
        assert!(!live.is_done());
        let tightened = live.and_deadline(Instant::now());
        assert_eq!(tightened.err(), Some(CancelReason::DeadlineExceeded));
        let (child, _) = expired.child();
        assert_eq!(child.err(), Some(CancelReason::DeadlineExceeded));
    }
}
