use crate::catalog::ContentHash;
use crate::error::SessionError;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Shared flag flipped by whoever supersedes or aborts an in-flight open.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn check_cancelled(&self, stage: &'static str) -> Result<(), SessionError> {
        if self.is_cancelled() {
            return Err(SessionError::Cancelled { stage });
        }
        Ok(())
    }
}

/// Liveness handle captured when an open starts.
///
/// Continuations compare their lease against the host's current request before
/// touching state; a mismatch means the work was superseded.
#[derive(Clone, Debug)]
pub struct OpenLease {
    pub request_id: u64,
    /// Book being opened.
    pub hash: ContentHash,
    pub token: CancellationToken,
}

impl OpenLease {
    pub fn new(request_id: u64, hash: ContentHash) -> Self {
        Self {
            request_id,
            hash,
            token: CancellationToken::new(),
        }
    }

    pub fn is_current(&self, active_request: Option<u64>) -> bool {
        active_request == Some(self.request_id) && !self.token.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_cancelled_reports_stage() {
        let token = CancellationToken::new();
        assert!(token.check_cancelled("acquire").is_ok());
        token.clone().cancel();
        let err = token.check_cancelled("bind").expect_err("cancelled token");
        assert!(matches!(err, SessionError::Cancelled { stage: "bind" }));
    }

    #[test]
    fn lease_goes_stale_when_superseded_or_cancelled() {
        let lease = OpenLease::new(7, ContentHash::new("abc123"));
        assert!(lease.is_current(Some(7)));
        assert!(!lease.is_current(Some(8)));
        assert!(!lease.is_current(None));
        lease.token.cancel();
        assert!(!lease.is_current(Some(7)));
    }
}
