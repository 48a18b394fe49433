use webwatch_common::capture::CaptureDecodeError;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to launch browser '{browser}': {reason}")]
    Spawn { browser: String, reason: String },
    #[error("capture of {target} timed out after {secs}s")]
    Timeout { target: String, secs: u64 },
    #[error("failed to load {target}: {reason}")]
    Navigation { target: String, reason: String },
    #[error("devtools request failed: {0}")]
    Protocol(String),
    #[error(transparent)]
    Decode(#[from] CaptureDecodeError),
    #[error("capture session is closed")]
    Closed,
    #[error("failed to release capture session: {0}")]
    Release(String),
}

impl CaptureError {
    /// Errors that will not go away by trying again on the next tick.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CaptureError::Spawn { .. } | CaptureError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_launch_and_closed_are_fatal() {
        let spawn = CaptureError::Spawn {
            browser: "chromium".into(),
            reason: "not found".into(),
        };
        assert!(spawn.is_fatal());
        assert!(CaptureError::Closed.is_fatal());
        assert!(!CaptureError::Timeout {
            target: "https://example.com".into(),
            secs: 30
        }
        .is_fatal());
        assert!(!CaptureError::Decode(CaptureDecodeError::Empty).is_fatal());
        assert!(!CaptureError::Navigation {
            target: "http://nonexistent.invalid".into(),
            reason: "net::ERR_NAME_NOT_RESOLVED".into(),
        }
        .is_fatal());
    }
}
