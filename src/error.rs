use thiserror::Error;

/// Failure classes surfaced by the capture pipeline.
///
/// Setup failures (missing audio device, invalid media) fail the current
/// phase immediately with no retry. Process failures distinguish a capture
/// process that never confirmed startup from one that died mid-stream.
/// `Cancelled` is not an error from the user's point of view; it only
/// short-circuits the pipeline.
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error("no usable audio capture device (no virtual loopback, no stereo mix)")]
    AudioDeviceUnavailable,

    #[error("capture process exited with code {code} before confirming startup")]
    ProcessStartup { code: i32 },

    #[error("capture process exited with code {code}")]
    ProcessFailed { code: i32 },

    #[error("include list is empty, the whole stream was cut")]
    EmptyIncludeList,

    #[error("invalid media: {0}")]
    InvalidMedia(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Internal(String),
}

impl CaptureError {
    /// Fails unless the transcoder exited cleanly.
    pub fn check_exit_code(code: i32) -> Result<(), CaptureError> {
        if code != 0 {
            return Err(CaptureError::ProcessFailed { code });
        }
        Ok(())
    }
}

impl From<anyhow::Error> for CaptureError {
    fn from(err: anyhow::Error) -> Self {
        CaptureError::Internal(format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_exit_code() {
        assert!(CaptureError::check_exit_code(0).is_ok());
        let err = CaptureError::check_exit_code(1).unwrap_err();
        assert!(matches!(err, CaptureError::ProcessFailed { code: 1 }));
    }
}
