/// Errors that can occur while framing native-channel messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The declared or actual payload length exceeds the configured bound.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A frame declared a zero-length payload.
    #[error("empty frame (zero-length payload)")]
    EmptyFrame,

    /// The payload is not syntactically valid JSON.
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The stream ended with a partial frame buffered.
    #[error("connection closed mid-frame ({buffered} bytes buffered)")]
    IncompleteFrame { buffered: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The native channel has already been closed.
    #[error("native channel closed")]
    Closed,
}

impl FrameError {
    /// True for faults in the byte stream itself. These are fatal to the
    /// transport instance that observed them.
    pub fn is_protocol_fault(&self) -> bool {
        matches!(
            self,
            FrameError::PayloadTooLarge { .. }
                | FrameError::EmptyFrame
                | FrameError::InvalidJson(_)
                | FrameError::IncompleteFrame { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
