use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("stream ended mid-frame: expected {expected} bytes, received {received}")]
    Truncated { expected: usize, received: usize },
    #[error("checksum mismatch: computed {expected:#04x}, frame carried {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },
    #[error("unknown status code: {0}")]
    UnknownStatus(u8),
    #[error("identifier is not ASCII: {0:02x?}")]
    NonAsciiIdentifier([u8; 8]),
    #[error("identifier must be exactly 8 ASCII characters: {0:?}")]
    IdentifierLength(String),
    #[error("too many field records: {0}")]
    TooManyFields(usize),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// Whether the connection can keep going after answering with a NAK.
    ///
    /// Everything except a transport failure is a bad frame, not a bad peer.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, FrameError::Io(_))
    }

    /// Short label used for metrics and logs
    pub fn reason(&self) -> &'static str {
        match self {
            FrameError::Truncated { .. } => "truncated",
            FrameError::ChecksumMismatch { .. } => "checksum",
            FrameError::UnknownStatus(_) => "status",
            FrameError::NonAsciiIdentifier(_) | FrameError::IdentifierLength(_) => "identifier",
            FrameError::TooManyFields(_) => "fields",
            FrameError::Io(_) => "io",
        }
    }
}
