/// TLS protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("bad message: {0}")]
    BadMessage(String),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("fatal alert received: code {0}")]
    AlertReceived(u8),
    #[error("no shared cipher suite")]
    NoSharedCipherSuite,
    #[error("internal error: {0}")]
    Internal(String),
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

impl TlsError {
    /// Whether this error is a non-blocking transport suspension rather
    /// than a failure. Suspended I/O is retried by the caller; everything
    /// else is fatal.
    pub fn is_would_block(&self) -> bool {
        matches!(self, TlsError::IoError(e) if e.kind() == std::io::ErrorKind::WouldBlock)
    }
}
