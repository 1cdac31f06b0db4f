pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the indexing and search layers.
///
/// Storage-level failures pass through unchanged; `CorruptIndex` means the
/// on-disk structure violated a format invariant and the index is unusable
/// until repaired, while the other kinds permit retry.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] store::Error),

    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("already closed: {0}")]
    AlreadyClosed(String),
}

impl Error {
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Error::CorruptIndex(msg.into())
    }
}
