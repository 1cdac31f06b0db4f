use std::io;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by directories and their streams.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// A read would run past the end of the stream.
    #[error("read past EOF: {0}")]
    Eof(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("lock obtain failed: {0}")]
    LockObtainFailed(String),

    #[error("already closed: {0}")]
    AlreadyClosed(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Wraps an `io::Error` from an operation on `name`, translating
    /// `NotFound` into the dedicated kind.
    pub fn from_io(name: &str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Error::FileNotFound(name.to_string())
        } else {
            Error::Io {
                context: name.to_string(),
                source,
            }
        }
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }
}
