use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("backward seek: at position {position}, requested {target}")]
    BackwardSeek { position: u64, target: u64 },

    #[error("back-patching is not supported on an append-only sink")]
    PatchUnsupported,

    #[error("stream truncated at position {position}")]
    Truncated { position: u64 },

    #[error("malformed primitive at position {position}: {reason}")]
    Malformed { position: u64, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StreamResult<T> = Result<T, StreamError>;
