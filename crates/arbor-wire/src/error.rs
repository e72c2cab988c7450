use arbor_codec::CodecError;
use arbor_stream::StreamError;
use arbor_symtab::SymbolError;
use arbor_types::{BranchGraphId, SymbolId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    /// The stream does not start with the wire magic.
    #[error("not an arbor stream (magic `{found}`)")]
    InvalidMagic { found: String },

    /// The stream's format version postdates this reader.
    #[error("stream version {found} exceeds supported version {supported}")]
    UnsupportedVersion { found: i32, supported: i32 },

    /// A unit finished writing with references into graphs never written
    /// in this session. A stream unit must be self-contained; the session
    /// is unusable after this.
    #[error("branch graph {graph} is not self-contained: {symbols:?} unresolved")]
    DanglingReferences {
        graph: BranchGraphId,
        symbols: Vec<SymbolId>,
    },

    /// A unit in this session already failed the self-containment check;
    /// the session table no longer matches what reached the transport.
    #[error("stream session unusable after a dangling-reference failure")]
    DeadSession,

    #[error("malformed stream unit: {0}")]
    Format(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Symbol(#[from] SymbolError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type WireResult<T> = Result<T, WireError>;
