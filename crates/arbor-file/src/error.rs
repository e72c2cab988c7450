use arbor_codec::CodecError;
use arbor_stream::StreamError;
use arbor_symtab::SymbolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileError {
    /// The file does not start with the container magic.
    #[error("not an arbor container (magic `{found}`)")]
    InvalidMagic { found: String },

    /// The stored format version postdates this reader.
    #[error("container version {found} exceeds supported version {supported}")]
    UnsupportedVersion { found: i32, supported: i32 },

    /// The header pointers were never back-patched: the writing session
    /// did not close.
    #[error("container was not finalized; the writing session never closed")]
    NotFinalized,

    /// Structural damage beyond the specific cases above.
    #[error("malformed container: {0}")]
    Format(String),

    /// The back-patched per-graph record count disagrees with the records
    /// actually parsed.
    #[error("branch graph {graph} declares {expected} records but parsed {actual}")]
    RecordCountMismatch {
        graph: arbor_types::BranchGraphId,
        expected: i32,
        actual: i32,
    },

    /// Caller broke the writer protocol.
    #[error("protocol misuse: {0}")]
    Protocol(String),

    /// No binding for the requested object name.
    #[error("no object named `{0}`")]
    UnknownName(String),

    /// A name was bound to an object whose record never reached the
    /// container, so no reader could ever load it.
    #[error("named object `{name}` ({symbol}) has no record in the container")]
    UnwrittenName {
        name: String,
        symbol: arbor_types::SymbolId,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Symbol(#[from] SymbolError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type FileResult<T> = Result<T, FileError>;
