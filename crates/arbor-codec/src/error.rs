use arbor_stream::StreamError;
use arbor_symtab::SymbolError;
use arbor_types::SymbolId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    /// Malformed or unparseable record; always fatal for the whole load.
    #[error("format error: {0}")]
    Format(String),

    /// Caller broke the write/read protocol; never silently recovered.
    #[error("protocol misuse: {0}")]
    Protocol(String),

    /// No payload codec resolves the named type, and no fallback applied.
    #[error("no payload codec registered for type `{name}`")]
    MissingCodec { name: String },

    /// The symbol exists but its owning graph or component record has not
    /// been loaded yet. Distinct from [`CodecError::UnknownSymbol`]: the
    /// caller can trigger a load and retry.
    #[error("symbol {symbol} is not loaded; its owning graph or component record must be read first")]
    NotLoaded { symbol: SymbolId },

    /// The symbol does not exist in this session at all.
    #[error("symbol {0} does not exist")]
    UnknownSymbol(SymbolId),

    /// A payload codec failed to encode or decode its own fields.
    #[error("payload codec error: {0}")]
    Payload(String),

    #[error(transparent)]
    Symbol(#[from] SymbolError),

    #[error(transparent)]
    Stream(#[from] StreamError),
}

pub type CodecResult<T> = Result<T, CodecError>;
