use arbor_stream::StreamError;
use arbor_types::{BranchGraphId, SymbolId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SymbolError {
    #[error("object already registered as node symbol {id}")]
    NodeSymbolExists { id: SymbolId },

    #[error("symbol {0} does not exist in this session")]
    UnknownSymbol(SymbolId),

    #[error("branch graph {0} does not exist in this session")]
    UnknownGraph(BranchGraphId),

    #[error("name `{name}` is already bound to symbol {existing}")]
    NameConflict { name: String, existing: SymbolId },

    #[error("no branch graph is being written")]
    NoCurrentGraph,

    #[error("corrupt symbol table record: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Stream(#[from] StreamError),
}

pub type SymbolResult<T> = Result<T, SymbolError>;
