//! Forward-only stream backend for the Arbor graph container.
//!
//! Where the random-access backend revisits reserved fields, this backend
//! never seeks the transport: each branch graph travels as one
//! self-contained unit (object records, inline component batch, trailing
//! symbol table) suitable for network transport. Self-containment is a
//! hard invariant: a unit that still references an unwritten graph is a
//! fatal error and nothing is flushed.

pub mod error;
pub mod reader;
pub mod writer;

pub use error::{WireError, WireResult};
pub use reader::StreamReader;
pub use writer::StreamWriter;

/// Stream magic, written as a UTF string (u16 length + bytes).
pub const MAGIC: &str = "j3dsf";

/// Current writer format version. Readers refuse anything newer.
pub const FORMAT_VERSION: i32 = 1;
