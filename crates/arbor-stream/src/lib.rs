//! Positional byte streams for the Arbor graph container.
//!
//! Both backends frame their records through these wrappers: a raw sink or
//! source decorated with a running position counter, a forward-only seek
//! (pad with zeros on write, skip on read), and, on seekable sinks, the
//! back-patching primitive the random-access container uses for reserved
//! header fields and next-record offsets.

pub mod error;
pub mod ext;
pub mod reader;
pub mod writer;

pub use error::{StreamError, StreamResult};
pub use ext::{ReadExt, WriteExt};
pub use reader::{CountingReader, InputStream, SeekReader};
pub use writer::{Capability, CountingWriter, OutputStream, SeekWriter};
