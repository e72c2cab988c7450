use std::io::{Seek, SeekFrom, Write};

use crate::error::{StreamError, StreamResult};

/// What a backend may do with its underlying sink or source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    /// Arbitrary repositioning; reserved fields can be back-patched.
    Seekable,
    /// Forward-only; reserved fields stay at their placeholder value.
    AppendOnly,
}

/// Byte sink with a running position counter.
///
/// `seek_forward` only ever moves toward the end (padding with zero bytes);
/// a backward target is a fatal caller error. `patch` rewrites bytes that
/// were already emitted and is only available on seekable sinks.
pub trait OutputStream {
    /// Write all bytes, advancing the position.
    fn write_bytes(&mut self, buf: &[u8]) -> StreamResult<()>;

    /// Current position in bytes from the start of the stream.
    fn position(&self) -> u64;

    /// Move forward to `target`, padding the gap with zero bytes.
    fn seek_forward(&mut self, target: u64) -> StreamResult<()>;

    /// Overwrite previously written bytes at `at` without moving the
    /// logical position.
    fn patch(&mut self, at: u64, buf: &[u8]) -> StreamResult<()>;

    /// Whether this sink supports `patch`.
    fn capability(&self) -> Capability;

    /// Flush buffered bytes to the underlying sink.
    fn flush(&mut self) -> StreamResult<()>;
}

/// Seekable positional writer over a `Write + Seek` sink.
pub struct SeekWriter<W: Write + Seek> {
    inner: W,
    /// Logical position; `base` + byte offset within `inner`.
    pos: u64,
    /// Logical position of the sink's byte 0.
    base: u64,
}

impl<W: Write + Seek> SeekWriter<W> {
    /// Wrap a sink positioned at its start.
    pub fn new(inner: W) -> Self {
        Self::new_at(inner, 0)
    }

    /// Wrap a sink whose byte 0 corresponds to logical position `base`.
    ///
    /// Used when a unit is staged in a memory buffer that will be appended
    /// to an outer stream: positions recorded while staging then match the
    /// final stream.
    pub fn new_at(inner: W, base: u64) -> Self {
        Self {
            inner,
            pos: base,
            base,
        }
    }

    /// Unwrap the sink, flushing first.
    pub fn into_inner(mut self) -> StreamResult<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write + Seek> OutputStream for SeekWriter<W> {
    fn write_bytes(&mut self, buf: &[u8]) -> StreamResult<()> {
        self.inner.write_all(buf)?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn seek_forward(&mut self, target: u64) -> StreamResult<()> {
        if target < self.pos {
            return Err(StreamError::BackwardSeek {
                position: self.pos,
                target,
            });
        }
        const ZEROS: [u8; 64] = [0u8; 64];
        let mut gap = target - self.pos;
        while gap > 0 {
            let n = gap.min(ZEROS.len() as u64) as usize;
            self.write_bytes(&ZEROS[..n])?;
            gap -= n as u64;
        }
        Ok(())
    }

    fn patch(&mut self, at: u64, buf: &[u8]) -> StreamResult<()> {
        if at < self.base || at + buf.len() as u64 > self.pos {
            return Err(StreamError::BackwardSeek {
                position: self.pos,
                target: at,
            });
        }
        self.inner.seek(SeekFrom::Start(at - self.base))?;
        self.inner.write_all(buf)?;
        self.inner.seek(SeekFrom::Start(self.pos - self.base))?;
        Ok(())
    }

    fn capability(&self) -> Capability {
        Capability::Seekable
    }

    fn flush(&mut self) -> StreamResult<()> {
        self.inner.flush()?;
        Ok(())
    }
}

/// Forward-only positional writer over any `Write` sink.
pub struct CountingWriter<W: Write> {
    inner: W,
    pos: u64,
}

impl<W: Write> CountingWriter<W> {
    /// Wrap a sink positioned at its start.
    pub fn new(inner: W) -> Self {
        Self { inner, pos: 0 }
    }

    /// Unwrap the sink, flushing first.
    pub fn into_inner(mut self) -> StreamResult<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> OutputStream for CountingWriter<W> {
    fn write_bytes(&mut self, buf: &[u8]) -> StreamResult<()> {
        self.inner.write_all(buf)?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn seek_forward(&mut self, target: u64) -> StreamResult<()> {
        if target < self.pos {
            return Err(StreamError::BackwardSeek {
                position: self.pos,
                target,
            });
        }
        const ZEROS: [u8; 64] = [0u8; 64];
        let mut gap = target - self.pos;
        while gap > 0 {
            let n = gap.min(ZEROS.len() as u64) as usize;
            self.write_bytes(&ZEROS[..n])?;
            gap -= n as u64;
        }
        Ok(())
    }

    fn patch(&mut self, _at: u64, _buf: &[u8]) -> StreamResult<()> {
        Err(StreamError::PatchUnsupported)
    }

    fn capability(&self) -> Capability {
        Capability::AppendOnly
    }

    fn flush(&mut self) -> StreamResult<()> {
        self.inner.flush()?;
        Ok(())
    }
}
