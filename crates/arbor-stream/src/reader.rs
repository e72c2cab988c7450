use std::io::{ErrorKind, Read, Seek, SeekFrom};

use crate::error::{StreamError, StreamResult};
use crate::writer::Capability;

/// Byte source with a running position counter.
///
/// `seek_forward` skips bytes; `seek_to` repositions arbitrarily and is
/// only available on seekable sources.
pub trait InputStream {
    /// Fill `buf` entirely, advancing the position. Hitting end-of-stream
    /// mid-read is a truncation error.
    fn read_bytes(&mut self, buf: &mut [u8]) -> StreamResult<()>;

    /// Current position in bytes from the start of the stream.
    fn position(&self) -> u64;

    /// Skip forward to `target`.
    fn seek_forward(&mut self, target: u64) -> StreamResult<()>;

    /// Reposition to an arbitrary `target`.
    fn seek_to(&mut self, target: u64) -> StreamResult<()>;

    /// Whether this source supports `seek_to`.
    fn capability(&self) -> Capability;
}

/// Seekable positional reader over a `Read + Seek` source.
pub struct SeekReader<R: Read + Seek> {
    inner: R,
    pos: u64,
}

impl<R: Read + Seek> SeekReader<R> {
    /// Wrap a source positioned at its start.
    pub fn new(inner: R) -> Self {
        Self { inner, pos: 0 }
    }
}

impl<R: Read + Seek> InputStream for SeekReader<R> {
    fn read_bytes(&mut self, buf: &mut [u8]) -> StreamResult<()> {
        match self.inner.read_exact(buf) {
            Ok(()) => {
                self.pos += buf.len() as u64;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                Err(StreamError::Truncated { position: self.pos })
            }
            Err(e) => Err(e.into()),
        }
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
        self.seek_to(target)
    }

    fn seek_to(&mut self, target: u64) -> StreamResult<()> {
        self.inner.seek(SeekFrom::Start(target))?;
        self.pos = target;
        Ok(())
    }

    fn capability(&self) -> Capability {
        Capability::Seekable
    }
}

/// Forward-only positional reader over any `Read` source.
pub struct CountingReader<R: Read> {
    inner: R,
    pos: u64,
}

impl<R: Read> CountingReader<R> {
    /// Wrap a source positioned at its start.
    pub fn new(inner: R) -> Self {
        Self { inner, pos: 0 }
    }
}

impl<R: Read> InputStream for CountingReader<R> {
    fn read_bytes(&mut self, buf: &mut [u8]) -> StreamResult<()> {
        match self.inner.read_exact(buf) {
            Ok(()) => {
                self.pos += buf.len() as u64;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                Err(StreamError::Truncated { position: self.pos })
            }
            Err(e) => Err(e.into()),
        }
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
        let mut gap = target - self.pos;
        let mut scratch = [0u8; 256];
        while gap > 0 {
            let n = gap.min(scratch.len() as u64) as usize;
            self.read_bytes(&mut scratch[..n])?;
            gap -= n as u64;
        }
        Ok(())
    }

    fn seek_to(&mut self, target: u64) -> StreamResult<()> {
        // Forward targets are a skip; anything else has no meaning here.
        self.seek_forward(target)
    }

    fn capability(&self) -> Capability {
        Capability::AppendOnly
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn read_tracks_position() {
        let mut r = CountingReader::new(&b"abcdef"[..]);
        let mut buf = [0u8; 4];
        r.read_bytes(&mut buf).unwrap();
        assert_eq!(&buf, b"abcd");
        assert_eq!(r.position(), 4);
    }

    #[test]
    fn forward_skip() {
        let mut r = CountingReader::new(&b"abcdef"[..]);
        r.seek_forward(4).unwrap();
        let mut buf = [0u8; 2];
        r.read_bytes(&mut buf).unwrap();
        assert_eq!(&buf, b"ef");
    }

    #[test]
    fn backward_skip_rejected() {
        let mut r = CountingReader::new(&b"abcdef"[..]);
        let mut buf = [0u8; 4];
        r.read_bytes(&mut buf).unwrap();
        assert!(matches!(
            r.seek_forward(1),
            Err(StreamError::BackwardSeek { .. })
        ));
    }

    #[test]
    fn truncated_read() {
        let mut r = CountingReader::new(&b"ab"[..]);
        let mut buf = [0u8; 4];
        let err = r.read_bytes(&mut buf).unwrap_err();
        assert!(matches!(err, StreamError::Truncated { .. }));
    }

    #[test]
    fn seek_reader_random_access() {
        let mut r = SeekReader::new(Cursor::new(b"abcdef".to_vec()));
        r.seek_to(4).unwrap();
        let mut buf = [0u8; 1];
        r.read_bytes(&mut buf).unwrap();
        assert_eq!(&buf, b"e");
        // Backward is fine through seek_to, fatal through seek_forward.
        r.seek_to(0).unwrap();
        assert_eq!(r.position(), 0);
        r.seek_to(3).unwrap();
        assert!(matches!(
            r.seek_forward(1),
            Err(StreamError::BackwardSeek { .. })
        ));
    }
}
