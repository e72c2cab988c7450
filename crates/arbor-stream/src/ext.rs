//! Primitive codecs layered over the positional streams.
//!
//! All integers are big-endian. Strings use the 2-byte-length UTF form;
//! blobs are a 4-byte signed length followed by raw bytes.

use crate::error::{StreamError, StreamResult};
use crate::reader::InputStream;
use crate::writer::OutputStream;

pub trait WriteExt: OutputStream {
    fn write_u8(&mut self, v: u8) -> StreamResult<()> {
        self.write_bytes(&[v])
    }

    fn write_bool(&mut self, v: bool) -> StreamResult<()> {
        self.write_u8(v as u8)
    }

    fn write_i32(&mut self, v: i32) -> StreamResult<()> {
        self.write_bytes(&v.to_be_bytes())
    }

    fn write_u32(&mut self, v: u32) -> StreamResult<()> {
        self.write_bytes(&v.to_be_bytes())
    }

    fn write_i64(&mut self, v: i64) -> StreamResult<()> {
        self.write_bytes(&v.to_be_bytes())
    }

    fn write_u64(&mut self, v: u64) -> StreamResult<()> {
        self.write_bytes(&v.to_be_bytes())
    }

    /// Write a string in 2-byte-length UTF form.
    fn write_utf(&mut self, s: &str) -> StreamResult<()> {
        if s.len() > u16::MAX as usize {
            return Err(StreamError::Malformed {
                position: self.position(),
                reason: format!("string of {} bytes exceeds UTF record limit", s.len()),
            });
        }
        self.write_bytes(&(s.len() as u16).to_be_bytes())?;
        self.write_bytes(s.as_bytes())
    }

    /// Write a length-prefixed byte block.
    fn write_blob(&mut self, data: &[u8]) -> StreamResult<()> {
        self.write_i32(data.len() as i32)?;
        self.write_bytes(data)
    }

    /// Emit a zero i32 to be patched later; returns its position.
    fn reserve_i32(&mut self) -> StreamResult<u64> {
        let at = self.position();
        self.write_i32(0)?;
        Ok(at)
    }

    /// Emit a zero u64 to be patched later; returns its position.
    fn reserve_u64(&mut self) -> StreamResult<u64> {
        let at = self.position();
        self.write_u64(0)?;
        Ok(at)
    }

    fn patch_i32(&mut self, at: u64, v: i32) -> StreamResult<()> {
        self.patch(at, &v.to_be_bytes())
    }

    fn patch_u64(&mut self, at: u64, v: u64) -> StreamResult<()> {
        self.patch(at, &v.to_be_bytes())
    }
}

impl<T: OutputStream + ?Sized> WriteExt for T {}

pub trait ReadExt: InputStream {
    fn read_u8(&mut self) -> StreamResult<u8> {
        let mut buf = [0u8; 1];
        self.read_bytes(&mut buf)?;
        Ok(buf[0])
    }

    fn read_bool(&mut self) -> StreamResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    fn read_i32(&mut self) -> StreamResult<i32> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf)?;
        Ok(i32::from_be_bytes(buf))
    }

    fn read_u32(&mut self) -> StreamResult<u32> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    fn read_i64(&mut self) -> StreamResult<i64> {
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf)?;
        Ok(i64::from_be_bytes(buf))
    }

    fn read_u64(&mut self) -> StreamResult<u64> {
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    /// Read a string in 2-byte-length UTF form.
    fn read_utf(&mut self) -> StreamResult<String> {
        let mut len_buf = [0u8; 2];
        self.read_bytes(&mut len_buf)?;
        let len = u16::from_be_bytes(len_buf) as usize;
        let mut buf = vec![0u8; len];
        self.read_bytes(&mut buf)?;
        String::from_utf8(buf).map_err(|e| StreamError::Malformed {
            position: self.position(),
            reason: format!("invalid UTF-8: {e}"),
        })
    }

    /// Read a length-prefixed byte block.
    fn read_blob(&mut self) -> StreamResult<Vec<u8>> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(StreamError::Malformed {
                position: self.position(),
                reason: format!("negative blob length {len}"),
            });
        }
        let mut buf = vec![0u8; len as usize];
        self.read_bytes(&mut buf)?;
        Ok(buf)
    }
}

impl<T: InputStream + ?Sized> ReadExt for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::CountingReader;
    use crate::writer::{CountingWriter, SeekWriter};
    use std::io::Cursor;

    fn roundtrip(write: impl FnOnce(&mut dyn OutputStream)) -> CountingReader<Cursor<Vec<u8>>> {
        let mut w = CountingWriter::new(Vec::new());
        write(&mut w);
        CountingReader::new(Cursor::new(w.into_inner().unwrap()))
    }

    #[test]
    fn integer_roundtrip() {
        let mut r = roundtrip(|w| {
            w.write_i32(-5).unwrap();
            w.write_u32(7).unwrap();
            w.write_i64(-1 << 40).unwrap();
            w.write_u64(1 << 50).unwrap();
            w.write_bool(true).unwrap();
        });
        assert_eq!(r.read_i32().unwrap(), -5);
        assert_eq!(r.read_u32().unwrap(), 7);
        assert_eq!(r.read_i64().unwrap(), -1 << 40);
        assert_eq!(r.read_u64().unwrap(), 1 << 50);
        assert!(r.read_bool().unwrap());
    }

    #[test]
    fn utf_roundtrip() {
        let mut r = roundtrip(|w| w.write_utf("héllo wörld").unwrap());
        assert_eq!(r.read_utf().unwrap(), "héllo wörld");
    }

    #[test]
    fn empty_utf() {
        let mut r = roundtrip(|w| w.write_utf("").unwrap());
        assert_eq!(r.read_utf().unwrap(), "");
    }

    #[test]
    fn blob_roundtrip() {
        let mut r = roundtrip(|w| w.write_blob(&[1, 2, 3]).unwrap());
        assert_eq!(r.read_blob().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn negative_blob_length_rejected() {
        let mut r = roundtrip(|w| w.write_i32(-4).unwrap());
        assert!(matches!(
            r.read_blob(),
            Err(StreamError::Malformed { .. })
        ));
    }

    #[test]
    fn oversized_utf_rejected() {
        let mut w = CountingWriter::new(Vec::new());
        let big = "x".repeat(u16::MAX as usize + 1);
        assert!(matches!(
            w.write_utf(&big),
            Err(StreamError::Malformed { .. })
        ));
    }

    #[test]
    fn reserve_and_patch() {
        let mut w = SeekWriter::new(Cursor::new(Vec::new()));
        let count_at = w.reserve_i32().unwrap();
        let ptr_at = w.reserve_u64().unwrap();
        w.write_utf("body").unwrap();
        w.patch_i32(count_at, 3).unwrap();
        w.patch_u64(ptr_at, 99).unwrap();
        let mut r = CountingReader::new(Cursor::new(w.into_inner().unwrap().into_inner()));
        assert_eq!(r.read_i32().unwrap(), 3);
        assert_eq!(r.read_u64().unwrap(), 99);
        assert_eq!(r.read_utf().unwrap(), "body");
    }
}
