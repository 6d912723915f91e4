// Little-endian byte plumbing shared by both traversal directions.
use std::borrow::Cow;
use std::io::{self, Read, Write};

use crate::error::{Error, Result};

/// Text encoding used for string payloads. Length prefixes count encoded bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    #[default]
    Utf8,
    Utf16Le,
}

impl TextEncoding {
    pub fn encode<'s>(&self, s: &'s str) -> Cow<'s, [u8]> {
        match self {
            TextEncoding::Utf8 => Cow::Borrowed(s.as_bytes()),
            TextEncoding::Utf16Le => {
                let mut out = Vec::with_capacity(s.len() * 2);
                for unit in s.encode_utf16() {
                    out.extend_from_slice(&unit.to_le_bytes());
                }
                Cow::Owned(out)
            }
        }
    }

    pub fn decode(&self, bytes: Vec<u8>) -> Result<String> {
        match self {
            TextEncoding::Utf8 => {
                String::from_utf8(bytes).map_err(|_| Error::malformed("invalid utf8 in string"))
            }
            TextEncoding::Utf16Le => {
                if bytes.len() % 2 != 0 {
                    return Err(Error::malformed("odd byte count in utf16 string"));
                }
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .collect();
                String::from_utf16(&units).map_err(|_| Error::malformed("invalid utf16 in string"))
            }
        }
    }
}

pub(crate) struct ByteReader<'a> {
    inner: Box<dyn Read + 'a>,
    pos: u64,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(inner: impl Read + 'a) -> Self {
        Self {
            inner: Box::new(inner),
            pos: 0,
        }
    }

    pub(crate) fn pos(&self) -> u64 {
        self.pos
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("eof at {:#x}", self.pos),
                ))
            } else {
                Error::Io(e)
            }
        })?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    pub(crate) fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut b = [0u8; N];
        self.fill(&mut b)?;
        Ok(b)
    }

    // Grows with the bytes actually present; the length came off the stream.
    pub(crate) fn read_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        (&mut self.inner).take(len as u64).read_to_end(&mut out)?;
        self.pos += out.len() as u64;
        if out.len() != len {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("eof at {:#x}", self.pos),
            )));
        }
        Ok(out)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }
    pub(crate) fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }
    pub(crate) fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }
    pub(crate) fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }
    pub(crate) fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }
    pub(crate) fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }
    pub(crate) fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }
    pub(crate) fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }
    pub(crate) fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }
    pub(crate) fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }
}

pub(crate) struct ByteWriter<'a> {
    inner: Box<dyn Write + 'a>,
    written: u64,
}

impl<'a> ByteWriter<'a> {
    pub(crate) fn new(inner: impl Write + 'a) -> Self {
        Self {
            inner: Box::new(inner),
            written: 0,
        }
    }

    pub(crate) fn written(&self) -> u64 {
        self.written
    }

    pub(crate) fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub(crate) fn write_bytes(&mut self, b: &[u8]) -> Result<()> {
        self.inner.write_all(b)?;
        self.written += b.len() as u64;
        Ok(())
    }

    pub(crate) fn write_u8(&mut self, v: u8) -> Result<()> {
        self.write_bytes(&[v])
    }
    pub(crate) fn write_i8(&mut self, v: i8) -> Result<()> {
        self.write_u8(v as u8)
    }
    pub(crate) fn write_u16(&mut self, v: u16) -> Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }
    pub(crate) fn write_i16(&mut self, v: i16) -> Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }
    pub(crate) fn write_u32(&mut self, v: u32) -> Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }
    pub(crate) fn write_i32(&mut self, v: i32) -> Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }
    pub(crate) fn write_u64(&mut self, v: u64) -> Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }
    pub(crate) fn write_i64(&mut self, v: i64) -> Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }
    pub(crate) fn write_f32(&mut self, v: f32) -> Result<()> {
        self.write_u32(v.to_bits())
    }
    pub(crate) fn write_f64(&mut self, v: f64) -> Result<()> {
        self.write_u64(v.to_bits())
    }
}
