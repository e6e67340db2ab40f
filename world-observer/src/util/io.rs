//! Extension traits for [`Read`] and [`Write`] covering the little-endian
//! primitive encodings used by the observed protocol, plus the two distinct
//! string-length conventions it mixes: the engine's packed-u32 convention
//! (single byte, `0xFF` escapes to a 3-byte follow-up) used at the byte-stream
//! layer, and the unrelated .NET 7-bit-encoded varint used inside polymorph
//! descriptor bodies (see [`ReadExt::read_7bit_encoded_len`]).

use std::io::{self, Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use glam::Vec3;

/// Extension to [`Read`] for the primitive encodings used throughout the
/// byte-stream layer (TLV dispatch, descriptor bodies).
pub trait ReadExt: Read {
    #[inline]
    fn read_u8(&mut self) -> io::Result<u8> {
        ReadBytesExt::read_u8(self)
    }

    #[inline]
    fn read_i8(&mut self) -> io::Result<i8> {
        ReadBytesExt::read_i8(self)
    }

    #[inline]
    fn read_bool(&mut self) -> io::Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    #[inline]
    fn read_u16(&mut self) -> io::Result<u16> {
        ReadBytesExt::read_u16::<LE>(self)
    }

    #[inline]
    fn read_i16(&mut self) -> io::Result<i16> {
        ReadBytesExt::read_i16::<LE>(self)
    }

    #[inline]
    fn read_u32(&mut self) -> io::Result<u32> {
        ReadBytesExt::read_u32::<LE>(self)
    }

    #[inline]
    fn read_i32(&mut self) -> io::Result<i32> {
        ReadBytesExt::read_i32::<LE>(self)
    }

    #[inline]
    fn read_u64(&mut self) -> io::Result<u64> {
        ReadBytesExt::read_u64::<LE>(self)
    }

    #[inline]
    fn read_i64(&mut self) -> io::Result<i64> {
        ReadBytesExt::read_i64::<LE>(self)
    }

    #[inline]
    fn read_f32(&mut self) -> io::Result<f32> {
        ReadBytesExt::read_f32::<LE>(self)
    }

    #[inline]
    fn read_vec3(&mut self) -> io::Result<Vec3> {
        Ok(Vec3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }

    /// Read a blob of the given length.
    fn read_blob(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0; len];
        self.read_exact(&mut buf[..])?;
        Ok(buf)
    }

    /// Read the engine's packed-u32 length prefix: a single byte, or `0xFF`
    /// followed by a little-endian 24-bit value. Used by the byte-stream
    /// reader for blobs and by-size vectors, never inside polymorph bodies.
    #[inline]
    fn read_packed_u32(&mut self) -> io::Result<u32> {
        match self.read_u8()? {
            255 => ReadBytesExt::read_u24::<LE>(self),
            n => Ok(n as u32),
        }
    }

    /// Read a UTF-8 string with the engine's packed-u32 length prefix.
    fn read_string_packed(&mut self) -> io::Result<String> {
        let len = self.read_packed_u32()? as usize;
        String::from_utf8(self.read_blob(len)?)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "invalid utf8 string"))
    }

    /// Read a .NET-style 7-bit-encoded variable length integer: each byte
    /// contributes its low 7 bits, little-endian group order, continuing
    /// while the high bit is set. Used exclusively as the string length
    /// prefix inside polymorph descriptor bodies (`CSharpByteStream`), never
    /// at the byte-stream dispatch layer.
    fn read_7bit_encoded_len(&mut self) -> io::Result<u32> {
        let mut result: u32 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            result |= ((byte & 0x7F) as u32) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift >= 35 {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "7-bit encoded length too long"));
            }
        }
        Ok(result)
    }

    /// Read a UTF-8 string prefixed by a .NET 7-bit-encoded length, as used
    /// inside polymorph descriptor bodies.
    fn read_string_7bit(&mut self) -> io::Result<String> {
        let len = self.read_7bit_encoded_len()? as usize;
        String::from_utf8(self.read_blob(len)?)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "invalid utf8 string"))
    }
}

impl<R: Read + ?Sized> ReadExt for R {}

/// Extension to [`Write`] mirroring [`ReadExt`], used by tests to build
/// synthetic wire fixtures.
pub trait WriteExt: Write {
    #[inline]
    fn write_u8(&mut self, n: u8) -> io::Result<()> {
        WriteBytesExt::write_u8(self, n)
    }

    #[inline]
    fn write_bool(&mut self, b: bool) -> io::Result<()> {
        self.write_u8(b as u8)
    }

    #[inline]
    fn write_u16(&mut self, n: u16) -> io::Result<()> {
        WriteBytesExt::write_u16::<LE>(self, n)
    }

    #[inline]
    fn write_i16(&mut self, n: i16) -> io::Result<()> {
        WriteBytesExt::write_i16::<LE>(self, n)
    }

    #[inline]
    fn write_u32(&mut self, n: u32) -> io::Result<()> {
        WriteBytesExt::write_u32::<LE>(self, n)
    }

    #[inline]
    fn write_i32(&mut self, n: i32) -> io::Result<()> {
        WriteBytesExt::write_i32::<LE>(self, n)
    }

    #[inline]
    fn write_f32(&mut self, n: f32) -> io::Result<()> {
        WriteBytesExt::write_f32::<LE>(self, n)
    }

    #[inline]
    fn write_blob(&mut self, data: &[u8]) -> io::Result<()> {
        self.write_all(data)
    }

    fn write_packed_u32(&mut self, n: u32) -> io::Result<()> {
        if n >= 255 {
            self.write_u8(255)?;
            WriteBytesExt::write_u24::<LE>(self, n)
        } else {
            self.write_u8(n as u8)
        }
    }

    fn write_string_packed(&mut self, s: &str) -> io::Result<()> {
        self.write_packed_u32(s.len() as u32)?;
        self.write_blob(s.as_bytes())
    }

    fn write_7bit_encoded_len(&mut self, mut n: u32) -> io::Result<()> {
        loop {
            let mut byte = (n & 0x7F) as u8;
            n >>= 7;
            if n != 0 {
                byte |= 0x80;
            }
            self.write_u8(byte)?;
            if n == 0 {
                break;
            }
        }
        Ok(())
    }

    fn write_string_7bit(&mut self, s: &str) -> io::Result<()> {
        self.write_7bit_encoded_len(s.len() as u32)?;
        self.write_blob(s.as_bytes())
    }
}

impl<W: Write + ?Sized> WriteExt for W {}
