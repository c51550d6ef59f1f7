//! Variable-width integer primitives for the block format.
//!
//! ## Public invariants (must not change without a format bump)
//!
//! - vint/vlong are LEB128-style: 7-bit groups, **low bits first**, high bit set on
//!   every byte except the last.
//! - vint is at most 5 bytes (u32), vlong at most 10 bytes (u64).
//! - Canonical-length encoding is not required on read; overlong-but-in-range values
//!   decode to the same integer.

use crate::error::{TermDictError, TermDictResult};
use std::io::Read;

/// Append a u32 as a vint.
pub fn write_vint(out: &mut Vec<u8>, mut v: u32) {
    while v >= 0x80 {
        out.push((v as u8 & 0x7f) | 0x80);
        v >>= 7;
    }
    out.push(v as u8);
}

/// Append a u64 as a vlong.
pub fn write_vlong(out: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        out.push((v as u8 & 0x7f) | 0x80);
        v >>= 7;
    }
    out.push(v as u8);
}

/// Number of bytes `write_vint` would append for `v`.
pub fn vint_len(v: u32) -> usize {
    match v {
        0..=0x7f => 1,
        0x80..=0x3fff => 2,
        0x4000..=0x1f_ffff => 3,
        0x20_0000..=0xfff_ffff => 4,
        _ => 5,
    }
}

/// Read a vint from a stream.
pub fn read_vint<R: Read + ?Sized>(r: &mut R) -> TermDictResult<u32> {
    let mut out: u32 = 0;
    let mut shift = 0;
    loop {
        let mut byte = [0u8; 1];
        r.read_exact(&mut byte)?;
        let b = byte[0];
        if shift == 28 && b > 0x0f {
            return Err(TermDictError::Decode("vint exceeds 32 bits".into()));
        }
        out |= u32::from(b & 0x7f) << shift;
        if b & 0x80 == 0 {
            return Ok(out);
        }
        shift += 7;
        if shift > 28 {
            return Err(TermDictError::Decode("vint longer than 5 bytes".into()));
        }
    }
}

/// Read a vlong from a stream.
pub fn read_vlong<R: Read + ?Sized>(r: &mut R) -> TermDictResult<u64> {
    let mut out: u64 = 0;
    let mut shift = 0;
    loop {
        let mut byte = [0u8; 1];
        r.read_exact(&mut byte)?;
        let b = byte[0];
        if shift == 63 && b > 0x01 {
            return Err(TermDictError::Decode("vlong exceeds 64 bits".into()));
        }
        out |= u64::from(b & 0x7f) << shift;
        if b & 0x80 == 0 {
            return Ok(out);
        }
        shift += 7;
        if shift > 63 {
            return Err(TermDictError::Decode("vlong longer than 10 bytes".into()));
        }
    }
}

/// Position-tracked reader over fully-buffered block bytes.
///
/// Overrunning the slice means the block's own length fields lied, so every failure
/// here is a [`TermDictError::Corruption`].
pub struct SliceReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    /// Wrap `buf` with the read position at 0.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current read position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move the read position to `pos` (may point one past the end).
    pub fn set_position(&mut self, pos: usize) -> TermDictResult<()> {
        if pos > self.buf.len() {
            return Err(TermDictError::Corruption(format!(
                "seek to {pos} past end of {}-byte strip",
                self.buf.len()
            )));
        }
        self.pos = pos;
        Ok(())
    }

    /// Whether the position has reached the end of the slice.
    pub fn exhausted(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> TermDictResult<u8> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| TermDictError::Corruption("strip truncated".into()))?;
        self.pos += 1;
        Ok(b)
    }

    /// Read a vint.
    pub fn read_vint(&mut self) -> TermDictResult<u32> {
        let mut out: u32 = 0;
        let mut shift = 0;
        loop {
            let b = self.read_u8()?;
            if shift == 28 && b > 0x0f {
                return Err(TermDictError::Corruption("vint exceeds 32 bits".into()));
            }
            out |= u32::from(b & 0x7f) << shift;
            if b & 0x80 == 0 {
                return Ok(out);
            }
            shift += 7;
            if shift > 28 {
                return Err(TermDictError::Corruption("vint longer than 5 bytes".into()));
            }
        }
    }

    /// Read a vlong.
    pub fn read_vlong(&mut self) -> TermDictResult<u64> {
        let mut out: u64 = 0;
        let mut shift = 0;
        loop {
            let b = self.read_u8()?;
            if shift == 63 && b > 0x01 {
                return Err(TermDictError::Corruption("vlong exceeds 64 bits".into()));
            }
            out |= u64::from(b & 0x7f) << shift;
            if b & 0x80 == 0 {
                return Ok(out);
            }
            shift += 7;
            if shift > 63 {
                return Err(TermDictError::Corruption("vlong longer than 10 bytes".into()));
            }
        }
    }

    /// Borrow the next `len` bytes and advance past them.
    pub fn read_bytes(&mut self, len: usize) -> TermDictResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or_else(|| {
            TermDictError::Corruption("strip length overflows usize".into())
        })?;
        if end > self.buf.len() {
            return Err(TermDictError::Corruption(format!(
                "strip truncated: need {len} bytes at {}, have {}",
                self.pos,
                self.buf.len() - self.pos
            )));
        }
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    /// Advance past `len` bytes without borrowing them.
    pub fn skip(&mut self, len: usize) -> TermDictResult<()> {
        self.read_bytes(len).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vint_roundtrip_boundaries() {
        for v in [0u32, 1, 0x7f, 0x80, 0x3fff, 0x4000, 0x1f_ffff, u32::MAX] {
            let mut buf = Vec::new();
            write_vint(&mut buf, v);
            assert_eq!(buf.len(), vint_len(v));
            let mut cur = std::io::Cursor::new(&buf);
            assert_eq!(read_vint(&mut cur).unwrap(), v);

            let mut sr = SliceReader::new(&buf);
            assert_eq!(sr.read_vint().unwrap(), v);
            assert!(sr.exhausted());
        }
    }

    #[test]
    fn vlong_roundtrip_boundaries() {
        for v in [0u64, 0x7f, 0x80, 1 << 35, (1 << 62) - 1, u64::MAX] {
            let mut buf = Vec::new();
            write_vlong(&mut buf, v);
            let mut sr = SliceReader::new(&buf);
            assert_eq!(sr.read_vlong().unwrap(), v);
        }
    }

    #[test]
    fn vint_rejects_six_bytes() {
        let buf = [0x80u8, 0x80, 0x80, 0x80, 0x80, 0x01];
        let mut sr = SliceReader::new(&buf);
        assert!(matches!(
            sr.read_vint(),
            Err(TermDictError::Corruption(_))
        ));
    }

    #[test]
    fn vint_rejects_overflow_in_fifth_byte() {
        // 5th byte may only carry 4 significant bits.
        let buf = [0xffu8, 0xff, 0xff, 0xff, 0x1f];
        let mut sr = SliceReader::new(&buf);
        assert!(sr.read_vint().is_err());
    }

    #[test]
    fn slice_reader_truncation_is_corruption() {
        let buf = [0x05u8];
        let mut sr = SliceReader::new(&buf);
        assert_eq!(sr.read_u8().unwrap(), 5);
        assert!(matches!(
            sr.read_bytes(1),
            Err(TermDictError::Corruption(_))
        ));
    }
}
