use nom::number::complete::{
    be_f32, be_f64, be_i16, be_i32, be_i64, be_i8, be_u16, be_u32, be_u64, be_u8,
};
use nom::IResult;

use crate::core::error::DecodeError;

/// Magnitudes below this decode to exactly 0.0; some producers emit
/// denormal garbage in unset histogram bins.
const DENORMAL_CUTOFF: f64 = 1e-300;

/// Positioned reader over an immutable byte buffer. All multi-byte reads are
/// big-endian; every read advances the position and fails with
/// [`DecodeError::TruncatedBuffer`] instead of running past the end.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Cursor { buf, pos: 0 }
    }

    pub fn with_pos(buf: &'a [u8], pos: usize) -> Self {
        Cursor { buf, pos }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Positions past the end are representable (a later byte-count
    /// realignment may point there); the next read reports truncation.
    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn skip(&mut self, n: usize) -> Result<(), DecodeError> {
        if self.pos + n > self.buf.len() {
            return Err(self.truncated());
        }
        self.pos += n;
        Ok(())
    }

    fn truncated(&self) -> DecodeError {
        DecodeError::TruncatedBuffer {
            offset: self.pos,
            len: self.buf.len(),
        }
    }

    fn rest(&self) -> &'a [u8] {
        self.buf.get(self.pos..).unwrap_or(&[])
    }

    /// Run a nom parser at the current position and advance past what it
    /// consumed. Keys and payloads thereby share one set of decoders.
    fn parse<O>(
        &mut self,
        p: impl FnOnce(&'a [u8]) -> IResult<&'a [u8], O>,
    ) -> Result<O, DecodeError> {
        match p(self.rest()) {
            Ok((rest, v)) => {
                self.pos = self.buf.len() - rest.len();
                Ok(v)
            }
            Err(_) => Err(self.truncated()),
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        self.parse(be_u8)
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        self.parse(be_u16)
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        self.parse(be_u32)
    }

    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        self.parse(be_u64)
    }

    pub fn read_i8(&mut self) -> Result<i8, DecodeError> {
        self.parse(be_i8)
    }

    pub fn read_i16(&mut self) -> Result<i16, DecodeError> {
        self.parse(be_i16)
    }

    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        self.parse(be_i32)
    }

    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        self.parse(be_i64)
    }

    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        let v = self.parse(be_f32)?;
        Ok(if (v.abs() as f64) < DENORMAL_CUTOFF {
            0.0
        } else {
            v
        })
    }

    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        let v = self.parse(be_f64)?;
        Ok(if v.abs() < DENORMAL_CUTOFF { 0.0 } else { v })
    }

    /// NUL-terminated string. `max_len == 0` means unbounded; the terminator
    /// is consumed when present, a hit length cap leaves the position on the
    /// first unread byte.
    pub fn read_string(&mut self, max_len: usize) -> Result<String, DecodeError> {
        let rest = self.rest();
        let mut len = 0;
        loop {
            if max_len > 0 && len >= max_len {
                self.pos += len;
                break;
            }
            match rest.get(len) {
                Some(0) => {
                    self.pos += len + 1;
                    break;
                }
                Some(_) => len += 1,
                None => return Err(self.truncated()),
            }
        }
        Ok(String::from_utf8_lossy(&rest[..len]).into_owned())
    }

    /// Length-prefixed string: one length byte, with `0xFF` escaping to a
    /// four-byte length. Content starting with a NUL decodes as the empty
    /// string (the format's "null string" convention) but still advances by
    /// the declared length.
    pub fn read_tstring(&mut self) -> Result<String, DecodeError> {
        let len = self.read_u8()?;
        let len = if len == 0xFF {
            self.read_u32()? as usize
        } else {
            len as usize
        };
        let start = self.pos;
        self.skip(len)?;
        let bytes = &self.buf[start..start + len];
        if bytes.first() == Some(&0) {
            return Ok(String::new());
        }
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_round_trip() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0xdeadbeef_u32.to_be_bytes());
        buf.extend_from_slice(&(-513_i16).to_be_bytes());
        buf.extend_from_slice(&3.5_f64.to_be_bytes());
        buf.extend_from_slice(&(-1.25_f32).to_be_bytes());
        let mut cur = Cursor::new(&buf);
        assert_eq!(cur.read_u32().unwrap(), 0xdeadbeef);
        assert_eq!(cur.read_i16().unwrap(), -513);
        assert_eq!(cur.read_f64().unwrap(), 3.5);
        assert_eq!(cur.read_f32().unwrap(), -1.25);
        assert_eq!(cur.pos(), buf.len());
    }

    #[test]
    fn denormals_clamp_to_zero() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1e-310_f64.to_be_bytes());
        buf.extend_from_slice(&1e-301_f64.to_be_bytes());
        buf.extend_from_slice(&1e-299_f64.to_be_bytes());
        let mut cur = Cursor::new(&buf);
        assert_eq!(cur.read_f64().unwrap(), 0.0);
        assert_eq!(cur.read_f64().unwrap(), 0.0);
        assert_eq!(cur.read_f64().unwrap(), 1e-299);
    }

    #[test]
    fn reads_past_end_fail() {
        let buf = [0u8; 3];
        let mut cur = Cursor::new(&buf);
        assert!(matches!(
            cur.read_u32(),
            Err(DecodeError::TruncatedBuffer { .. })
        ));
        // a failed read does not advance
        assert_eq!(cur.pos(), 0);
        cur.set_pos(10);
        assert!(cur.read_u8().is_err());
    }

    #[test]
    fn tstring_short_and_escaped() {
        let mut buf = vec![3];
        buf.extend_from_slice(b"abc");
        let long = "x".repeat(300);
        buf.push(0xFF);
        buf.extend_from_slice(&300_u32.to_be_bytes());
        buf.extend_from_slice(long.as_bytes());
        buf.push(0); // zero-length string
        let mut cur = Cursor::new(&buf);
        assert_eq!(cur.read_tstring().unwrap(), "abc");
        assert_eq!(cur.read_tstring().unwrap(), long);
        assert_eq!(cur.read_tstring().unwrap(), "");
        assert_eq!(cur.pos(), buf.len());
    }

    #[test]
    fn tstring_leading_nul_is_empty() {
        let buf = [2, 0, 7, 9];
        let mut cur = Cursor::new(&buf);
        assert_eq!(cur.read_tstring().unwrap(), "");
        // still advanced by the declared length
        assert_eq!(cur.pos(), 3);
    }

    #[test]
    fn nul_terminated_string() {
        let buf = b"hello\0world";
        let mut cur = Cursor::new(buf);
        assert_eq!(cur.read_string(0).unwrap(), "hello");
        assert_eq!(cur.pos(), 6);
        assert_eq!(cur.read_string(3).unwrap(), "wor");
        assert_eq!(cur.pos(), 9);
    }
}
