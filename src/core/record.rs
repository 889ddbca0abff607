use tracing::warn;

use crate::core::error::ByteCountMismatch;
use crate::core::{Cursor, DecodeError, K_BYTE_COUNT_MASK};

/// The `[byte count][version]` envelope wrapping every streamed class
/// instance. The byte count covers everything after itself; two bytes of it
/// are the version field, so the element program owns `byte_count` bytes
/// starting at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionedRecord {
    pub version: u16,
    /// Cursor position immediately after the version field.
    pub start: usize,
    /// Declared size of the element program's bytes; absent when the
    /// producer wrote a bare version word.
    pub byte_count: Option<usize>,
}

impl VersionedRecord {
    pub fn open(cur: &mut Cursor) -> Result<Self, DecodeError> {
        let first = cur.read_u32()?;
        let byte_count = if first & K_BYTE_COUNT_MASK != 0 {
            Some(((first & !K_BYTE_COUNT_MASK) as usize).saturating_sub(2))
        } else {
            None
        };
        let version = cur.read_u16()?;
        Ok(VersionedRecord {
            version,
            start: cur.pos(),
            byte_count,
        })
    }

    /// Reconcile the cursor against the declared byte count. The cursor is
    /// always realigned to the producer's stated end, which keeps downstream
    /// decoding alive across a locally buggy element program; when `context`
    /// is given the discrepancy is recorded and logged.
    pub fn close(
        &self,
        cur: &mut Cursor,
        context: Option<&str>,
        warnings: &mut Vec<ByteCountMismatch>,
    ) {
        let expected = match self.byte_count {
            Some(n) => n,
            None => return,
        };
        let end = self.start + expected;
        if cur.pos() == end {
            return;
        }
        let actual = cur.pos().saturating_sub(self.start);
        if let Some(ctx) = context {
            warn!(
                context = ctx,
                expected, actual, "byte count mismatch, realigning cursor"
            );
            warnings.push(ByteCountMismatch {
                context: ctx.to_string(),
                expected,
                actual,
            });
        }
        cur.set_pos(end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_bytes(body: &[u8], version: u16) -> Vec<u8> {
        let mut buf = (K_BYTE_COUNT_MASK | (body.len() as u32 + 2)).to_be_bytes().to_vec();
        buf.extend_from_slice(&version.to_be_bytes());
        buf.extend_from_slice(body);
        buf
    }

    #[test]
    fn open_reads_count_and_version() {
        let buf = record_bytes(&[0; 10], 7);
        let mut cur = Cursor::new(&buf);
        let rec = VersionedRecord::open(&mut cur).unwrap();
        assert_eq!(rec.version, 7);
        assert_eq!(rec.start, 6);
        assert_eq!(rec.byte_count, Some(10));
    }

    #[test]
    fn bare_version_has_no_count() {
        let buf = [0x00, 0x00, 0x00, 0x05, 0x00, 0x02];
        let mut cur = Cursor::new(&buf);
        // first word lacks the count bit: it is consumed as the count word
        // anyway, the record just cannot be checked
        let rec = VersionedRecord::open(&mut cur).unwrap();
        assert_eq!(rec.byte_count, None);
        assert_eq!(rec.version, 2);
    }

    #[test]
    fn close_heals_under_and_over_reads() {
        let buf = record_bytes(&[0; 16], 1);
        for wrong_pos in [9, 30] {
            let mut cur = Cursor::new(&buf);
            let rec = VersionedRecord::open(&mut cur).unwrap();
            cur.set_pos(wrong_pos);
            let mut warnings = Vec::new();
            rec.close(&mut cur, Some("test record"), &mut warnings);
            assert_eq!(cur.pos(), rec.start + 16);
            assert_eq!(
                warnings,
                vec![ByteCountMismatch {
                    context: "test record".into(),
                    expected: 16,
                    actual: wrong_pos - rec.start,
                }]
            );
        }
    }

    #[test]
    fn silent_close_still_realigns() {
        let buf = record_bytes(&[0; 8], 3);
        let mut cur = Cursor::new(&buf);
        let rec = VersionedRecord::open(&mut cur).unwrap();
        cur.set_pos(rec.start + 2);
        let mut warnings = Vec::new();
        rec.close(&mut cur, None, &mut warnings);
        assert_eq!(cur.pos(), rec.start + 8);
        assert!(warnings.is_empty());
    }
}
