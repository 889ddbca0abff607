use std::io::Read;

use flate2::bufread::ZlibDecoder;

use crate::core::error::DecodeError;

/// Size of the envelope header preceding every compressed record.
pub const HEADER_SIZE: usize = 9;

/// Sub-algorithm byte expected behind the zlib magics.
const Z_DEFLATED: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// "ZL": zlib deflate.
    Zlib,
    /// "CS": the pre-zlib format; recognized but not inflatable.
    OldZlib,
    /// "XZ": lzma.
    Lzma,
    /// "L4": lz4 block behind an 8-byte checksum.
    Lz4,
}

/// Decoded 9-byte envelope header: 2-byte magic, 1-byte algorithm id,
/// 3-byte little-endian-assembled compressed size, 3 reserved bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeHeader {
    pub algorithm: Algorithm,
    pub compressed: usize,
}

pub fn read_header(buf: &[u8]) -> Result<EnvelopeHeader, DecodeError> {
    if buf.len() < HEADER_SIZE {
        return Err(DecodeError::TruncatedBuffer {
            offset: buf.len(),
            len: buf.len(),
        });
    }
    let magic = [buf[0], buf[1]];
    let algo = buf[2];
    let algorithm = match (&magic, algo) {
        (b"ZL", Z_DEFLATED) => Algorithm::Zlib,
        (b"CS", Z_DEFLATED) => Algorithm::OldZlib,
        (b"XZ", 0) => Algorithm::Lzma,
        (b"L4", _) => Algorithm::Lz4,
        _ => return Err(DecodeError::UnsupportedCompression { magic, algo }),
    };
    let compressed = buf[3] as usize | (buf[4] as usize) << 8 | (buf[5] as usize) << 16;
    Ok(EnvelopeHeader {
        algorithm,
        compressed,
    })
}

/// Inflate one enveloped record. `declared_total` is the on-disk size the
/// directory entry claims for the record (header included); a disagreement
/// with the envelope's own size is an [`DecodeError::EnvelopeMismatch`].
pub fn inflate(buf: &[u8], declared_total: usize) -> Result<Vec<u8>, DecodeError> {
    let hdr = read_header(buf)?;
    if hdr.compressed + HEADER_SIZE != declared_total {
        return Err(DecodeError::EnvelopeMismatch {
            declared: declared_total,
            actual: hdr.compressed + HEADER_SIZE,
        });
    }
    let body = buf
        .get(HEADER_SIZE..HEADER_SIZE + hdr.compressed)
        .ok_or(DecodeError::TruncatedBuffer {
            offset: HEADER_SIZE + hdr.compressed,
            len: buf.len(),
        })?;
    let mut out = Vec::new();
    match hdr.algorithm {
        Algorithm::Zlib => {
            // the two bytes after the envelope header are zlib's own prefix
            ZlibDecoder::new(body)
                .read_to_end(&mut out)
                .map_err(|_| DecodeError::EnvelopeMismatch {
                    declared: declared_total,
                    actual: HEADER_SIZE,
                })?;
        }
        Algorithm::Lzma => {
            let mut reader = std::io::BufReader::new(body);
            lzma_rs::xz_decompress(&mut reader, &mut out).map_err(|_| {
                DecodeError::EnvelopeMismatch {
                    declared: declared_total,
                    actual: HEADER_SIZE,
                }
            })?;
        }
        Algorithm::Lz4 => {
            // 8 bytes of checksum precede the block
            let block = body.get(8..).ok_or(DecodeError::TruncatedBuffer {
                offset: HEADER_SIZE + 8,
                len: buf.len(),
            })?;
            out = lz4_compress::decompress(block).map_err(|_| DecodeError::EnvelopeMismatch {
                declared: declared_total,
                actual: HEADER_SIZE,
            })?;
        }
        Algorithm::OldZlib => {
            return Err(DecodeError::UnsupportedCompression {
                magic: *b"CS",
                algo: Z_DEFLATED,
            })
        }
    }
    Ok(out)
}
