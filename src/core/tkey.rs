use nom::bytes::complete::{tag, take};
use nom::combinator::map;
use nom::number::complete::{be_i16, be_i32, be_u128, be_u16, be_u32, be_u64, be_u8};
use nom::IResult;
use uuid::Uuid;

use crate::core::error::DecodeError;

/// Size of the serialized file header in bytes (the 64-bit layout; the
/// 32-bit one is shorter and parsing stops early).
pub const FILE_HEADER_SIZE: u64 = 75;

/// Maximal size of a serialized directory record (64-bit seek pointers).
pub const DIRECTORY_RECORD_MAX_SIZE: u64 = 42;

/// Records whose end crosses this offset switch to 8-byte seek pointers.
/// The decision is per record, not per file.
const LARGE_RECORD_THRESHOLD: u64 = 2 * 1024 * 1024 * 1024;

/// The fixed-layout header at offset 0 of every file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub version: i32,
    pub begin: i32,
    pub end: u64,
    pub seek_free: u64,
    pub nbytes_free: i32,
    pub n_free: i32,
    pub nbytes_name: i32,
    pub pointer_size: u8,
    pub compression: i32,
    pub seek_info: u64,
    pub nbytes_info: i32,
    pub uuid: Uuid,
    /// Where the root directory record starts: past the file's own name
    /// block at `begin`.
    pub seek_dir: u64,
}

/// One directory entry: where a named, typed, possibly compressed payload
/// lives and how big it is on disk and decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TKey {
    /// On-disk size of the whole record, key header included.
    pub total_size: u32,
    pub version: u16,
    /// Decoded payload size.
    pub uncomp_len: u32,
    pub datime: u32,
    /// Size of the key header; the payload follows it.
    pub key_len: u16,
    /// Versioning counter; several keys may share a name.
    pub cycle: u16,
    /// Absolute offset of the record (its own position, as a consistency
    /// anchor).
    pub seek_key: u64,
    /// Absolute offset of the owning directory's record.
    pub seek_pdir: u64,
    pub class_name: String,
    pub name: String,
    pub title: String,
}

impl TKey {
    /// Absolute offset of the payload bytes.
    pub fn data_offset(&self) -> u64 {
        self.seek_key + self.key_len as u64
    }

    /// On-disk payload size.
    pub fn payload_len(&self) -> u32 {
        self.total_size - self.key_len as u32
    }

    /// A payload stored smaller than its decoded size went through the
    /// compression envelope.
    pub fn is_compressed(&self) -> bool {
        self.uncomp_len > self.payload_len()
    }
}

/// Directory body as serialized in the file: creation info, the size and
/// position of its key list, and the seek chain to its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRecord {
    pub version: i16,
    pub c_time: u32,
    pub m_time: u32,
    pub nbytes_keys: i32,
    pub nbytes_name: i32,
    pub seek_dir: u64,
    pub seek_parent: u64,
    pub seek_keys: u64,
}

/// Parse the opening bytes of a file.
pub fn file_header(i: &[u8]) -> IResult<&[u8], FileHeader> {
    fn version_dep_int(i: &[u8], is_64_bit: bool) -> IResult<&[u8], u64> {
        if is_64_bit {
            be_u64(i)
        } else {
            let (i, v) = be_u32(i)?;
            Ok((i, v as u64))
        }
    }
    let (i, _) = tag("root")(i)?;
    let (i, version) = be_i32(i)?;
    let is_64_bit = version >= 1_000_000;
    let (i, begin) = be_i32(i)?;
    let (i, end) = version_dep_int(i, is_64_bit)?;
    let (i, seek_free) = version_dep_int(i, is_64_bit)?;
    let (i, nbytes_free) = be_i32(i)?;
    let (i, n_free) = be_i32(i)?;
    let (i, nbytes_name) = be_i32(i)?;
    let (i, pointer_size) = be_u8(i)?;
    let (i, compression) = be_i32(i)?;
    let (i, seek_info) = version_dep_int(i, is_64_bit)?;
    let (i, nbytes_info) = be_i32(i)?;
    let (i, _uuid_version) = be_u16(i)?;
    let (i, uuid) = be_u128(i)?;

    let uuid = Uuid::from_u128(uuid);
    let seek_dir = (begin + nbytes_name) as u64;
    Ok((
        i,
        FileHeader {
            version,
            begin,
            end,
            seek_free,
            nbytes_free,
            n_free,
            nbytes_name,
            pointer_size,
            compression,
            seek_info,
            nbytes_info,
            uuid,
            seek_dir,
        },
    ))
}

/// Seek pointer whose width depends on the record version.
fn versioned_pointer(i: &[u8], version: i16) -> IResult<&[u8], u64> {
    if version > 1000 {
        be_u64(i)
    } else {
        map(be_u32, u64::from)(i)
    }
}

/// Parse a directory record (the root directory's, or the payload of a
/// directory key).
pub fn directory_record(i: &[u8]) -> IResult<&[u8], DirectoryRecord> {
    let (i, version) = be_i16(i)?;
    let (i, c_time) = be_u32(i)?;
    let (i, m_time) = be_u32(i)?;
    let (i, nbytes_keys) = be_i32(i)?;
    let (i, nbytes_name) = be_i32(i)?;
    let (i, seek_dir) = versioned_pointer(i, version)?;
    let (i, seek_parent) = versioned_pointer(i, version)?;
    let (i, seek_keys) = versioned_pointer(i, version)?;
    Ok((
        i,
        DirectoryRecord {
            version,
            c_time,
            m_time,
            nbytes_keys,
            nbytes_name,
            seek_dir,
            seek_parent,
            seek_keys,
        },
    ))
}

/// Length-prefixed string with the 0xFF four-byte escape; a leading NUL in
/// the content means the empty string.
pub fn tstring(i: &[u8]) -> IResult<&[u8], String> {
    let (i, len) = be_u8(i)?;
    let (i, len) = if len == 0xFF {
        be_u32(i)?
    } else {
        (i, len as u32)
    };
    let (i, bytes) = take(len)(i)?;
    let s = if bytes.first() == Some(&0) {
        String::new()
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    };
    Ok((i, s))
}

/// Parse one key at absolute file offset `seek`; the offset feeds the
/// large-record pointer-width decision.
pub fn tkey(i: &[u8], seek: u64) -> IResult<&[u8], TKey> {
    let (i, nbytes) = be_i32(i)?;
    let total_size = nbytes.unsigned_abs();
    let (i, version) = be_u16(i)?;
    let (i, uncomp_len) = be_u32(i)?;
    let (i, datime) = be_u32(i)?;
    let (i, key_len) = be_u16(i)?;
    let (i, cycle) = be_u16(i)?;
    let large = seek + total_size as u64 > LARGE_RECORD_THRESHOLD;
    let (i, seek_key) = if large {
        be_u64(i)?
    } else {
        map(be_u32, u64::from)(i)?
    };
    let (i, seek_pdir) = if large {
        be_u64(i)?
    } else {
        map(be_u32, u64::from)(i)?
    };
    let (i, class_name) = tstring(i)?;
    let (i, name) = tstring(i)?;
    let (i, title) = tstring(i)?;
    Ok((
        i,
        TKey {
            total_size,
            version,
            uncomp_len,
            datime,
            key_len,
            cycle,
            seek_key,
            seek_pdir,
            class_name,
            name,
            title,
        },
    ))
}

/// Non-combinator entry point for callers that walk buffers by offset.
pub(crate) fn parse_tkey(buf: &[u8], seek: u64) -> Result<TKey, DecodeError> {
    match tkey(buf, seek) {
        Ok((_rest, key)) => Ok(key),
        Err(_) => Err(DecodeError::TruncatedBuffer {
            offset: 0,
            len: buf.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::Writer;

    fn key_bytes(seek_width_64: bool) -> Vec<u8> {
        let mut w = Writer::new();
        w.i32(200);
        w.u16(4);
        w.u32(500);
        w.u32(0);
        w.u16(60);
        w.u16(2);
        if seek_width_64 {
            w.u64(3_000_000_000);
            w.u64(100);
        } else {
            w.u32(400);
            w.u32(100);
        }
        w.tstring("TH1D");
        w.tstring("spectrum");
        w.tstring("fit input");
        w.into_vec()
    }

    #[test]
    fn small_key_parses() {
        let buf = key_bytes(false);
        let (_rest, key) = tkey(&buf, 400).unwrap();
        assert_eq!(key.total_size, 200);
        assert_eq!(key.uncomp_len, 500);
        assert_eq!(key.key_len, 60);
        assert_eq!(key.cycle, 2);
        assert_eq!(key.seek_key, 400);
        assert_eq!(key.class_name, "TH1D");
        assert_eq!(key.name, "spectrum");
        assert_eq!(key.title, "fit input");
        assert!(key.is_compressed());
        assert_eq!(key.data_offset(), 460);
    }

    #[test]
    fn keys_past_two_gib_use_wide_pointers() {
        let buf = key_bytes(true);
        let (_rest, key) = tkey(&buf, 3_000_000_000).unwrap();
        assert_eq!(key.seek_key, 3_000_000_000);
        assert_eq!(key.seek_pdir, 100);
    }

    #[test]
    fn negative_record_length_is_taken_absolute() {
        let mut buf = key_bytes(false);
        buf[..4].copy_from_slice(&(-200i32).to_be_bytes());
        let (_rest, key) = tkey(&buf, 400).unwrap();
        assert_eq!(key.total_size, 200);
    }

    #[test]
    fn header_and_directory_round_trip() {
        let file = crate::test_utils::build_minimal_file();
        let (_rest, hdr) = file_header(&file).unwrap();
        assert_eq!(hdr.begin, 100);
        assert_eq!(hdr.seek_dir, 136);
        assert!(hdr.seek_info > 0);
        assert_eq!(hdr.uuid, Uuid::nil());
        let (_rest, dir) = directory_record(&file[hdr.seek_dir as usize..]).unwrap();
        assert_eq!(dir.version, 5);
        assert!(dir.seek_keys > hdr.seek_info);
        assert!(dir.nbytes_keys > 0);
    }
}
