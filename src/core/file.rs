use std::sync::{Arc, RwLock};

use failure::{Error, Fail};
use tracing::{debug, warn};

use crate::core::error::ByteCountMismatch;
use crate::core::refs::ClassTagMap;
use crate::core::tkey::{
    self, DirectoryRecord, FileHeader, TKey, DIRECTORY_RECORD_MAX_SIZE, FILE_HEADER_SIZE,
};
use crate::core::{compression, Cursor, DecodeError, DecodeSession, DecodedObject, Source};
use crate::streamer::{StreamerCatalog, Streamers};

/// A directory node of the key index: its own keys plus nested directories,
/// walked once at open time.
#[derive(Debug)]
pub struct Directory {
    pub name: String,
    pub keys: Vec<TKey>,
    pub dirs: Vec<Directory>,
}

impl Directory {
    fn find_key(&self, name: &str, cycle: u16) -> Option<&TKey> {
        self.keys
            .iter()
            .find(|k| k.name == name && k.cycle == cycle)
            .or_else(|| self.dirs.iter().find_map(|d| d.find_key(name, cycle)))
    }
}

/// Result of decoding one key: the object graph plus any byte-count
/// mismatches that were healed along the way.
#[derive(Debug)]
pub struct Decoded {
    pub obj: Arc<DecodedObject>,
    pub warnings: Vec<ByteCountMismatch>,
}

/// An open file, ready for key reads: byte source, parsed header, the full
/// key index and the shared streamer state.
#[derive(Debug)]
pub struct RootFile {
    source: Source,
    hdr: FileHeader,
    root: Directory,
    streamers: Streamers,
}

impl RootFile {
    /// Open a file: read the fixed header, walk the directory tree into a
    /// key index, and load the streamer-info catalog. Only then can
    /// payloads be decoded.
    pub fn open<S: Into<Source>>(source: S) -> Result<Self, Error> {
        let source = source.into();
        let hdr = source.fetch(0, FILE_HEADER_SIZE).and_then(|buf| {
            tkey::file_header(&buf)
                .map(|(_i, h)| h)
                .map_err(|_| format_err!("failed to parse file header"))
        })?;
        debug!(version = hdr.version, end = hdr.end, "file header read");
        let dir = source
            .fetch(hdr.seek_dir, DIRECTORY_RECORD_MAX_SIZE)
            .and_then(|buf| {
                tkey::directory_record(&buf)
                    .map(|(_i, d)| d)
                    .map_err(|_| format_err!("failed to parse root directory record"))
            })?;
        let classes = RwLock::new(ClassTagMap::default());
        let root = walk_directory(&source, &dir, String::new())?;
        let catalog = load_catalog(&source, &hdr, &classes)?;
        debug!(classes = catalog.len(), "streamer catalog loaded");
        Ok(RootFile {
            source,
            hdr,
            root,
            streamers: Streamers::new(catalog, classes),
        })
    }

    pub fn header(&self) -> &FileHeader {
        &self.hdr
    }

    pub fn root_directory(&self) -> &Directory {
        &self.root
    }

    pub fn streamer_catalog(&self) -> &StreamerCatalog {
        self.streamers.catalog()
    }

    /// Keys of one directory; `""` or `"/"` is the file itself, nested
    /// directories are addressed with `/`-separated paths.
    pub fn list_keys(&self, path: &str) -> Result<&[TKey], Error> {
        let mut dir = &self.root;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            dir = dir
                .dirs
                .iter()
                .find(|d| d.name == part)
                .ok_or_else(|| format_err!("no directory `{}` in file", path))?;
        }
        Ok(&dir.keys)
    }

    /// Find a key anywhere in the index by name and cycle.
    pub fn get_key(&self, name: &str, cycle: u16) -> Option<&TKey> {
        self.root.find_key(name, cycle)
    }

    /// Decode the object stored under `(name, cycle)`.
    pub fn read_object(&self, name: &str, cycle: u16) -> Result<Decoded, Error> {
        let key = self.get_key(name, cycle).ok_or(DecodeError::KeyNotFound {
            name: name.to_string(),
            cycle,
        })?;
        self.read_key(key)
    }

    /// Decode the payload of a key. Failures are scoped to this key and
    /// identify it; the index and catalog stay usable.
    pub fn read_key(&self, key: &TKey) -> Result<Decoded, Error> {
        self.decode_key(key).map_err(|e| {
            e.context(format!("reading key `{}` cycle {}", key.name, key.cycle))
                .into()
        })
    }

    fn decode_key(&self, key: &TKey) -> Result<Decoded, Error> {
        let payload = read_key_payload(&self.source, key)?;
        let mut cur = Cursor::new(&payload);
        let mut session = DecodeSession::new(key.key_len as u64, self.streamers.classes());
        let mut obj = DecodedObject::new(&key.class_name);
        self.streamers
            .class_streamer(&mut cur, &mut session, &mut obj, &key.class_name)?;
        Ok(Decoded {
            obj: Arc::new(obj),
            warnings: session.warnings,
        })
    }
}

/// Fetch a key's payload and undo the compression envelope when the stored
/// size is smaller than the decoded one.
fn read_key_payload(source: &Source, key: &TKey) -> Result<Vec<u8>, Error> {
    let len = key.payload_len() as u64;
    let raw = source.fetch(key.data_offset(), len)?;
    if key.is_compressed() {
        Ok(compression::inflate(&raw, len as usize)?)
    } else {
        Ok(raw)
    }
}

/// Key list of one directory: a header key, a count, then the keys, each
/// advanced over by its declared header length.
fn read_key_list(source: &Source, seek_keys: u64, nbytes_keys: u64) -> Result<Vec<TKey>, Error> {
    let buf = source.fetch(seek_keys, nbytes_keys)?;
    let header = tkey::parse_tkey(&buf, seek_keys)?;
    let mut cur = Cursor::with_pos(&buf, header.key_len as usize);
    let n = cur.read_i32()?;
    let mut keys = Vec::with_capacity(n.max(0) as usize);
    let mut off = cur.pos();
    for _ in 0..n {
        let key = tkey::parse_tkey(&buf[off..], seek_keys + off as u64)?;
        off += key.key_len as usize;
        keys.push(key);
    }
    Ok(keys)
}

/// Build the index below one directory record. A broken sub-directory is
/// skipped with a warning; it must not take the rest of the index with it.
fn walk_directory(source: &Source, rec: &DirectoryRecord, name: String) -> Result<Directory, Error> {
    let keys = read_key_list(source, rec.seek_keys, rec.nbytes_keys as u64)?;
    let mut dirs = Vec::new();
    for key in &keys {
        if key.class_name != "TDirectory" && key.class_name != "TDirectoryFile" {
            continue;
        }
        let sub = read_key_payload(source, key).and_then(|payload| {
            tkey::directory_record(&payload)
                .map(|(_i, d)| d)
                .map_err(|_| format_err!("failed to parse directory record of `{}`", key.name))
        });
        match sub {
            Ok(subrec) => dirs.push(walk_directory(source, &subrec, key.name.clone())?),
            Err(err) => warn!(directory = key.name.as_str(), %err, "skipping unreadable directory"),
        }
    }
    Ok(Directory { name, keys, dirs })
}

/// Read and parse the streamer-info record the header points at. The class
/// map fills up as a side effect and stays with the file.
fn load_catalog(
    source: &Source,
    hdr: &FileHeader,
    classes: &RwLock<ClassTagMap>,
) -> Result<StreamerCatalog, Error> {
    if hdr.seek_info == 0 || hdr.nbytes_info <= 0 {
        return Ok(StreamerCatalog::default());
    }
    let buf = source.fetch(hdr.seek_info, hdr.nbytes_info as u64)?;
    let key = tkey::parse_tkey(&buf, hdr.seek_info)?;
    let payload = read_key_payload(source, &key)?;
    let mut session = DecodeSession::new(key.key_len as u64, classes);
    let catalog = StreamerCatalog::parse(&payload, &mut session)
        .map_err(|e| Error::from(e.context("parsing streamer info catalog")))?;
    for w in &session.warnings {
        warn!(
            context = w.context.as_str(),
            expected = w.expected,
            actual = w.actual,
            "byte count mismatch in streamer info"
        );
    }
    Ok(catalog)
}
