//! Helpers for building wire-format byte sequences by hand: a big-endian
//! patch-writer, class-word emission with the same tag arithmetic the
//! decoder uses, and a complete synthetic file for end-to-end tests.

use std::collections::HashMap;
use std::io::Write as _;

use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::core::{K_BYTE_COUNT_MASK, K_CLASS_MASK, K_NEW_CLASS_TAG};
use crate::streamer::element::type_code;
use crate::MAP_OFFSET;

/// Append-only big-endian writer with 32-bit backpatching, for length
/// fields that are only known once the record body is written.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Writer::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    pub fn raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// NUL-terminated string.
    pub fn cstring(&mut self, s: &str) {
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
    }

    /// Length-prefixed string with the 0xFF four-byte escape.
    pub fn tstring(&mut self, s: &str) {
        if s.len() >= 255 {
            self.buf.push(0xFF);
            self.u32(s.len() as u32);
        } else {
            self.buf.push(s.len() as u8);
        }
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn placeholder_u32(&mut self) -> usize {
        let at = self.buf.len();
        self.u32(0);
        at
    }

    pub fn patch_u32(&mut self, at: usize, v: u32) {
        self.buf[at..at + 4].copy_from_slice(&v.to_be_bytes());
    }

    /// Write a `[byte count][version]` record envelope around `body`,
    /// backpatching the count once the body size is known.
    pub fn versioned(&mut self, version: u16, body: impl FnOnce(&mut Writer)) {
        let patch = self.placeholder_u32();
        self.u16(version);
        let start = self.len();
        body(self);
        let count = (self.len() - start) as u32 + 2;
        self.patch_u32(patch, K_BYTE_COUNT_MASK | count);
    }

    /// Base-object header: version word, unique id, status bits.
    pub fn tobject(&mut self) {
        self.u16(1);
        self.u32(0);
        self.u32(0x0300_0000);
    }

    /// Named-object layout as the decoder's TNamed reader expects it.
    pub fn tnamed(&mut self, name: &str, title: &str) {
        self.versioned(1, |w| {
            w.tobject();
            w.tstring(name);
            w.tstring(title);
        });
    }

    /// Emit a class word (new class, or a class reference for classes seen
    /// before) followed by the object body, mirroring the decoder's tag
    /// arithmetic so back-references can be computed by hand.
    pub fn object_any(
        &mut self,
        reg: &mut ClassReg,
        class: &str,
        body: impl FnOnce(&mut Writer, &mut ClassReg),
    ) {
        let patch = self.placeholder_u32();
        let startpos = self.len();
        match reg.tags.get(class) {
            Some(&tag) => self.u32(K_CLASS_MASK | tag),
            None => {
                self.u32(K_NEW_CLASS_TAG);
                self.cstring(class);
                reg.tags.insert(
                    class.to_string(),
                    reg.key_len as u32 + startpos as u32 + MAP_OFFSET as u32,
                );
            }
        }
        body(self, reg);
        let count = (self.len() - startpos) as u32;
        self.patch_u32(patch, K_BYTE_COUNT_MASK | count);
    }
}

/// Builder-side mirror of the class tag map: remembers under which tag each
/// class name was first emitted. `key_len` plays the record-tag-offset role.
#[derive(Debug)]
pub struct ClassReg {
    key_len: u16,
    tags: HashMap<String, u32>,
}

impl ClassReg {
    pub fn new(key_len: u16) -> Self {
        ClassReg {
            key_len,
            tags: HashMap::new(),
        }
    }
}

/// Wrap `payload` in a ZL compression envelope.
pub fn zl_envelope(payload: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(payload).expect("in-memory write");
    let compressed = enc.finish().expect("in-memory write");
    let mut out = Vec::with_capacity(9 + compressed.len());
    out.extend_from_slice(b"ZL");
    out.push(8);
    let c = compressed.len() as u32;
    out.extend_from_slice(&[c as u8, (c >> 8) as u8, (c >> 16) as u8]);
    let u = payload.len() as u32;
    out.extend_from_slice(&[u as u8, (u >> 8) as u8, (u >> 16) as u8]);
    out.extend_from_slice(&compressed);
    out
}

/// Description of one basic-type member for the synthetic catalog.
#[derive(Debug, Clone)]
pub struct ElementSpec {
    pub name: &'static str,
    pub code: u32,
    pub type_name: &'static str,
    pub size: u32,
}

impl ElementSpec {
    pub fn basic(name: &'static str, code: u32, type_name: &'static str, size: u32) -> Self {
        ElementSpec {
            name,
            code,
            type_name,
            size,
        }
    }
}

/// Streamer-info payload describing a single class with basic-type members,
/// laid out exactly as the file-level catalog record is.
pub fn streamer_catalog_payload(
    key_len: u16,
    class_name: &str,
    class_version: u32,
    elements: &[ElementSpec],
) -> Vec<u8> {
    let mut w = Writer::new();
    let mut reg = ClassReg::new(key_len);
    w.versioned(5, |w| {
        w.tobject();
        w.tstring("");
        w.u32(1);
        w.object_any(&mut reg, "TStreamerInfo", |w, reg| {
            w.versioned(9, |w| {
                w.tnamed(class_name, "");
                w.u32(0x1234_5678); // checksum
                w.u32(class_version);
                w.object_any(reg, "TObjArray", |w, reg| {
                    w.versioned(3, |w| {
                        w.tobject();
                        w.tstring("");
                        w.u32(elements.len() as u32);
                        w.u32(0); // lower bound
                        for el in elements {
                            w.object_any(reg, "TStreamerBasicType", |w, _| {
                                w.versioned(2, |w| {
                                    w.versioned(4, |w| {
                                        w.tnamed(el.name, "");
                                        w.u32(el.code);
                                        w.u32(el.size);
                                        w.u32(0); // array length
                                        w.u32(0); // dimensions
                                        for _ in 0..5 {
                                            w.u32(0);
                                        }
                                        w.tstring(el.type_name);
                                    });
                                });
                            });
                        }
                    });
                });
            });
        });
        w.u8(0); // option string
    });
    w.into_vec()
}

fn key_len_for(class: &str, name: &str, title: &str) -> u16 {
    (26 + 1 + class.len() + 1 + name.len() + 1 + title.len()) as u16
}

fn tkey_bytes(
    nbytes: u32,
    obj_len: u32,
    cycle: u16,
    seek_key: u32,
    seek_pdir: u32,
    class: &str,
    name: &str,
    title: &str,
) -> Vec<u8> {
    let mut w = Writer::new();
    w.i32(nbytes as i32);
    w.i16(4); // key format version
    w.u32(obj_len);
    w.u32(0); // datime
    w.u16(key_len_for(class, name, title));
    w.u16(cycle);
    w.u32(seek_key);
    w.u32(seek_pdir);
    w.tstring(class);
    w.tstring(name);
    w.tstring(title);
    w.into_vec()
}

/// Values stored in the synthetic histogram; the end-to-end test asserts
/// them after the decode round trip.
pub const H1_FIELDS: &[(&str, f64)] = &[
    ("fNcells", 64.0),
    ("fDimension", 1.0),
    ("fEntries", 250.0),
    ("fXmin", -4.0),
    ("fXmax", 4.0),
    ("fSumw", 0.0),
    ("fSumw2", 0.0),
    ("fMaximum", 0.0),
    ("fMinimum", 0.0),
];

pub const H2_FIELDS: &[(&str, f64)] = &[
    ("fNcells", 12.0),
    ("fDimension", 1.0),
    ("fEntries", 42.0),
    ("fXmin", 0.0),
    ("fXmax", 6.0),
    ("fSumw", 0.0),
    ("fSumw2", 0.0),
    ("fMaximum", 0.0),
    ("fMinimum", 0.0),
];

fn h1i_payload(fields: &[(&str, f64)]) -> Vec<u8> {
    let mut w = Writer::new();
    w.versioned(2, |w| {
        for (name, value) in fields {
            match *name {
                "fNcells" | "fDimension" => w.i32(*value as i32),
                _ => w.f64(*value),
            }
        }
    });
    w.into_vec()
}

fn h1i_elements() -> Vec<ElementSpec> {
    H1_FIELDS
        .iter()
        .map(|&(name, _)| match name {
            "fNcells" | "fDimension" => ElementSpec::basic(name, type_code::INT, "Int_t", 4),
            _ => ElementSpec::basic(name, type_code::DOUBLE, "Double_t", 8),
        })
        .collect()
}

/// A complete small file: header, root directory with a histogram key and a
/// sub-directory holding a second histogram, a deflate-compressed object
/// payload each, and an uncompressed streamer-info record describing the
/// histogram class.
pub fn build_minimal_file() -> Vec<u8> {
    const BEGIN: u32 = 100;
    const NBYTES_NAME: u32 = 36;
    let dir_record_at = BEGIN + NBYTES_NAME;

    let h1_key_len = key_len_for("TH1I", "h1", "first histogram") as u32;
    let h1_plain = h1i_payload(H1_FIELDS);
    let h1_disk = zl_envelope(&h1_plain);
    let h1_obj_len = h1_plain.len() as u32;
    // the reader takes "stored smaller than declared" as the compression
    // marker, so the payload must actually shrink
    assert!(h1_disk.len() < h1_plain.len());
    let h1_nbytes = h1_key_len + h1_disk.len() as u32;

    let h2_key_len = key_len_for("TH1I", "h2", "") as u32;
    let h2_plain = h1i_payload(H2_FIELDS);
    let h2_disk = zl_envelope(&h2_plain);
    let h2_obj_len = h2_plain.len() as u32;
    assert!(h2_disk.len() < h2_plain.len());
    let h2_nbytes = h2_key_len + h2_disk.len() as u32;

    let subdir_key_len = key_len_for("TDirectory", "histos", "") as u32;
    let subdir_nbytes = subdir_key_len + 30;

    let sinfo_key_len = key_len_for("TList", "StreamerInfo", "Doubly linked list") as u32;
    let sinfo_payload = streamer_catalog_payload(sinfo_key_len as u16, "TH1I", 2, &h1i_elements());
    let sinfo_nbytes = sinfo_key_len + sinfo_payload.len() as u32;

    let keys2_header_len = key_len_for("TDirectory", "histos", "") as u32;
    let keys2_nbytes = keys2_header_len + 4 + h2_key_len;

    let keys_header_len = key_len_for("TFile", "minimal", "") as u32;
    let keys_nbytes = keys_header_len + 4 + h1_key_len + subdir_key_len;

    // record layout, in file order
    let h1_at = dir_record_at + 30;
    let h2_at = h1_at + h1_nbytes;
    let subdir_at = h2_at + h2_nbytes;
    let sinfo_at = subdir_at + subdir_nbytes;
    let keys2_at = sinfo_at + sinfo_nbytes;
    let keys_at = keys2_at + keys2_nbytes;
    let end = keys_at + keys_nbytes;

    let mut w = Writer::new();
    // file header
    w.raw(b"root");
    w.u32(61404); // format version
    w.u32(BEGIN);
    w.u32(end);
    w.u32(0); // seek free
    w.u32(0); // nbytes free
    w.u32(0); // n free records
    w.u32(NBYTES_NAME);
    w.u8(4); // pointer size
    w.u32(101); // compression setting
    w.u32(sinfo_at);
    w.u32(sinfo_nbytes);
    w.u16(1); // uuid version
    w.raw(&[0; 16]);
    while w.len() < BEGIN as usize + NBYTES_NAME as usize {
        w.u8(0);
    }
    // root directory record
    w.i16(5);
    w.u32(0); // creation time
    w.u32(0); // modification time
    w.i32(keys_nbytes as i32);
    w.i32(NBYTES_NAME as i32);
    w.u32(BEGIN);
    w.u32(0); // parent
    w.u32(keys_at);
    // h1 data record
    w.raw(&tkey_bytes(
        h1_nbytes,
        h1_obj_len,
        1,
        h1_at,
        BEGIN,
        "TH1I",
        "h1",
        "first histogram",
    ));
    w.raw(&h1_disk);
    // h2 data record
    w.raw(&tkey_bytes(
        h2_nbytes, h2_obj_len, 1, h2_at, BEGIN, "TH1I", "h2", "",
    ));
    w.raw(&h2_disk);
    // sub-directory record: key plus a directory body
    w.raw(&tkey_bytes(
        subdir_nbytes,
        30,
        1,
        subdir_at,
        BEGIN,
        "TDirectory",
        "histos",
        "",
    ));
    w.i16(5);
    w.u32(0);
    w.u32(0);
    w.i32(keys2_nbytes as i32);
    w.i32(0);
    w.u32(subdir_at);
    w.u32(BEGIN);
    w.u32(keys2_at);
    // streamer info record, stored uncompressed
    w.raw(&tkey_bytes(
        sinfo_nbytes,
        sinfo_payload.len() as u32,
        1,
        sinfo_at,
        BEGIN,
        "TList",
        "StreamerInfo",
        "Doubly linked list",
    ));
    w.raw(&sinfo_payload);
    // sub-directory key list
    w.raw(&tkey_bytes(
        keys2_nbytes,
        keys2_nbytes - keys2_header_len,
        1,
        keys2_at,
        subdir_at,
        "TDirectory",
        "histos",
        "",
    ));
    w.i32(1);
    w.raw(&tkey_bytes(
        h2_nbytes, h2_obj_len, 1, h2_at, BEGIN, "TH1I", "h2", "",
    ));
    // root key list
    w.raw(&tkey_bytes(
        keys_nbytes,
        keys_nbytes - keys_header_len,
        1,
        keys_at,
        BEGIN,
        "TFile",
        "minimal",
        "",
    ));
    w.i32(2);
    w.raw(&tkey_bytes(
        h1_nbytes,
        h1_obj_len,
        1,
        h1_at,
        BEGIN,
        "TH1I",
        "h1",
        "first histogram",
    ));
    w.raw(&tkey_bytes(
        subdir_nbytes,
        30,
        1,
        subdir_at,
        BEGIN,
        "TDirectory",
        "histos",
        "",
    ));
    let buf = w.into_vec();
    debug_assert_eq!(buf.len(), end as usize);
    buf
}
