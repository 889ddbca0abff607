use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::core::error::ByteCountMismatch;
use crate::core::{
    Cursor, DecodeError, DecodedObject, K_BYTE_COUNT_MASK, K_CLASS_MASK, K_NEW_CLASS_TAG,
};
use crate::MAP_OFFSET;

/// Result of decoding one class word from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassRef {
    /// An inline class-name string followed; it was registered under `tag`.
    NewClass { name: String, tag: u64 },
    /// A tag referring to an already registered class.
    KnownClass { name: String },
    /// A back-reference to an already decoded object.
    ObjectBackRef { tag: u64 },
}

/// `tag -> class name`, populated on new-class sightings. Tags are derived
/// from byte offsets, so the map is append-only: re-registration of a tag is
/// ignored rather than overwritten.
#[derive(Debug, Default)]
pub struct ClassTagMap {
    tags: HashMap<u64, String>,
}

impl ClassTagMap {
    pub fn get(&self, tag: u64) -> Option<&str> {
        self.tags.get(&tag).map(String::as_str)
    }

    pub fn register(&mut self, tag: u64, name: &str) {
        self.tags.entry(tag).or_insert_with(|| name.to_string());
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// `tag -> decoded object`. A lookup table for back-references, not an
/// ownership graph: entries are `Arc` clones of values owned by whoever
/// holds the decoded root. Tag 0 is reserved and resolves to nothing, per
/// the format's one-based tagging convention.
#[derive(Debug, Default)]
pub struct ObjectMap {
    objs: HashMap<u64, Arc<DecodedObject>>,
}

impl ObjectMap {
    pub fn get(&self, tag: u64) -> Option<Arc<DecodedObject>> {
        self.objs.get(&tag).cloned()
    }

    pub fn insert(&mut self, tag: u64, obj: Arc<DecodedObject>) {
        if tag == 0 {
            return;
        }
        self.objs.insert(tag, obj);
    }

    pub fn len(&self) -> usize {
        self.objs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objs.is_empty()
    }
}

/// Per-decode state: a fresh object map for this payload, the file-scoped
/// class map, and the record's tag offset (the key header length, which the
/// producer folded into every tag it wrote).
pub struct DecodeSession<'f> {
    pub tag_offset: u64,
    pub objects: ObjectMap,
    pub classes: &'f RwLock<ClassTagMap>,
    pub warnings: Vec<ByteCountMismatch>,
}

impl<'f> DecodeSession<'f> {
    pub fn new(tag_offset: u64, classes: &'f RwLock<ClassTagMap>) -> Self {
        DecodeSession {
            tag_offset,
            objects: ObjectMap::default(),
            classes,
            warnings: Vec::new(),
        }
    }

    /// Fresh object scope for a nested buffer (pointer/polymorphic fields);
    /// the class map and tag offset carry over.
    pub fn nested(&self) -> DecodeSession<'f> {
        DecodeSession::new(self.tag_offset, self.classes)
    }

    /// Fold a finished nested scope's diagnostics back into this one.
    pub fn absorb(&mut self, nested: DecodeSession<'f>) {
        self.warnings.extend(nested.warnings);
    }

    /// Map key for an object or class sighted at `startpos`.
    pub fn tag_at(&self, startpos: usize) -> u64 {
        self.tag_offset + startpos as u64 + MAP_OFFSET
    }

    /// Decode one class word. The classification order is load-bearing:
    /// a first word without the byte-count bit (or equal to the new-class
    /// sentinel) is itself the tag; otherwise the tag is the second word.
    /// A tag without the class bit is an object back-reference; the
    /// sentinel announces an inline class name; anything else must already
    /// be registered.
    pub fn read_class(&mut self, cur: &mut Cursor) -> Result<ClassRef, DecodeError> {
        let first = cur.read_u32()?;
        let startpos = cur.pos();
        let tag = if first & K_BYTE_COUNT_MASK == 0 || first == K_NEW_CLASS_TAG {
            first
        } else {
            cur.read_u32()?
        };
        if tag & K_CLASS_MASK == 0 {
            return Ok(ClassRef::ObjectBackRef { tag: tag as u64 });
        }
        if tag == K_NEW_CLASS_TAG {
            let name = cur.read_string(0)?;
            let tag = self.tag_at(startpos);
            self.classes
                .write()
                .expect("class map poisoned")
                .register(tag, &name);
            return Ok(ClassRef::NewClass { name, tag });
        }
        let cl_tag = (tag & !K_CLASS_MASK) as u64;
        let classes = self.classes.read().expect("class map poisoned");
        match classes.get(cl_tag) {
            Some(name) => Ok(ClassRef::KnownClass {
                name: name.to_string(),
            }),
            None => Err(DecodeError::UnknownClassReference { tag: cl_tag }),
        }
    }
}
