pub mod compression;
pub mod cursor;
pub mod error;
pub mod file;
pub mod record;
pub mod refs;
pub mod source;
pub mod tkey;
pub mod value;

pub use self::cursor::Cursor;
pub use self::error::{ByteCountMismatch, DecodeError};
pub use self::file::{Decoded, Directory, RootFile};
pub use self::record::VersionedRecord;
pub use self::refs::{ClassRef, ClassTagMap, DecodeSession, ObjectMap};
pub use self::source::Source;
pub use self::tkey::{FileHeader, TKey};
pub use self::value::{DecodedObject, ObjBits, Value};

/// High bit pattern marking the first word of a versioned record as a byte
/// count rather than a tag.
pub(crate) const K_BYTE_COUNT_MASK: u32 = 0x4000_0000;

/// Sentinel tag announcing an inline class-name string.
pub(crate) const K_NEW_CLASS_TAG: u32 = 0xFFFF_FFFF;

/// High bit separating class tags from object back-reference tags.
pub(crate) const K_CLASS_MASK: u32 = 0x8000_0000;
