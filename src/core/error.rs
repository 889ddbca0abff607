use failure::Fail;

/// Errors raised while decoding a file. Each failure is scoped to the record
/// being decoded; the key index, streamer catalog and other in-flight reads
/// stay valid.
#[derive(Debug, Fail, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A read ran past the end of the current buffer.
    #[fail(display = "decode ran past end of buffer (offset {}, length {})", offset, len)]
    TruncatedBuffer { offset: usize, len: usize },

    /// The byte source delivered fewer bytes than requested.
    #[fail(display = "short read at offset {} (wanted {} bytes)", offset, wanted)]
    ShortRead { offset: u64, wanted: u64 },

    /// Compression envelope with an unknown magic or algorithm id.
    #[fail(
        display = "unsupported compression envelope (magic {:?}, algorithm {})",
        magic, algo
    )]
    UnsupportedCompression { magic: [u8; 2], algo: u8 },

    /// The record's declared size disagrees with the envelope's own.
    #[fail(
        display = "compression envelope declares {} bytes but the record holds {}",
        declared, actual
    )]
    EnvelopeMismatch { declared: usize, actual: usize },

    /// A streamer element whose type code has no decoder.
    #[fail(
        display = "no decoder for member `{}` of type `{}` (code {})",
        member, type_name, code
    )]
    UnsupportedType {
        member: String,
        type_name: String,
        code: u32,
    },

    /// A class tag that was never registered in the class map.
    #[fail(display = "class tag {:#x} is not in the class map", tag)]
    UnknownClassReference { tag: u64 },

    /// A class with neither a catalog entry nor a built-in layout.
    #[fail(display = "no streamer info for class `{}`", class_name)]
    MissingStreamerInfo { class_name: String },

    /// Lookup of a key by name and cycle found nothing.
    #[fail(display = "key `{}` cycle {} not found", name, cycle)]
    KeyNotFound { name: String, cycle: u16 },
}

/// Diagnostic for a recoverable byte-count violation: a streamer program
/// left the cursor away from the producer-declared record end. The cursor is
/// realigned and decoding continues; the mismatch is reported alongside the
/// decoded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteCountMismatch {
    /// Name of the record being closed (class or call site).
    pub context: String,
    /// Bytes the producer declared for the record body.
    pub expected: usize,
    /// Bytes the element program actually consumed.
    pub actual: usize,
}
