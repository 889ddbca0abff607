/// Wire-format type codes carried by streamer elements. Fixed-length arrays
/// add [`OFFSET_L`] to the element code, counted-pointer arrays add
/// [`OFFSET_P`].
pub mod type_code {
    pub const BASE: u32 = 0;
    pub const CHAR: u32 = 1;
    pub const SHORT: u32 = 2;
    pub const INT: u32 = 3;
    pub const LONG: u32 = 4;
    pub const FLOAT: u32 = 5;
    pub const COUNTER: u32 = 6;
    pub const CHAR_STAR: u32 = 7;
    pub const DOUBLE: u32 = 8;
    pub const DOUBLE32: u32 = 9;
    pub const LEGACY_CHAR: u32 = 10;
    pub const UCHAR: u32 = 11;
    pub const USHORT: u32 = 12;
    pub const UINT: u32 = 13;
    pub const ULONG: u32 = 14;
    pub const BITS: u32 = 15;
    pub const LONG64: u32 = 16;
    pub const ULONG64: u32 = 17;
    pub const BOOL: u32 = 18;
    pub const FLOAT16: u32 = 19;
    pub const OFFSET_L: u32 = 20;
    pub const OFFSET_P: u32 = 40;
    pub const OBJECT: u32 = 61;
    pub const ANY: u32 = 62;
    /// Pre-allocated pointer member, streamed inline as its declared class.
    pub const OBJECT_INLINE_PTR: u32 = 63;
    /// Owned pointer member, streamed through the general object entry.
    pub const OBJECT_OWNED_PTR: u32 = 64;
    pub const TSTRING: u32 = 65;
    pub const TOBJECT: u32 = 66;
    pub const TNAMED: u32 = 67;
    pub const ANY_INLINE_PTR: u32 = 68;
    pub const ANY_OWNED_PTR: u32 = 69;
    pub const ANY_PTR_NO_VTABLE: u32 = 70;
    pub const STL_P: u32 = 71;
    pub const SKIP: u32 = 100;
    pub const SKIP_L: u32 = 120;
    pub const SKIP_P: u32 = 140;
    pub const CONV: u32 = 200;
    pub const CONV_L: u32 = 220;
    pub const CONV_P: u32 = 240;
    pub const STL: u32 = 300;
    pub const STL_STRING: u32 = 365;
    pub const STREAMER: u32 = 500;
    pub const STREAM_LOOP: u32 = 501;
}

/// One member (or base class) of a streamed class, as described by the
/// file's streamer-info catalog. Immutable after catalog construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamerElement {
    pub name: String,
    pub title: String,
    /// Numeric wire code, see [`type_code`].
    pub type_code: u32,
    /// Full byte length of the member as written.
    pub size: u32,
    /// Element count for fixed-length array members.
    pub length: u32,
    /// Number of array dimensions.
    pub dim: u32,
    pub max_index: Vec<u32>,
    /// Declared type name; `"BASE"` marks a base-class element.
    pub type_name: String,
    /// Inherited-class version, for base-class elements.
    pub base_version: Option<u32>,
    /// Sibling field holding the live element count, for counted-pointer
    /// members, together with its class and version.
    pub count_name: Option<String>,
    pub count_class: Option<String>,
    pub count_version: Option<u32>,
    /// Container kind and element kind for STL members. Carried through the
    /// catalog, but element-level STL decoding is unsupported.
    pub stl_kind: Option<(u32, u32)>,
}

impl StreamerElement {
    pub(crate) fn new(name: &str, type_code: u32, type_name: &str) -> Self {
        StreamerElement {
            name: name.to_string(),
            title: String::new(),
            type_code,
            size: 0,
            length: 0,
            dim: 0,
            max_index: Vec::new(),
            type_name: type_name.to_string(),
            base_version: None,
            count_name: None,
            count_class: None,
            count_version: None,
            stl_kind: None,
        }
    }

    pub fn is_base(&self) -> bool {
        self.type_name == "BASE"
    }
}
