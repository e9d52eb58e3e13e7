//! Entry framing metadata: flags, type tags, headers.

use crate::value::Value;

/// Current wire format version, written into every frame.
pub const FORMAT_VERSION: u8 = 1;

/// Minimum length of a single un-obfuscated entry frame: two empty
/// length-prefixed names plus flags, version, and type bytes.
pub const MIN_ENTRY_LEN: usize = 5;

/// Largest possible un-obfuscated header: two length-prefixed names of up to
/// 255 bytes each, plus flags, version, and type bytes. Reading this many
/// bytes of a file is always enough to decode its header.
pub const MAX_HEADER_LEN: usize = 1 + 255 + 1 + 255 + 3;

/// Per-entry bit flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u8);

impl Flags {
    /// No flags set.
    pub const NONE: Flags = Flags(0);
    /// Entry is eligible for the bulk removable sweep.
    pub const REMOVABLE: Flags = Flags(0b01);
    /// Entry value is an encrypted envelope from the injected encrypter.
    pub const SECURE: Flags = Flags(0b10);

    /// Build flags from a raw byte. Unknown bits are preserved.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Flags(bits)
    }

    /// The raw flag byte.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Check whether all bits of `other` are set.
    #[must_use]
    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of two flag sets.
    #[must_use]
    pub const fn with(self, other: Flags) -> Flags {
        Flags(self.0 | other.0)
    }

    /// Whether the removable bit is set.
    #[must_use]
    pub const fn is_removable(self) -> bool {
        self.contains(Flags::REMOVABLE)
    }

    /// Whether the secure bit is set.
    #[must_use]
    pub const fn is_secure(self) -> bool {
        self.contains(Flags::SECURE)
    }
}

/// Explicit one-byte type tag stored alongside every value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TypeTag {
    /// Null value.
    Null = 0,
    /// Signed integer.
    Int = 1,
    /// Double-precision float.
    Double = 2,
    /// Boolean.
    Bool = 3,
    /// Text string.
    Str = 4,
    /// Ordered list.
    List = 5,
    /// String-keyed map.
    Map = 6,
    /// Raw byte sequence.
    Bytes = 7,
}

impl TypeTag {
    /// Decode a tag byte. Returns `None` for unknown tags.
    #[must_use]
    pub const fn from_u8(byte: u8) -> Option<TypeTag> {
        match byte {
            0 => Some(TypeTag::Null),
            1 => Some(TypeTag::Int),
            2 => Some(TypeTag::Double),
            3 => Some(TypeTag::Bool),
            4 => Some(TypeTag::Str),
            5 => Some(TypeTag::List),
            6 => Some(TypeTag::Map),
            7 => Some(TypeTag::Bytes),
            _ => None,
        }
    }

    /// The tag byte.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// The fundamental persisted unit: a value plus its framing metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Name of the owning store.
    pub store: String,
    /// Key name this entry is stored under.
    pub name: String,
    /// The stored value.
    pub value: Value,
    /// Per-entry flags.
    pub flags: Flags,
    /// Format version the entry was written with.
    pub version: u8,
}

impl Entry {
    /// Create an entry at the current format version.
    #[must_use]
    pub fn new(
        store: impl Into<String>,
        name: impl Into<String>,
        value: Value,
        flags: Flags,
    ) -> Self {
        Self {
            store: store.into(),
            name: name.into(),
            value,
            flags,
            version: FORMAT_VERSION,
        }
    }

    /// The type tag derived from this entry's value.
    #[must_use]
    pub fn type_tag(&self) -> TypeTag {
        self.value.type_tag()
    }

    /// The header view of this entry.
    #[must_use]
    pub fn header(&self) -> Header {
        Header {
            store: self.store.clone(),
            name: self.name.clone(),
            flags: self.flags,
            version: self.version,
            tag: self.type_tag(),
        }
    }
}

/// Framing metadata of an entry, decoded without materializing the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Name of the owning store.
    pub store: String,
    /// Key name.
    pub name: String,
    /// Per-entry flags.
    pub flags: Flags,
    /// Format version the entry was written with.
    pub version: u8,
    /// Type tag of the (unread) payload.
    pub tag: TypeTag,
}
