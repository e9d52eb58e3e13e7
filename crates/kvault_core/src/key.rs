//! Key definitions: a logical name plus placement policy.

use kvault_codec::Flags;

/// A logical key name with its placement policy.
///
/// Keys are plain values constructed by the caller (typically once, at
/// startup) and passed to every vault operation. There is no global key
/// registry; a key means the same thing on any vault it is used with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpec {
    /// Logical key name.
    pub name: String,
    /// Whether the entry is eligible for the bulk removable sweep.
    pub removable: bool,
    /// Whether the value lives in its own file instead of the consolidated
    /// store. Use for large or independently-updated values.
    pub external: bool,
    /// Whether the value (and the on-disk key identity) routes through the
    /// injected encrypter.
    pub secure: bool,
}

impl KeySpec {
    /// A key with default placement: internal, not removable, not secure.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            removable: false,
            external: false,
            secure: false,
        }
    }

    /// Mark the entry eligible for the bulk removable sweep.
    #[must_use]
    pub fn removable(mut self, value: bool) -> Self {
        self.removable = value;
        self
    }

    /// Store the value in its own file under `external/`.
    #[must_use]
    pub fn external(mut self, value: bool) -> Self {
        self.external = value;
        self
    }

    /// Route the value through the injected encrypter.
    #[must_use]
    pub fn secure(mut self, value: bool) -> Self {
        self.secure = value;
        self
    }

    /// The flag bits this key's entries are written with.
    #[must_use]
    pub fn flags(&self) -> Flags {
        let mut flags = Flags::NONE;
        if self.removable {
            flags = flags.with(Flags::REMOVABLE);
        }
        if self.secure {
            flags = flags.with(Flags::SECURE);
        }
        flags
    }
}
