//! The injected encryption boundary.
//!
//! The engine never chooses or implements a cipher. Secure entries route
//! their payload through an [`Encrypter`] supplied at construction time,
//! and the engine treats its output as an opaque string. Decrypt failures
//! are recoverable: the affected entry reads as absent and a fault is
//! reported, nothing else stops.

use crate::error::VaultResult;

/// An injected encryption service.
///
/// Implementations must be deterministic only in the sense that
/// `decrypt(encrypt(p)) == p`; ciphertexts themselves may differ between
/// calls (e.g. nonce-based ciphers), which is why secure on-disk key names
/// are derived by hashing rather than by encrypting the name.
pub trait Encrypter: Send + Sync {
    /// One-time initialization (key loading, keychain access). Called once
    /// when the vault is opened.
    ///
    /// # Errors
    ///
    /// Returns an error if the encrypter cannot become ready; opening the
    /// vault fails in that case.
    fn init(&self) -> VaultResult<()> {
        Ok(())
    }

    /// Encrypt a plaintext string to an opaque ciphertext string.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails; the write carrying this value
    /// fails with it.
    fn encrypt(&self, plaintext: &str) -> VaultResult<String>;

    /// Decrypt a ciphertext string produced by [`Encrypter::encrypt`].
    ///
    /// # Errors
    ///
    /// Returns an error if the ciphertext is invalid; the affected entry is
    /// treated as unreadable, not fatal.
    fn decrypt(&self, ciphertext: &str) -> VaultResult<String>;
}
