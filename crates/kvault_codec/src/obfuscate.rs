//! Byte-level obfuscation applied to every persisted buffer.
//!
//! Each byte is circularly rotated one bit left on the way to disk and one
//! bit right on the way back. This is an anti-casual-inspection transform,
//! not encryption; confidentiality for secure entries is layered above by
//! the injected encrypter.

/// Rotate every byte one bit left, in place.
pub fn shift(bytes: &mut [u8]) {
    for b in bytes.iter_mut() {
        *b = b.rotate_left(1);
    }
}

/// Rotate every byte one bit right, in place. Inverse of [`shift`].
pub fn unshift(bytes: &mut [u8]) {
    for b in bytes.iter_mut() {
        *b = b.rotate_right(1);
    }
}

/// Return a shifted copy of `bytes`.
#[must_use]
pub fn shifted(bytes: &[u8]) -> Vec<u8> {
    let mut out = bytes.to_vec();
    shift(&mut out);
    out
}

/// Return an unshifted copy of `bytes`.
#[must_use]
pub fn unshifted(bytes: &[u8]) -> Vec<u8> {
    let mut out = bytes.to_vec();
    unshift(&mut out);
    out
}
