//! Wire-format encoding.
//!
//! A single entry frame is, before obfuscation:
//!
//! ```text
//! [storeLen:1][storeBytes][nameLen:1][nameBytes][flags:1][version:1][type:1][JSON payload]
//! ```
//!
//! The consolidated batch format concatenates `[len:4 BE][frame]` records and
//! obfuscates the whole resulting buffer, not each record.

use crate::entry::{Entry, Flags, FORMAT_VERSION};
use crate::error::{CodecError, CodecResult};
use crate::obfuscate;
use crate::value::Value;
use bytes::BufMut;
use std::collections::BTreeMap;

/// Encode a single entry to its obfuscated on-disk form.
///
/// # Errors
///
/// Returns an error if either name exceeds 255 UTF-8 bytes or the value
/// cannot be serialized (non-finite double).
pub fn encode_entry(
    store: &str,
    name: &str,
    value: &Value,
    flags: Flags,
) -> CodecResult<Vec<u8>> {
    let mut frame = encode_frame(store, name, value, flags, FORMAT_VERSION)?;
    obfuscate::shift(&mut frame);
    Ok(frame)
}

/// Encode a map of entries to the obfuscated consolidated batch format.
///
/// # Errors
///
/// Returns an error if any entry fails to encode.
pub fn encode_batch(entries: &BTreeMap<String, Entry>) -> CodecResult<Vec<u8>> {
    let mut buf = Vec::new();
    for entry in entries.values() {
        let frame = encode_frame(
            &entry.store,
            &entry.name,
            &entry.value,
            entry.flags,
            entry.version,
        )?;
        let len = u32::try_from(frame.len())
            .map_err(|_| CodecError::serialize("record exceeds u32 length"))?;
        buf.put_u32(len);
        buf.put_slice(&frame);
    }
    obfuscate::shift(&mut buf);
    Ok(buf)
}

/// Encode the un-obfuscated frame for one entry.
pub(crate) fn encode_frame(
    store: &str,
    name: &str,
    value: &Value,
    flags: Flags,
    version: u8,
) -> CodecResult<Vec<u8>> {
    let store_bytes = store.as_bytes();
    let name_bytes = name.as_bytes();
    if store_bytes.len() > 255 {
        return Err(CodecError::NameTooLong {
            len: store_bytes.len(),
        });
    }
    if name_bytes.len() > 255 {
        return Err(CodecError::NameTooLong {
            len: name_bytes.len(),
        });
    }

    let payload = serde_json::to_vec(&value.to_json()?)
        .map_err(|e| CodecError::serialize(e.to_string()))?;

    let mut frame = Vec::with_capacity(5 + store_bytes.len() + name_bytes.len() + payload.len());
    frame.put_u8(store_bytes.len() as u8);
    frame.put_slice(store_bytes);
    frame.put_u8(name_bytes.len() as u8);
    frame.put_slice(name_bytes);
    frame.put_u8(flags.bits());
    frame.put_u8(version);
    frame.put_u8(value.type_tag().as_u8());
    frame.put_slice(&payload);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::TypeTag;

    #[test]
    fn frame_layout() {
        let frame = encode_frame("s", "k", &Value::Int(42), Flags::NONE, 1).unwrap();
        assert_eq!(frame[0], 1); // store name length
        assert_eq!(frame[1], b's');
        assert_eq!(frame[2], 1); // key name length
        assert_eq!(frame[3], b'k');
        assert_eq!(frame[4], 0); // flags
        assert_eq!(frame[5], 1); // version
        assert_eq!(frame[6], TypeTag::Int.as_u8());
        assert_eq!(&frame[7..], b"42");
    }

    #[test]
    fn output_is_obfuscated() {
        let frame = encode_frame("s", "k", &Value::Int(42), Flags::NONE, 1).unwrap();
        let encoded = encode_entry("s", "k", &Value::Int(42), Flags::NONE).unwrap();
        assert_ne!(frame, encoded);
        assert_eq!(obfuscate::unshifted(&encoded), frame);
    }

    #[test]
    fn long_name_rejected() {
        let long = "x".repeat(256);
        let err = encode_entry("s", &long, &Value::Null, Flags::NONE).unwrap_err();
        assert_eq!(err, CodecError::NameTooLong { len: 256 });
        let err = encode_entry(&long, "k", &Value::Null, Flags::NONE).unwrap_err();
        assert_eq!(err, CodecError::NameTooLong { len: 256 });
    }

    #[test]
    fn name_limit_is_bytes_not_chars() {
        // 128 two-byte chars: 128 chars but 256 UTF-8 bytes
        let name: String = "é".repeat(128);
        assert!(encode_entry("s", &name, &Value::Null, Flags::NONE).is_err());
    }

    #[test]
    fn empty_batch_is_empty_buffer() {
        let buf = encode_batch(&BTreeMap::new()).unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn batch_frames_each_record() {
        let mut entries = BTreeMap::new();
        entries.insert(
            "a".to_string(),
            Entry::new("s", "a", Value::Int(1), Flags::NONE),
        );
        entries.insert(
            "b".to_string(),
            Entry::new("s", "b", Value::Bool(true), Flags::NONE),
        );
        let buf = encode_batch(&entries).unwrap();
        let plain = obfuscate::unshifted(&buf);

        let first_len =
            u32::from_be_bytes([plain[0], plain[1], plain[2], plain[3]]) as usize;
        let second_start = 4 + first_len;
        assert!(plain.len() > second_start + 4);
    }
}
