//! Wire-format decoding.

use crate::entry::{
    Entry, Flags, Header, TypeTag, FORMAT_VERSION, MAX_HEADER_LEN, MIN_ENTRY_LEN,
};
use crate::error::{CodecError, CodecResult};
use crate::obfuscate;
use crate::value::Value;
use std::collections::BTreeMap;

/// Decode a single obfuscated entry.
///
/// Returns `None` for any structural violation: short buffer, truncated
/// field, invalid UTF-8, invalid JSON, tag/shape mismatch, or an unknown
/// format version. Corruption never coerces.
#[must_use]
pub fn decode_entry(bytes: &[u8]) -> Option<Entry> {
    if bytes.len() < MIN_ENTRY_LEN {
        return None;
    }
    let plain = obfuscate::unshifted(bytes);
    parse_entry(&plain)
}

/// Decode only the framing metadata of an obfuscated entry.
///
/// The payload is never materialized; a truncated prefix of the file is
/// sufficient as long as it covers the header (at most [`MAX_HEADER_LEN`]
/// bytes).
#[must_use]
pub fn decode_header(bytes: &[u8]) -> Option<Header> {
    if bytes.len() < MIN_ENTRY_LEN {
        return None;
    }
    let prefix = &bytes[..bytes.len().min(MAX_HEADER_LEN)];
    let plain = obfuscate::unshifted(prefix);
    let mut cursor = Cursor::new(&plain);
    parse_header(&mut cursor)
}

/// Result of a batch decode: the surviving entries plus the number of
/// records that were skipped as corrupt.
#[derive(Debug, Default)]
pub struct DecodedBatch {
    /// Entries that decoded cleanly, keyed by entry name.
    pub entries: BTreeMap<String, Entry>,
    /// Number of records skipped due to corruption.
    pub skipped: usize,
}

/// Decode an obfuscated consolidated batch.
///
/// A corrupt record is skipped and the scan continues at the next frame. A
/// corrupted length field destroys framing from that point on; everything
/// already decoded is kept and the unframeable tail is abandoned.
///
/// # Errors
///
/// Returns [`CodecError::Truncated`] when the buffer is non-empty but too
/// short to frame even one record; the whole file is undecodable and the
/// caller should treat this as an initialization fault.
pub fn decode_batch(bytes: &[u8]) -> CodecResult<DecodedBatch> {
    if bytes.is_empty() {
        return Ok(DecodedBatch::default());
    }
    if bytes.len() < 4 + MIN_ENTRY_LEN {
        return Err(CodecError::Truncated);
    }

    let plain = obfuscate::unshifted(bytes);
    let mut batch = DecodedBatch::default();
    let mut pos = 0usize;

    while plain.len() - pos >= 4 {
        let len = u32::from_be_bytes([plain[pos], plain[pos + 1], plain[pos + 2], plain[pos + 3]])
            as usize;
        pos += 4;

        if len < MIN_ENTRY_LEN || len > plain.len() - pos {
            batch.skipped += 1;
            return Ok(batch);
        }

        match parse_entry(&plain[pos..pos + len]) {
            Some(entry) => {
                batch.entries.insert(entry.name.clone(), entry);
            }
            None => batch.skipped += 1,
        }
        pos += len;
    }

    if pos != plain.len() {
        // Trailing partial record
        batch.skipped += 1;
    }
    Ok(batch)
}

/// Byte cursor over an un-obfuscated frame.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_u8(&mut self) -> Option<u8> {
        let byte = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(byte)
    }

    fn read_slice(&mut self, len: usize) -> Option<&'a [u8]> {
        if self.data.len() - self.pos < len {
            return None;
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Some(slice)
    }

    /// Read a one-byte-length-prefixed UTF-8 name.
    fn read_name(&mut self) -> Option<&'a str> {
        let len = usize::from(self.read_u8()?);
        let bytes = self.read_slice(len)?;
        std::str::from_utf8(bytes).ok()
    }

    fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}

fn parse_header(cursor: &mut Cursor) -> Option<Header> {
    let store = cursor.read_name()?.to_string();
    let name = cursor.read_name()?.to_string();
    let flags = Flags::from_bits(cursor.read_u8()?);
    let version = cursor.read_u8()?;
    let tag = TypeTag::from_u8(cursor.read_u8()?)?;
    Some(Header {
        store,
        name,
        flags,
        version,
        tag,
    })
}

fn parse_entry(plain: &[u8]) -> Option<Entry> {
    let mut cursor = Cursor::new(plain);
    let header = parse_header(&mut cursor)?;

    // The version byte selects the payload migration path. Version 1 is the
    // only format written so far; entries from a newer writer are skipped
    // rather than misread.
    if header.version != FORMAT_VERSION {
        return None;
    }

    let json: serde_json::Value = serde_json::from_slice(cursor.rest()).ok()?;
    let value = Value::from_json_tagged(header.tag, &json)?;
    Some(Entry {
        store: header.store,
        name: header.name,
        value,
        flags: header.flags,
        version: header.version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{encode_batch, encode_entry, encode_frame};

    fn sample_batch(n: usize) -> BTreeMap<String, Entry> {
        (0..n)
            .map(|i| {
                let name = format!("key{i}");
                (
                    name.clone(),
                    Entry::new("s", name, Value::Int(i as i64), Flags::NONE),
                )
            })
            .collect()
    }

    #[test]
    fn entry_roundtrip() {
        let bytes = encode_entry("s", "k", &Value::Int(42), Flags::NONE).unwrap();
        let entry = decode_entry(&bytes).unwrap();
        assert_eq!(entry.store, "s");
        assert_eq!(entry.name, "k");
        assert_eq!(entry.value, Value::Int(42));
        assert_eq!(entry.flags, Flags::NONE);
    }

    #[test]
    fn header_skips_payload() {
        let bytes = encode_entry("s", "k", &Value::Int(42), Flags::NONE).unwrap();
        let header = decode_header(&bytes).unwrap();
        assert_eq!(header.store, "s");
        assert_eq!(header.name, "k");
        assert_eq!(header.flags, Flags::NONE);
        assert_eq!(header.tag, TypeTag::Int);
    }

    #[test]
    fn header_from_truncated_prefix() {
        let bytes = encode_entry("store", "key", &Value::Str("x".repeat(4096)), Flags::SECURE)
            .unwrap();
        // Header is 1+5+1+3+3 = 13 bytes; hand the decoder only a prefix
        let header = decode_header(&bytes[..16]).unwrap();
        assert_eq!(header.name, "key");
        assert!(header.flags.is_secure());
        assert_eq!(header.tag, TypeTag::Str);
    }

    #[test]
    fn short_buffer_is_none() {
        assert!(decode_entry(&[]).is_none());
        assert!(decode_entry(&[1, 2, 3]).is_none());
        assert!(decode_header(&[1, 2, 3]).is_none());
    }

    #[test]
    fn truncated_name_is_none() {
        // storeLen claims 10 bytes but only 2 follow
        let mut frame = vec![10u8, b'a', b'b'];
        obfuscate::shift(&mut frame);
        // Pad past the minimum length check
        frame.extend_from_slice(&[0, 0, 0]);
        assert!(decode_entry(&frame).is_none());
    }

    #[test]
    fn unknown_version_is_none() {
        let mut frame = encode_frame("s", "k", &Value::Int(1), Flags::NONE, 99).unwrap();
        obfuscate::shift(&mut frame);
        assert!(decode_entry(&frame).is_none());
        // The header itself still decodes; only the payload path is gated
        assert_eq!(decode_header(&frame).unwrap().version, 99);
    }

    #[test]
    fn tag_shape_mismatch_is_none() {
        // Claim Bool but carry an integer payload
        let mut frame = Vec::new();
        frame.push(1);
        frame.push(b's');
        frame.push(1);
        frame.push(b'k');
        frame.push(0); // flags
        frame.push(FORMAT_VERSION);
        frame.push(TypeTag::Bool.as_u8());
        frame.extend_from_slice(b"42");
        obfuscate::shift(&mut frame);
        assert!(decode_entry(&frame).is_none());
    }

    #[test]
    fn batch_roundtrip() {
        let entries = sample_batch(3);
        let bytes = encode_batch(&entries).unwrap();
        let decoded = decode_batch(&bytes).unwrap();
        assert_eq!(decoded.skipped, 0);
        assert_eq!(decoded.entries, entries);
    }

    #[test]
    fn empty_batch_roundtrip() {
        let decoded = decode_batch(&[]).unwrap();
        assert!(decoded.entries.is_empty());
        assert_eq!(decoded.skipped, 0);
    }

    #[test]
    fn corrupt_payload_skips_one_record() {
        let entries = sample_batch(5);
        let mut bytes = encode_batch(&entries).unwrap();

        // Locate the third record's payload and break its JSON with a NUL.
        // 0x00 is a fixed point of the rotation, so writing it to the
        // obfuscated buffer lands a NUL in the decoded payload.
        let plain = obfuscate::unshifted(&bytes);
        let mut pos = 0usize;
        for _ in 0..2 {
            let len = u32::from_be_bytes([plain[pos], plain[pos + 1], plain[pos + 2], plain[pos + 3]])
                as usize;
            pos += 4 + len;
        }
        let third_len =
            u32::from_be_bytes([plain[pos], plain[pos + 1], plain[pos + 2], plain[pos + 3]]) as usize;
        let payload_last = pos + 4 + third_len - 1;
        bytes[payload_last] = 0x00;

        let decoded = decode_batch(&bytes).unwrap();
        assert_eq!(decoded.skipped, 1);
        assert_eq!(decoded.entries.len(), 4);
        assert!(!decoded.entries.contains_key("key2"));
    }

    #[test]
    fn corrupt_length_field_keeps_prior_records() {
        let entries = sample_batch(5);
        let bytes = encode_batch(&entries).unwrap();

        // Overwrite the last record's length with an impossible value
        let mut plain = obfuscate::unshifted(&bytes);
        let mut pos = 0usize;
        for _ in 0..4 {
            let len = u32::from_be_bytes([plain[pos], plain[pos + 1], plain[pos + 2], plain[pos + 3]])
                as usize;
            pos += 4 + len;
        }
        plain[pos..pos + 4].copy_from_slice(&u32::MAX.to_be_bytes());
        obfuscate::shift(&mut plain);

        let decoded = decode_batch(&plain).unwrap();
        assert_eq!(decoded.entries.len(), 4);
        assert_eq!(decoded.skipped, 1);
    }

    #[test]
    fn unframeable_buffer_is_an_error() {
        assert!(matches!(
            decode_batch(&[1, 2, 3]),
            Err(CodecError::Truncated)
        ));
    }
}
