//! # kvault codec
//!
//! Wire format encoding/decoding for kvault.
//!
//! This crate is pure and synchronous: it turns typed values into framed,
//! obfuscated byte buffers and back, and derives stable on-disk file names
//! from key names. All I/O and scheduling lives in `kvault_core`.
//!
//! ## Guarantees
//!
//! - An explicit type tag travels with every value, so decode never relies
//!   on JSON's loose typing
//! - Decode rejects tag/shape mismatches instead of coercing
//! - A corrupt record in a batch is skipped; the batch never hard-fails on
//!   a single bad record
//! - The obfuscation transform is exactly self-inverse
//!
//! ## Usage
//!
//! ```
//! use kvault_codec::{decode_entry, encode_entry, Flags, Value};
//!
//! let bytes = encode_entry("settings", "volume", &Value::Int(7), Flags::NONE).unwrap();
//! let entry = decode_entry(&bytes).unwrap();
//! assert_eq!(entry.value, Value::Int(7));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod entry;
mod error;
pub mod hash;
pub mod obfuscate;
mod value;

pub use decoder::{decode_batch, decode_entry, decode_header, DecodedBatch};
pub use encoder::{encode_batch, encode_entry};
pub use entry::{Entry, Flags, Header, TypeTag, FORMAT_VERSION, MAX_HEADER_LEN, MIN_ENTRY_LEN};
pub use error::{CodecError, CodecResult};
pub use hash::hash36;
pub use value::Value;
