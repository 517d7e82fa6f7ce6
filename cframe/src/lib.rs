//! Push-data record framing
//!
//! A ledger record holds one small payload. Inside it every field is a
//! length-prefixed "push", which lets a decoder recover field boundaries
//! from the raw bytes without any other metadata.
//!
//! # Record layout
//!
//! | Bytes      | Description |
//! | ---------: | ----------- |
//! | `00 6a`    | No-op data carrier prefix, see [`RECORD_PREFIX`] |
//! | push       | Namespace, identifies what kind of record this is |
//! | push * N   | Fields, interpreted according to the namespace |
//!
//! # Push encoding
//!
//! Unless other wise noted lengths are stored in Little Endian format.
//!
//! | Payload length `L`   | Header               | Description |
//! | -------------------- | -------------------- | ----------- |
//! | `0 ..= 75`           | `L`                  | Direct push, the length byte is the header |
//! | `76 ..= 255`         | `4c`, u8 length      | One byte length |
//! | `256 ..= 65535`      | `4d`, u16 length     | Two byte length |
//! | `65536 ..= u32::MAX` | `4e`, u32 length     | Four byte length, only large chunk payloads |
//!
//! Any other header byte (`4f ..= ff`) is not a push and the record is
//! rejected as malformed.
//!
//! # Namespaces
//!
//! | Namespace               | Fields |
//! | ----------------------- | ------ |
//! | [`CHUNK_NAMESPACE`]     | One field, the raw chunk bytes |
//! | [`MANIFEST_NAMESPACE`]  | mime, charset, filename, compression, then one 32 byte chunk id per chunk |
//!
//! See [`manifest::Manifest`] for the manifest field rules.
pub mod manifest;
pub mod push;
pub mod record;

use thiserror::Error;

pub use manifest::{ContentInfo, Manifest};
pub use record::Record;

/// `OP_FALSE OP_RETURN`, marks the record as an unspendable data carrier.
pub const RECORD_PREFIX: [u8; 2] = [0x00, 0x6a];

pub const MAX_DIRECT_PUSH: usize = 75;
pub const PUSH_U8: u8 = 0x4c;
pub const PUSH_U16: u8 = 0x4d;
pub const PUSH_U32: u8 = 0x4e;

pub const CHUNK_NAMESPACE: &str = "1ChDHzdd1H4wSjgGMHyndZm6qxEDGjqpJL";
pub const MANIFEST_NAMESPACE: &str = "15DHFxWZJT58f9nhyGnsRBqrgwK4W6h4Up";

#[derive(Error, Debug, PartialEq)]
pub enum FrameError {
    #[error("record does not start with the data carrier prefix")]
    MissingPrefix,
    #[error("malformed push header 0x{byte:02x} at offset {offset}")]
    Malformed { offset: usize, byte: u8 },
    #[error("push at offset {offset} declares {declared} bytes but only {available} are available")]
    Truncated {
        offset: usize,
        declared: usize,
        available: usize,
    },
    #[error("field of {0} bytes cannot be framed")]
    FieldTooLarge(usize),
    #[error("record has no namespace")]
    MissingNamespace,
    #[error("unexpected namespace {0:?}")]
    WrongNamespace(String),
    #[error("record is missing the {0} field")]
    MissingField(&'static str),
    #[error("chunk reference {index} is {len} bytes, expected 32")]
    BadChunkRef { index: usize, len: usize },
    #[error("{0} field is not valid utf-8")]
    InvalidUtf8(&'static str),
}

impl FrameError {
    /// The response the push was read from ended before the push did.
    pub fn is_truncation(&self) -> bool {
        matches!(self, FrameError::Truncated { .. })
    }
}
