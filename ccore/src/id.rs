use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum IdError {
    #[error("invalid hex in record id: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("record id must be 32 bytes, got {0}")]
    Length(usize),
}

/// Ledger record id.
///
/// Internally this is an opaque 32 byte value compared byte for byte. Humans
/// see it byte-reversed (the way ledger explorers print ids), which is what
/// `Display` and [`RecordId::from_display_hex`] deal in.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash, Serialize, Deserialize)]
pub struct RecordId([u8; 32]);

impl RecordId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, IdError> {
        let raw: [u8; 32] = bytes.try_into().map_err(|_| IdError::Length(bytes.len()))?;
        Ok(RecordId(raw))
    }

    pub fn from_display_hex(s: &str) -> Result<Self, IdError> {
        let mut raw = hex::decode(s.trim())?;
        raw.reverse();
        RecordId::from_slice(&raw)
    }

    pub fn to_display_hex(&self) -> String {
        let mut raw = self.0;
        raw.reverse();
        hex::encode(raw)
    }
}

impl From<[u8; 32]> for RecordId {
    fn from(bytes: [u8; 32]) -> Self {
        RecordId(bytes)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_hex())
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.to_display_hex())
    }
}
