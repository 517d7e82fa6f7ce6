//! On-disk wrapper for everything persisted into the [`remote::Remote`].
//!
//! | Type    | Name     | Description |
//! | ------: | -------- | ----------- |
//! | u8      | version  | Currently `0x01` |
//! | u32     | checksum | xxhash32 of `body`, Little Endian |
//! | [u8; N] | body     | zstd compressed bincode of the value |
//!
//! Anything that fails to open is reported as [`Corrupted`] and callers treat
//! the entry as absent.
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use ccore::hash::checksum;
use remote::RemoteError;

pub const ENVELOPE_VERSION: u8 = 0x01;
const HEADER_LEN: usize = 5;
const COMPRESSION_LEVEL: i32 = 9;

#[derive(Error, Debug)]
pub enum Corrupted {
    #[error("envelope is only {0} bytes")]
    Short(usize),
    #[error("unknown envelope version 0x{0:02x}")]
    Version(u8),
    #[error("envelope checksum mismatch")]
    Checksum,
    #[error("envelope body failed to decompress: {0}")]
    Decompress(#[source] std::io::Error),
    #[error("envelope body failed to deserialize: {0}")]
    Deserialize(#[from] bincode::Error),
}

#[derive(Error, Debug)]
pub enum SealError {
    #[error(transparent)]
    Serialize(#[from] bincode::Error),
    #[error(transparent)]
    Compress(#[from] std::io::Error),
}

/// Failure of the persistent store itself, corruption never shows up here.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Seal(#[from] SealError),
}

pub fn seal<T: Serialize>(value: &T) -> Result<Vec<u8>, SealError> {
    let raw = bincode::serialize(value)?;
    let body = zstd::stream::encode_all(&raw[..], COMPRESSION_LEVEL)?;

    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.push(ENVELOPE_VERSION);
    out.extend_from_slice(&checksum(&body).to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

pub fn open<T: DeserializeOwned>(raw: &[u8]) -> Result<T, Corrupted> {
    if raw.len() < HEADER_LEN {
        return Err(Corrupted::Short(raw.len()));
    }
    if raw[0] != ENVELOPE_VERSION {
        return Err(Corrupted::Version(raw[0]));
    }

    let expect = u32::from_le_bytes([raw[1], raw[2], raw[3], raw[4]]);
    let body = &raw[HEADER_LEN..];
    if checksum(body) != expect {
        return Err(Corrupted::Checksum);
    }

    let data = zstd::stream::decode_all(body).map_err(Corrupted::Decompress)?;
    Ok(bincode::deserialize(&data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Sample {
        name: String,
        data: Vec<u8>,
    }

    fn sample() -> Sample {
        Sample {
            name: "sample".to_string(),
            data: vec![9; 4096],
        }
    }

    #[test]
    fn seal_and_open() {
        let sealed = seal(&sample()).unwrap();

        assert_eq!(sealed[0], ENVELOPE_VERSION);
        // Repetitive data should compress
        assert!(sealed.len() < 4096);
        assert_eq!(open::<Sample>(&sealed).unwrap(), sample());
    }

    #[test]
    fn flipped_bit_is_caught() {
        let mut sealed = seal(&sample()).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;

        assert!(matches!(open::<Sample>(&sealed), Err(Corrupted::Checksum)));
    }

    #[test]
    fn short_and_unknown_version() {
        assert!(matches!(open::<Sample>(&[0x01, 0x00]), Err(Corrupted::Short(2))));

        let mut sealed = seal(&sample()).unwrap();
        sealed[0] = 0x7f;
        assert!(matches!(open::<Sample>(&sealed), Err(Corrupted::Version(0x7f))));
    }

    #[test]
    fn wrong_type_fails_to_deserialize() {
        let sealed = seal(&42u8).unwrap();

        assert!(open::<Sample>(&sealed).is_err());
    }
}
