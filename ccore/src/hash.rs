use std::fmt;
use std::io::{copy, Read};

use std::hash::Hash as StdHash;
use std::hash::Hasher as StdHasher;
use twox_hash::XxHash32;

use serde::de::{self, Unexpected, Visitor};
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

// Make the checksum api be similiar to blake3's
pub struct Checksum(XxHash32);

impl Checksum {
    pub fn new() -> Checksum {
        Checksum(XxHash32::with_seed(0))
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.write(data);
    }

    pub fn finalize(self) -> u32 {
        self.0.finish() as u32
    }
}

impl Default for Checksum {
    fn default() -> Self {
        Checksum::new()
    }
}

pub fn checksum(data: &[u8]) -> u32 {
    let mut sum = Checksum::new();
    sum.update(data);
    sum.finalize()
}

/// Content digest of a file or of a single chunk.
#[derive(PartialEq, Eq, Clone, Copy, StdHash)]
pub struct Digest(blake3::Hash);

pub fn hash<R: Read>(data: &mut R) -> Result<Digest, std::io::Error> {
    let mut hash = blake3::Hasher::new();
    copy(data, &mut hash)?;
    Ok(Digest(hash.finalize()))
}

pub fn digest(data: &[u8]) -> Digest {
    Digest(blake3::hash(data))
}

// To encapsulate the hash engine used
pub fn from_hex(hash: &str) -> Result<Digest, blake3::HexError> {
    blake3::Hash::from_hex(hash).map(Digest)
}

pub fn to_hex(hash: &Digest) -> String {
    hash.0.to_hex().to_string()
}

impl From<[u8; 32]> for Digest {
    fn from(bytes: [u8; 32]) -> Self {
        Digest(blake3::Hash::from(bytes))
    }
}

impl Digest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.0.to_hex())
    }
}

// Serde impls
impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(self.0.as_bytes())
    }
}

struct DigestVisitor;

impl<'de> Visitor<'de> for DigestVisitor {
    type Value = Digest;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a byte array containing 32 bytes")
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        if v.len() == 32 {
            let mut hash_bytes: [u8; 32] = [0; 32];
            hash_bytes.clone_from_slice(v);
            Ok(Digest::from(hash_bytes))
        } else {
            Err(de::Error::invalid_value(Unexpected::Bytes(v), &self))
        }
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
        v.try_into().map_or_else(
            |v: Vec<u8>| Err(de::Error::invalid_value(Unexpected::Bytes(&v), &self)),
            |hash_bytes: [u8; 32]| Ok(Digest::from(hash_bytes)),
        )
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Digest, D::Error> {
        deserializer.deserialize_byte_buf(DigestVisitor)
    }
}
