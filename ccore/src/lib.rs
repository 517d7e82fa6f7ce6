//! Shared primitives for the chainfile crates.
//!
//! - [`id::RecordId`]: the opaque 32 byte id the ledger hands out per record
//! - [`hash::Digest`]: blake3 content digest used for file and chunk identity
//! - [`hash::Checksum`]: cheap xxhash32 checksum for persisted blobs
//! - [`buf`]: reader helpers
//! - [`clock`]: wall clock abstraction so expiry logic can be tested
pub mod buf;
pub mod clock;
pub mod hash;
pub mod id;
