//! Store large files on a record-size capped, append-only ledger.
//!
//! * [`transmit`] chunks a file, commits every chunk and then the manifest
//! * [`reconstruct`] resolves a manifest and reassembles the file
//! * [`session`] and [`cache`] persist upload progress and finished files
//! * [`ledger`] is the seam to the ledger itself
pub mod cache;
pub mod chunk;
pub mod client;
pub mod config;
pub mod envelope;
pub mod ledger;
pub mod progress;
pub mod reconstruct;
pub mod session;
pub mod sizing;
pub mod transmit;

pub use client::{Chainfile, ClientError};
pub use config::Config;
