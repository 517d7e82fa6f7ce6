use std::cell::Cell;

use async_trait::async_trait;
use log::debug;

use ccore::id::RecordId;
use remote::{Remote, Typ};

use crate::ledger::{LedgerError, LedgerSubmit, RecordQuery};

/// Ledger kept in a [`Remote`], one blob per record.
///
/// Ids are the blake3 of the submission sequence number followed by the
/// record, so submitting the same bytes twice gives two records.
pub struct StoreLedger<R: Remote> {
    name: String,
    remote: R,
    sequence: Cell<u64>,
    max_record: usize,
}

impl<R: Remote> StoreLedger<R> {
    pub fn new(name: &str, remote: R) -> Result<Self, LedgerError> {
        let existing = remote.list_keys(Typ::Record)?.len() as u64;

        Ok(StoreLedger {
            name: name.to_string(),
            remote,
            sequence: Cell::new(existing),
            max_record: usize::MAX,
        })
    }

    /// Reject any record bigger than `max_record` bytes.
    pub fn with_max_record(mut self, max_record: usize) -> Self {
        self.max_record = max_record;
        self
    }

    pub fn len(&self) -> Result<usize, LedgerError> {
        Ok(self.remote.list_keys(Typ::Record)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, LedgerError> {
        Ok(self.len()? == 0)
    }
}

#[async_trait(?Send)]
impl<R: Remote> LedgerSubmit for StoreLedger<R> {
    async fn submit(&self, record: &[u8]) -> Result<RecordId, LedgerError> {
        if record.len() > self.max_record {
            return Err(LedgerError::Rejected(format!(
                "{} bytes is over the {} byte record limit",
                record.len(),
                self.max_record
            )));
        }

        let seq = self.sequence.get();
        self.sequence.set(seq + 1);

        let mut hasher = blake3::Hasher::new();
        hasher.update(&seq.to_le_bytes());
        hasher.update(record);
        let id = RecordId::from(*hasher.finalize().as_bytes());

        self.remote
            .put(Typ::Record, &id.to_display_hex(), record)?;

        debug!("{}: committed {} ({} bytes)", self.name, id, record.len());
        Ok(id)
    }
}

#[async_trait(?Send)]
impl<R: Remote> RecordQuery for StoreLedger<R> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_record(&self, id: &RecordId) -> Result<Vec<u8>, LedgerError> {
        self.remote
            .get(Typ::Record, &id.to_display_hex())?
            .ok_or(LedgerError::NotFound(*id))
    }
}
