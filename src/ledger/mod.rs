pub mod http;
pub mod store;

use async_trait::async_trait;
use thiserror::Error;

use ccore::id::RecordId;
use remote::RemoteError;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("backend {backend} unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },
    #[error("record {0} not found")]
    NotFound(RecordId),
    #[error("record rejected: {0}")]
    Rejected(String),
    #[error(transparent)]
    Store(#[from] RemoteError),
}

// Both traits are ?Send, everything runs on one task

/// Commits records to the ledger, the ledger picks the id.
#[async_trait(?Send)]
pub trait LedgerSubmit {
    async fn submit(&self, record: &[u8]) -> Result<RecordId, LedgerError>;
}

/// One place records can be read back from.
#[async_trait(?Send)]
pub trait RecordQuery {
    fn name(&self) -> &str;

    async fn fetch_record(&self, id: &RecordId) -> Result<Vec<u8>, LedgerError>;
}

#[async_trait(?Send)]
impl<T: LedgerSubmit + ?Sized> LedgerSubmit for std::rc::Rc<T> {
    async fn submit(&self, record: &[u8]) -> Result<RecordId, LedgerError> {
        (**self).submit(record).await
    }
}

#[async_trait(?Send)]
impl<T: RecordQuery + ?Sized> RecordQuery for std::rc::Rc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn fetch_record(&self, id: &RecordId) -> Result<Vec<u8>, LedgerError> {
        (**self).fetch_record(id).await
    }
}
