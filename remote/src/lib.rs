#[cfg(feature = "sql")]
pub mod sql;

pub mod mem;

use std::fmt;
use std::io::Read;
use std::rc::Rc;

use thiserror::Error;

// Main types of blobs being stored, each gets its own key space
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Typ {
    Session,
    Cache,
    Record,
}

impl fmt::Display for Typ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Typ::Session => write!(f, "session"),
            Typ::Cache => write!(f, "cache"),
            Typ::Record => write!(f, "record"),
        }
    }
}

#[derive(Error, Debug)]
pub enum RemoteError {
    #[cfg(feature = "sql")]
    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Whole-blob key value store.
///
/// There is no partial update, a `put` replaces whatever was stored under
/// that key.
pub trait Remote {
    fn list_keys(&self, typ: Typ) -> Result<Vec<String>, RemoteError>;

    fn get(&self, typ: Typ, key: &str) -> Result<Option<Vec<u8>>, RemoteError>;
    fn put<R: Read>(&self, typ: Typ, key: &str, reader: R) -> Result<(), RemoteError>;
    fn delete(&self, typ: Typ, key: &str) -> Result<(), RemoteError>;
}

// Sessions, cache and the local ledger all share one store
impl<T: Remote> Remote for Rc<T> {
    fn list_keys(&self, typ: Typ) -> Result<Vec<String>, RemoteError> {
        (**self).list_keys(typ)
    }

    fn get(&self, typ: Typ, key: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        (**self).get(typ, key)
    }

    fn put<R: Read>(&self, typ: Typ, key: &str, reader: R) -> Result<(), RemoteError> {
        (**self).put(typ, key, reader)
    }

    fn delete(&self, typ: Typ, key: &str) -> Result<(), RemoteError> {
        (**self).delete(typ, key)
    }
}
