use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::Read;

use crate::Remote;
use crate::RemoteError;
use crate::Typ;

/// Plain in-process store, nothing survives a drop.
#[derive(Default)]
pub struct MemRemote {
    blobs: RefCell<BTreeMap<(String, String), Vec<u8>>>,
}

impl MemRemote {
    pub fn new() -> Self {
        MemRemote::default()
    }
}

impl Remote for MemRemote {
    fn list_keys(&self, typ: Typ) -> Result<Vec<String>, RemoteError> {
        let typ = typ.to_string();
        Ok(self
            .blobs
            .borrow()
            .keys()
            .filter(|(t, _)| *t == typ)
            .map(|(_, k)| k.clone())
            .collect())
    }

    fn get(&self, typ: Typ, key: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        Ok(self
            .blobs
            .borrow()
            .get(&(typ.to_string(), key.to_string()))
            .cloned())
    }

    fn put<R: Read>(&self, typ: Typ, key: &str, mut reader: R) -> Result<(), RemoteError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;

        self.blobs
            .borrow_mut()
            .insert((typ.to_string(), key.to_string()), data);
        Ok(())
    }

    fn delete(&self, typ: Typ, key: &str) -> Result<(), RemoteError> {
        self.blobs
            .borrow_mut()
            .remove(&(typ.to_string(), key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_read_write() {
        let back = MemRemote::new();

        back.put(Typ::Record, "a", &b"Test Data"[..]).unwrap();
        back.put(Typ::Record, "a", &b"Data Test"[..]).unwrap();

        assert_eq!(back.get(Typ::Record, "a").unwrap(), Some(b"Data Test".to_vec()));
        assert_eq!(back.get(Typ::Cache, "a").unwrap(), None);
    }

    #[test]
    fn list_and_delete() {
        let back = MemRemote::new();

        back.put(Typ::Session, "b", &b"2"[..]).unwrap();
        back.put(Typ::Session, "a", &b"1"[..]).unwrap();
        back.put(Typ::Cache, "c", &b"3"[..]).unwrap();

        assert_eq!(
            back.list_keys(Typ::Session).unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );

        back.delete(Typ::Session, "a").unwrap();
        assert_eq!(back.list_keys(Typ::Session).unwrap(), vec!["b".to_string()]);
    }
}
