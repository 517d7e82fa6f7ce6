use log::debug;
use rusqlite as rs;
use rusqlite::Connection;
use std::io::Read;
use std::path::Path;

use ccore::buf::fill_buf;

use crate::Remote;
use crate::RemoteError;
use crate::Typ;

// Blobs are split over rows of this size
const CHUNK_SIZE: usize = 64 * 1024;

pub struct SqlRemote {
    conn: Connection,
}

impl SqlRemote {
    /// Open (or create) the store, `None` keeps it in memory.
    pub fn new(filename: Option<&Path>) -> Result<Self, RemoteError> {
        let conn = match filename {
            None => Connection::open_in_memory()?,
            Some(f) => {
                debug!("Opening store at {}", f.display());
                Connection::open(f)?
            }
        };

        // Setup the db
        conn.execute_batch(
            "BEGIN;
             CREATE TABLE IF NOT EXISTS blob (
                key VARCHAR NOT NULL,
                typ VARCHAR NOT NULL,
                chunk INTEGER NOT NULL,
                content BLOB NOT NULL,
                UNIQUE(key, typ, chunk)
             );
             COMMIT;",
        )?;

        Ok(SqlRemote { conn })
    }
}

impl Remote for SqlRemote {
    fn list_keys(&self, typ: Typ) -> Result<Vec<String>, RemoteError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT DISTINCT key
             FROM blob
             WHERE typ = ?
             ORDER BY key ASC",
        )?;

        let keys = stmt
            .query_map(rs::params![typ.to_string()], |row| row.get(0))?
            .collect::<Result<Vec<String>, rs::Error>>()?;
        Ok(keys)
    }

    fn get(&self, typ: Typ, key: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT content
             FROM blob
             WHERE key = ?
             AND typ = ?
             ORDER BY chunk ASC",
        )?;

        let rows = stmt
            .query_map(rs::params![key, typ.to_string()], |row| row.get(0))?
            .collect::<Result<Vec<Vec<u8>>, rs::Error>>()?;

        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(rows.concat()))
        }
    }

    fn put<R: Read>(&self, typ: Typ, key: &str, mut reader: R) -> Result<(), RemoteError> {
        let tx = self.conn.unchecked_transaction()?;

        // Delete any key chunks that exists before
        tx.prepare_cached(
            "DELETE FROM blob
             WHERE key = ?
             AND typ = ?",
        )?
        .execute(rs::params![key, typ.to_string()])?;

        // Insert new data, an empty blob still gets one row so it can be found
        let mut chunk_idx: i64 = 0;
        let mut in_buf = vec![0u8; CHUNK_SIZE];

        loop {
            match fill_buf(&mut reader, &mut in_buf)? {
                (true, 0) if chunk_idx > 0 => break,
                (eof, len) => {
                    tx.prepare_cached(
                        "INSERT INTO blob
                         (key, typ, chunk, content)
                         VALUES
                         (?, ?, ?, ?)",
                    )?
                    .execute(rs::params![key, typ.to_string(), chunk_idx, &in_buf[..len]])?;

                    chunk_idx += 1;
                    if eof {
                        break;
                    }
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn delete(&self, typ: Typ, key: &str) -> Result<(), RemoteError> {
        self.conn
            .prepare_cached(
                "DELETE FROM blob
                 WHERE key = ?
                 AND typ = ?",
            )?
            .execute(rs::params![key, typ.to_string()])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::sql::SqlRemote;
    use crate::Remote;
    use crate::Typ;

    #[test]
    fn basic_read_write() {
        let back = SqlRemote::new(None).unwrap();
        let key = "test-key";

        back.put(Typ::Cache, key, &b"Test Data"[..]).unwrap();

        assert_eq!(back.get(Typ::Cache, key).unwrap(), Some(b"Test Data".to_vec()));
    }

    #[test]
    fn overwrite_read_write() {
        let back = SqlRemote::new(None).unwrap();
        let key = "test-key";

        back.put(Typ::Cache, key, &b"Test Data"[..]).unwrap();
        back.put(Typ::Cache, key, &b"Data Test"[..]).unwrap();

        assert_eq!(back.get(Typ::Cache, key).unwrap(), Some(b"Data Test".to_vec()));
    }

    #[test]
    fn multi_row_blob() {
        let back = SqlRemote::new(None).unwrap();
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 253) as u8).collect();

        back.put(Typ::Record, "big", &data[..]).unwrap();

        assert_eq!(back.get(Typ::Record, "big").unwrap(), Some(data));
    }

    #[test]
    fn empty_blob_is_present() {
        let back = SqlRemote::new(None).unwrap();

        back.put(Typ::Session, "empty", &b""[..]).unwrap();

        assert_eq!(back.get(Typ::Session, "empty").unwrap(), Some(vec![]));
        assert_eq!(back.list_keys(Typ::Session).unwrap(), vec!["empty".to_string()]);
    }

    #[test]
    fn typ_namespaces_are_separate() {
        let back = SqlRemote::new(None).unwrap();

        back.put(Typ::Session, "k", &b"session"[..]).unwrap();
        back.put(Typ::Cache, "k", &b"cache"[..]).unwrap();
        back.delete(Typ::Session, "k").unwrap();

        assert_eq!(back.get(Typ::Session, "k").unwrap(), None);
        assert_eq!(back.get(Typ::Cache, "k").unwrap(), Some(b"cache".to_vec()));
        assert!(back.list_keys(Typ::Session).unwrap().is_empty());
    }

    #[test]
    fn persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.sqlite");

        {
            let back = SqlRemote::new(Some(&path)).unwrap();
            back.put(Typ::Record, "a", &b"abc"[..]).unwrap();
        }

        let back = SqlRemote::new(Some(&path)).unwrap();
        assert_eq!(back.get(Typ::Record, "a").unwrap(), Some(b"abc".to_vec()));
    }
}
