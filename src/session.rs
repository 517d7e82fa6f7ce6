use std::collections::BTreeMap;
use std::collections::BTreeSet;

use log::{debug, warn};
use serde::Deserialize;
use serde::Serialize;

use ccore::clock::{Clock, SystemClock};
use ccore::hash::{self, Digest};
use ccore::id::RecordId;
use remote::{Remote, Typ};

use crate::envelope::{self, StoreError};

pub const DEFAULT_MAX_SESSIONS: usize = 10;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Pending,
    Uploading,
    Completed,
    Failed,
    Paused,
}

/// Where one chunk ended up on the ledger.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkCommit {
    pub id: RecordId,
    pub digest: Digest,
}

/// Persisted progress of one upload, keyed by the digest of the file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UploadSession {
    pub session_id: String,
    pub file_hash: Digest,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
    pub status: SessionStatus,
    pub chunk_size: u32,
    pub compression: Option<String>,
    pub total_chunks: u32,
    /// Digest of the bytes being chunked, differs from `file_hash` once
    /// compressed
    pub payload_hash: Digest,
    pub committed: BTreeMap<u32, ChunkCommit>,
    pub main_record_id: Option<RecordId>,
    /// Unix millis of the last state change
    pub timestamp: i64,
}

impl UploadSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        file_hash: Digest,
        file_name: &str,
        file_size: u64,
        mime_type: &str,
        chunk_size: u32,
        compression: Option<String>,
        total_chunks: u32,
        now: i64,
    ) -> Self {
        let hex = hash::to_hex(&file_hash);

        UploadSession {
            session_id: format!("{}-{}", &hex[..16], now),
            file_hash,
            file_name: file_name.to_string(),
            file_size,
            mime_type: mime_type.to_string(),
            status: SessionStatus::Pending,
            chunk_size,
            compression,
            total_chunks,
            payload_hash: file_hash,
            committed: BTreeMap::new(),
            main_record_id: None,
            timestamp: now,
        }
    }

    pub fn key(&self) -> String {
        session_key(&self.file_hash)
    }

    pub fn completed_chunks(&self) -> BTreeSet<u32> {
        self.committed.keys().copied().collect()
    }

    pub fn is_chunk_complete(&self, index: u32) -> bool {
        self.committed.contains_key(&index)
    }

    /// Record a committed chunk, indices outside the file are ignored.
    pub fn mark_chunk(&mut self, index: u32, commit: ChunkCommit) -> bool {
        if index >= self.total_chunks {
            return false;
        }
        self.committed.insert(index, commit);
        true
    }

    pub fn all_chunks_committed(&self) -> bool {
        self.committed.len() as u32 == self.total_chunks
    }

    /// Chunk ids in file order, only once every chunk is committed.
    pub fn chunk_refs(&self) -> Option<Vec<RecordId>> {
        if !self.all_chunks_committed() {
            return None;
        }
        Some(self.committed.values().map(|c| c.id).collect())
    }

    pub fn chunk_digests(&self) -> Option<Vec<Digest>> {
        if !self.all_chunks_committed() {
            return None;
        }
        Some(self.committed.values().map(|c| c.digest).collect())
    }

    pub fn is_resumable(&self) -> bool {
        self.status != SessionStatus::Completed
    }
}

pub fn session_key(file_hash: &Digest) -> String {
    hash::to_hex(file_hash)
}

pub struct SessionStore<R: Remote> {
    remote: R,
    max_sessions: usize,
    clock: Box<dyn Clock>,
}

impl<R: Remote> SessionStore<R> {
    pub fn new(remote: R) -> Self {
        SessionStore {
            remote,
            max_sessions: DEFAULT_MAX_SESSIONS,
            clock: Box::new(SystemClock),
        }
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Stamp and persist `session`, then drop the oldest sessions past the cap.
    pub fn save(&self, session: &mut UploadSession) -> Result<(), StoreError> {
        session.timestamp = self.now();

        let sealed = envelope::seal(session)?;
        self.remote.put(Typ::Session, &session.key(), &sealed[..])?;
        debug!(
            "Saved session {} ({}/{} chunks, {:?})",
            session.session_id,
            session.committed.len(),
            session.total_chunks,
            session.status
        );

        self.prune(&session.key())?;
        Ok(())
    }

    pub fn get(&self, file_hash: &Digest) -> Result<Option<UploadSession>, StoreError> {
        self.load(&session_key(file_hash))
    }

    /// Every readable session, newest first.
    pub fn get_all(&self) -> Result<Vec<UploadSession>, StoreError> {
        let mut sessions = Vec::new();
        for key in self.remote.list_keys(Typ::Session)? {
            if let Some(session) = self.load(&key)? {
                sessions.push(session);
            }
        }

        sessions.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(sessions)
    }

    pub fn delete(&self, file_hash: &Digest) -> Result<(), StoreError> {
        self.remote.delete(Typ::Session, &session_key(file_hash))?;
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<UploadSession>, StoreError> {
        let raw = match self.remote.get(Typ::Session, key)? {
            Some(raw) => raw,
            None => return Ok(None),
        };

        match envelope::open::<UploadSession>(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!("Session {} is corrupted ({}), dropping it", key, e);
                self.remote.delete(Typ::Session, key)?;
                Ok(None)
            }
        }
    }

    /// Drop the oldest sessions past the cap, never the one under `keep`.
    fn prune(&self, keep: &str) -> Result<(), StoreError> {
        let sessions = self.get_all()?;

        let others = sessions.iter().filter(|s| s.key() != keep);
        for old in others.skip(self.max_sessions.saturating_sub(1)) {
            debug!("Pruning session {}", old.session_id);
            self.remote.delete(Typ::Session, &old.key())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccore::clock::ManualClock;
    use ccore::hash::digest;
    use remote::mem::MemRemote;
    use std::rc::Rc;
    use std::time::Duration;
    use time::OffsetDateTime;

    fn session(name: &str, total: u32) -> UploadSession {
        UploadSession::new(
            digest(name.as_bytes()),
            name,
            100,
            "text/plain",
            10,
            None,
            total,
            0,
        )
    }

    fn store() -> (SessionStore<Rc<MemRemote>>, Rc<MemRemote>, ManualClock) {
        let remote = Rc::new(MemRemote::new());
        let clock = ManualClock::new(OffsetDateTime::UNIX_EPOCH);
        let store = SessionStore::new(remote.clone()).with_clock(clock.clone());
        (store, remote, clock)
    }

    #[test]
    fn save_and_get() {
        let (store, _, clock) = store();
        let mut s = session("a", 3);
        s.mark_chunk(
            1,
            ChunkCommit {
                id: RecordId::from([1; 32]),
                digest: digest(b"chunk"),
            },
        );

        clock.advance(Duration::from_secs(5));
        store.save(&mut s).unwrap();

        let got = store.get(&s.file_hash).unwrap().unwrap();
        assert_eq!(got, s);
        assert_eq!(got.timestamp, 5000);
        assert_eq!(got.completed_chunks(), BTreeSet::from([1]));
    }

    #[test]
    fn missing_session() {
        let (store, _, _) = store();
        assert!(store.get(&digest(b"nope")).unwrap().is_none());
    }

    #[test]
    fn mark_chunk_bounds() {
        let mut s = session("a", 2);
        let commit = ChunkCommit {
            id: RecordId::from([0; 32]),
            digest: digest(b""),
        };

        assert!(s.mark_chunk(1, commit));
        assert!(!s.mark_chunk(2, commit));
        assert!(!s.all_chunks_committed());
        assert!(s.chunk_refs().is_none());

        assert!(s.mark_chunk(0, commit));
        assert!(s.all_chunks_committed());
        assert_eq!(s.chunk_refs().unwrap().len(), 2);
    }

    #[test]
    fn chunk_refs_follow_index_order() {
        let mut s = session("a", 3);
        for i in [2u32, 0, 1] {
            s.mark_chunk(
                i,
                ChunkCommit {
                    id: RecordId::from([i as u8; 32]),
                    digest: digest(&[i as u8]),
                },
            );
        }

        let refs = s.chunk_refs().unwrap();
        assert_eq!(
            refs,
            vec![
                RecordId::from([0; 32]),
                RecordId::from([1; 32]),
                RecordId::from([2; 32])
            ]
        );
    }

    #[test]
    fn get_all_newest_first_and_pruned() {
        let remote = Rc::new(MemRemote::new());
        let clock = ManualClock::new(OffsetDateTime::UNIX_EPOCH);
        let store = SessionStore::new(remote.clone())
            .with_clock(clock.clone())
            .with_max_sessions(3);

        for name in ["s0", "s1", "s2", "s3", "s4"] {
            clock.advance(Duration::from_secs(1));
            store.save(&mut session(name, 1)).unwrap();
        }

        let all = store.get_all().unwrap();
        let names: Vec<&str> = all.iter().map(|s| s.file_name.as_str()).collect();
        assert_eq!(names, vec!["s4", "s3", "s2"]);
        assert_eq!(remote.list_keys(Typ::Session).unwrap().len(), 3);
    }

    #[test]
    fn prune_keeps_the_session_just_saved() {
        let (store, remote, _) = store();
        let store = store.with_max_sessions(2);

        // Same millisecond for all of them, so only the ids order them
        for name in ["s0", "s1", "s2", "s3"] {
            let mut s = session(name, 1);
            s.session_id = format!("z-{}", name);
            store.save(&mut s).unwrap();

            assert!(store.get(&s.file_hash).unwrap().is_some(), "{} was pruned", name);
        }
        assert_eq!(remote.list_keys(Typ::Session).unwrap().len(), 2);
    }

    #[test]
    fn corrupted_session_is_absent_and_removed() {
        let (store, remote, _) = store();
        let mut s = session("a", 1);
        store.save(&mut s).unwrap();

        remote
            .put(Typ::Session, &s.key(), &b"not an envelope"[..])
            .unwrap();

        assert!(store.get(&s.file_hash).unwrap().is_none());
        assert!(remote.get(Typ::Session, &s.key()).unwrap().is_none());
        assert!(store.get_all().unwrap().is_empty());
    }

    #[test]
    fn delete_session() {
        let (store, _, _) = store();
        let mut s = session("a", 1);
        store.save(&mut s).unwrap();

        store.delete(&s.file_hash).unwrap();
        assert!(store.get(&s.file_hash).unwrap().is_none());
    }
}
