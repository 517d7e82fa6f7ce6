use std::collections::BTreeMap;
use std::time::Duration;

use log::{debug, info, warn};
use serde::Deserialize;
use serde::Serialize;

use ccore::clock::{Clock, SystemClock};
use ccore::id::RecordId;
use cframe::ContentInfo;
use remote::{Remote, Typ};

use crate::envelope::{self, StoreError};

pub const DEFAULT_MAX_SIZE: u64 = 100 * 1024 * 1024;
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// One reconstructed file, keyed by its manifest id.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: RecordId,
    pub data: Vec<u8>,
    pub size_bytes: u64,
    /// Unix millis of the last insert or hit
    pub timestamp: i64,
    pub metadata: ContentInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub items: usize,
    pub size_bytes: u64,
    pub max_size_bytes: u64,
}

/// Size capped LRU of reconstructed files, mirrored into a [`Remote`].
pub struct ReconstructionCache<R: Remote> {
    remote: R,
    entries: BTreeMap<RecordId, CacheEntry>,
    size_bytes: u64,
    max_size: u64,
    max_age: Duration,
    clock: Box<dyn Clock>,
}

impl<R: Remote> ReconstructionCache<R> {
    pub fn new(remote: R) -> Self {
        ReconstructionCache {
            remote,
            entries: BTreeMap::new(),
            size_bytes: 0,
            max_size: DEFAULT_MAX_SIZE,
            max_age: DEFAULT_MAX_AGE,
            clock: Box::new(SystemClock),
        }
    }

    pub fn with_limits(mut self, max_size: u64, max_age: Duration) -> Self {
        self.max_size = max_size;
        self.max_age = max_age;
        self
    }

    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Pull every persisted entry that is still fresh back into memory.
    pub fn load(&mut self) -> Result<(), StoreError> {
        let now = self.clock.now_millis();

        for key in self.remote.list_keys(Typ::Cache)? {
            let raw = match self.remote.get(Typ::Cache, &key)? {
                Some(raw) => raw,
                None => continue,
            };

            let entry = match envelope::open::<CacheEntry>(&raw) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Cache entry {} is corrupted ({}), dropping it", key, e);
                    self.remote.delete(Typ::Cache, &key)?;
                    continue;
                }
            };

            if self.is_expired(&entry, now) {
                debug!("Cache entry {} expired", key);
                self.remote.delete(Typ::Cache, &key)?;
                continue;
            }

            self.size_bytes += entry.size_bytes;
            self.entries.insert(entry.key, entry);
        }

        // A smaller cap than last run
        while self.size_bytes > self.max_size {
            if !self.evict_oldest()? {
                break;
            }
        }

        info!(
            "Loaded {} cached files ({} bytes)",
            self.entries.len(),
            self.size_bytes
        );
        Ok(())
    }

    pub fn get(&mut self, key: &RecordId) -> Result<Option<&CacheEntry>, StoreError> {
        let now = self.clock.now_millis();

        let expired = match self.entries.get(key) {
            None => return Ok(None),
            Some(entry) => self.is_expired(entry, now),
        };
        if expired {
            debug!("Cache entry {} expired", key);
            self.remove(key)?;
            return Ok(None);
        }

        if let Some(entry) = self.entries.get_mut(key) {
            entry.timestamp = now;
            let sealed = envelope::seal(&*entry)?;
            self.remote.put(Typ::Cache, &cache_key(key), &sealed[..])?;
        }
        Ok(self.entries.get(key))
    }

    /// Insert `data`, returns false when it is too big to ever be cached.
    pub fn set(
        &mut self,
        key: RecordId,
        data: Vec<u8>,
        metadata: ContentInfo,
    ) -> Result<bool, StoreError> {
        let size = data.len() as u64;
        if size > self.max_size / 2 {
            debug!(
                "Not caching {}: {} bytes is over half the cache",
                key, size
            );
            return Ok(false);
        }

        if self.entries.contains_key(&key) {
            self.remove(&key)?;
        }
        while self.size_bytes + size > self.max_size {
            if !self.evict_oldest()? {
                break;
            }
        }

        let entry = CacheEntry {
            key,
            data,
            size_bytes: size,
            timestamp: self.clock.now_millis(),
            metadata,
        };
        let sealed = envelope::seal(&entry)?;
        self.remote.put(Typ::Cache, &cache_key(&key), &sealed[..])?;

        self.size_bytes += size;
        self.entries.insert(key, entry);
        Ok(true)
    }

    pub fn clear(&mut self) -> Result<(), StoreError> {
        for key in self.remote.list_keys(Typ::Cache)? {
            self.remote.delete(Typ::Cache, &key)?;
        }
        self.entries.clear();
        self.size_bytes = 0;
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            items: self.entries.len(),
            size_bytes: self.size_bytes,
            max_size_bytes: self.max_size,
        }
    }

    fn is_expired(&self, entry: &CacheEntry, now: i64) -> bool {
        let age = now.saturating_sub(entry.timestamp);
        age > self.max_age.as_millis() as i64
    }

    fn evict_oldest(&mut self) -> Result<bool, StoreError> {
        let oldest = self
            .entries
            .values()
            .min_by_key(|e| (e.timestamp, e.key))
            .map(|e| e.key);

        match oldest {
            Some(key) => {
                debug!("Evicting {} from cache", key);
                self.remove(&key)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn remove(&mut self, key: &RecordId) -> Result<(), StoreError> {
        if let Some(entry) = self.entries.remove(key) {
            self.size_bytes -= entry.size_bytes;
        }
        self.remote.delete(Typ::Cache, &cache_key(key))?;
        Ok(())
    }
}

fn cache_key(key: &RecordId) -> String {
    key.to_display_hex()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccore::clock::ManualClock;
    use remote::mem::MemRemote;
    use std::rc::Rc;
    use time::OffsetDateTime;

    fn id(n: u8) -> RecordId {
        RecordId::from([n; 32])
    }

    fn info() -> ContentInfo {
        ContentInfo {
            mime_type: "text/plain".to_string(),
            ..ContentInfo::default()
        }
    }

    fn cache(max_size: u64) -> (ReconstructionCache<Rc<MemRemote>>, Rc<MemRemote>, ManualClock) {
        let remote = Rc::new(MemRemote::new());
        let clock = ManualClock::new(OffsetDateTime::UNIX_EPOCH);
        let cache = ReconstructionCache::new(remote.clone())
            .with_limits(max_size, Duration::from_secs(60))
            .with_clock(clock.clone());
        (cache, remote, clock)
    }

    #[test]
    fn set_and_get() {
        let (mut cache, _, _) = cache(1000);
        assert!(cache.set(id(1), vec![1; 100], info()).unwrap());

        let entry = cache.get(&id(1)).unwrap().unwrap();
        assert_eq!(entry.data, vec![1; 100]);
        assert_eq!(entry.metadata, info());
        assert!(cache.get(&id(2)).unwrap().is_none());
    }

    #[test]
    fn rejects_over_half_the_cap() {
        let (mut cache, remote, _) = cache(1000);

        assert!(!cache.set(id(1), vec![0; 501], info()).unwrap());
        assert!(cache.set(id(2), vec![0; 500], info()).unwrap());
        assert_eq!(cache.stats().items, 1);
        assert_eq!(remote.list_keys(Typ::Cache).unwrap().len(), 1);
    }

    #[test]
    fn evicts_least_recently_used() {
        let (mut cache, remote, clock) = cache(1000);

        for n in 1..=3 {
            clock.advance(Duration::from_secs(1));
            cache.set(id(n), vec![n; 300], info()).unwrap();
        }

        // Touch the oldest so the second becomes least recent
        clock.advance(Duration::from_secs(1));
        assert!(cache.get(&id(1)).unwrap().is_some());

        clock.advance(Duration::from_secs(1));
        cache.set(id(4), vec![4; 300], info()).unwrap();

        assert!(cache.get(&id(2)).unwrap().is_none());
        assert!(cache.get(&id(1)).unwrap().is_some());
        assert!(cache.get(&id(3)).unwrap().is_some());
        assert!(cache.get(&id(4)).unwrap().is_some());

        let stats = cache.stats();
        assert_eq!(stats.items, 3);
        assert_eq!(stats.size_bytes, 900);
        assert!(stats.size_bytes <= stats.max_size_bytes);
        assert_eq!(remote.list_keys(Typ::Cache).unwrap().len(), 3);
    }

    #[test]
    fn replacing_a_key_does_not_double_count() {
        let (mut cache, _, _) = cache(1000);

        cache.set(id(1), vec![0; 300], info()).unwrap();
        cache.set(id(1), vec![0; 200], info()).unwrap();

        assert_eq!(cache.stats().size_bytes, 200);
    }

    #[test]
    fn expired_entries_vanish() {
        let (mut cache, remote, clock) = cache(1000);
        cache.set(id(1), vec![0; 10], info()).unwrap();

        clock.advance(Duration::from_secs(61));
        assert!(cache.get(&id(1)).unwrap().is_none());
        assert_eq!(cache.stats().items, 0);
        assert!(remote.list_keys(Typ::Cache).unwrap().is_empty());
    }

    #[test]
    fn load_restores_fresh_and_drops_the_rest() {
        let remote = Rc::new(MemRemote::new());
        let clock = ManualClock::new(OffsetDateTime::UNIX_EPOCH);

        {
            let mut cache = ReconstructionCache::new(remote.clone())
                .with_limits(1000, Duration::from_secs(60))
                .with_clock(clock.clone());
            cache.set(id(1), vec![1; 10], info()).unwrap();
            clock.advance(Duration::from_secs(30));
            cache.set(id(2), vec![2; 10], info()).unwrap();
        }
        remote.put(Typ::Cache, "garbage", &b"junk"[..]).unwrap();

        clock.advance(Duration::from_secs(40));
        let mut cache = ReconstructionCache::new(remote.clone())
            .with_limits(1000, Duration::from_secs(60))
            .with_clock(clock.clone());
        cache.load().unwrap();

        assert_eq!(cache.stats().items, 1);
        assert!(cache.get(&id(2)).unwrap().is_some());
        assert_eq!(
            remote.list_keys(Typ::Cache).unwrap(),
            vec![cache_key(&id(2))]
        );
    }

    #[test]
    fn clear_empties_everything() {
        let (mut cache, remote, _) = cache(1000);
        cache.set(id(1), vec![0; 10], info()).unwrap();
        cache.set(id(2), vec![0; 10], info()).unwrap();

        cache.clear().unwrap();

        assert_eq!(cache.stats().items, 0);
        assert_eq!(cache.stats().size_bytes, 0);
        assert!(remote.list_keys(Typ::Cache).unwrap().is_empty());
    }
}
