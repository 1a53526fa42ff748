//! Message cache consulted by the scheduler worker.
//!
//! Headers and bodies are stored as the raw bytes the session returned, so
//! a cached entry goes through exactly the same decoding as a fresh one.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::num::NonZeroUsize;

use lru::LruCache;
use tracing::debug;

use crate::config::Config;
use crate::model::{MessageFlags, Uid};

/// Storage for data fetched through a session.
///
/// Implementations are owned by the scheduler worker and only used from
/// that thread.
pub trait MessageCache: Send {
    fn folders(&self) -> Option<BTreeSet<String>>;
    fn store_folders(&mut self, folders: &BTreeSet<String>);

    fn uids(&self, folder: &str) -> Option<BTreeSet<Uid>>;
    fn store_uids(&mut self, folder: &str, uids: &BTreeSet<Uid>);

    /// Known flags for those of `uids` that are cached.
    fn flags(&self, folder: &str, uids: &BTreeSet<Uid>) -> BTreeMap<Uid, MessageFlags>;
    fn store_flags(&mut self, folder: &str, flags: &BTreeMap<Uid, MessageFlags>);
    /// Raise or lower `flag` on cached entries of `uids`.
    fn update_flags(&mut self, folder: &str, uids: &BTreeSet<Uid>, flag: MessageFlags, on: bool);

    fn header(&mut self, folder: &str, uid: Uid) -> Option<Vec<u8>>;
    fn store_header(&mut self, folder: &str, uid: Uid, raw: &[u8]);

    fn body(&mut self, folder: &str, uid: Uid) -> Option<Vec<u8>>;
    fn store_body(&mut self, folder: &str, uid: Uid, raw: &[u8]);

    /// Forget everything about `uids` in `folder`.
    fn evict(&mut self, folder: &str, uids: &BTreeSet<Uid>);
}

type Key = (String, Uid);

/// In-memory cache; headers and bodies are bounded by an LRU policy.
pub struct MemoryCache {
    folders: Option<BTreeSet<String>>,
    uids: HashMap<String, BTreeSet<Uid>>,
    flags: HashMap<String, BTreeMap<Uid, MessageFlags>>,
    headers: LruCache<Key, Vec<u8>>,
    bodies: LruCache<Key, Vec<u8>>,
}

impl MemoryCache {
    /// Cache keeping at most `capacity` headers and as many bodies.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            folders: None,
            uids: HashMap::new(),
            flags: HashMap::new(),
            headers: LruCache::new(capacity),
            bodies: LruCache::new(capacity),
        }
    }

    /// Cache sized by `[performance] cache_size`.
    pub fn from_config(config: &Config) -> Self {
        debug!(capacity = config.performance.cache_size, "Creating message cache");
        Self::new(config.performance.cache_size)
    }
}

fn key(folder: &str, uid: Uid) -> Key {
    (folder.to_string(), uid)
}

impl MessageCache for MemoryCache {
    fn folders(&self) -> Option<BTreeSet<String>> {
        self.folders.clone()
    }

    fn store_folders(&mut self, folders: &BTreeSet<String>) {
        self.folders = Some(folders.clone());
    }

    fn uids(&self, folder: &str) -> Option<BTreeSet<Uid>> {
        self.uids.get(folder).cloned()
    }

    fn store_uids(&mut self, folder: &str, uids: &BTreeSet<Uid>) {
        self.uids.insert(folder.to_string(), uids.clone());
    }

    fn flags(&self, folder: &str, uids: &BTreeSet<Uid>) -> BTreeMap<Uid, MessageFlags> {
        let Some(known) = self.flags.get(folder) else {
            return BTreeMap::new();
        };
        uids.iter()
            .filter_map(|uid| known.get(uid).map(|&flags| (*uid, flags)))
            .collect()
    }

    fn store_flags(&mut self, folder: &str, flags: &BTreeMap<Uid, MessageFlags>) {
        self.flags
            .entry(folder.to_string())
            .or_default()
            .extend(flags.iter().map(|(&uid, &f)| (uid, f)));
    }

    fn update_flags(&mut self, folder: &str, uids: &BTreeSet<Uid>, flag: MessageFlags, on: bool) {
        let Some(known) = self.flags.get_mut(folder) else {
            return;
        };
        for uid in uids {
            if let Some(flags) = known.get_mut(uid) {
                flags.set(flag, on);
            }
        }
    }

    fn header(&mut self, folder: &str, uid: Uid) -> Option<Vec<u8>> {
        self.headers.get(&key(folder, uid)).cloned()
    }

    fn store_header(&mut self, folder: &str, uid: Uid, raw: &[u8]) {
        self.headers.put(key(folder, uid), raw.to_vec());
    }

    fn body(&mut self, folder: &str, uid: Uid) -> Option<Vec<u8>> {
        self.bodies.get(&key(folder, uid)).cloned()
    }

    fn store_body(&mut self, folder: &str, uid: Uid, raw: &[u8]) {
        self.bodies.put(key(folder, uid), raw.to_vec());
    }

    fn evict(&mut self, folder: &str, uids: &BTreeSet<Uid>) {
        debug!(folder, count = uids.len(), "Evicting cached messages");
        for &uid in uids {
            let key = key(folder, uid);
            self.headers.pop(&key);
            self.bodies.pop(&key);
        }
        if let Some(known) = self.flags.get_mut(folder) {
            known.retain(|uid, _| !uids.contains(uid));
        }
        if let Some(known) = self.uids.get_mut(folder) {
            known.retain(|uid| !uids.contains(uid));
        }
    }
}

/// Cache that stores nothing; every lookup misses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl MessageCache for NoCache {
    fn folders(&self) -> Option<BTreeSet<String>> {
        None
    }
    fn store_folders(&mut self, _folders: &BTreeSet<String>) {}
    fn uids(&self, _folder: &str) -> Option<BTreeSet<Uid>> {
        None
    }
    fn store_uids(&mut self, _folder: &str, _uids: &BTreeSet<Uid>) {}
    fn flags(&self, _folder: &str, _uids: &BTreeSet<Uid>) -> BTreeMap<Uid, MessageFlags> {
        BTreeMap::new()
    }
    fn store_flags(&mut self, _folder: &str, _flags: &BTreeMap<Uid, MessageFlags>) {}
    fn update_flags(&mut self, _: &str, _: &BTreeSet<Uid>, _: MessageFlags, _: bool) {}
    fn header(&mut self, _folder: &str, _uid: Uid) -> Option<Vec<u8>> {
        None
    }
    fn store_header(&mut self, _folder: &str, _uid: Uid, _raw: &[u8]) {}
    fn body(&mut self, _folder: &str, _uid: Uid) -> Option<Vec<u8>> {
        None
    }
    fn store_body(&mut self, _folder: &str, _uid: Uid, _raw: &[u8]) {}
    fn evict(&mut self, _folder: &str, _uids: &BTreeSet<Uid>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_comes_from_config() {
        let mut config = Config::default();
        config.performance.cache_size = 1;
        let mut cache = MemoryCache::from_config(&config);
        cache.store_header("INBOX", 1, b"one");
        cache.store_header("INBOX", 2, b"two");
        assert!(cache.header("INBOX", 1).is_none());
        assert_eq!(cache.header("INBOX", 2).as_deref(), Some(&b"two"[..]));
    }

    #[test]
    fn test_bodies_are_bounded() {
        let mut cache = MemoryCache::new(2);
        cache.store_body("INBOX", 1, b"one");
        cache.store_body("INBOX", 2, b"two");
        assert!(cache.body("INBOX", 1).is_some());
        cache.store_body("INBOX", 3, b"three");
        // 2 was least recently used
        assert!(cache.body("INBOX", 2).is_none());
        assert_eq!(cache.body("INBOX", 1).as_deref(), Some(&b"one"[..]));
    }

    #[test]
    fn test_zero_capacity_still_holds_one() {
        let mut cache = MemoryCache::new(0);
        cache.store_header("INBOX", 1, b"h");
        assert!(cache.header("INBOX", 1).is_some());
    }

    #[test]
    fn test_update_flags_only_touches_known_entries() {
        let mut cache = MemoryCache::new(8);
        cache.store_flags("INBOX", &BTreeMap::from([(1, MessageFlags::empty())]));
        cache.update_flags("INBOX", &BTreeSet::from([1, 2]), MessageFlags::SEEN, true);
        let flags = cache.flags("INBOX", &BTreeSet::from([1, 2]));
        assert_eq!(flags, BTreeMap::from([(1, MessageFlags::SEEN)]));
    }

    #[test]
    fn test_evict_forgets_messages() {
        let mut cache = MemoryCache::new(8);
        cache.store_uids("INBOX", &BTreeSet::from([1, 2]));
        cache.store_header("INBOX", 1, b"h");
        cache.store_body("INBOX", 1, b"b");
        cache.store_flags("INBOX", &BTreeMap::from([(1, MessageFlags::SEEN)]));
        cache.evict("INBOX", &BTreeSet::from([1]));
        assert!(cache.header("INBOX", 1).is_none());
        assert!(cache.body("INBOX", 1).is_none());
        assert!(cache.flags("INBOX", &BTreeSet::from([1])).is_empty());
        assert_eq!(cache.uids("INBOX"), Some(BTreeSet::from([2])));
    }

    #[test]
    fn test_folders_are_per_account() {
        let mut cache = MemoryCache::new(8);
        assert!(cache.folders().is_none());
        cache.store_folders(&BTreeSet::from(["INBOX".to_string()]));
        assert_eq!(cache.folders().map(|f| f.len()), Some(1));
        assert!(NoCache.folders().is_none());
    }
}
