//! In-memory rendition of the kernel tables, with the same capacity and
//! eviction contracts. Used to run the hook protocol outside the kernel.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

use log::trace;

use crate::addr::IpKey;
use crate::classify::{AddressResolver, Classifier};
use crate::connect::Interceptor;
use crate::origin::OriginInfo;
use crate::pair::{MarkTuple, Pair};
use crate::pod::PodConfig;
use crate::recovery::Recovery;
use crate::splice::{peer_key, Pairing};
use crate::table::{SocketTable, Table, TableError, TableRead};
use crate::tagger::Tagger;
use crate::{
    MARK_TUPLES_CAPACITY, NAT_TABLE_CAPACITY, ORIGIN_STORE_CAPACITY, POD_REGISTRY_CAPACITY,
    PROCESS_ADDRS_CAPACITY, SOCK_PAIRS_CAPACITY,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct LruInner<K, V> {
    entries: HashMap<K, (V, u64)>,
    recency: BTreeMap<u64, K>,
    tick: u64,
}

impl<K: Copy + Eq + Hash, V> LruInner<K, V> {
    fn touch(&mut self, key: &K) {
        self.tick += 1;
        let tick = self.tick;
        if let Some((_, stamp)) = self.entries.get_mut(key) {
            self.recency.remove(stamp);
            *stamp = tick;
            self.recency.insert(tick, *key);
        }
    }

    fn evict_oldest(&mut self) {
        if let Some((_, key)) = self.recency.pop_first() {
            self.entries.remove(&key);
        }
    }
}

/// Bounded table evicting the least recently used entry when full. Inserts
/// never fail.
pub struct LruTable<K, V> {
    capacity: usize,
    inner: Mutex<LruInner<K, V>>,
}

impl<K: Copy + Eq + Hash, V: Copy> LruTable<K, V> {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity: capacity as usize,
            inner: Mutex::new(LruInner {
                entries: HashMap::new(),
                recency: BTreeMap::new(),
                tick: 0,
            }),
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn put(&self, key: &K, value: &V, only_new: bool) -> Result<(), TableError> {
        let mut inner = lock(&self.inner);
        if inner.entries.contains_key(key) {
            if only_new {
                return Err(TableError::Exists);
            }
            if let Some(entry) = inner.entries.get_mut(key) {
                entry.0 = *value;
            }
            inner.touch(key);
            return Ok(());
        }
        if inner.entries.len() >= self.capacity {
            trace!("lru table full ({}), evicting oldest entry", self.capacity);
            inner.evict_oldest();
        }
        inner.tick += 1;
        let tick = inner.tick;
        inner.entries.insert(*key, (*value, tick));
        inner.recency.insert(tick, *key);
        Ok(())
    }
}

impl<K: Copy + Eq + Hash, V: Copy> TableRead<K, V> for LruTable<K, V> {
    fn get(&self, key: &K) -> Option<V> {
        let mut inner = lock(&self.inner);
        let value = inner.entries.get(key).map(|(value, _)| *value)?;
        inner.touch(key);
        Some(value)
    }
}

impl<K: Copy + Eq + Hash, V: Copy> Table<K, V> for LruTable<K, V> {
    fn insert(&self, key: &K, value: &V) -> Result<(), TableError> {
        self.put(key, value, false)
    }

    fn insert_new(&self, key: &K, value: &V) -> Result<(), TableError> {
        self.put(key, value, true)
    }

    fn remove(&self, key: &K) -> Result<(), TableError> {
        let mut inner = lock(&self.inner);
        let (_, stamp) = inner.entries.remove(key).ok_or(TableError::NotFound)?;
        inner.recency.remove(&stamp);
        Ok(())
    }
}

/// Bounded table without eviction: inserting a new key into a full table
/// fails with [`TableError::Full`].
pub struct HashTable<K, V> {
    capacity: usize,
    entries: Mutex<HashMap<K, V>>,
}

impl<K: Copy + Eq + Hash, V: Copy> HashTable<K, V> {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity: capacity as usize,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Copy + Eq + Hash, V: Copy> TableRead<K, V> for HashTable<K, V> {
    fn get(&self, key: &K) -> Option<V> {
        lock(&self.entries).get(key).copied()
    }
}

impl<K: Copy + Eq + Hash, V: Copy> Table<K, V> for HashTable<K, V> {
    fn insert(&self, key: &K, value: &V) -> Result<(), TableError> {
        let mut entries = lock(&self.entries);
        if !entries.contains_key(key) && entries.len() >= self.capacity {
            return Err(TableError::Full);
        }
        entries.insert(*key, *value);
        Ok(())
    }

    fn insert_new(&self, key: &K, value: &V) -> Result<(), TableError> {
        let mut entries = lock(&self.entries);
        if entries.contains_key(key) {
            return Err(TableError::Exists);
        }
        if entries.len() >= self.capacity {
            return Err(TableError::Full);
        }
        entries.insert(*key, *value);
        Ok(())
    }

    fn remove(&self, key: &K) -> Result<(), TableError> {
        lock(&self.entries)
            .remove(key)
            .map(|_| ())
            .ok_or(TableError::NotFound)
    }
}

/// Stand-in for a kernel socket: only its identity matters here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostSocket {
    pub cookie: u64,
}

/// Socket Redirect Table: bounded, non-LRU, values are socket identities.
pub struct HostSockets {
    table: HashTable<Pair, u64>,
}

impl HostSockets {
    pub fn new(capacity: u32) -> Self {
        Self {
            table: HashTable::new(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn socket(&self, key: &Pair) -> Option<u64> {
        self.table.get(key)
    }

    /// Where a sendmsg on the socket with live tuple `local` is spliced to,
    /// or `None` for the normal stack path.
    pub fn splice_target(&self, local: &Pair) -> Option<u64> {
        self.table.get(&peer_key(local))
    }
}

impl SocketTable<Pair> for HostSockets {
    type Socket = HostSocket;

    fn register(&self, key: &Pair, socket: &mut HostSocket) -> Result<(), TableError> {
        self.table.insert(key, &socket.cookie)
    }

    fn unregister(&self, key: &Pair) -> Result<(), TableError> {
        self.table.remove(key)
    }
}

/// All six tables at their kernel capacities.
pub struct HostMaps {
    pub origins: LruTable<u64, OriginInfo>,
    pub pods: HashTable<IpKey, PodConfig>,
    pub processes: LruTable<u32, u32>,
    pub nat: LruTable<Pair, OriginInfo>,
    pub sockets: HostSockets,
    pub marks: LruTable<u32, MarkTuple>,
}

impl Default for HostMaps {
    fn default() -> Self {
        Self::new()
    }
}

impl HostMaps {
    pub fn new() -> Self {
        Self {
            origins: LruTable::new(ORIGIN_STORE_CAPACITY),
            pods: HashTable::new(POD_REGISTRY_CAPACITY),
            processes: LruTable::new(PROCESS_ADDRS_CAPACITY),
            nat: LruTable::new(NAT_TABLE_CAPACITY),
            sockets: HostSockets::new(SOCK_PAIRS_CAPACITY),
            marks: LruTable::new(MARK_TUPLES_CAPACITY),
        }
    }

    pub fn classifier<'a, R: AddressResolver>(
        &'a self,
        resolver: &'a R,
    ) -> Classifier<'a, HashTable<IpKey, PodConfig>, LruTable<u32, u32>, R> {
        Classifier {
            pods: &self.pods,
            processes: &self.processes,
            resolver,
        }
    }

    #[allow(clippy::type_complexity)]
    pub fn interceptor<'a, R: AddressResolver>(
        &'a self,
        resolver: &'a R,
    ) -> Interceptor<
        'a,
        HashTable<IpKey, PodConfig>,
        LruTable<u32, u32>,
        R,
        LruTable<u64, OriginInfo>,
        LruTable<Pair, OriginInfo>,
    > {
        Interceptor {
            classifier: self.classifier(resolver),
            origins: &self.origins,
            nat: &self.nat,
        }
    }

    #[allow(clippy::type_complexity)]
    pub fn pairing<'a, R: AddressResolver>(
        &'a self,
        resolver: &'a R,
    ) -> Pairing<
        'a,
        HashTable<IpKey, PodConfig>,
        LruTable<u32, u32>,
        R,
        LruTable<u64, OriginInfo>,
        LruTable<Pair, OriginInfo>,
        HostSockets,
    > {
        Pairing {
            classifier: self.classifier(resolver),
            origins: &self.origins,
            nat: &self.nat,
            sockets: &self.sockets,
        }
    }

    pub fn recovery(
        &self,
    ) -> Recovery<'_, LruTable<u64, OriginInfo>, LruTable<Pair, OriginInfo>, LruTable<u32, MarkTuple>>
    {
        Recovery {
            origins: &self.origins,
            nat: &self.nat,
            marks: &self.marks,
        }
    }

    pub fn tagger(
        &self,
    ) -> Tagger<'_, HashTable<IpKey, PodConfig>, LruTable<Pair, OriginInfo>, LruTable<u32, MarkTuple>>
    {
        Tagger {
            pods: &self.pods,
            nat: &self.nat,
            marks: &self.marks,
        }
    }
}
