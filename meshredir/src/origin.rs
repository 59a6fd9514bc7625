use std::net::SocketAddr;
use std::path::Path;

use anyhow::Context;
use aya::maps::{HashMap, Map, MapData, MapError};
use aya::Pod;
use log::warn;

use meshredir_common::addr;
use meshredir_common::{
    MarkTuple, OriginInfo, OriginQuery, Pair, Recovered, Recovery, TableRead, MARK_TUPLES,
    NAT_TABLE, ORIGIN_STORE,
};

/// A pinned kernel map seen through the read side of the table traits.
pub struct PinnedTable<K, V>(HashMap<MapData, K, V>);

impl<K: Pod, V: Pod> PinnedTable<K, V> {
    /// Opens an LRU hash map pinned under `pin_dir`.
    fn open(pin_dir: &Path, name: &str) -> anyhow::Result<Self> {
        let path = pin_dir.join(name);
        let data = MapData::from_pin(&path)
            .with_context(|| format!("opening pinned map {}", path.display()))?;
        Ok(Self(HashMap::try_from(Map::LruHashMap(data))?))
    }
}

impl<K: Pod, V: Pod> TableRead<K, V> for PinnedTable<K, V> {
    fn get(&self, key: &K) -> Option<V> {
        match self.0.get(key, 0) {
            Ok(value) => Some(value),
            Err(MapError::KeyNotFound) => None,
            Err(err) => {
                warn!("map lookup failed: {err}");
                None
            }
        }
    }
}

/// Origin Recovery from user space, over the maps a running loader pinned.
pub struct OriginLookup {
    origins: PinnedTable<u64, OriginInfo>,
    nat: PinnedTable<Pair, OriginInfo>,
    marks: PinnedTable<u32, MarkTuple>,
}

impl OriginLookup {
    pub fn open(pin_dir: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            origins: PinnedTable::open(pin_dir, ORIGIN_STORE)?,
            nat: PinnedTable::open(pin_dir, NAT_TABLE)?,
            marks: PinnedTable::open(pin_dir, MARK_TUPLES)?,
        })
    }

    /// Best-effort: see [`Recovery`].
    pub fn recover(&self, query: &OriginQuery) -> Option<Recovered> {
        Recovery {
            origins: &self.origins,
            nat: &self.nat,
            marks: &self.marks,
        }
        .recover(query)
    }
}

/// NAT Table key of the redirected connection `src -> dst`, both as seen by
/// the application after the rewrite.
pub fn tuple_key(src: SocketAddr, dst: SocketAddr) -> Pair {
    Pair::new(
        addr::from_ip(src.ip()),
        src.port(),
        addr::from_ip(dst.ip()),
        dst.port(),
    )
}

pub fn origin_addr(origin: &OriginInfo) -> SocketAddr {
    SocketAddr::new(addr::to_ip(&origin.ip), origin.port)
}
