use std::borrow::BorrowMut;
use std::net::IpAddr;
use std::path::Path;

use aya::maps::{HashMap, Map, MapData, MapError};
use log::{debug, info};
use thiserror::Error;

use meshredir_common::addr;
use meshredir_common::{IpKey, PodConfig, POD_REGISTRY};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to open pinned map {path}: {source}")]
    Open { path: String, source: MapError },
    #[error("pod {pod}: {source}")]
    Map { pod: IpAddr, source: MapError },
}

/// Control-plane side of the Pod Registry. Hooks only ever read it.
pub struct PodRegistry<T> {
    map: HashMap<T, IpKey, PodConfig>,
}

impl PodRegistry<MapData> {
    /// Opens the registry pinned under `pin_dir` by a running loader.
    pub fn open(pin_dir: &Path) -> Result<Self, RegistryError> {
        let path = pin_dir.join(POD_REGISTRY);
        let data = MapData::from_pin(&path).map_err(|source| RegistryError::Open {
            path: path.display().to_string(),
            source,
        })?;
        let map = HashMap::try_from(Map::HashMap(data)).map_err(|source| RegistryError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self { map })
    }
}

impl<T: BorrowMut<MapData>> PodRegistry<T> {
    /// Inserts or updates the mesh configuration of the pod at `pod`.
    pub fn upsert(&mut self, pod: IpAddr, config: &PodConfig) -> Result<(), RegistryError> {
        self.map
            .insert(addr::from_ip(pod), config, 0)
            .map_err(|source| RegistryError::Map { pod, source })?;
        debug!("pod {pod} registered, outbound port {}", config.outbound_port);
        Ok(())
    }

    /// Removes a pod. Removing an unknown pod is not an error.
    pub fn remove(&mut self, pod: IpAddr) -> Result<bool, RegistryError> {
        match self.map.remove(&addr::from_ip(pod)) {
            Ok(()) => Ok(true),
            Err(MapError::KeyNotFound) => Ok(false),
            Err(source) => Err(RegistryError::Map { pod, source }),
        }
    }

    pub fn get(&self, pod: IpAddr) -> Result<Option<PodConfig>, RegistryError> {
        match self.map.get(&addr::from_ip(pod), 0) {
            Ok(config) => Ok(Some(config)),
            Err(MapError::KeyNotFound) => Ok(None),
            Err(source) => Err(RegistryError::Map { pod, source }),
        }
    }

    pub fn apply(&mut self, entries: &[(IpAddr, PodConfig)]) -> Result<(), RegistryError> {
        for (pod, config) in entries {
            self.upsert(*pod, config)?;
        }
        info!("applied {} pod entries", entries.len());
        Ok(())
    }
}
