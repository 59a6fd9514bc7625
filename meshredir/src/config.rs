use std::net::IpAddr;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use meshredir_common::addr;
use meshredir_common::pod::{MAX_CIDR_ITEMS, MAX_PORT_ITEMS};
use meshredir_common::{
    Cidr, PodConfig, DEFAULT_INBOUND_PORT, DEFAULT_OUTBOUND_PORT, POD_FLAG_INBOUND,
    POD_FLAG_LOOPBACK_REDIRECT,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid pods file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("pod {pod}: invalid range {range:?}")]
    Range { pod: IpAddr, range: String },
    #[error("pod {pod}: at most {max} entries allowed in {field}")]
    TooMany {
        pod: IpAddr,
        field: &'static str,
        max: usize,
    },
    #[error("pod {pod}: port 0 in {field}")]
    ZeroPort { pod: IpAddr, field: &'static str },
}

/// Pods file: the Pod Registry contents the control plane would push.
#[derive(Debug, Deserialize)]
pub struct PodsFile {
    #[serde(default, rename = "pod")]
    pub pods: Vec<PodEntry>,
}

#[derive(Debug, Deserialize)]
pub struct PodEntry {
    pub address: IpAddr,
    #[serde(default = "default_outbound_port")]
    pub outbound_port: u16,
    #[serde(default = "default_inbound_port")]
    pub inbound_port: u16,
    #[serde(default)]
    pub status_port: u16,
    #[serde(default)]
    pub loopback_redirect: bool,
    #[serde(default)]
    pub inbound: bool,
    #[serde(default)]
    pub exclude_out_ports: Vec<u16>,
    #[serde(default)]
    pub exclude_in_ports: Vec<u16>,
    #[serde(default)]
    pub exclude_out_ranges: Vec<String>,
    #[serde(default)]
    pub include_out_ranges: Vec<String>,
}

fn default_outbound_port() -> u16 {
    DEFAULT_OUTBOUND_PORT
}

fn default_inbound_port() -> u16 {
    DEFAULT_INBOUND_PORT
}

impl PodsFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn entries(&self) -> Result<Vec<(IpAddr, PodConfig)>, ConfigError> {
        self.pods
            .iter()
            .map(|pod| Ok((pod.address, pod.to_config()?)))
            .collect()
    }
}

impl PodEntry {
    pub fn to_config(&self) -> Result<PodConfig, ConfigError> {
        let mut config = PodConfig::new(self.outbound_port, self.inbound_port);
        config.status_port = self.status_port;
        if self.loopback_redirect {
            config.flags |= POD_FLAG_LOOPBACK_REDIRECT;
        }
        if self.inbound {
            config.flags |= POD_FLAG_INBOUND;
        }

        self.fill_ports(&mut config.exclude_out_ports, &self.exclude_out_ports, "exclude_out_ports")?;
        self.fill_ports(&mut config.exclude_in_ports, &self.exclude_in_ports, "exclude_in_ports")?;
        self.fill_ranges(
            &mut config.exclude_out_ranges,
            &self.exclude_out_ranges,
            "exclude_out_ranges",
        )?;
        self.fill_ranges(
            &mut config.include_out_ranges,
            &self.include_out_ranges,
            "include_out_ranges",
        )?;
        Ok(config)
    }

    fn fill_ports(
        &self,
        slots: &mut [u16; MAX_PORT_ITEMS],
        ports: &[u16],
        field: &'static str,
    ) -> Result<(), ConfigError> {
        if ports.len() > MAX_PORT_ITEMS {
            return Err(ConfigError::TooMany {
                pod: self.address,
                field,
                max: MAX_PORT_ITEMS,
            });
        }
        if ports.contains(&0) {
            return Err(ConfigError::ZeroPort {
                pod: self.address,
                field,
            });
        }
        slots[..ports.len()].copy_from_slice(ports);
        Ok(())
    }

    fn fill_ranges(
        &self,
        slots: &mut [Cidr; MAX_CIDR_ITEMS],
        ranges: &[String],
        field: &'static str,
    ) -> Result<(), ConfigError> {
        if ranges.len() > MAX_CIDR_ITEMS {
            return Err(ConfigError::TooMany {
                pod: self.address,
                field,
                max: MAX_CIDR_ITEMS,
            });
        }
        for (slot, range) in slots.iter_mut().zip(ranges) {
            *slot = parse_cidr(range).ok_or_else(|| ConfigError::Range {
                pod: self.address,
                range: range.clone(),
            })?;
        }
        Ok(())
    }
}

/// Parses `a.b.c.d/n` or `x::/n`. IPv4 prefixes are widened to the mapped
/// address space; a bare address is a host route.
pub fn parse_cidr(range: &str) -> Option<Cidr> {
    let (ip, prefix) = match range.split_once('/') {
        Some((ip, prefix)) => (ip.parse::<IpAddr>().ok()?, Some(prefix.parse::<u8>().ok()?)),
        None => (range.parse::<IpAddr>().ok()?, None),
    };
    let prefix = match (ip, prefix) {
        (IpAddr::V4(_), Some(n)) if n <= 32 => 96 + n,
        (IpAddr::V4(_), None) => 128,
        (IpAddr::V6(_), Some(n)) if n <= 128 => n,
        (IpAddr::V6(_), None) => 128,
        _ => return None,
    };
    // A /0 is an empty slot on the kernel side.
    if prefix == 0 {
        return None;
    }
    Some(Cidr::new(addr::from_ip(ip), prefix))
}
