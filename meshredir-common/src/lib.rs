#![cfg_attr(not(any(test, feature = "user")), no_std)]

pub mod addr;
pub mod classify;
pub mod connect;
pub mod origin;
pub mod pair;
pub mod pod;
pub mod recovery;
pub mod splice;
pub mod table;
pub mod tagger;

#[cfg(any(test, feature = "user"))]
pub mod host;

#[cfg(test)]
mod tests;

pub use addr::IpKey;
pub use classify::{AddressResolver, Classifier, NoResolver};
pub use connect::{ConnectRequest, ConnectVerdict, Interceptor};
pub use origin::{OriginInfo, Provenance, INBOUND_FLAG, TC_ORIGIN_FLAG};
pub use pair::{MarkTuple, Pair};
pub use pod::{Cidr, PodConfig, POD_FLAG_INBOUND, POD_FLAG_LOOPBACK_REDIRECT};
pub use recovery::{OriginQuery, OriginSource, Recovered, Recovery};
pub use splice::{EstablishedSocket, Pairing, PairingOutcome};
pub use table::{SocketTable, Table, TableError, TableRead};
pub use tagger::{SynPacket, TagOutcome, Tagger};

pub const ORIGIN_STORE: &str = "ORIGIN_STORE";
pub const POD_REGISTRY: &str = "POD_REGISTRY";
pub const PROCESS_ADDRS: &str = "PROCESS_ADDRS";
pub const NAT_TABLE: &str = "NAT_TABLE";
pub const SOCK_PAIRS: &str = "SOCK_PAIRS";
pub const MARK_TUPLES: &str = "MARK_TUPLES";

pub const ORIGIN_STORE_CAPACITY: u32 = 65535;
pub const POD_REGISTRY_CAPACITY: u32 = 65535;
pub const PROCESS_ADDRS_CAPACITY: u32 = 1024;
pub const NAT_TABLE_CAPACITY: u32 = 65535;
pub const SOCK_PAIRS_CAPACITY: u32 = 65535;
pub const MARK_TUPLES_CAPACITY: u32 = 65535;

/// uid the sidecar proxy runs as. Its own connections are never sent back
/// into a sidecar.
pub const SIDECAR_UID: u32 = 1500;

pub const DEFAULT_OUTBOUND_PORT: u16 = 15001;
pub const DEFAULT_INBOUND_PORT: u16 = 15003;

pub const SOL_IP: i32 = 0;
pub const SO_ORIGINAL_DST: i32 = 80;
