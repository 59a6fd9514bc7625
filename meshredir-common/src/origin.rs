use crate::addr::{self, IpKey};

/// Record produced by the traffic-control origin tagger.
pub const TC_ORIGIN_FLAG: u16 = 0b1000;

/// Record produced by an inbound (sidecar to local pod) redirect.
pub const INBOUND_FLAG: u16 = 0b0001;

/// The pre-redirect destination of a connection.
///
/// Shared by the Origin Store (cookie keyed) and the NAT Table (4-tuple
/// keyed). `port` is in host byte order.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OriginInfo {
    pub ip: IpKey,
    pub port: u16,
    pub flags: u16,
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for OriginInfo {}

/// Which hook layer produced an [`OriginInfo`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provenance {
    Connect,
    TrafficControl,
}

impl OriginInfo {
    #[inline(always)]
    pub const fn new(ip: IpKey, port: u16, flags: u16) -> Self {
        Self { ip, port, flags }
    }

    #[inline(always)]
    pub const fn outbound(ip: IpKey, port: u16) -> Self {
        Self::new(ip, port, 0)
    }

    #[inline(always)]
    pub const fn inbound(ip: IpKey, port: u16) -> Self {
        Self::new(ip, port, INBOUND_FLAG)
    }

    /// A record learned from a packet rather than from `connect`.
    #[inline(always)]
    pub fn traffic_control(raw_ipv4: u32, port: u16) -> Self {
        Self::new(addr::from_ipv4_raw(raw_ipv4), port, TC_ORIGIN_FLAG)
    }

    #[inline(always)]
    pub fn provenance(&self) -> Provenance {
        if self.flags & TC_ORIGIN_FLAG != 0 {
            Provenance::TrafficControl
        } else {
            Provenance::Connect
        }
    }

    #[inline(always)]
    pub fn is_inbound(&self) -> bool {
        self.flags & INBOUND_FLAG != 0
    }
}
