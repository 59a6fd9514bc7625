use crate::addr::IpKey;
use crate::{DEFAULT_INBOUND_PORT, DEFAULT_OUTBOUND_PORT};

pub const MAX_PORT_ITEMS: usize = 8;
pub const MAX_CIDR_ITEMS: usize = 8;

/// Redirect to the loopback address instead of the pod address.
pub const POD_FLAG_LOOPBACK_REDIRECT: u16 = 0b0001;

/// Traffic from sidecars to this pod is short-cut into its inbound port.
pub const POD_FLAG_INBOUND: u16 = 0b0010;

/// An address prefix over the 128-bit [`IpKey`] space. IPv4 prefixes are
/// stored mapped, so `10.0.0.0/8` has `prefix == 104`. `prefix == 0` marks an
/// unused slot.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cidr {
    pub net: IpKey,
    pub prefix: u8,
    pub _pad: [u8; 3],
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for Cidr {}

impl Cidr {
    pub const EMPTY: Cidr = Cidr {
        net: [0; 4],
        prefix: 0,
        _pad: [0; 3],
    };

    pub const fn new(net: IpKey, prefix: u8) -> Self {
        Self {
            net,
            prefix,
            _pad: [0; 3],
        }
    }

    #[inline(always)]
    pub fn is_set(&self) -> bool {
        self.prefix != 0
    }

    #[inline(always)]
    pub fn contains(&self, addr: &IpKey) -> bool {
        if !self.is_set() {
            return false;
        }
        let mut i = 0;
        while i < 4 {
            let covered = (self.prefix as i32 - (i as i32) * 32).clamp(0, 32) as u32;
            if covered == 0 {
                break;
            }
            let mask = if covered == 32 {
                u32::MAX
            } else {
                !(u32::MAX >> covered)
            };
            if u32::from_be(addr[i]) & mask != u32::from_be(self.net[i]) & mask {
                return false;
            }
            i += 1;
        }
        true
    }
}

/// Mesh configuration of one pod, written by the control plane into the Pod
/// Registry and only read by hook programs. Zero entries in the port and
/// range lists are unused slots.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PodConfig {
    pub outbound_port: u16,
    pub inbound_port: u16,
    pub status_port: u16,
    pub flags: u16,
    pub exclude_out_ports: [u16; MAX_PORT_ITEMS],
    pub exclude_in_ports: [u16; MAX_PORT_ITEMS],
    pub exclude_out_ranges: [Cidr; MAX_CIDR_ITEMS],
    pub include_out_ranges: [Cidr; MAX_CIDR_ITEMS],
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for PodConfig {}

impl Default for PodConfig {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOUND_PORT, DEFAULT_INBOUND_PORT)
    }
}

#[inline(always)]
fn port_listed(ports: &[u16; MAX_PORT_ITEMS], port: u16) -> bool {
    let mut i = 0;
    while i < MAX_PORT_ITEMS {
        if ports[i] != 0 && ports[i] == port {
            return true;
        }
        i += 1;
    }
    false
}

impl PodConfig {
    pub const fn new(outbound_port: u16, inbound_port: u16) -> Self {
        Self {
            outbound_port,
            inbound_port,
            status_port: 0,
            flags: 0,
            exclude_out_ports: [0; MAX_PORT_ITEMS],
            exclude_in_ports: [0; MAX_PORT_ITEMS],
            exclude_out_ranges: [Cidr::EMPTY; MAX_CIDR_ITEMS],
            include_out_ranges: [Cidr::EMPTY; MAX_CIDR_ITEMS],
        }
    }

    #[inline(always)]
    pub fn has_flag(&self, flag: u16) -> bool {
        self.flags & flag != 0
    }

    /// Ports the sidecar itself listens on.
    #[inline(always)]
    pub fn is_sidecar_port(&self, port: u16) -> bool {
        port == self.outbound_port
            || port == self.inbound_port
            || (self.status_port != 0 && port == self.status_port)
    }

    /// Whether an outbound connection to `dst:port` must bypass the sidecar.
    #[inline(always)]
    pub fn excludes_outbound(&self, dst: &IpKey, port: u16) -> bool {
        if port_listed(&self.exclude_out_ports, port) {
            return true;
        }

        let mut include_set = false;
        let mut included = false;
        let mut i = 0;
        while i < MAX_CIDR_ITEMS {
            if self.exclude_out_ranges[i].contains(dst) {
                return true;
            }
            let include = &self.include_out_ranges[i];
            if include.is_set() {
                include_set = true;
                included |= include.contains(dst);
            }
            i += 1;
        }

        include_set && !included
    }

    #[inline(always)]
    pub fn excludes_inbound(&self, port: u16) -> bool {
        port_listed(&self.exclude_in_ports, port)
    }
}
