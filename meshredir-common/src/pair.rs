use crate::addr::{self, IpKey};

/// A live TCP 4-tuple as seen from one socket: `s*` is the local end, `d*`
/// the remote end. Ports are in host byte order.
///
/// Keys both the NAT Table and the Socket Redirect Table.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Pair {
    pub sip: IpKey,
    pub dip: IpKey,
    pub sport: u16,
    pub dport: u16,
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for Pair {}

impl Pair {
    #[inline(always)]
    pub const fn new(sip: IpKey, sport: u16, dip: IpKey, dport: u16) -> Self {
        Self {
            sip,
            dip,
            sport,
            dport,
        }
    }

    /// The same connection seen from the other socket.
    #[inline(always)]
    pub const fn reversed(&self) -> Self {
        Self::new(self.dip, self.dport, self.sip, self.sport)
    }
}

/// Value of the Mark Correlation Table: an IPv4 4-tuple. Addresses are raw
/// network-order words, ports host order widened to 32 bits.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MarkTuple {
    pub saddr: u32,
    pub sport: u32,
    pub daddr: u32,
    pub dport: u32,
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for MarkTuple {}

impl MarkTuple {
    #[inline(always)]
    pub const fn new(saddr: u32, sport: u16, daddr: u32, dport: u16) -> Self {
        Self {
            saddr,
            sport: sport as u32,
            daddr,
            dport: dport as u32,
        }
    }

    #[inline(always)]
    pub fn pair(&self) -> Pair {
        Pair::new(
            addr::from_ipv4_raw(self.saddr),
            self.sport as u16,
            addr::from_ipv4_raw(self.daddr),
            self.dport as u16,
        )
    }
}
