use network_types::ip::Ipv4Hdr;
use network_types::tcp::TcpHdr;

use crate::addr::{self, IpKey};
use crate::origin::OriginInfo;
use crate::pair::{MarkTuple, Pair};
use crate::pod::PodConfig;
use crate::table::{Table, TableRead};

/// A marked TCP SYN observed on egress. Addresses are raw network-order
/// words, ports host order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SynPacket {
    pub mark: u32,
    pub saddr: u32,
    pub sport: u16,
    pub daddr: u32,
    pub dport: u16,
}

impl SynPacket {
    /// Offset of the TCP header from the start of the IPv4 header, honouring
    /// IP options. `None` for a header length below the 20-byte minimum.
    #[inline(always)]
    pub fn tcp_offset(ip: &Ipv4Hdr) -> Option<usize> {
        let len = ip.ihl() as usize * 4;
        if len < Ipv4Hdr::LEN {
            return None;
        }
        Some(len)
    }

    /// `None` unless the segment opens a connection (SYN without ACK).
    #[inline(always)]
    pub fn from_headers(mark: u32, ip: &Ipv4Hdr, tcp: &TcpHdr) -> Option<Self> {
        if tcp.syn() == 0 || tcp.ack() != 0 {
            return None;
        }
        Some(Self {
            mark,
            saddr: u32::from_ne_bytes(ip.src_addr().octets()),
            sport: u16::from_be(tcp.source),
            daddr: u32::from_ne_bytes(ip.dst_addr().octets()),
            dport: u16::from_be(tcp.dest),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagOutcome {
    Skipped,
    /// Mark recorded and a `TC_ORIGIN_FLAG` record added to the NAT Table.
    Tagged,
    /// Mark recorded; the NAT Table already held a record for the tuple.
    MarkOnly,
    /// The mark could not be recorded, the NAT record was.
    NatOnly,
}

/// Traffic-control origin tagger: the producer of the Mark Correlation Table
/// and of traffic-control provenance records.
pub struct Tagger<'a, P, N, M> {
    pub pods: &'a P,
    pub nat: &'a N,
    pub marks: &'a M,
}

impl<'a, P, N, M> Tagger<'a, P, N, M>
where
    P: TableRead<IpKey, PodConfig>,
    N: Table<Pair, OriginInfo>,
    M: Table<u32, MarkTuple>,
{
    #[inline(always)]
    pub fn on_syn(&self, pkt: &SynPacket) -> TagOutcome {
        if pkt.mark == 0 {
            return TagOutcome::Skipped;
        }
        let dst = addr::from_ipv4_raw(pkt.daddr);
        if let Some(config) = self.pods.get(&dst) {
            // Already redirected into a sidecar; the connect hook owns it.
            if config.is_sidecar_port(pkt.dport) {
                return TagOutcome::Skipped;
            }
        }

        let tuple = MarkTuple::new(pkt.saddr, pkt.sport, pkt.daddr, pkt.dport);
        let marked = self.marks.insert(&pkt.mark, &tuple).is_ok();

        let origin = OriginInfo::traffic_control(pkt.daddr, pkt.dport);
        let recorded = self.nat.insert_new(&tuple.pair(), &origin).is_ok();
        match (marked, recorded) {
            (true, true) => TagOutcome::Tagged,
            (true, false) => TagOutcome::MarkOnly,
            (false, true) => TagOutcome::NatOnly,
            (false, false) => TagOutcome::Skipped,
        }
    }
}
