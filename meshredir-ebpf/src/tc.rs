use aya_ebpf::bindings::TC_ACT_PIPE;
use aya_ebpf::programs::TcContext;
use aya_log_ebpf::debug;

use core::mem;
use network_types::eth::{EthHdr, EtherType};
use network_types::ip::{IpProto, Ipv4Hdr};
use network_types::tcp::TcpHdr;

use meshredir_common::{SynPacket, TagOutcome, Tagger};

use crate::maps;

/// Egress classifier recording marked SYNs. Never alters or drops a packet.
#[inline(always)]
pub fn try_tag(ctx: &TcContext) -> Result<i32, i32> {
    let ethhdr = ptr_at::<EthHdr>(ctx, 0).ok_or(TC_ACT_PIPE)?;

    if unsafe { (*ethhdr).ether_type } != EtherType::Ipv4 {
        return Ok(TC_ACT_PIPE);
    }

    let ipv4hdr = ptr_at::<Ipv4Hdr>(ctx, EthHdr::LEN).ok_or(TC_ACT_PIPE)?;
    let ipv4hdr_stack = unsafe { *ipv4hdr };

    if ipv4hdr_stack.proto != IpProto::Tcp {
        return Ok(TC_ACT_PIPE);
    }

    let ip_len = SynPacket::tcp_offset(&ipv4hdr_stack).ok_or(TC_ACT_PIPE)?;
    let tcphdr = ptr_at::<TcpHdr>(ctx, EthHdr::LEN + ip_len).ok_or(TC_ACT_PIPE)?;
    let tcphdr_stack = unsafe { *tcphdr };

    let mark = unsafe { (*ctx.skb.skb).mark };
    let pkt = SynPacket::from_headers(mark, &ipv4hdr_stack, &tcphdr_stack).ok_or(TC_ACT_PIPE)?;

    let pods = maps::pods();
    let nat = maps::nat();
    let marks = maps::marks();
    let tagger = Tagger {
        pods: &pods,
        nat: &nat,
        marks: &marks,
    };

    if tagger.on_syn(&pkt) != TagOutcome::Skipped {
        debug!(
            ctx,
            "tagged SYN mark {} to {:i}:{}",
            pkt.mark,
            u32::from_be(pkt.daddr),
            pkt.dport
        );
    }

    Ok(TC_ACT_PIPE)
}

#[inline(always)]
fn ptr_at<T>(ctx: &TcContext, offset: usize) -> Option<*mut T> {
    let start = ctx.data();
    let end = ctx.data_end();
    let len = mem::size_of::<T>();

    if start + offset + len > end {
        return None;
    }

    Some((start + offset) as *mut T)
}
