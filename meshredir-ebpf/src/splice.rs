use aya_ebpf::bindings::BPF_F_INGRESS;
use aya_ebpf::programs::SkMsgContext;

use meshredir_common::addr;
use meshredir_common::splice::peer_key;
use meshredir_common::Pair;

use crate::maps::SOCK_PAIRS;
use crate::sockops::{AF_INET, AF_INET6};

/// Hands the message to the peer registered under the reversed tuple. A
/// miss leaves it on the normal stack path.
#[inline(always)]
pub fn try_splice(ctx: &SkMsgContext) {
    let msg = ctx.msg;
    let (family, local_port, remote_port) =
        unsafe { ((*msg).family, (*msg).local_port, (*msg).remote_port) };

    let (local, remote) = match family {
        AF_INET => unsafe {
            (
                addr::from_ipv4_raw((*msg).local_ip4),
                addr::from_ipv4_raw((*msg).remote_ip4),
            )
        },
        AF_INET6 => unsafe { ((*msg).local_ip6, (*msg).remote_ip6) },
        _ => return,
    };

    let pair = Pair::new(
        local,
        local_port as u16,
        remote,
        u32::from_be(remote_port) as u16,
    );
    let mut key = peer_key(&pair);
    let _ = SOCK_PAIRS.redirect_msg(ctx, &mut key, BPF_F_INGRESS as u64);
}
