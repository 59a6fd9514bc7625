use aya_ebpf::helpers::{bpf_get_current_pid_tgid, bpf_get_socket_cookie};
use aya_ebpf::programs::SockOpsContext;
use aya_ebpf::EbpfContext;
use aya_log_ebpf::{debug, info};

use meshredir_common::addr;
use meshredir_common::{Classifier, EstablishedSocket, NoResolver, Pair, Pairing, PairingOutcome};

use crate::maps;

const TCP_CONNECT_CB: u32 = 3;
const ACTIVE_ESTABLISHED_CB: u32 = 4;
const PASSIVE_ESTABLISHED_CB: u32 = 5;
const STATE_CB: u32 = 10;
const STATE_CB_FLAG: u32 = 1 << 2;
const TCP_CLOSE: u32 = 7;

pub const AF_INET: u32 = 2;
pub const AF_INET6: u32 = 10;

/// Live tuple of the socket, local end first.
#[inline(always)]
fn live_pair(ctx: &SockOpsContext) -> Option<Pair> {
    let (local, remote) = match ctx.family() {
        AF_INET => (
            addr::from_ipv4_raw(ctx.local_ip4()),
            addr::from_ipv4_raw(ctx.remote_ip4()),
        ),
        AF_INET6 => (ctx.local_ip6(), ctx.remote_ip6()),
        _ => return None,
    };
    Some(Pair::new(
        local,
        ctx.local_port() as u16,
        remote,
        u32::from_be(ctx.remote_port()) as u16,
    ))
}

#[inline(always)]
pub fn try_sockops(ctx: &SockOpsContext) -> Result<u32, u32> {
    let op = ctx.op();
    let pair = live_pair(ctx).ok_or(0u32)?;

    let pods = maps::pods();
    let processes = maps::processes();
    let origins = maps::origins();
    let nat = maps::nat();
    let sockets = maps::sockets();
    let pairing = Pairing {
        classifier: Classifier {
            pods: &pods,
            processes: &processes,
            resolver: &NoResolver,
        },
        origins: &origins,
        nat: &nat,
        sockets: &sockets,
    };

    let outcome = match op {
        TCP_CONNECT_CB => {
            let pid = (unsafe { bpf_get_current_pid_tgid() } >> 32) as u32;
            pairing.on_connect_started(pid, &pair.sip);
            return Ok(0);
        }
        ACTIVE_ESTABLISHED_CB => {
            let sock = EstablishedSocket {
                cookie: unsafe { bpf_get_socket_cookie(ctx.as_ptr()) },
                pair,
            };
            pairing.on_active_established(&sock, unsafe { &mut *ctx.ops })
        }
        PASSIVE_ESTABLISHED_CB => {
            let sock = EstablishedSocket { cookie: 0, pair };
            pairing.on_passive_established(&sock, unsafe { &mut *ctx.ops })
        }
        STATE_CB => {
            if ctx.arg(1) == TCP_CLOSE {
                pairing.on_close(&pair);
            }
            return Ok(0);
        }
        _ => return Ok(0),
    };

    match outcome {
        PairingOutcome::Ignored => {}
        PairingOutcome::Registered => {
            debug!(
                ctx,
                "paired socket {}:{}",
                pair.sport,
                pair.dport
            );
            ctx.set_cb_flags((ctx.cb_flags() | STATE_CB_FLAG) as i32)
                .map_err(|_| 0u32)?;
        }
        PairingOutcome::Fallback => {
            info!(ctx, "socket {} not paired, normal path", pair.sport);
        }
    }
    Ok(0)
}
