use aya_ebpf::helpers::{bpf_get_current_pid_tgid, bpf_get_current_uid_gid, bpf_get_socket_cookie};
use aya_ebpf::programs::SockAddrContext;
use aya_ebpf::EbpfContext;
use aya_log_ebpf::debug;

use meshredir_common::addr;
use meshredir_common::{
    AddressResolver, Classifier, ConnectRequest, ConnectVerdict, Interceptor, IpKey,
};

use crate::maps;

const ALLOW: i32 = 1;

/// Slow path for a process the classifier has not seen yet: the socket's
/// own source address, when it is already bound.
struct BoundSource(u32);

impl AddressResolver for BoundSource {
    #[inline(always)]
    fn resolve(&self, _pid: u32) -> Option<u32> {
        (self.0 != 0).then_some(self.0)
    }
}

#[inline(always)]
fn bound_source(ctx: &SockAddrContext) -> (u32, u16) {
    let sk = unsafe { (*ctx.sock_addr).__bindgen_anon_1.sk };
    if sk.is_null() {
        return (0, 0);
    }
    unsafe { ((*sk).src_ip4, (*sk).src_port as u16) }
}

#[inline(always)]
fn intercept(ctx: &SockAddrContext, dst: IpKey, dst_port: u16) -> ConnectVerdict {
    let (src_ip4, src_port) = bound_source(ctx);
    let req = ConnectRequest {
        cookie: unsafe { bpf_get_socket_cookie(ctx.as_ptr()) },
        pid: (unsafe { bpf_get_current_pid_tgid() } >> 32) as u32,
        uid: unsafe { bpf_get_current_uid_gid() } as u32,
        dst,
        dst_port,
        src_port,
    };

    let pods = maps::pods();
    let processes = maps::processes();
    let origins = maps::origins();
    let nat = maps::nat();
    let resolver = BoundSource(src_ip4);
    let interceptor = Interceptor {
        classifier: Classifier {
            pods: &pods,
            processes: &processes,
            resolver: &resolver,
        },
        origins: &origins,
        nat: &nat,
    };

    let verdict = interceptor.on_connect(&req);
    if let ConnectVerdict::Redirect { port, .. } = verdict {
        debug!(
            ctx,
            "connect pid {} uid {} to port {} redirected to {}",
            req.pid,
            req.uid,
            dst_port,
            port
        );
    }
    verdict
}

#[inline(always)]
pub fn try_connect4(ctx: &SockAddrContext) -> Result<i32, i32> {
    let sock_addr = ctx.sock_addr;
    let (dst, user_port) = unsafe { ((*sock_addr).user_ip4, (*sock_addr).user_port) };

    match intercept(ctx, addr::from_ipv4_raw(dst), u16::from_be(user_port as u16)) {
        ConnectVerdict::PassThrough => Ok(ALLOW),
        ConnectVerdict::Redirect { addr: target, port } => {
            let raw = addr::ipv4_raw(&target).ok_or(ALLOW)?;
            unsafe {
                (*sock_addr).user_ip4 = raw;
                (*sock_addr).user_port = port.to_be() as u32;
            }
            Ok(ALLOW)
        }
    }
}

#[inline(always)]
pub fn try_connect6(ctx: &SockAddrContext) -> Result<i32, i32> {
    let sock_addr = ctx.sock_addr;
    let (dst, user_port) = unsafe { ((*sock_addr).user_ip6, (*sock_addr).user_port) };

    match intercept(ctx, dst, u16::from_be(user_port as u16)) {
        ConnectVerdict::PassThrough => Ok(ALLOW),
        ConnectVerdict::Redirect { addr: target, port } => {
            unsafe {
                (*sock_addr).user_ip6 = target;
                (*sock_addr).user_port = port.to_be() as u32;
            }
            Ok(ALLOW)
        }
    }
}
