#![no_std]
#![no_main]

use aya_ebpf::bindings::sk_action::SK_PASS;
use aya_ebpf::macros::{cgroup_sock_addr, cgroup_sockopt, classifier, sk_msg, sock_ops};
use aya_ebpf::programs::{SkMsgContext, SockAddrContext, SockOpsContext, SockoptContext, TcContext};

mod connect;
mod getsockopt;
mod maps;
mod sockops;
mod splice;
mod tc;

#[cgroup_sock_addr(connect4)]
pub fn mesh_connect4(ctx: SockAddrContext) -> i32 {
    connect::try_connect4(&ctx).unwrap_or_else(|ret| ret)
}

#[cgroup_sock_addr(connect6)]
pub fn mesh_connect6(ctx: SockAddrContext) -> i32 {
    connect::try_connect6(&ctx).unwrap_or_else(|ret| ret)
}

#[sock_ops]
pub fn mesh_sockops(ctx: SockOpsContext) -> u32 {
    sockops::try_sockops(&ctx).unwrap_or_else(|ret| ret)
}

#[sk_msg]
pub fn mesh_splice(ctx: SkMsgContext) -> u32 {
    splice::try_splice(&ctx);
    SK_PASS
}

#[cgroup_sockopt(getsockopt)]
pub fn mesh_getsockopt(ctx: SockoptContext) -> i32 {
    getsockopt::try_getsockopt(&ctx).unwrap_or_else(|ret| ret)
}

#[classifier]
pub fn mesh_tag(ctx: TcContext) -> i32 {
    tc::try_tag(&ctx).unwrap_or_else(|ret| ret)
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}

#[link_section = "license"]
#[no_mangle]
static LICENSE: [u8; 13] = *b"Dual MIT/GPL\0";
