use core::mem;

use aya_ebpf::programs::SockoptContext;
use aya_log_ebpf::debug;

use meshredir_common::addr;
use meshredir_common::{OriginQuery, Pair, Recovery, SOL_IP, SO_ORIGINAL_DST};

use crate::maps;
use crate::sockops::AF_INET;

const PROCEED: i32 = 1;

#[repr(C)]
#[derive(Clone, Copy)]
struct SockaddrIn {
    family: u16,
    port: u16,
    addr: u32,
    zero: [u8; 8],
}

/// Answers `SO_ORIGINAL_DST` on a socket the sidecar accepted, with the
/// destination its peer originally asked for.
#[inline(always)]
pub fn try_getsockopt(ctx: &SockoptContext) -> Result<i32, i32> {
    let sockopt = ctx.sockopt;
    let (level, optname) = unsafe { ((*sockopt).level, (*sockopt).optname) };
    if level != SOL_IP || optname != SO_ORIGINAL_DST {
        return Ok(PROCEED);
    }

    let sk = unsafe { (*sockopt).__bindgen_anon_1.sk };
    if sk.is_null() {
        return Ok(PROCEED);
    }
    let (family, src_ip4, src_port, dst_ip4, dst_port, mark) = unsafe {
        (
            (*sk).family,
            (*sk).src_ip4,
            (*sk).src_port,
            (*sk).dst_ip4,
            (*sk).dst_port,
            (*sk).mark,
        )
    };
    if family != AF_INET {
        return Ok(PROCEED);
    }

    let accepted = Pair::new(
        addr::from_ipv4_raw(src_ip4),
        src_port as u16,
        addr::from_ipv4_raw(dst_ip4),
        u16::from_be(dst_port as u16),
    );
    let query = OriginQuery {
        cookie: None,
        pair: Some(accepted.reversed()),
        mark: Some(mark),
    };

    let origins = maps::origins();
    let nat = maps::nat();
    let marks = maps::marks();
    let recovery = Recovery {
        origins: &origins,
        nat: &nat,
        marks: &marks,
    };
    let recovered = recovery.recover(&query).ok_or(PROCEED)?;
    let ip = addr::ipv4_raw(&recovered.origin.ip).ok_or(PROCEED)?;

    let optval = unsafe { (*sockopt).__bindgen_anon_2.optval } as *mut SockaddrIn;
    let optval_end = unsafe { (*sockopt).__bindgen_anon_3.optval_end } as usize;
    if optval as usize + mem::size_of::<SockaddrIn>() > optval_end {
        return Ok(PROCEED);
    }

    unsafe {
        *optval = SockaddrIn {
            family: AF_INET as u16,
            port: recovered.origin.port.to_be(),
            addr: ip,
            zero: [0; 8],
        };
        (*sockopt).optlen = mem::size_of::<SockaddrIn>() as i32;
        (*sockopt).retval = 0;
    }
    debug!(
        ctx,
        "original destination {:i}:{} for port {}",
        u32::from_be(ip),
        recovered.origin.port,
        accepted.sport
    );
    Ok(PROCEED)
}
