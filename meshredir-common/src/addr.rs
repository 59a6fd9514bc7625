use core::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// An address as four 32-bit words holding the address bytes in network
/// order, the way the kernel exposes `user_ip6`. IPv4 addresses are stored
/// IPv4-mapped (`::ffff:a.b.c.d`).
pub type IpKey = [u32; 4];

pub const UNSPECIFIED: IpKey = [0; 4];

const V4_MAPPED_PREFIX: u32 = u32::from_ne_bytes([0, 0, 0xff, 0xff]);

pub const LOOPBACK_V4: IpKey = [0, 0, V4_MAPPED_PREFIX, u32::from_ne_bytes([127, 0, 0, 1])];

pub const LOOPBACK_V6: IpKey = [0, 0, 0, u32::from_ne_bytes([0, 0, 0, 1])];

/// Wraps a raw IPv4 word (network order, as in `user_ip4`).
#[inline(always)]
pub fn from_ipv4_raw(raw: u32) -> IpKey {
    [0, 0, V4_MAPPED_PREFIX, raw]
}

#[inline(always)]
pub fn is_ipv4_mapped(key: &IpKey) -> bool {
    key[0] == 0 && key[1] == 0 && key[2] == V4_MAPPED_PREFIX
}

/// Returns the raw IPv4 word if `key` is IPv4-mapped.
#[inline(always)]
pub fn ipv4_raw(key: &IpKey) -> Option<u32> {
    if is_ipv4_mapped(key) {
        Some(key[3])
    } else {
        None
    }
}

#[inline(always)]
pub fn is_loopback(key: &IpKey) -> bool {
    match ipv4_raw(key) {
        Some(raw) => raw.to_ne_bytes()[0] == 127,
        None => *key == LOOPBACK_V6,
    }
}

/// Loopback address of the same family as `key`.
#[inline(always)]
pub fn loopback_like(key: &IpKey) -> IpKey {
    if is_ipv4_mapped(key) {
        LOOPBACK_V4
    } else {
        LOOPBACK_V6
    }
}

pub fn from_ip(addr: IpAddr) -> IpKey {
    match addr {
        IpAddr::V4(v4) => from_ipv4_raw(u32::from_ne_bytes(v4.octets())),
        IpAddr::V6(v6) => from_octets(v6.octets()),
    }
}

pub fn to_ip(key: &IpKey) -> IpAddr {
    match ipv4_raw(key) {
        Some(raw) => IpAddr::V4(Ipv4Addr::from(raw.to_ne_bytes())),
        None => IpAddr::V6(Ipv6Addr::from(to_octets(key))),
    }
}

pub fn from_octets(octets: [u8; 16]) -> IpKey {
    let mut key = UNSPECIFIED;
    for (word, chunk) in key.iter_mut().zip(octets.chunks_exact(4)) {
        *word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    key
}

pub fn to_octets(key: &IpKey) -> [u8; 16] {
    let mut octets = [0u8; 16];
    for (chunk, word) in octets.chunks_exact_mut(4).zip(key.iter()) {
        chunk.copy_from_slice(&word.to_ne_bytes());
    }
    octets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_is_stored_mapped() {
        let key = from_ip(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)));
        assert!(is_ipv4_mapped(&key));
        assert_eq!(ipv4_raw(&key), Some(u32::from_ne_bytes([10, 0, 0, 5])));
        assert_eq!(
            to_ip(&key),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)),
        );
        assert_eq!(
            Ipv6Addr::from(to_octets(&key)),
            Ipv4Addr::new(10, 0, 0, 5).to_ipv6_mapped()
        );
    }

    #[test]
    fn ipv6_keeps_its_words() {
        let v6: Ipv6Addr = "fd00::1:2".parse().unwrap();
        let key = from_ip(IpAddr::V6(v6));
        assert!(!is_ipv4_mapped(&key));
        assert_eq!(to_ip(&key), IpAddr::V6(v6));
    }

    #[test]
    fn loopback() {
        assert!(is_loopback(&LOOPBACK_V4));
        assert!(is_loopback(&LOOPBACK_V6));
        assert!(is_loopback(&from_ip("127.1.2.3".parse().unwrap())));
        assert!(!is_loopback(&from_ip("93.184.216.34".parse().unwrap())));
        assert_eq!(loopback_like(&from_ip("10.0.0.1".parse().unwrap())), LOOPBACK_V4);
        assert_eq!(loopback_like(&from_ip("fd00::1".parse().unwrap())), LOOPBACK_V6);
    }
}
