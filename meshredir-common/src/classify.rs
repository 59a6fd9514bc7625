use crate::addr::{self, IpKey};
use crate::pod::PodConfig;
use crate::table::{Table, TableRead};

/// Slow path for a Process Classifier Cache miss: derives the IPv4 address
/// (raw network-order word) a process connects from.
pub trait AddressResolver {
    fn resolve(&self, pid: u32) -> Option<u32>;
}

impl<F: Fn(u32) -> Option<u32>> AddressResolver for F {
    fn resolve(&self, pid: u32) -> Option<u32> {
        self(pid)
    }
}

/// A resolver that never knows.
pub struct NoResolver;

impl AddressResolver for NoResolver {
    fn resolve(&self, _pid: u32) -> Option<u32> {
        None
    }
}

/// Read-side pod and process classification gating every redirect.
pub struct Classifier<'a, P, C, R> {
    pub pods: &'a P,
    pub processes: &'a C,
    pub resolver: &'a R,
}

impl<'a, P, C, R> Classifier<'a, P, C, R>
where
    P: TableRead<IpKey, PodConfig>,
    C: Table<u32, u32>,
    R: AddressResolver,
{
    /// The address `pid` connects from: cached, or derived and then cached.
    #[inline(always)]
    pub fn process_address(&self, pid: u32) -> Option<IpKey> {
        let raw = match self.processes.get(&pid) {
            Some(raw) => raw,
            None => {
                let raw = self.resolver.resolve(pid)?;
                // A failed cache write only costs the next lookup.
                let _ = self.processes.insert(&pid, &raw);
                raw
            }
        };
        Some(addr::from_ipv4_raw(raw))
    }

    #[inline(always)]
    pub fn pod(&self, addr: &IpKey) -> Option<PodConfig> {
        self.pods.get(addr)
    }

    /// Caches the local address a process was seen connecting from.
    /// Loopback and non-IPv4 addresses are not cached.
    #[inline(always)]
    pub fn learn(&self, pid: u32, local: &IpKey) -> bool {
        if pid == 0 || addr::is_loopback(local) {
            return false;
        }
        match addr::ipv4_raw(local) {
            Some(raw) => self.processes.insert(&pid, &raw).is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::from_ip;
    use crate::host::{HashTable, LruTable};
    use core::cell::Cell;

    #[test]
    fn miss_derives_then_caches() {
        let pods = HashTable::new(16);
        let processes = LruTable::new(16);
        let calls = Cell::new(0);
        let resolver = |pid: u32| {
            calls.set(calls.get() + 1);
            (pid == 42).then(|| u32::from_ne_bytes([10, 0, 0, 5]))
        };
        let classifier = Classifier {
            pods: &pods,
            processes: &processes,
            resolver: &resolver,
        };

        let expected = from_ip("10.0.0.5".parse().unwrap());
        assert_eq!(classifier.process_address(42), Some(expected));
        assert_eq!(classifier.process_address(42), Some(expected));
        assert_eq!(calls.get(), 1);

        assert_eq!(classifier.process_address(7), None);
        assert_eq!(processes.get(&7), None);
    }

    #[test]
    fn learn_skips_loopback_and_v6() {
        let pods = HashTable::new(16);
        let processes = LruTable::new(16);
        let classifier = Classifier {
            pods: &pods,
            processes: &processes,
            resolver: &NoResolver,
        };

        assert!(!classifier.learn(9, &crate::addr::LOOPBACK_V4));
        assert!(!classifier.learn(9, &from_ip("fd00::5".parse().unwrap())));
        assert!(!classifier.learn(0, &from_ip("10.0.0.5".parse().unwrap())));
        assert!(classifier.learn(9, &from_ip("10.0.0.5".parse().unwrap())));
        assert_eq!(
            classifier.process_address(9),
            Some(from_ip("10.0.0.5".parse().unwrap()))
        );
    }

    #[test]
    fn pod_lookup_is_read_only() {
        let pods = HashTable::new(16);
        let addr = from_ip("10.0.0.5".parse().unwrap());
        pods.insert(&addr, &PodConfig::default()).unwrap();
        let processes = LruTable::new(16);
        let classifier = Classifier {
            pods: &pods,
            processes: &processes,
            resolver: &NoResolver,
        };

        assert_eq!(classifier.pod(&addr), Some(PodConfig::default()));
        assert_eq!(classifier.pod(&from_ip("10.0.0.6".parse().unwrap())), None);
    }
}
