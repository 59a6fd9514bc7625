use core::ffi::c_void;

use aya_ebpf::bindings::{bpf_sock_ops, BPF_ANY, BPF_NOEXIST};
use aya_ebpf::helpers::r#gen::bpf_map_delete_elem;
use aya_ebpf::macros::map;
use aya_ebpf::maps::{HashMap, LruHashMap, SockHash};

use meshredir_common::{
    IpKey, MarkTuple, OriginInfo, Pair, PodConfig, SocketTable, Table, TableError, TableRead,
    MARK_TUPLES_CAPACITY, NAT_TABLE_CAPACITY, ORIGIN_STORE_CAPACITY, POD_REGISTRY_CAPACITY,
    PROCESS_ADDRS_CAPACITY, SOCK_PAIRS_CAPACITY,
};

// All maps are pinned so the control plane and the recovery CLI can reach
// them without holding the loader's file descriptors.

#[map]
pub static ORIGIN_STORE: LruHashMap<u64, OriginInfo> =
    LruHashMap::pinned(ORIGIN_STORE_CAPACITY, 0);

#[map]
pub static POD_REGISTRY: HashMap<IpKey, PodConfig> = HashMap::pinned(POD_REGISTRY_CAPACITY, 0);

#[map]
pub static PROCESS_ADDRS: LruHashMap<u32, u32> = LruHashMap::pinned(PROCESS_ADDRS_CAPACITY, 0);

#[map]
pub static NAT_TABLE: LruHashMap<Pair, OriginInfo> = LruHashMap::pinned(NAT_TABLE_CAPACITY, 0);

#[map]
pub static SOCK_PAIRS: SockHash<Pair> = SockHash::pinned(SOCK_PAIRS_CAPACITY, 0);

#[map]
pub static MARK_TUPLES: LruHashMap<u32, MarkTuple> =
    LruHashMap::pinned(MARK_TUPLES_CAPACITY, 0);

/// A kernel map behind the table traits the hook protocol is written against.
pub struct KernelTable<M: 'static>(pub &'static M);

macro_rules! kernel_table {
    ($map:ident) => {
        impl<K, V: Copy> TableRead<K, V> for KernelTable<$map<K, V>> {
            #[inline(always)]
            fn get(&self, key: &K) -> Option<V> {
                unsafe { self.0.get(key) }.copied()
            }
        }

        impl<K, V: Copy> Table<K, V> for KernelTable<$map<K, V>> {
            #[inline(always)]
            fn insert(&self, key: &K, value: &V) -> Result<(), TableError> {
                self.0
                    .insert(key, value, BPF_ANY as u64)
                    .map_err(|ret| TableError::from_errno(ret as i64))
            }

            #[inline(always)]
            fn insert_new(&self, key: &K, value: &V) -> Result<(), TableError> {
                self.0
                    .insert(key, value, BPF_NOEXIST as u64)
                    .map_err(|ret| TableError::from_errno(ret as i64))
            }

            #[inline(always)]
            fn remove(&self, key: &K) -> Result<(), TableError> {
                self.0
                    .remove(key)
                    .map_err(|ret| TableError::from_errno(ret as i64))
            }
        }
    };
}

kernel_table!(HashMap);
kernel_table!(LruHashMap);

pub struct KernelSockets(pub &'static SockHash<Pair>);

impl SocketTable<Pair> for KernelSockets {
    type Socket = bpf_sock_ops;

    #[inline(always)]
    fn register(&self, key: &Pair, socket: &mut bpf_sock_ops) -> Result<(), TableError> {
        let mut key = *key;
        self.0
            .update(&mut key, socket, BPF_ANY as u64)
            .map_err(|ret| TableError::from_errno(ret as i64))
    }

    #[inline(always)]
    fn unregister(&self, key: &Pair) -> Result<(), TableError> {
        let ret = unsafe {
            bpf_map_delete_elem(
                self.0 as *const _ as *mut c_void,
                key as *const Pair as *const c_void,
            )
        };
        if ret == 0 {
            Ok(())
        } else {
            Err(TableError::from_errno(ret as i64))
        }
    }
}

pub type Pods = KernelTable<HashMap<IpKey, PodConfig>>;
pub type Processes = KernelTable<LruHashMap<u32, u32>>;
pub type Origins = KernelTable<LruHashMap<u64, OriginInfo>>;
pub type Nat = KernelTable<LruHashMap<Pair, OriginInfo>>;
pub type Marks = KernelTable<LruHashMap<u32, MarkTuple>>;

#[inline(always)]
pub fn pods() -> Pods {
    KernelTable(&POD_REGISTRY)
}

#[inline(always)]
pub fn processes() -> Processes {
    KernelTable(&PROCESS_ADDRS)
}

#[inline(always)]
pub fn origins() -> Origins {
    KernelTable(&ORIGIN_STORE)
}

#[inline(always)]
pub fn nat() -> Nat {
    KernelTable(&NAT_TABLE)
}

#[inline(always)]
pub fn marks() -> Marks {
    KernelTable(&MARK_TUPLES)
}

#[inline(always)]
pub fn sockets() -> KernelSockets {
    KernelSockets(&SOCK_PAIRS)
}
