use core::fmt;

/// Failure of a single keyed-table operation.
///
/// None of these ever reach an application connection: every hook maps them
/// to its pass-through verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableError {
    /// A non-LRU table is at capacity.
    Full,
    /// `insert_new` found the key occupied.
    Exists,
    NotFound,
    /// Any other kernel error code.
    Errno(i64),
}

const ENOENT: i64 = 2;
const EEXIST: i64 = 17;
const E2BIG: i64 = 7;
const ENOSPC: i64 = 28;

impl TableError {
    /// Maps a negative return of a map helper.
    pub fn from_errno(ret: i64) -> Self {
        match -ret {
            ENOENT => TableError::NotFound,
            EEXIST => TableError::Exists,
            E2BIG | ENOSPC => TableError::Full,
            _ => TableError::Errno(ret),
        }
    }
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableError::Full => f.write_str("table is full"),
            TableError::Exists => f.write_str("key already present"),
            TableError::NotFound => f.write_str("key not found"),
            TableError::Errno(ret) => write!(f, "map operation failed ({ret})"),
        }
    }
}

/// Read side of a keyed table. Values are copied out; a miss is `None`,
/// never an error.
pub trait TableRead<K, V> {
    fn get(&self, key: &K) -> Option<V>;
}

/// A keyed table shared between hook invocations. Each operation is atomic
/// per key; there are no multi-key transactions.
pub trait Table<K, V>: TableRead<K, V> {
    /// Inserts or overwrites.
    fn insert(&self, key: &K, value: &V) -> Result<(), TableError>;

    /// Inserts only if `key` is vacant.
    fn insert_new(&self, key: &K, value: &V) -> Result<(), TableError>;

    fn remove(&self, key: &K) -> Result<(), TableError>;
}

/// A table whose values are live socket references. Entries are weak: they
/// must be unregistered when the socket closes.
pub trait SocketTable<K> {
    type Socket: ?Sized;

    fn register(&self, key: &K, socket: &mut Self::Socket) -> Result<(), TableError>;

    fn unregister(&self, key: &K) -> Result<(), TableError>;
}
