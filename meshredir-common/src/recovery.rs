use crate::origin::OriginInfo;
use crate::pair::{MarkTuple, Pair};
use crate::table::TableRead;

/// Identities available at the point of the lookup. Absent ones skip their
/// tier; mark 0 means "unmarked".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OriginQuery {
    pub cookie: Option<u64>,
    pub pair: Option<Pair>,
    pub mark: Option<u32>,
}

/// Which tier answered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OriginSource {
    Cookie,
    Tuple,
    Mark,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Recovered {
    pub origin: OriginInfo,
    pub source: OriginSource,
}

/// Origin Recovery: cookie, then 4-tuple, then mark; first hit wins.
///
/// Delivery is best-effort. Any tier may have lost its entry to LRU eviction
/// between the write and this read, and a 4-tuple or mark may have been
/// reused by an unrelated connection. A mark whose recorded source differs
/// from the queried pair is treated as a miss. `None` means "not
/// mesh-managed".
pub struct Recovery<'a, O, N, M> {
    pub origins: &'a O,
    pub nat: &'a N,
    pub marks: &'a M,
}

impl<'a, O, N, M> Recovery<'a, O, N, M>
where
    O: TableRead<u64, OriginInfo>,
    N: TableRead<Pair, OriginInfo>,
    M: TableRead<u32, MarkTuple>,
{
    #[inline(always)]
    pub fn recover(&self, query: &OriginQuery) -> Option<Recovered> {
        if let Some(cookie) = query.cookie {
            if let Some(origin) = self.origins.get(&cookie) {
                return Some(Recovered {
                    origin,
                    source: OriginSource::Cookie,
                });
            }
        }
        if let Some(pair) = query.pair {
            if let Some(origin) = self.nat.get(&pair) {
                return Some(Recovered {
                    origin,
                    source: OriginSource::Tuple,
                });
            }
        }
        match query.mark {
            Some(mark) if mark != 0 => {
                let tuple = self.marks.get(&mark)?;
                // Marks collide across connections; the recorded source must
                // be the peer being asked about.
                if let Some(pair) = query.pair {
                    let recorded = tuple.pair();
                    if recorded.sip != pair.sip || recorded.sport != pair.sport {
                        return None;
                    }
                }
                Some(Recovered {
                    origin: OriginInfo::traffic_control(tuple.daddr, tuple.dport as u16),
                    source: OriginSource::Mark,
                })
            }
            _ => None,
        }
    }
}
