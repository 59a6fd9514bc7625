use crate::addr::IpKey;
use crate::classify::{AddressResolver, Classifier};
use crate::origin::OriginInfo;
use crate::pair::Pair;
use crate::pod::PodConfig;
use crate::table::{SocketTable, Table, TableRead};

/// An established socket as seen by the sockops hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EstablishedSocket {
    pub cookie: u64,
    /// Live tuple, local end first.
    pub pair: Pair,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PairingOutcome {
    /// Not a redirected connection.
    Ignored,
    /// In the Socket Redirect Table; the caller should ask for state
    /// callbacks so the entry is dropped on close.
    Registered,
    /// Could not be paired; data keeps taking the normal stack path.
    Fallback,
}

/// Key under which the peer of `local` is registered: sendmsg on a socket is
/// spliced into whatever socket sits under its reversed tuple.
#[inline(always)]
pub fn peer_key(local: &Pair) -> Pair {
    local.reversed()
}

/// Socket Pairing: fills the NAT Table from the Origin Store once the live
/// tuple is known and maintains the Socket Redirect Table.
pub struct Pairing<'a, P, C, R, O, N, S> {
    pub classifier: Classifier<'a, P, C, R>,
    pub origins: &'a O,
    pub nat: &'a N,
    pub sockets: &'a S,
}

impl<'a, P, C, R, O, N, S> Pairing<'a, P, C, R, O, N, S>
where
    P: TableRead<IpKey, PodConfig>,
    C: Table<u32, u32>,
    R: AddressResolver,
    O: Table<u64, OriginInfo>,
    N: Table<Pair, OriginInfo>,
    S: SocketTable<Pair>,
{
    /// `connect()` has picked the local address; runs in the caller's
    /// process context.
    #[inline(always)]
    pub fn on_connect_started(&self, pid: u32, local: &IpKey) -> bool {
        self.classifier.learn(pid, local)
    }

    /// The redirected application socket reached ESTABLISHED.
    #[inline(always)]
    pub fn on_active_established(
        &self,
        sock: &EstablishedSocket,
        socket: &mut S::Socket,
    ) -> PairingOutcome {
        let origin = match self.origins.get(&sock.cookie) {
            Some(origin) => origin,
            None => return PairingOutcome::Ignored,
        };
        // Keyed both as the application asked and as the sidecar sees it.
        let requested = Pair::new(sock.pair.sip, sock.pair.sport, origin.ip, origin.port);
        if self.nat.insert(&requested, &origin).is_err()
            || self.nat.insert(&sock.pair, &origin).is_err()
        {
            return PairingOutcome::Fallback;
        }
        self.register(sock, socket)
    }

    /// The sidecar accepted a connection. It is the peer of a redirected
    /// socket exactly when the reversed tuple has a NAT entry.
    #[inline(always)]
    pub fn on_passive_established(
        &self,
        sock: &EstablishedSocket,
        socket: &mut S::Socket,
    ) -> PairingOutcome {
        if self.nat.get(&sock.pair.reversed()).is_none() {
            return PairingOutcome::Ignored;
        }
        self.register(sock, socket)
    }

    /// Either end closed: both directions leave the table before returning.
    #[inline(always)]
    pub fn on_close(&self, local: &Pair) {
        let _ = self.sockets.unregister(local);
        let _ = self.sockets.unregister(&peer_key(local));
    }

    #[inline(always)]
    fn register(&self, sock: &EstablishedSocket, socket: &mut S::Socket) -> PairingOutcome {
        match self.sockets.register(&sock.pair, socket) {
            Ok(()) => PairingOutcome::Registered,
            Err(_) => PairingOutcome::Fallback,
        }
    }
}
