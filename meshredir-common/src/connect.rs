use crate::addr::{self, IpKey};
use crate::classify::{AddressResolver, Classifier};
use crate::origin::OriginInfo;
use crate::pair::Pair;
use crate::pod::{PodConfig, POD_FLAG_INBOUND, POD_FLAG_LOOPBACK_REDIRECT};
use crate::table::{Table, TableRead};
use crate::SIDECAR_UID;

/// What the connect hook sees of a `connect()` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectRequest {
    pub cookie: u64,
    pub pid: u32,
    pub uid: u32,
    pub dst: IpKey,
    pub dst_port: u16,
    /// Local port if the socket is already bound, otherwise 0.
    pub src_port: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectVerdict {
    PassThrough,
    Redirect { addr: IpKey, port: u16 },
}

/// The Connect Interceptor: decides whether a `connect()` goes through the
/// sidecar and records where it was really headed.
pub struct Interceptor<'a, P, C, R, O, N> {
    pub classifier: Classifier<'a, P, C, R>,
    pub origins: &'a O,
    pub nat: &'a N,
}

impl<'a, P, C, R, O, N> Interceptor<'a, P, C, R, O, N>
where
    P: TableRead<IpKey, PodConfig>,
    C: Table<u32, u32>,
    R: AddressResolver,
    O: Table<u64, OriginInfo>,
    N: Table<Pair, OriginInfo>,
{
    #[inline(always)]
    pub fn on_connect(&self, req: &ConnectRequest) -> ConnectVerdict {
        if addr::is_loopback(&req.dst) {
            return ConnectVerdict::PassThrough;
        }
        if req.uid == SIDECAR_UID {
            return self.on_sidecar_connect(req);
        }

        let src = match self.classifier.process_address(req.pid) {
            Some(src) => src,
            None => return ConnectVerdict::PassThrough,
        };
        let config = match self.classifier.pod(&src) {
            Some(config) => config,
            None => return ConnectVerdict::PassThrough,
        };
        if req.dst == src && config.is_sidecar_port(req.dst_port) {
            return ConnectVerdict::PassThrough;
        }
        if config.excludes_outbound(&req.dst, req.dst_port) {
            return ConnectVerdict::PassThrough;
        }

        let target = if config.has_flag(POD_FLAG_LOOPBACK_REDIRECT) {
            addr::loopback_like(&req.dst)
        } else {
            src
        };
        if addr::is_ipv4_mapped(&target) != addr::is_ipv4_mapped(&req.dst) {
            return ConnectVerdict::PassThrough;
        }

        let origin = OriginInfo::outbound(req.dst, req.dst_port);
        self.redirect(req, &origin, target, target, config.outbound_port)
    }

    /// Sidecar traffic is never sent back into the sidecar, except that a
    /// sidecar dialing another local meshed pod lands directly on that pod's
    /// inbound port.
    #[inline(always)]
    fn on_sidecar_connect(&self, req: &ConnectRequest) -> ConnectVerdict {
        let config = match self.classifier.pod(&req.dst) {
            Some(config) => config,
            None => return ConnectVerdict::PassThrough,
        };
        if !config.has_flag(POD_FLAG_INBOUND)
            || config.is_sidecar_port(req.dst_port)
            || config.excludes_inbound(req.dst_port)
        {
            return ConnectVerdict::PassThrough;
        }
        let src = match self.classifier.process_address(req.pid) {
            Some(src) => src,
            None => return ConnectVerdict::PassThrough,
        };
        if src == req.dst {
            // The pod's own sidecar reaching its application.
            return ConnectVerdict::PassThrough;
        }

        let origin = OriginInfo::inbound(req.dst, req.dst_port);
        self.redirect(req, &origin, src, req.dst, config.inbound_port)
    }

    #[inline(always)]
    fn redirect(
        &self,
        req: &ConnectRequest,
        origin: &OriginInfo,
        src: IpKey,
        target: IpKey,
        port: u16,
    ) -> ConnectVerdict {
        if self.origins.insert(&req.cookie, origin).is_err() {
            return ConnectVerdict::PassThrough;
        }
        if req.src_port != 0 {
            let requested = Pair::new(src, req.src_port, origin.ip, origin.port);
            let live = Pair::new(src, req.src_port, target, port);
            if self.nat.insert(&requested, origin).is_err() || self.nat.insert(&live, origin).is_err()
            {
                let _ = self.nat.remove(&requested);
                let _ = self.origins.remove(&req.cookie);
                return ConnectVerdict::PassThrough;
            }
        }
        ConnectVerdict::Redirect { addr: target, port }
    }
}
