use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use aya::maps::SockHash;
use aya::programs::{tc, CgroupSockAddr, CgroupSockopt, SchedClassifier, SkMsg, SockOps, TcAttachType};
use aya::{Bpf, BpfLoader};
use aya_log::BpfLogger;
use log::{debug, info, warn};

use meshredir_common::{Pair, SOCK_PAIRS};

/// Where and how to install the data plane.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub object: PathBuf,
    pub cgroup: PathBuf,
    pub pin_dir: PathBuf,
    pub iface: Option<String>,
}

fn bump_memlock_rlimit() {
    let rlim = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        debug!("remove limit on locked memory failed, ret is: {}", ret);
    }
}

macro_rules! program {
    ($bpf:expr, $name:expr, $ty:ty) => {{
        let program: &mut $ty = $bpf
            .program_mut($name)
            .ok_or_else(|| anyhow!("program {} not found", $name))?
            .try_into()?;
        program.load().with_context(|| format!("loading {}", $name))?;
        program
    }};
}

/// Loads the hook object, pins its maps and attaches every program. The
/// returned handle keeps the programs attached until dropped.
pub fn load(config: &LoaderConfig) -> anyhow::Result<Bpf> {
    bump_memlock_rlimit();

    let object = std::fs::read(&config.object)
        .with_context(|| format!("reading {}", config.object.display()))?;
    std::fs::create_dir_all(&config.pin_dir)
        .with_context(|| format!("creating {}", config.pin_dir.display()))?;

    let mut bpf = BpfLoader::new()
        .map_pin_path(&config.pin_dir)
        .load(&object)?;
    if let Err(e) = BpfLogger::init(&mut bpf) {
        warn!("failed to initialize eBPF logger: {}", e);
    }

    attach_cgroup(&mut bpf, &config.cgroup)?;
    attach_splice(&mut bpf)?;
    if let Some(iface) = &config.iface {
        attach_tagger(&mut bpf, iface)?;
    }

    info!(
        "data plane attached to {}, maps pinned under {}",
        config.cgroup.display(),
        config.pin_dir.display()
    );
    Ok(bpf)
}

fn attach_cgroup(bpf: &mut Bpf, cgroup: &Path) -> anyhow::Result<()> {
    let cgroup_file =
        File::open(cgroup).with_context(|| format!("opening cgroup {}", cgroup.display()))?;

    for name in ["mesh_connect4", "mesh_connect6"] {
        let program = program!(bpf, name, CgroupSockAddr);
        program.attach(&cgroup_file)?;
    }

    let sockops = program!(bpf, "mesh_sockops", SockOps);
    sockops.attach(&cgroup_file)?;

    let getsockopt = program!(bpf, "mesh_getsockopt", CgroupSockopt);
    getsockopt.attach(&cgroup_file)?;

    Ok(())
}

fn attach_splice(bpf: &mut Bpf) -> anyhow::Result<()> {
    let map_fd = {
        let map = bpf
            .map(SOCK_PAIRS)
            .ok_or_else(|| anyhow!("map {} not found", SOCK_PAIRS))?;
        let sock_pairs: SockHash<_, Pair> = SockHash::try_from(map)?;
        sock_pairs.fd().try_clone()?
    };

    let splice = program!(bpf, "mesh_splice", SkMsg);
    splice.attach(&map_fd)?;
    Ok(())
}

fn attach_tagger(bpf: &mut Bpf, iface: &str) -> anyhow::Result<()> {
    // error adding clsact to the interface if it is already added is harmless
    // the full cleanup can be done with 'sudo tc qdisc del dev eth0 clsact'.
    let _ = tc::qdisc_add_clsact(iface);

    let tagger = program!(bpf, "mesh_tag", SchedClassifier);
    tagger
        .attach(iface, TcAttachType::Egress)
        .with_context(|| format!("attaching tc egress on {iface}"))?;
    Ok(())
}
