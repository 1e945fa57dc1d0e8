/// Per-process metric probes
///
/// Every probe reports `Sample::Failed` instead of returning an error. The
/// platform-dependent strategies (open files, connection counting) are chosen
/// once when the probe is built, not on every tick.

use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use sysinfo::{Pid, System};
use tracing::{debug, info, warn};

use crate::core::history::{MetricKind, Sample};
use crate::core::resolver::ProcessHandle;

/// Natural ceiling of the CPU graph (one full core)
const CPU_CEILING: f64 = 100.0;

/// How often a running child is polled while waiting for it
const CHILD_POLL: Duration = Duration::from_millis(10);

/// Source of metric readings for the sampler
#[cfg_attr(test, mockall::automock)]
pub trait Probe: Send {
    /// Refresh OS state for the tick; returns false once the process is gone
    fn refresh(&mut self) -> bool;

    fn sample(&mut self, kind: MetricKind) -> Sample;

    /// Fixed ceilings per metric in `MetricKind::ALL` order
    fn natural_max(&self) -> [Option<f64>; 4];
}

/// Socket families counted by the network probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NetKind {
    #[default]
    All,
    Inet,
    Inet4,
    Inet6,
    Tcp,
    Tcp4,
    Tcp6,
    Udp,
    Udp4,
    Udp6,
    Unix,
}

/// One socket table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketTable {
    Tcp4,
    Tcp6,
    Udp4,
    Udp6,
    Unix,
}

impl SocketTable {
    fn proc_path(&self) -> &'static str {
        match self {
            SocketTable::Tcp4 => "/proc/net/tcp",
            SocketTable::Tcp6 => "/proc/net/tcp6",
            SocketTable::Udp4 => "/proc/net/udp",
            SocketTable::Udp6 => "/proc/net/udp6",
            SocketTable::Unix => "/proc/net/unix",
        }
    }
}

impl NetKind {
    pub fn tables(&self) -> &'static [SocketTable] {
        use SocketTable::*;
        match self {
            NetKind::All => &[Tcp4, Tcp6, Udp4, Udp6, Unix],
            NetKind::Inet => &[Tcp4, Tcp6, Udp4, Udp6],
            NetKind::Inet4 => &[Tcp4, Udp4],
            NetKind::Inet6 => &[Tcp6, Udp6],
            NetKind::Tcp => &[Tcp4, Tcp6],
            NetKind::Tcp4 => &[Tcp4],
            NetKind::Tcp6 => &[Tcp6],
            NetKind::Udp => &[Udp4, Udp6],
            NetKind::Udp4 => &[Udp4],
            NetKind::Udp6 => &[Udp6],
            NetKind::Unix => &[Unix],
        }
    }
}

/// How open descriptors are counted on this platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FdStrategy {
    /// Enumerate `/proc/<pid>/fd`
    ProcFd,
    /// Shell out to `lsof -p`
    Lsof(PathBuf),
    Unsupported,
}

impl FdStrategy {
    pub fn detect(pid: u32) -> Self {
        let fd_dir = PathBuf::from(format!("/proc/{}/fd", pid));
        if cfg!(target_os = "linux") && std::fs::read_dir(&fd_dir).is_ok() {
            return FdStrategy::ProcFd;
        }
        match find_in_path("lsof") {
            Some(path) => FdStrategy::Lsof(path),
            None => FdStrategy::Unsupported,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FdStrategy::ProcFd => "procfs",
            FdStrategy::Lsof(_) => "lsof",
            FdStrategy::Unsupported => "unsupported",
        }
    }
}

/// How system-wide sockets are counted on this platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetStrategy {
    /// Read the `/proc/net/*` socket tables
    ProcNet,
    /// Parse `netstat -an`
    Netstat(PathBuf),
    Unsupported,
}

impl NetStrategy {
    pub fn detect() -> Self {
        if cfg!(target_os = "linux") && Path::new("/proc/net/tcp").exists() {
            return NetStrategy::ProcNet;
        }
        match find_in_path("netstat") {
            Some(path) => NetStrategy::Netstat(path),
            None => NetStrategy::Unsupported,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NetStrategy::ProcNet => "procfs",
            NetStrategy::Netstat(_) => "netstat",
            NetStrategy::Unsupported => "unsupported",
        }
    }
}

/// Probe backed by `sysinfo` plus the detected fd/socket strategies
pub struct SystemProbe {
    system: System,
    pid: Pid,
    alive: bool,
    fd: FdStrategy,
    net: NetStrategy,
    net_kind: NetKind,
    timeout: Duration,
    natural_max: [Option<f64>; 4],
}

impl SystemProbe {
    pub fn new(handle: &ProcessHandle, net_kind: NetKind, timeout: Duration) -> Self {
        let mut system = System::new();
        system.refresh_memory();

        let total_memory = system.total_memory();
        let memory_max = if total_memory > 0 {
            Some(total_memory as f64)
        } else {
            debug!("total memory unavailable, memory graph will autoscale");
            None
        };

        let files_max = fd_limit(handle.pid);
        if files_max.is_none() {
            debug!(pid = handle.pid, "fd limit unavailable, open-files graph will autoscale");
        }

        let pid = Pid::from_u32(handle.pid);
        // Two refreshes a minimum interval apart, or the first tick reads 0% CPU
        let mut alive = system.refresh_process(pid);
        if alive {
            std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
            alive = system.refresh_process(pid);
        }

        let fd = FdStrategy::detect(handle.pid);
        let net = NetStrategy::detect();
        info!(
            pid = handle.pid,
            fd_strategy = fd.name(),
            net_strategy = net.name(),
            ?net_kind,
            "probe ready"
        );
        if fd == FdStrategy::Unsupported {
            warn!("no open-file strategy on this platform, FILES will report no data");
        }

        Self {
            system,
            pid,
            alive,
            fd,
            net,
            net_kind,
            timeout,
            natural_max: [Some(CPU_CEILING), memory_max, None, files_max],
        }
    }

    fn count_open_files(&self) -> Option<f64> {
        match &self.fd {
            FdStrategy::ProcFd => {
                let entries = std::fs::read_dir(format!("/proc/{}/fd", self.pid.as_u32())).ok()?;
                Some(entries.filter(|e| e.is_ok()).count() as f64)
            }
            FdStrategy::Lsof(lsof) => {
                let pid = self.pid.as_u32().to_string();
                let output = run_with_timeout(lsof, &["-n", "-P", "-p", &pid, "-F", "f"], self.timeout)?;
                Some(count_lsof_descriptors(&output) as f64)
            }
            FdStrategy::Unsupported => None,
        }
    }

    fn count_connections(&self) -> Option<f64> {
        match &self.net {
            NetStrategy::ProcNet => {
                let mut total = 0usize;
                for table in self.net_kind.tables() {
                    match std::fs::read_to_string(table.proc_path()) {
                        Ok(contents) => total += count_proc_net_entries(&contents),
                        // Missing tables (e.g. no IPv6) count as empty
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(_) => return None,
                    }
                }
                Some(total as f64)
            }
            NetStrategy::Netstat(netstat) => {
                let output = run_with_timeout(netstat, &["-an"], self.timeout)?;
                Some(count_netstat_entries(&output, self.net_kind) as f64)
            }
            NetStrategy::Unsupported => None,
        }
    }
}

impl Probe for SystemProbe {
    fn refresh(&mut self) -> bool {
        self.alive = self.system.refresh_process(self.pid);
        self.alive
    }

    fn sample(&mut self, kind: MetricKind) -> Sample {
        let value = match kind {
            MetricKind::Cpu => self
                .system
                .process(self.pid)
                .filter(|_| self.alive)
                .map(|p| p.cpu_usage() as f64),
            MetricKind::Memory => self
                .system
                .process(self.pid)
                .filter(|_| self.alive)
                .map(|p| p.memory() as f64),
            MetricKind::NetworkConnections => self.count_connections(),
            MetricKind::OpenFiles => self.count_open_files(),
        };
        Sample::from(value)
    }

    fn natural_max(&self) -> [Option<f64>; 4] {
        self.natural_max
    }
}

/// Snapshot of the process table, excluding this process
pub fn list_processes() -> Vec<ProcessHandle> {
    let mut system = System::new();
    system.refresh_processes();
    let own_pid = std::process::id();

    system
        .processes()
        .values()
        .filter(|p| p.pid().as_u32() != own_pid)
        .map(|p| ProcessHandle::new(p.pid().as_u32(), p.name()))
        .collect()
}

/// Entries in a `/proc/net/{tcp,udp,unix}` table (header line excluded)
pub fn count_proc_net_entries(contents: &str) -> usize {
    contents
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .count()
}

/// Socket lines in `netstat -an` output matching `kind`
pub fn count_netstat_entries(output: &str, kind: NetKind) -> usize {
    let tables = kind.tables();
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter_map(|proto| match proto.to_lowercase().as_str() {
            "tcp" | "tcp4" => Some(SocketTable::Tcp4),
            "tcp6" | "tcp46" => Some(SocketTable::Tcp6),
            "udp" | "udp4" => Some(SocketTable::Udp4),
            "udp6" | "udp46" => Some(SocketTable::Udp6),
            "unix" => Some(SocketTable::Unix),
            _ => None,
        })
        .filter(|table| tables.contains(table))
        .count()
}

/// Numeric descriptors in `lsof -F f` output (`cwd`, `txt`, `mem` etc. are skipped)
pub fn count_lsof_descriptors(output: &str) -> usize {
    output
        .lines()
        .filter_map(|line| line.strip_prefix('f'))
        .filter(|fd| !fd.is_empty() && fd.chars().all(|c| c.is_ascii_digit()))
        .count()
}

/// Soft limit from the `Max open files` row of `/proc/<pid>/limits`
pub fn parse_limits_file(contents: &str) -> Option<u64> {
    contents
        .lines()
        .find(|line| line.starts_with("Max open files"))
        .and_then(|line| line.split_whitespace().nth(3))
        .and_then(|soft| soft.parse().ok())
}

/// Open-file ceiling for `pid`, falling back to our own soft limit
pub fn fd_limit(pid: u32) -> Option<f64> {
    if let Ok(contents) = std::fs::read_to_string(format!("/proc/{}/limits", pid)) {
        if let Some(limit) = parse_limits_file(&contents) {
            return Some(limit as f64);
        }
    }
    own_fd_limit()
}

#[cfg(unix)]
fn own_fd_limit() -> Option<f64> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: getrlimit only writes into the struct we pass
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) };
    if rc != 0 || limit.rlim_cur == libc::RLIM_INFINITY {
        return None;
    }
    Some(limit.rlim_cur as f64)
}

#[cfg(not(unix))]
fn own_fd_limit() -> Option<f64> {
    None
}

/// Locate an executable on `PATH`
pub fn find_in_path(program: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

/// Run a command and capture stdout, killing it after `timeout`.
///
/// Returns `None` on spawn failure, timeout or a non-zero exit.
pub fn run_with_timeout(program: &Path, args: &[&str], timeout: Duration) -> Option<String> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .ok()?;

    // Drain stdout on a thread so a chatty child never blocks on a full pipe
    let mut stdout = child.stdout.take()?;
    let reader = std::thread::spawn(move || {
        let mut buf = String::new();
        let _ = stdout.read_to_string(&mut buf);
        buf
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                debug!(program = %program.display(), ?timeout, "probe command timed out");
                let _ = child.kill();
                let _ = child.wait();
                // Grandchildren may still hold the pipe; leave the reader detached
                return None;
            }
            Ok(None) => std::thread::sleep(CHILD_POLL),
            Err(_) => return None,
        }
    };

    let output = reader.join().ok()?;
    // lsof exits 1 when some files could not be listed but still prints the rest
    (status.success() || !output.is_empty()).then_some(output)
}
