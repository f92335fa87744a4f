//! Cleanup of btrfs and rsync children when snapback is interrupted
//!
//! A transfer may run for the whole rsync timeout. If the scheduler stops
//! snapback during that time, rsync and the ssh it started must not keep
//! writing into the staging area.
//!
//! Every tool runs as the leader of its own process group and receives
//! SIGTERM if snapback dies. While it runs, its group id sits in a process-wide
//! [`ChildRegistry`]. The signal thread installed by [`init_signal_handlers`]
//! shuts those groups down before exiting with `128 + signal`.

use std::collections::BTreeSet;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

/// Time a child group gets to exit after SIGTERM before it is killed
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

static REGISTRY: Mutex<ChildRegistry> = Mutex::new(ChildRegistry::new());

/// Process group ids of running tool children
#[derive(Debug, Default)]
pub struct ChildRegistry {
    groups: BTreeSet<u32>,
    shutting_down: bool,
}

impl ChildRegistry {
    pub const fn new() -> Self {
        Self { groups: BTreeSet::new(), shutting_down: false }
    }

    /// The registry shared by the tool runner and the signal thread
    pub fn global() -> &'static Mutex<ChildRegistry> {
        &REGISTRY
    }

    pub fn register(&mut self, pgid: u32) {
        debug!("Tracking child group {}", pgid);
        self.groups.insert(pgid);
    }

    pub fn unregister(&mut self, pgid: u32) {
        if self.groups.remove(&pgid) {
            debug!("Child group {} finished", pgid);
        }
    }

    pub fn count(&self) -> usize {
        self.groups.len()
    }

    /// SIGTERM every tracked group, then SIGKILL whatever is left after
    /// `grace`. Runs at most once per registry.
    pub fn terminate_all(&mut self, grace: Duration) {
        if std::mem::replace(&mut self.shutting_down, true) || self.groups.is_empty() {
            return;
        }

        let groups: Vec<u32> = std::mem::take(&mut self.groups).into_iter().collect();
        info!("Stopping {} running tool(s)", groups.len());

        for &pgid in &groups {
            signal_group(pgid, Signal::SIGTERM);
        }

        for pgid in survivors_after(&groups, grace) {
            warn!("Tool group {} still running after {:?}, killing it", pgid, grace);
            signal_group(pgid, Signal::SIGKILL);
        }
    }
}

/// Keeps a child's group in the global registry for as long as it lives
pub struct RegisteredChild {
    pgid: u32,
}

impl RegisteredChild {
    pub fn new(pgid: u32) -> Self {
        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.register(pgid);
        }
        Self { pgid }
    }
}

impl Drop for RegisteredChild {
    fn drop(&mut self) {
        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.unregister(self.pgid);
        }
    }
}

/// Signal the whole group (rsync and its ssh), or the leader alone if the
/// group is already gone.
fn signal_group(pgid: u32, signal: Signal) {
    let Ok(raw) = i32::try_from(pgid) else {
        return;
    };
    if let Err(group_err) = kill(Pid::from_raw(-raw), signal) {
        if let Err(err) = kill(Pid::from_raw(raw), signal) {
            debug!("{} to group {} failed: {}; to leader: {}", signal, pgid, group_err, err);
        }
    }
}

/// Poll until every leader has exited or `grace` runs out.
fn survivors_after(groups: &[u32], grace: Duration) -> Vec<u32> {
    let deadline = Instant::now() + grace;
    loop {
        let running: Vec<u32> = groups.iter().copied().filter(|&p| is_running(p)).collect();
        if running.is_empty() || Instant::now() >= deadline {
            return running;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Whether `pid` exists and is neither a zombie nor dead
fn is_running(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if kill(Pid::from_raw(raw), None).is_err() {
        return false;
    }
    match process_state(pid) {
        Some(state) => !matches!(state, 'Z' | 'X'),
        None => true,
    }
}

/// State letter from `/proc/<pid>/stat`. The command name is parenthesised
/// and may contain spaces, so the state is read after the last `)`.
fn process_state(pid: u32) -> Option<char> {
    let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    let (_, rest) = stat.rsplit_once(')')?;
    rest.trim_start().chars().next()
}

/// Start the thread that turns SIGINT, SIGTERM and SIGHUP into a fatal exit.
pub fn init_signal_handlers() -> std::io::Result<()> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    thread::Builder::new().name("signals".into()).spawn(move || {
        let Some(sig) = signals.forever().next() else {
            return;
        };
        tracing::error!(target: crate::logging::FATAL_TARGET, "Interrupted by signal {}", sig);
        eprintln!("ERROR: interrupted by signal {}", sig);

        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.terminate_all(SHUTDOWN_GRACE);
        }
        std::process::exit(128 + sig);
    })?;

    Ok(())
}

/// Spawn configuration for tool children
pub trait CommandProcessGroup {
    /// Lead a fresh process group and get SIGTERM when snapback dies
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;

        self.process_group(0);
        // SAFETY: prctl is async-signal-safe and touches no parent state
        unsafe {
            self.pre_exec(|| {
                nix::sys::prctl::set_pdeathsig(Signal::SIGTERM).map_err(std::io::Error::from)
            });
        }
        self
    }
}
