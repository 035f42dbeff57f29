//! Child termination and liveness checks

use std::process::Child;
use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Check if a process with the given PID is alive
///
/// Sends the null signal. `EPERM` still means the process exists, it just
/// belongs to someone else (e.g. a child that dropped to another user).
pub fn is_process_alive(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };

    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Terminate `child` and, with `group` set, every process in its group.
///
/// Sends `SIGTERM`, waits up to `grace` for the child to exit, then sends
/// `SIGKILL`. Always returns with the child reaped. A child that was already
/// reaped is only signalled through its group, since its pid may be reused.
pub(crate) fn terminate(child: &mut Child, grace: Duration, group: bool) {
    let pid = child.id();
    let Ok(raw) = i32::try_from(pid) else {
        let _ = child.kill();
        let _ = child.wait();
        return;
    };
    let target = Pid::from_raw(raw);

    let reaped = matches!(child.try_wait(), Ok(Some(_)));
    if reaped && !group {
        return;
    }

    send(target, Signal::SIGTERM, group);

    // A grace too large to represent is no deadline at all
    let deadline = Instant::now().checked_add(grace);
    let mut exited = reaped;
    while !exited && deadline.map_or(true, |deadline| Instant::now() < deadline) {
        match child.try_wait() {
            Ok(Some(_)) => {
                exited = true;
                break;
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                warn!(pid, error = %e, "polling child after SIGTERM failed");
                break;
            }
        }
    }

    if !exited {
        debug!(pid, "child ignored SIGTERM for {}ms; sending SIGKILL", grace.as_millis());
    }

    // Also sweeps group members that outlived a leader which exited on SIGTERM
    if group {
        send(target, Signal::SIGKILL, true);
    } else if !exited {
        let _ = child.kill();
    }

    if let Err(e) = child.wait() {
        warn!(pid, error = %e, "reaping terminated child failed");
    }
}

fn send(target: Pid, signal: Signal, group: bool) {
    let result = if group {
        killpg(target, signal)
    } else {
        kill(target, signal)
    };

    match result {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(pid = %target, ?signal, group, error = ?e, "signalling child failed"),
    }
}
