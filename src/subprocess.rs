// Copyright 2024 the Tectonic Project
// Licensed under the MIT License

//! The Subprocess Runner.
//!
//! Every external tool this pipeline shells out to — `tar`, `gunzip`,
//! `epstopdf`, `pdftex`/`pdflatex`/`tex`/`latex`, `dvitype`, `pdftotext` —
//! goes through here so that timeout enforcement and process-group cleanup
//! are handled in exactly one place: a blocking call that launches a
//! process group, waits for it with a hard wall-clock timeout, and escalates
//! signals if it overruns.

use std::ffi::OsStr;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tectonic_errors::prelude::*;

/// How a child's standard streams should be wired up.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdioPlan {
    /// Suppress stdout (send to the null device) rather than inheriting it.
    pub quiet_stdout: bool,
    /// Suppress stderr rather than inheriting it.
    pub quiet_stderr: bool,
}

/// How a child process actually terminated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExitStatusKind {
    Exited(i32),
    Signaled(i32),
    /// The runner's timeout elapsed and the process group was killed.
    TimedOut,
}

impl ExitStatusKind {
    pub fn is_success(self) -> bool {
        matches!(self, ExitStatusKind::Exited(0))
    }
}

/// The poll cadence used while waiting for a child to exit or time out.
const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Delay between each signal-escalation step once a timeout fires.
const ESCALATION_DELAY: Duration = Duration::from_millis(200);

/// Runs external commands with a hard timeout and process-group cleanup.
#[derive(Clone, Copy, Debug, Default)]
pub struct SubprocessRunner;

impl SubprocessRunner {
    pub fn new() -> Self {
        SubprocessRunner
    }

    /// Run `argv[0] argv[1..]` with working directory `cwd`, killing the
    /// whole process group if it has not exited within `timeout`. stdin is
    /// always the null device: none of this pipeline's subprocesses need
    /// interactive input.
    pub fn run<I, S>(
        &self,
        argv: I,
        cwd: &Path,
        timeout: Duration,
        stdio: StdioPlan,
    ) -> Result<ExitStatusKind>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut iter = argv.into_iter();
        let program = atry!(
            iter.next().ok_or_else(|| anyhow!("empty argv passed to subprocess runner"));
            ["cannot run an empty command line"]
        );

        let mut cmd = Command::new(program.as_ref());
        cmd.args(iter);
        cmd.current_dir(cwd);
        cmd.stdin(Stdio::null());
        cmd.stdout(if stdio.quiet_stdout {
            Stdio::null()
        } else {
            Stdio::inherit()
        });
        cmd.stderr(if stdio.quiet_stderr {
            Stdio::null()
        } else {
            Stdio::inherit()
        });

        // Put the child in its own process group so that a timeout can kill
        // the whole subtree (e.g. a shell wrapper and the real tool it
        // execs) rather than just the immediate child.
        unsafe {
            cmd.pre_exec(|| {
                if libc::setpgid(0, 0) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = atry!(
            cmd.spawn();
            ["failed to spawn subprocess `{}`", program.as_ref().to_string_lossy()]
        );

        let pid = child.id() as libc::pid_t;
        let deadline = Instant::now() + timeout;

        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    return Ok(exit_status_kind(status));
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        kill_process_group(pid);
                        // Reap the (now-dead-or-dying) child so it does not
                        // linger as a zombie.
                        let _ = child.wait();
                        return Ok(ExitStatusKind::TimedOut);
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    bail!("failed to poll subprocess status: {e}");
                }
            }
        }
    }
}

fn exit_status_kind(status: std::process::ExitStatus) -> ExitStatusKind {
    use std::os::unix::process::ExitStatusExt;

    if let Some(code) = status.code() {
        ExitStatusKind::Exited(code)
    } else if let Some(sig) = status.signal() {
        ExitStatusKind::Signaled(sig)
    } else {
        // Should not happen on Unix, but don't invent a fake success.
        ExitStatusKind::Exited(-1)
    }
}

/// Escalate TERM -> HUP -> KILL against the negative pid (the process
/// group), pausing briefly between signals to give well-behaved children a
/// chance to exit on the gentler signal.
fn kill_process_group(pid: libc::pid_t) {
    for sig in [libc::SIGTERM, libc::SIGHUP, libc::SIGKILL] {
        unsafe {
            libc::kill(-pid, sig);
        }
        std::thread::sleep(ESCALATION_DELAY);
        if !process_group_alive(pid) {
            return;
        }
    }
}

/// Best-effort liveness probe for a process group: sending signal 0 fails
/// with ESRCH once every process in the group has exited.
fn process_group_alive(pid: libc::pid_t) -> bool {
    unsafe { libc::kill(-pid, 0) == 0 }
}
