//! Per-daemon live supervisor.
//!
//! Each started daemon gets one [`ActiveDaemon`] whose restart loop runs
//! on a dedicated task: spawn the child in its own process group, wait
//! for it to exit, spawn again. The loop only stops once the exit flag is
//! set, and the flag is only set by [`ActiveDaemon::kill`] or by engine
//! shutdown. Signals are always delivered to the whole process group so a
//! stop reaches every descendant the child forked.

use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::command::split_command;
use crate::daemon::DaemonStatus;
use crate::engine::{Engine, EngineError};
use crate::workdir::normalize_dir;

/// Delay between respawn attempts after a failed spawn.
pub(crate) const RESTART_BACKOFF: Duration = Duration::from_secs(10);

/// Live supervisor for one daemon.
pub(crate) struct ActiveDaemon {
    engine: Engine,
    key: String,

    /// Process-group id of the live child; 0 while no child is running.
    pgid: Mutex<i32>,

    /// When true the restart loop must not spawn again. Held across the
    /// kill signal so the loop cannot race in a replacement child.
    exit: Mutex<bool>,
}

impl ActiveDaemon {
    /// Creates the supervisor, marks the record running, and schedules
    /// the restart loop on its own task.
    pub(crate) fn spawn(engine: Engine, key: String) -> Arc<Self> {
        let daemon = Arc::new(Self {
            engine,
            key,
            pgid: Mutex::new(0),
            exit: Mutex::new(false),
        });
        daemon.set_status(DaemonStatus::Running);
        let task = Arc::clone(&daemon);
        tokio::spawn(async move {
            task.run().await;
            task.cleanup().await;
        });
        daemon
    }

    fn pgid_guard(&self) -> MutexGuard<'_, i32> {
        self.pgid.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn exit_guard(&self) -> MutexGuard<'_, bool> {
        self.exit.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Best-effort status write; supervision continues even when the
    /// store write fails.
    fn set_status(&self, status: DaemonStatus) {
        if let Err(err) = self.engine.store().update(&self.key, |d| d.status = status) {
            warn!(key = %self.key, %err, "failed to persist daemon status");
        }
    }

    /// Restart loop: spawn, wait, spawn again until told to exit.
    async fn run(&self) {
        loop {
            if *self.exit_guard() {
                return;
            }
            // Re-read the record each iteration so edits take effect on
            // the next restart.
            let record = match self.engine.store().get(&self.key) {
                Ok(record) => record,
                Err(err) => {
                    warn!(key = %self.key, %err, "cannot load daemon record");
                    return;
                },
            };
            let argv = match split_command(&record.cmd) {
                Ok(argv) => argv,
                Err(err) => {
                    warn!(key = %self.key, %err, "unusable daemon command");
                    return;
                },
            };
            let dir = match normalize_dir(&record.dir) {
                Ok(dir) => dir,
                Err(err) => {
                    warn!(key = %self.key, %err, "unusable working directory");
                    return;
                },
            };

            let mut command = Command::new(&argv[0]);
            command
                .args(&argv[1..])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(false)
                .process_group(0);
            if let Some(dir) = &dir {
                command.current_dir(dir);
            }

            let mut child = match command.spawn() {
                Ok(child) => child,
                Err(err) => {
                    warn!(key = %self.key, %err, "spawn failed, backing off");
                    self.set_status(DaemonStatus::Failed);
                    tokio::time::sleep(RESTART_BACKOFF).await;
                    continue;
                },
            };

            #[allow(clippy::cast_possible_wrap)] // pids fit in i32 on POSIX
            if let Some(pid) = child.id() {
                *self.pgid_guard() = pid as i32;
            }
            self.set_status(DaemonStatus::Running);
            debug!(key = %self.key, pid = child.id(), "child spawned");

            if let Err(err) = child.wait().await {
                debug!(key = %self.key, %err, "wait failed");
            }
        }
    }

    /// Deregisters the daemon and persists its final state. Runs exactly
    /// once, on any return from the restart loop.
    async fn cleanup(&self) {
        let mut active = self.engine.active_map().write().await;
        active.remove(&self.key);
        // During engine shutdown the daemon stays enabled so the next
        // launch resumes it; only an operator stop disables it.
        let preserve_enabled = self.engine.is_shutting_down();
        let result = self.engine.store().update(&self.key, |d| {
            d.status = DaemonStatus::Stopped;
            if !preserve_enabled {
                d.disabled = true;
            }
        });
        if let Err(err) = result {
            warn!(key = %self.key, %err, "failed to persist final daemon state");
        }
    }

    /// Sends SIGKILL to the whole process group and marks the restart
    /// loop for exit.
    ///
    /// The exit flag is set before the signal goes out, so the loop can
    /// never spawn a replacement after the group dies.
    pub(crate) fn kill(&self) -> Result<(), EngineError> {
        let mut exit = self.exit_guard();
        self.set_status(DaemonStatus::Stopping);
        *exit = true;
        let pgid = *self.pgid_guard();
        if pgid == 0 {
            // Spawn failed and the loop is in backoff; there is nothing
            // to signal, and the exit flag already prevents a respawn.
            return Err(EngineError::BadPid);
        }
        killpg(Pid::from_raw(pgid), Signal::SIGKILL).map_err(EngineError::Signal)?;
        Ok(())
    }

    /// Sends SIGSTOP to the process group. The child stays supervised;
    /// only the kill path touches the exit flag.
    pub(crate) fn pause(&self) -> Result<(), EngineError> {
        let pgid = *self.pgid_guard();
        if pgid == 0 {
            return Err(EngineError::BadPid);
        }
        killpg(Pid::from_raw(pgid), Signal::SIGSTOP).map_err(EngineError::Signal)?;
        self.set_status(DaemonStatus::Paused);
        Ok(())
    }

    /// Sends SIGCONT to the process group.
    pub(crate) fn resume(&self) -> Result<(), EngineError> {
        let pgid = *self.pgid_guard();
        if pgid == 0 {
            return Err(EngineError::BadPid);
        }
        killpg(Pid::from_raw(pgid), Signal::SIGCONT).map_err(EngineError::Signal)?;
        self.set_status(DaemonStatus::Running);
        Ok(())
    }
}
