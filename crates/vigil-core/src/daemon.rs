//! Daemon records.
//!
//! A [`DaemonRecord`] is the persisted description of one user-registered
//! daemon: the command line to run, where to run it, the last observed
//! lifecycle state, and whether the supervisor is supposed to keep it
//! alive.

use serde::{Deserialize, Serialize};

/// Last observed lifecycle state of a daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonStatus {
    /// Not being supervised.
    Stopped,

    /// Supervised with a live (or about to be respawned) child.
    Running,

    /// Child received SIGSTOP and has not been resumed.
    Paused,

    /// Stop was requested; the child has not been reaped yet.
    Stopping,

    /// The last spawn attempt failed; the supervisor is in backoff.
    Failed,
}

impl DaemonStatus {
    /// Stable wire/storage string for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for DaemonStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored status string is not recognized.
#[derive(Debug, thiserror::Error)]
#[error("unrecognized daemon status: {0}")]
pub struct InvalidStatus(String);

impl std::str::FromStr for DaemonStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stopped" => Ok(Self::Stopped),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "stopping" => Ok(Self::Stopping),
            "failed" => Ok(Self::Failed),
            other => Err(InvalidStatus(other.to_string())),
        }
    }
}

/// A registered daemon as persisted in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonRecord {
    /// Unique short identifier; immutable once created.
    pub key: String,

    /// Command line, tokenized with POSIX shell quoting at spawn time.
    pub cmd: String,

    /// Working directory. Empty means "inherit the supervisor's"; a
    /// leading `~` is expanded to the invoking user's home directory.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dir: String,

    /// Last observed lifecycle state.
    pub status: DaemonStatus,

    /// True when the supervisor is not supposed to be running this
    /// daemon. Cleared by start, set again when supervision ends.
    pub disabled: bool,
}

impl DaemonRecord {
    /// A freshly registered daemon: stopped and disabled until started.
    #[must_use]
    pub fn new(key: String, cmd: String, dir: String) -> Self {
        Self {
            key,
            cmd,
            dir,
            status: DaemonStatus::Stopped,
            disabled: true,
        }
    }
}
