//! # vigil-core
//!
//! Supervisor engine for vigil, a remote daemon manager.
//!
//! This crate owns the durable registry of user-defined daemons and keeps
//! the enabled ones alive: each started daemon runs under a dedicated
//! supervisor task that respawns the child whenever it exits, delivers
//! pause/resume/stop signals to the child's process group, and records
//! every lifecycle transition back into the store. The HTTP control plane
//! and the command-line client live in sibling crates and only ever talk
//! to [`Engine`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use vigil_core::{DaemonStore, Engine};
//!
//! # async fn demo() -> Result<(), vigil_core::EngineError> {
//! let store = DaemonStore::open("vigil.db")?;
//! let engine = Engine::open(store).await?;
//!
//! let daemon = engine.add(None, "sleep 3600", "")?;
//! engine.start(&daemon.key).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod active;
pub mod command;
pub mod daemon;
pub mod engine;
pub mod key;
pub mod store;
pub mod workdir;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::daemon::{DaemonRecord, DaemonStatus};
    pub use crate::engine::{Engine, EngineError};
    pub use crate::store::DaemonStore;
}

/// Re-export commonly used types at the crate root.
pub use daemon::{DaemonRecord, DaemonStatus};
pub use engine::{Engine, EngineError};
pub use store::{DaemonStore, StoreError};
