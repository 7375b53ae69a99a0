//! Working-directory normalization for spawned daemons.

use std::path::PathBuf;

/// Errors from normalizing a configured working directory.
#[derive(Debug, thiserror::Error)]
pub enum WorkdirError {
    /// The invoking user's home directory could not be determined.
    #[error("cannot determine home directory")]
    NoHome,

    /// The supervisor's current directory could not be read.
    #[error("cannot resolve current directory: {0}")]
    CurrentDir(#[from] std::io::Error),
}

/// Resolves a stored `dir` to the absolute path the child should run in.
///
/// An empty `dir` yields `None`: the child inherits the supervisor's
/// working directory. A leading `~` is replaced with the invoking user's
/// home directory; relative paths are resolved against the supervisor's
/// current directory.
///
/// # Errors
///
/// Returns [`WorkdirError::NoHome`] when `~` cannot be expanded and
/// [`WorkdirError::CurrentDir`] when a relative path cannot be anchored.
pub fn normalize_dir(dir: &str) -> Result<Option<PathBuf>, WorkdirError> {
    if dir.is_empty() {
        return Ok(None);
    }
    let expanded = match dir.strip_prefix('~') {
        Some(rest) => {
            let home = dirs::home_dir().ok_or(WorkdirError::NoHome)?;
            home.join(rest.trim_start_matches('/'))
        },
        None => PathBuf::from(dir),
    };
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()?.join(expanded)
    };
    Ok(Some(absolute))
}
