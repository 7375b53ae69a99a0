//! Daemon management commands issued over the HTTP control plane.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Wire shape of a daemon record returned by the server.
#[derive(Debug, Deserialize)]
pub struct Daemon {
    key: String,
    cmd: String,
    #[serde(default)]
    dir: String,
    status: String,
}

/// Error body shape used by the server.
#[derive(Debug, Deserialize)]
struct ApiError {
    error: String,
}

/// Connection details for the control-plane server.
pub struct Server {
    base: String,
    client: reqwest::blocking::Client,
}

impl Server {
    /// Builds a client for the server at `host:port`.
    #[must_use]
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            base: format!("http://{host}:{port}"),
            client: reqwest::blocking::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }
}

/// List all daemons.
pub fn list(server: &Server) -> Result<()> {
    let response = server
        .client
        .get(server.url("/"))
        .send()
        .context("failed to reach server")?;
    let daemons: Vec<Daemon> = decode(response)?;
    if daemons.is_empty() {
        println!("no daemons");
        return Ok(());
    }
    for daemon in &daemons {
        print_daemon(daemon);
    }
    Ok(())
}

/// Add a daemon, optionally under an explicit key.
pub fn add(server: &Server, cmd: &str, key: Option<&str>, dir: Option<&str>) -> Result<()> {
    let mut form = vec![("cmd", cmd)];
    if let Some(key) = key {
        form.push(("key", key));
    }
    if let Some(dir) = dir {
        form.push(("dir", dir));
    }
    let response = server
        .client
        .post(server.url("/"))
        .form(&form)
        .send()
        .context("failed to reach server")?;
    print_daemon(&decode(response)?);
    Ok(())
}

/// Remove a daemon.
pub fn remove(server: &Server, key: &str) -> Result<()> {
    let response = server
        .client
        .delete(server.url(&format!("/{key}")))
        .send()
        .context("failed to reach server")?;
    let _: serde_json::Value = decode(response)?;
    println!("{key} removed");
    Ok(())
}

/// Issue a lifecycle action (start/stop/pause/continue) and print the
/// resulting daemon.
pub fn action(server: &Server, key: &str, action: &str) -> Result<()> {
    let response = server
        .client
        .put(server.url(&format!("/{key}/{action}")))
        .send()
        .context("failed to reach server")?;
    print_daemon(&decode(response)?);
    Ok(())
}

/// Decodes a success body, or bails with the server's error message.
fn decode<T: DeserializeOwned>(response: reqwest::blocking::Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response.json().context("invalid server response");
    }
    let err: ApiError = response
        .json()
        .with_context(|| format!("server returned {status}"))?;
    bail!("{}", err.error);
}

fn print_daemon(daemon: &Daemon) {
    println!("{} ({})", daemon.key, daemon.status);
    println!("  cmd: {}", daemon.cmd);
    if !daemon.dir.is_empty() {
        println!("  dir: {}", daemon.dir);
    }
}
