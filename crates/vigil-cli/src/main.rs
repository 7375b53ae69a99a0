//! vigil - command-line client for the vigil daemon supervisor.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::daemon::{self, Server};

/// vigil - remote daemon supervisor client
#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(long, default_value_t = 8666)]
    port: u16,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List all daemons
    #[command(alias = "ls")]
    List,

    /// Add a daemon
    Add {
        /// Command line to supervise
        cmd: String,

        /// Explicit key for the new daemon
        #[arg(long)]
        key: Option<String>,

        /// Working directory for the daemon
        #[arg(long)]
        dir: Option<String>,
    },

    /// Remove a daemon (stop it first)
    Remove {
        /// Daemon key
        key: String,
    },

    /// Start a daemon
    Start {
        /// Daemon key
        key: String,
    },

    /// Stop a daemon
    Stop {
        /// Daemon key
        key: String,
    },

    /// Pause a daemon
    Pause {
        /// Daemon key
        key: String,
    },

    /// Continue a paused daemon
    Continue {
        /// Daemon key
        key: String,
    },

    /// Print client version
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let server = Server::new(&cli.host, cli.port);

    match cli.command {
        Commands::List => daemon::list(&server),
        Commands::Add { cmd, key, dir } => {
            daemon::add(&server, &cmd, key.as_deref(), dir.as_deref())
        },
        Commands::Remove { key } => daemon::remove(&server, &key),
        Commands::Start { key } => daemon::action(&server, &key, "start"),
        Commands::Stop { key } => daemon::action(&server, &key, "stop"),
        Commands::Pause { key } => daemon::action(&server, &key, "pause"),
        Commands::Continue { key } => daemon::action(&server, &key, "continue"),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        },
    }
}
