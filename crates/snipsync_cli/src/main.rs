//! Snipsync CLI
//!
//! Command-line front end for syncing a snippet library through a
//! directory-backed remote.
//!
//! # Commands
//!
//! - `init` - Create a device profile
//! - `sync` - Run one sync cycle
//! - `status` - Show the persisted sync status
//! - `verify` - Check a history log for malformed lines
//! - `dump-log` - Print history log entries
//! - `snapshot` - Print the state a history log replays to
//! - `reset` - Overwrite the remote with the local library
//! - `import` - Replace the local library with the remote one

mod commands;
mod profile;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Snippet library sync tools.
#[derive(Parser)]
#[command(name = "snipsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration directory holding the profile and sync state
    #[arg(global = true, short, long, default_value = ".snipsync")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a device profile
    Init {
        /// Directory acting as the remote bucket
        #[arg(long)]
        remote: PathBuf,

        /// Device tag (generated if omitted)
        #[arg(short, long)]
        device: Option<String>,

        /// Library file (defaults to library.json in the config directory)
        #[arg(short, long)]
        library: Option<PathBuf>,

        /// Replace an existing profile
        #[arg(long)]
        force: bool,
    },

    /// Run one sync cycle
    Sync,

    /// Show the persisted sync status
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check a history log for malformed lines
    Verify {
        /// Check the remote log and metadata instead of the baseline
        #[arg(short, long)]
        remote: bool,
    },

    /// Print history log entries
    DumpLog {
        /// Read the remote log instead of the baseline
        #[arg(short, long)]
        remote: bool,

        /// Maximum number of entries to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the state a history log replays to
    Snapshot {
        /// Read the remote log instead of the baseline
        #[arg(short, long)]
        remote: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Overwrite the remote with the local library
    Reset {
        /// Confirm the overwrite
        #[arg(long)]
        yes: bool,
    },

    /// Replace the local library with the remote one
    Import {
        /// Confirm discarding local changes
        #[arg(long)]
        yes: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = cli.config.as_path();
    match cli.command {
        Commands::Init {
            remote,
            device,
            library,
            force,
        } => commands::init::run(config, remote, device, library, force)?,
        Commands::Sync => commands::sync::run(config)?,
        Commands::Status { format } => commands::status::run(config, &format)?,
        Commands::Verify { remote } => commands::verify::run(config, remote)?,
        Commands::DumpLog {
            remote,
            limit,
            format,
        } => commands::dump_log::run(config, remote, &format, limit)?,
        Commands::Snapshot { remote, format } => {
            commands::snapshot::run(config, remote, &format)?
        }
        Commands::Reset { yes } => commands::reset::run(config, yes)?,
        Commands::Import { yes } => commands::import::run(config, yes)?,
        Commands::Version => {
            println!("snipsync v{}", env!("CARGO_PKG_VERSION"));
            println!("metadata version {}", snipsync_protocol::METADATA_VERSION);
        }
    }

    Ok(())
}
