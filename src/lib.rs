//! AndroSH: isolated Linux distros on a locked-down Android device.
//!
//! Each instance is an Alpine root filesystem extracted under a base
//! directory (by default `/data/local/tmp/AndroSH/<name>`) and started through
//! proot. The calling app cannot write there itself, so every filesystem
//! operation goes through Shizuku's privileged `rish` shell.
//!
//! # Architecture
//!
//! - **Registry** ([`core::registry`]): SQLite key / sub-key store recording
//!   each instance under its root path, plus the global `done` flag.
//! - **Execution bridge** ([`distro::bridge`]): runs shell commands through
//!   the privileged loader and captures the result.
//! - **Pipeline** ([`distro::pipeline`]): download, verify, stage, extract,
//!   configure and record an instance.
//!
//! # Examples
//!
//! ```bash
//! androsh setup --name alpha
//! androsh launch alpha
//! androsh list
//! androsh clean alpha
//! androsh remove alpha --force
//! ```

pub mod core;
pub mod distro;

use crate::core::{config::Config, error, output, registry::Registry};
use crate::distro::{
    bridge::RishBridge,
    download::HttpDownloader,
    pipeline::{Outcome, Pipeline},
};

use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[clap(
    name = "androsh",
    version = env!("CARGO_PKG_VERSION"),
    about = "Provision and run Linux distros through Shizuku"
)]
pub struct Cli {
    /// Verbose logging (overridden by RUST_LOG).
    #[clap(short, long, global = true)]
    pub verbose: bool,
    /// Parent directory of all instances.
    #[clap(long, global = true, env = "ANDROSH_BASE_DIR")]
    pub base_dir: Option<PathBuf>,
    /// Config file (defaults to <home>/config.toml).
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download, verify and extract a distro into a new instance
    Setup {
        /// Instance name (defaults to the configured default name).
        #[clap(long)]
        name: Option<String>,
        /// Provision again even if the instance already exists.
        #[clap(long)]
        resetup: bool,
    },
    /// Delete an instance and its registry record
    Remove {
        name: String,
        /// Do not ask for confirmation.
        #[clap(short, long)]
        force: bool,
    },
    /// Open a shell in an instance
    Launch { name: String },
    /// Wipe an instance's temporary directory
    Clean { name: String },
    /// List provisioned instances
    List {
        /// Emit JSON instead of a table.
        #[clap(long)]
        json: bool,
    },
    /// Show registry state and resolved paths
    Status,
}

fn prompt_confirm(instance: &Path) -> bool {
    print!("Remove {} and all its files? [y/N] ", instance.display());
    let _ = io::stdout().flush();
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn open_registry(config: &Config) -> Result<Registry, error::AndroshError> {
    let db_path = config.db_path();
    Registry::open(&db_path).map_err(|e| {
        error::AndroshError::Configuration(format!(
            "cannot open registry at {}: {}",
            db_path.display(),
            e
        ))
    })
}

pub fn run(cli: Cli) -> Result<(), error::AndroshError> {
    let home = crate::core::config::home_dir();
    let mut config = Config::load(&home, cli.config.as_deref())?;
    if let Some(base_dir) = cli.base_dir {
        config.base_dir = base_dir;
        config.validate()?;
    }
    let registry = open_registry(&config)?;

    match cli.command {
        Command::List { json } => {
            let (keys, subkeys) = registry.count();
            tracing::debug!(keys, subkeys, "registry totals");
            let rows = output::instance_rows(&registry.fetch_all());
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                print!("{}", output::render_instance_table(&rows));
            }
            return Ok(());
        }
        Command::Status => {
            let (keys, subkeys) = registry.count();
            println!("setup done:  {}", registry.is_setup_done());
            println!(
                "registry:    {} ({} keys, {} sub-keys)",
                registry.path().display(),
                keys,
                subkeys
            );
            println!("base dir:    {}", config.base_dir.display());
            println!("downloads:   {}", config.downloads_dir.display());
            println!("assets:      {}", config.assets_dir().display());
            return Ok(());
        }
        _ => {}
    }

    let bridge = RishBridge::new(config.bridge.clone(), &config.assets_dir());
    let downloader = HttpDownloader::new()?;
    let pipeline = Pipeline::new(&config, &registry, &bridge, &downloader);

    match cli.command {
        Command::Setup { name, resetup } => {
            let name = name.unwrap_or_else(|| config.default_name.clone());
            output::divider();
            pipeline.setup(&name, resetup)?;
        }
        Command::Launch { name } => {
            pipeline.launch(&name)?;
        }
        Command::Remove { name, force } => {
            let mut confirm = prompt_confirm;
            if pipeline.remove(&name, force, &mut confirm)? == Outcome::Aborted {
                output::info("Aborted, nothing was removed.");
            }
        }
        Command::Clean { name } => {
            pipeline.clean(&name)?;
        }
        Command::List { .. } | Command::Status => {}
    }
    Ok(())
}
