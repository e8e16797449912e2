//! SQLBridge CLI
//!
//! Host for one SQLite execution context: pumps protocol messages over
//! stdio, or runs a single backup/restore flow against the snapshot store.

use clap::{Args, Parser, Subcommand};
use sqlbridge_core::config::{BridgeConfig, StorageConfig};
use sqlbridge_core::logging_facility::{self, Profile};
use std::path::PathBuf;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "sqlbridge")]
#[command(about = "SQLBridge - SQLite in an isolated execution context", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// TOML config file; flags below override its values
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Logical database name (the snapshot key)
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// Keep snapshots in this SQLite key-value file
    #[arg(long, global = true, conflicts_with_all = ["fs", "memory"])]
    pub sqlite: Option<PathBuf>,

    /// Keep snapshots as files under this directory
    #[arg(long, global = true, conflicts_with = "memory")]
    pub fs: Option<PathBuf>,

    /// Keep snapshots in memory only
    #[arg(long, global = true)]
    pub memory: bool,

    /// Logging profile: development or production
    #[arg(long, global = true, default_value = "production")]
    pub log: Profile,
}

impl GlobalArgs {
    /// Config file (or defaults) with command-line overrides applied
    pub fn resolve(&self) -> Result<BridgeConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => BridgeConfig::load(path)?,
            None => BridgeConfig::default(),
        };

        if let Some(database) = &self.database {
            config.database = database.clone();
        }
        if let Some(path) = &self.sqlite {
            config.storage = StorageConfig::Sqlite { path: path.clone() };
        } else if let Some(dir) = &self.fs {
            config.storage = StorageConfig::Fs { dir: dir.clone() };
        } else if self.memory {
            config.storage = StorageConfig::Memory;
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Answer newline-delimited JSON requests from stdin on stdout
    Serve,
    /// Write the stored database image to a file
    Export(commands::backup::ExportArgs),
    /// Replace the stored database with an image from a file
    Import(commands::backup::ImportArgs),
}

fn main() {
    let cli = Cli::parse();
    logging_facility::init(cli.global.log);

    let result = cli.global.resolve().and_then(|config| match cli.command {
        Commands::Serve => commands::serve::execute(config),
        Commands::Export(args) => commands::backup::export(config, args),
        Commands::Import(args) => commands::backup::import(config, args),
    });

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
