//! Command-line interface definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Conversational grant matching service
#[derive(Parser, Debug)]
#[command(name = "grantflow")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file path (overrides config and GRANTFLOW_DB)
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    /// Increase log verbosity (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP API server
    Serve {
        /// Bind address (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Load grant records from a JSON file into the corpus
    SeedGrants {
        /// Path to a JSON array of grant records
        file: PathBuf,
    },
}
