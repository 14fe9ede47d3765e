use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "keystash",
    about = "Password-encrypted key and wallet store",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Store file to use instead of the configured one.
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,
    /// Password for secret operations; falls back to KEYSTASH_PASSWORD.
    #[arg(long, global = true)]
    pub password: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create the store file if it does not exist yet.
    Init,
    /// List record IDs.
    List,
    /// Decrypt a record and print its secret payload.
    Get { id: String },
    /// Encrypt a JSON payload and save it under an ID.
    Put { id: String, json: String },
    /// Read or write unencrypted record data.
    #[command(subcommand)]
    Public(PublicCommand),
    /// Delete a record.
    Remove { id: String },
    /// Print version and exit.
    Version,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum PublicCommand {
    /// Print a record's public payload.
    Get { id: String },
    /// Replace a record's public payload with JSON.
    Set { id: String, json: String },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}
