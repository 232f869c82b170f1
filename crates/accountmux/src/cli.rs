//! Command-line definitions.

use std::path::PathBuf;

use accountmux_core::ProviderKind;
use clap::{Parser, Subcommand};

/// Manage OAuth accounts for mail, calendar and storage providers.
#[derive(Debug, Parser)]
#[command(name = "accountmux", version)]
#[command(about = "Manage OAuth accounts for mail, calendar and storage providers")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Account registry location (overrides `ACCOUNTMUX_REGISTRY`)
    #[arg(long, global = true)]
    pub registry: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List configured accounts
    List {
        /// Include disabled accounts
        #[arg(long)]
        all: bool,
    },

    /// Add an account and stage its client secret file
    Add {
        /// Account id (letters, digits, '-' and '_')
        id: String,

        /// Provider kind: mail, calendar or storage
        provider: ProviderKind,

        /// Client secret file downloaded from the provider console
        secret: PathBuf,

        /// Display name (generated from the id when omitted)
        #[arg(long)]
        display_name: Option<String>,

        /// Make this the default account of its provider kind
        #[arg(long)]
        default: bool,

        /// Add the account disabled
        #[arg(long, conflicts_with = "default")]
        disabled: bool,
    },

    /// Change fields of an account
    Update {
        /// Account id
        id: String,

        /// New provider kind
        #[arg(long)]
        provider: Option<ProviderKind>,

        /// New display name
        #[arg(long)]
        display_name: Option<String>,

        /// New client secret location
        #[arg(long)]
        secret_path: Option<PathBuf>,

        /// New token state location
        #[arg(long)]
        token_path: Option<PathBuf>,
    },

    /// Remove an account and its stored credential
    Remove {
        /// Account id
        id: String,
    },

    /// Make an account the default of its provider kind
    SetDefault {
        /// Account id
        id: String,
    },

    /// Enable an account
    Enable {
        /// Account id
        id: String,
    },

    /// Disable an account (clears its default flag)
    Disable {
        /// Account id
        id: String,
    },

    /// Authorize an account, opening the browser if consent is needed
    Login {
        /// Account id
        id: String,
    },

    /// Delete the stored credential of an account
    Logout {
        /// Account id
        id: String,
    },

    /// Show every account with its stored credential state
    Status,
}
