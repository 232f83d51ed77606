//! # sync-cli
//!
//! CLI tool for exercising the mxsync engine.
//!
//! The engine runs against a local SQLite cache and an in-process mock
//! remote service.
//!
//! ## Commands
//!
//! - `register`: Register a resource and cache it
//! - `remove`: Remove a resource remotely and from the cache
//! - `list`: List an owner's cached resources
//! - `timeline`: Seed a stream and print its live window
//!
//! ## Example
//!
//! ```bash
//! # Register a push key
//! mxsync --db cache.db register --owner @alice:example.org --key pk1 --app im.app \
//!     --url https://push.example.org/notify
//!
//! # List what is cached
//! mxsync --db cache.db list --owner @alice:example.org
//!
//! # Remove it, with the remote failing once and a retry
//! mxsync --db cache.db --fail-remote remove --owner @alice:example.org --key pk1 --app im.app --retry
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mxsync_client::{EngineConfig, MockRemote, RemoteError, SyncClient};
use std::path::PathBuf;

mod commands;
mod logging;

use commands::{list, register, remove, timeline, Client};

/// CLI tool for exercising the mxsync engine.
#[derive(Parser, Debug)]
#[command(name = "mxsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// SQLite cache file (overrides the config file; in-memory if neither)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Make the mock remote fail its next call
    #[arg(long, global = true)]
    fail_remote: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Arguments naming one resource.
#[derive(clap::Args, Debug)]
pub struct ResourceArgs {
    /// Owning account
    #[arg(long)]
    pub owner: String,

    /// Resource key (push key)
    #[arg(long)]
    pub key: String,

    /// Application identity
    #[arg(long)]
    pub app: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register a resource and cache it
    Register {
        #[command(flatten)]
        resource: ResourceArgs,

        /// Preferred language
        #[arg(long, default_value = "en")]
        lang: String,

        /// Application display name
        #[arg(long)]
        app_name: Option<String>,

        /// Device display name
        #[arg(long)]
        device_name: Option<String>,

        /// Profile tag
        #[arg(long)]
        profile_tag: Option<String>,

        /// Delivery endpoint
        #[arg(long)]
        url: Option<String>,

        /// Delivery format
        #[arg(long)]
        format: Option<String>,

        /// Resource kind
        #[arg(long, default_value = mxsync_types::DEFAULT_RESOURCE_KIND)]
        kind: String,

        /// Keep other registrations with the same key
        #[arg(long)]
        append: bool,
    },

    /// Remove a resource remotely and from the cache
    Remove {
        #[command(flatten)]
        resource: ResourceArgs,

        /// Retry retryable failures using the configured policy
        #[arg(long)]
        retry: bool,
    },

    /// List an owner's cached resources
    List {
        /// Owning account
        #[arg(long)]
        owner: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Seed a stream with events and print its live window
    Timeline {
        /// Stream identity
        #[arg(long)]
        stream: String,

        /// Number of events to seed
        #[arg(long, default_value = "10")]
        events: usize,

        /// Number of "load more" requests before printing
        #[arg(long, default_value = "0")]
        load_more: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(db) = cli.db {
        config.storage.database = Some(db);
    }

    let remote = MockRemote::new();
    if cli.fail_remote {
        remote.fail_next(RemoteError::Network(
            "remote unavailable (--fail-remote)".to_string(),
        ));
    }

    let client: Client = SyncClient::open(config, remote)
        .await
        .context("Failed to open cache")?;

    match cli.command {
        Commands::Register {
            resource,
            lang,
            app_name,
            device_name,
            profile_tag,
            url,
            format,
            kind,
            append,
        } => {
            let request = register::Request {
                lang,
                app_name,
                device_name,
                profile_tag,
                url,
                format,
                kind,
                append,
            };
            register::run(&client, &resource, request).await?;
        }
        Commands::Remove { resource, retry } => {
            remove::run(&client, &resource, retry).await?;
        }
        Commands::List { owner, json } => {
            list::run(&client, &owner, json).await?;
        }
        Commands::Timeline {
            stream,
            events,
            load_more,
        } => {
            timeline::run(&client, &stream, events, load_more).await?;
        }
    }

    Ok(())
}
