mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use firegate_api::{FiregateError, IssuerResolver};
use firegate_core::{
    ProfileCatalog, default_config_dir, load_catalog_from_dir, write_default_config_file,
};

use crate::commands::keys;
use crate::commands::verify;

#[derive(Debug, Parser)]
#[command(name = "firegate", about = "Verify Firebase-style identity tokens")]
struct Cli {
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write a default profiles.toml into the config dir
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Issuer profiles
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Public key sets
    Keys {
        #[command(subcommand)]
        command: keys::KeysCommands,
    },
    /// Verify a token and print its subject and claims
    Verify(verify::VerifyArgs),
}

#[derive(Debug, Subcommand)]
enum ProfileCommands {
    List,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg_dir = cli.config_dir.clone().unwrap_or_else(default_config_dir);

    match cli.command {
        Commands::Init { force } => {
            let path = write_default_config_file(&cfg_dir, force)?;
            pout(
                cli.json,
                serde_json::json!({"message":"init complete","config_file":path}),
                &format!("Init complete: {}", path.display()),
            )?;
        }
        Commands::Profile { command } => match command {
            ProfileCommands::List => {
                let catalog = load_catalog(&cfg_dir)?;
                let mut lines = Vec::new();
                let mut rows = Vec::new();
                for id in catalog.profiles.keys() {
                    let issuer = catalog.resolve_issuer(id)?;
                    lines.push(format!("{id}\t{issuer}"));
                    rows.push(serde_json::json!({"profile":id,"issuer":issuer}));
                }
                let text = if lines.is_empty() {
                    "No profiles configured".to_string()
                } else {
                    lines.join("\n")
                };
                pout(cli.json, serde_json::Value::Array(rows), &text)?;
            }
        },
        Commands::Keys { command } => {
            let catalog = load_catalog(&cfg_dir)?;
            keys::run(command, &catalog, cli.json)?;
        }
        Commands::Verify(args) => {
            let catalog = load_catalog(&cfg_dir)?;
            let accepted = verify::run(args, catalog, cli.json)?;
            if !accepted {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// A missing config file is fine; a broken one is not.
fn load_catalog(dir: &std::path::Path) -> anyhow::Result<ProfileCatalog> {
    match load_catalog_from_dir(dir) {
        Ok(catalog) => Ok(catalog),
        Err(FiregateError::NotFound(msg)) => {
            tracing::debug!(%msg, "no config file, using defaults");
            Ok(ProfileCatalog::default())
        }
        Err(e) => Err(e.into()),
    }
}

pub fn pout(json_mode: bool, value: serde_json::Value, text: &str) -> anyhow::Result<()> {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{text}");
    }
    Ok(())
}
