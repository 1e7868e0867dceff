//! Quill CLI - operator commands
//!
//! Usage:
//!   quill check-config
//!   quill seed-user <username> <email> --admin
//!   quill prune-tokens

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use quill_api::{auth::RegisterRequest, state::AppState};
use quill_core::{AppConfig, PgStore, UserRole};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "quill")]
#[command(about = "Quill blogging service operator CLI")]
#[command(version)]
struct Cli {
    /// TOML configuration file; environment variables override it
    #[arg(long, global = true, env = "QUILL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and print it with secrets redacted
    CheckConfig,
    /// Create a verified account
    SeedUser {
        username: String,
        email: String,
        /// Read from QUILL_SEED_PASSWORD when omitted
        #[arg(long, env = "QUILL_SEED_PASSWORD", hide_env_values = true)]
        password: String,
        /// Also grant the admin role
        #[arg(long)]
        admin: bool,
    },
    /// Delete refresh-token rows that expired before a cutoff
    PruneTokens {
        /// RFC 3339 cutoff (default: now)
        #[arg(long)]
        before: Option<DateTime<Utc>>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = load_config(cli.config)?;

    match cli.command {
        Commands::CheckConfig => {
            config.validate().context("configuration is invalid")?;
            println!("{}", serde_json::to_string_pretty(&redacted(&config))?);
            println!("configuration OK");
        }
        Commands::SeedUser {
            username,
            email,
            password,
            admin,
        } => {
            let state = connect(config).await?;

            let mut roles = vec![UserRole::User.as_str().to_string()];
            if admin {
                roles.push(UserRole::Admin.as_str().to_string());
            }

            let user = state
                .sessions
                .create_account(
                    RegisterRequest {
                        username,
                        email,
                        password,
                    },
                    true,
                    roles,
                )
                .await
                .context("failed to create user")?;

            println!(
                "created user {} <{}> id={} roles={}",
                user.username,
                user.email,
                user.id,
                user.roles.join(",")
            );
        }
        Commands::PruneTokens { before } => {
            let before = before.unwrap_or_else(Utc::now);
            let state = connect(config).await?;

            let deleted = state
                .sessions
                .prune_expired(before)
                .await
                .context("failed to prune refresh tokens")?;

            println!("deleted {deleted} refresh token(s) expired before {before}");
        }
    }

    Ok(())
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    Ok(config)
}

async fn connect(config: AppConfig) -> anyhow::Result<AppState> {
    config.validate().context("configuration is invalid")?;

    let store = PgStore::connect(&config.database.url, config.database.pool_size)
        .await
        .context("failed to connect to database")?;
    store.migrate().await.context("failed to run migrations")?;

    Ok(AppState::with_postgres(config, store)?)
}

fn redacted(config: &AppConfig) -> AppConfig {
    let mut config = config.clone();
    config.auth.jwt_secret = "<redacted>".to_string();
    if let Some((scheme, rest)) = config.database.url.split_once("://") {
        if let Some((_, host)) = rest.rsplit_once('@') {
            config.database.url = format!("{scheme}://<redacted>@{host}");
        }
    }
    config
}
