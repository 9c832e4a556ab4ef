//! Warden administration CLI.
//!
//! Registers and manages OAuth clients and inspects issued tokens.
//! Command output is JSON on stdout; logs go to stderr.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use warden_core::ScopeSet;
use warden_core::config;
use warden_core::tracing_init::init_tracing;
use warden_crypto::SecureTokenGenerator;
use warden_provider::storage::{Client, ClientChanges, ProviderDatabase, TokenFilter};
use warden_provider::{ClientRegistration, Provider};

#[derive(Parser, Debug)]
#[command(name = "warden-admin")]
#[command(version, about = "Warden OAuth provider administration")]
struct Args {
    /// Path to SQLite database file.
    #[arg(long, env = "WARDEN_DATABASE_PATH")]
    db_path: Option<PathBuf>,

    /// Extra config file layered over the global settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output logs as JSON.
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a new client and print its credentials.
    Register {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        link: Option<String>,
        #[arg(long)]
        image_url: Option<String>,
        #[arg(long)]
        redirect_uri: Option<String>,
        /// Allowed scope, comma or space separated.
        #[arg(long, default_value = "")]
        scope: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List all clients.
    List,
    /// Show a client (by ID, display name or link) with token counts.
    Show { client: String },
    /// Change a client's fields.
    Update {
        client: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        link: Option<String>,
        #[arg(long)]
        image_url: Option<String>,
        #[arg(long)]
        redirect_uri: Option<String>,
        #[arg(long)]
        scope: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Revoke a client and everything it issued.
    Revoke { client: String },
    /// Delete a client and everything it owns.
    Delete { client: String },
    /// Inspect access tokens.
    Tokens {
        #[command(subcommand)]
        action: TokenAction,
    },
    /// Tokens granted and revoked per day.
    History {
        #[arg(long)]
        client: Option<String>,
        #[arg(long, default_value_t = 60)]
        days: i64,
    },
}

#[derive(Subcommand, Debug)]
enum TokenAction {
    /// Count tokens.
    Count {
        #[arg(long)]
        client: Option<String>,
        /// Only tokens created in the last N days.
        #[arg(long)]
        days: Option<i64>,
        /// `true` for revoked only, `false` for non-revoked only.
        #[arg(long)]
        revoked: Option<bool>,
    },
    /// List a client's tokens.
    List {
        client: String,
        #[arg(long, default_value_t = 0)]
        offset: u32,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// Revoke a single token.
    Revoke { token: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = config::load_config(args.config.as_deref())?;

    init_tracing(
        &format!("warden_provider={}", config.log_level),
        args.log_json,
    );

    let db_path = args
        .db_path
        .clone()
        .or_else(|| config.storage.database_path.clone())
        .map_or_else(default_db_path, Ok)?;
    info!(path = %db_path.display(), "Opening provider database");
    let db = ProviderDatabase::open_with(&db_path, &config.storage).await?;

    let provider = Provider::new(
        db,
        Arc::new(SecureTokenGenerator::new()),
        config.credentials.clone(),
    );

    run(&provider, args.command).await
}

async fn run(provider: &Provider, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Register {
            name,
            link,
            image_url,
            redirect_uri,
            scope,
            notes,
        } => {
            let client = provider
                .clients
                .register(ClientRegistration {
                    display_name: name,
                    link,
                    image_url,
                    redirect_uri,
                    scope: ScopeSet::parse(&scope),
                    notes,
                })
                .await?;
            print_json(&client)
        }
        Command::List => print_json(&provider.clients.list().await?),
        Command::Show { client } => {
            let client = resolve_client(provider, &client).await?;
            let count = |revoked| TokenFilter {
                client_id: Some(client.id.clone()),
                revoked: Some(revoked),
                days: None,
            };
            let active = provider.tokens.count(&count(false)).await?;
            let revoked = provider.tokens.count(&count(true)).await?;
            print_json(&ClientReport {
                client: &client,
                active_tokens: active,
                revoked_tokens: revoked,
            })
        }
        Command::Update {
            client,
            name,
            link,
            image_url,
            redirect_uri,
            scope,
            notes,
        } => {
            let client = resolve_client(provider, &client).await?;
            let changes = ClientChanges {
                display_name: name,
                link,
                image_url,
                redirect_uri,
                notes,
                scope: scope.as_deref().map(ScopeSet::parse),
            };
            print_json(&provider.clients.update(&client.id, changes).await?)
        }
        Command::Revoke { client } => {
            let client = resolve_client(provider, &client).await?;
            print_json(&provider.clients.revoke(&client.id).await?)
        }
        Command::Delete { client } => {
            let client = resolve_client(provider, &client).await?;
            provider.clients.delete(&client.id).await?;
            print_json(&serde_json::json!({ "deleted": client.id }))
        }
        Command::Tokens { action } => run_tokens(provider, action).await,
        Command::History { client, days } => {
            let client_id = match client {
                Some(key) => Some(resolve_client(provider, &key).await?.id),
                None => None,
            };
            print_json(
                &provider
                    .tokens
                    .historical(Some(days), client_id.as_deref())
                    .await?,
            )
        }
    }
}

async fn run_tokens(provider: &Provider, action: TokenAction) -> anyhow::Result<()> {
    match action {
        TokenAction::Count {
            client,
            days,
            revoked,
        } => {
            let client_id = match client {
                Some(key) => Some(resolve_client(provider, &key).await?.id),
                None => None,
            };
            let count = provider
                .tokens
                .count(&TokenFilter {
                    days,
                    revoked,
                    client_id,
                })
                .await?;
            print_json(&serde_json::json!({ "count": count }))
        }
        TokenAction::List {
            client,
            offset,
            limit,
        } => {
            let client = resolve_client(provider, &client).await?;
            print_json(&provider.tokens.for_client(&client.id, offset, limit).await?)
        }
        TokenAction::Revoke { token } => {
            provider.tokens.revoke(&token).await?;
            print_json(&serde_json::json!({ "revoked": true }))
        }
    }
}

#[derive(Serialize)]
struct ClientReport<'a> {
    client: &'a Client,
    active_tokens: i64,
    revoked_tokens: i64,
}

async fn resolve_client(provider: &Provider, key: &str) -> anyhow::Result<Client> {
    provider
        .clients
        .lookup(key)
        .await?
        .ok_or_else(|| anyhow::anyhow!("No client matches {key:?}"))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    if let Some(path) = config::database_path() {
        return Ok(path);
    }
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".warden").join("warden.db"))
}
