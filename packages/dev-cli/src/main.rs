//! `gatekeeper-admin`: operator CLI for the SchedLock write-gate.
//!
//! Talks directly to the same SQLite database the server process owns,
//! reusing `gatekeeper_core`'s repositories rather than going over HTTP —
//! there is no admin HTTP surface in scope (spec §1 lists "the web
//! administration UI" as an external collaborator). This binary covers
//! the one operator workflow that has no other entry point: minting and
//! revoking api keys, and inspecting requests/audit history when a human
//! is debugging a stuck request.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gatekeeper_core::common::crypto::{fingerprint_api_key, generate_api_key_secret};
use gatekeeper_core::common::{ApiKeyId, RequestId};
use gatekeeper_core::domains::api_keys::{ApiKeyRepository, KeyConstraints};
use gatekeeper_core::domains::audit::AuditRepository;
use gatekeeper_core::domains::requests::{RequestRepository, RequestStatus};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

#[derive(Parser)]
#[command(name = "gatekeeper-admin")]
#[command(about = "Operator CLI for the SchedLock calendar write-gate")]
struct Cli {
    /// Path to the SQLite database file. Defaults to $DATABASE_PATH, then
    /// `schedlock.db`, matching `gatekeeper_core::config::Config`.
    #[arg(long, global = true)]
    database_path: Option<String>,

    /// HMAC pepper api-key fingerprints are computed under. Defaults to
    /// $API_KEY_PEPPER; required by any `key` subcommand.
    #[arg(long, global = true)]
    pepper: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage api keys.
    Key {
        #[command(subcommand)]
        command: KeyCommands,
    },
    /// Inspect requests.
    Request {
        #[command(subcommand)]
        command: RequestCommands,
    },
    /// Inspect the append-only audit log.
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Mint a new api key. The raw secret is printed exactly once.
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, value_parser = ["read", "write", "admin"])]
        tier: String,
        /// Key lifetime in days; omit for a key that never expires.
        #[arg(long)]
        expires_in_days: Option<i64>,
    },
    /// List every key (revoked and expired included).
    List,
    /// Show one key's full detail, including its constraints.
    Show { id: String },
    /// Revoke a key. Idempotent: revoking an already-revoked key reports
    /// "already revoked" rather than erroring.
    Revoke { id: String },
    /// Replace a key's constraints object wholesale (spec §3: "Replaced
    /// atomically"). `json` is either an inline JSON document or
    /// `@path/to/file.json`.
    SetConstraints { id: String, json: String },
}

#[derive(Subcommand)]
enum RequestCommands {
    /// List recent requests across all keys, optionally filtered by status.
    List {
        #[arg(long, value_parser = ["pending_approval", "change_requested", "approved", "executing", "completed", "failed", "denied", "expired", "cancelled"])]
        status: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Show one request's full detail, including payload and result.
    Show { id: String },
}

#[derive(Subcommand)]
enum AuditCommands {
    /// Most recent audit entries across the whole system.
    Tail {
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Audit entries for a single request, oldest first.
    ForRequest { request_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match cli.command {
        Commands::Key { command } => {
            let pool = connect(cli.database_path.as_deref()).await?;
            let pepper = resolve_pepper(cli.pepper.as_deref())?;
            run_key_command(command, pool, &pepper).await
        }
        Commands::Request { command } => {
            let pool = connect(cli.database_path.as_deref()).await?;
            run_request_command(command, pool).await
        }
        Commands::Audit { command } => {
            let pool = connect(cli.database_path.as_deref()).await?;
            run_audit_command(command, pool).await
        }
    }
}

/// Opens the same SQLite file the server uses and applies any migrations
/// that haven't run yet, so the CLI works against a brand-new database
/// without requiring the server to have started first.
async fn connect(database_path: Option<&str>) -> Result<SqlitePool> {
    let path = database_path
        .map(str::to_string)
        .or_else(|| std::env::var("DATABASE_PATH").ok())
        .unwrap_or_else(|| "schedlock.db".to_string());

    let pool = SqlitePoolOptions::new()
        .max_connections(3)
        .connect(&format!("sqlite://{path}?mode=rwc"))
        .await
        .with_context(|| format!("failed to open database at {path}"))?;

    sqlx::migrate!("../gatekeeper/migrations")
        .run(&pool)
        .await
        .context("failed to run database migrations")?;

    Ok(pool)
}

fn resolve_pepper(pepper: Option<&str>) -> Result<Vec<u8>> {
    pepper
        .map(str::to_string)
        .or_else(|| std::env::var("API_KEY_PEPPER").ok())
        .map(String::into_bytes)
        .context("API_KEY_PEPPER must be set (via --pepper or the environment) for key commands")
}

async fn run_key_command(command: KeyCommands, pool: SqlitePool, pepper: &[u8]) -> Result<()> {
    let keys = ApiKeyRepository::new(pool);

    match command {
        KeyCommands::Create { name, tier, expires_in_days } => {
            let raw_secret = generate_api_key_secret(&tier);
            let fingerprint = fingerprint_api_key(&raw_secret, pepper);
            let key_prefix = display_prefix(&raw_secret);
            let expires_at = expires_in_days.map(|days| chrono::Utc::now() + chrono::Duration::days(days));

            let key = keys
                .create(ApiKeyId::new(), &fingerprint, &key_prefix, &name, &tier, None, expires_at)
                .await?;

            println!("Created key {} ({}, tier={})", key.id, name, tier);
            println!();
            println!("  {raw_secret}");
            println!();
            println!("This secret is shown once and is not recoverable. Store it now.");
        }
        KeyCommands::List => {
            let all = keys.list().await?;
            if all.is_empty() {
                println!("No api keys.");
                return Ok(());
            }
            println!("{:<40} {:<20} {:<16} {:<6} {:<10} {}", "id", "name", "prefix", "tier", "status", "created_at");
            for key in all {
                println!(
                    "{:<40} {:<20} {:<16} {:<6} {:<10} {}",
                    key.id.to_string(),
                    truncate(&key.name, 20),
                    key.key_prefix,
                    key.tier.as_str(),
                    key_status(&key),
                    key.created_at.to_rfc3339(),
                );
            }
        }
        KeyCommands::Show { id } => {
            let id = parse_key_id(&id)?;
            let key = keys.find_by_id(id).await?.context("no such key")?;
            println!("id:          {}", key.id);
            println!("name:        {}", key.name);
            println!("prefix:      {}", key.key_prefix);
            println!("tier:        {}", key.tier.as_str());
            println!("status:      {}", key_status(&key));
            println!("created_at:  {}", key.created_at.to_rfc3339());
            println!("last_used:   {}", key.last_used_at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "never".into()));
            println!("expires_at:  {}", key.expires_at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "never".into()));
            println!("revoked_at:  {}", key.revoked_at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".into()));
            match key.constraints {
                Some(c) => println!("constraints: {}", serde_json::to_string_pretty(&c)?),
                None => println!("constraints: none (tier default applies)"),
            }
        }
        KeyCommands::Revoke { id } => {
            let id = parse_key_id(&id)?;
            if keys.revoke(id).await? {
                println!("Revoked {id}.");
            } else {
                println!("{id} was already revoked (or does not exist).");
            }
        }
        KeyCommands::SetConstraints { id, json } => {
            let id = parse_key_id(&id)?;
            let raw = if let Some(path) = json.strip_prefix('@') {
                std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read constraints file {path}"))?
            } else {
                json
            };
            let constraints: KeyConstraints =
                serde_json::from_str(&raw).context("constraints must be a valid KeyConstraints JSON document")?;
            let constraints_json = serde_json::to_string(&constraints)?;
            if keys.update_constraints(id, Some(&constraints_json)).await? {
                println!("Updated constraints for {id}.");
            } else {
                anyhow::bail!("no such key: {id}");
            }
        }
    }

    Ok(())
}

async fn run_request_command(command: RequestCommands, pool: SqlitePool) -> Result<()> {
    let requests = RequestRepository::new(pool);

    match command {
        RequestCommands::List { status, limit } => {
            let status = status.map(|s| s.parse::<RequestStatus>()).transpose()?;
            let rows = requests.list_recent(status, limit).await?;
            if rows.is_empty() {
                println!("No requests.");
                return Ok(());
            }
            println!("{:<40} {:<18} {:<16} {}", "id", "operation", "status", "created_at");
            for req in rows {
                println!(
                    "{:<40} {:<18} {:<16} {}",
                    req.id.to_string(),
                    req.operation.as_str(),
                    req.status.as_str(),
                    req.created_at.to_rfc3339(),
                );
            }
        }
        RequestCommands::Show { id } => {
            let id: RequestId = RequestId::parse(&id).context("malformed request id")?;
            let req = requests.find_by_id(id).await?.context("no such request")?;
            println!("id:           {}", req.id);
            println!("api_key_id:   {}", req.api_key_id);
            println!("operation:    {}", req.operation.as_str());
            println!("status:       {}", req.status.as_str());
            println!("created_at:   {}", req.created_at.to_rfc3339());
            println!("expires_at:   {}", req.expires_at.to_rfc3339());
            println!("decided_at:   {}", req.decided_at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".into()));
            println!("decided_by:   {}", req.decided_by.unwrap_or_else(|| "-".into()));
            println!("executed_at:  {}", req.executed_at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".into()));
            println!("retry_count:  {}", req.retry_count);
            println!("payload:      {}", serde_json::to_string_pretty(&req.payload)?);
            if let Some(result) = req.result {
                println!("result:       {}", serde_json::to_string_pretty(&result)?);
            }
            if let Some(error) = req.error {
                println!("error:        {error}");
            }
            if let Some(suggestion) = req.suggestion {
                println!("suggestion:   \"{}\" (by {} at {})", suggestion.text, suggestion.by, suggestion.at.to_rfc3339());
            }
        }
    }

    Ok(())
}

async fn run_audit_command(command: AuditCommands, pool: SqlitePool) -> Result<()> {
    let audit = AuditRepository::new(pool);

    match command {
        AuditCommands::Tail { limit } => {
            let entries = audit.recent(limit).await?;
            print_audit_entries(&entries);
        }
        AuditCommands::ForRequest { request_id } => {
            let id: RequestId = RequestId::parse(&request_id).context("malformed request id")?;
            let entries = audit.for_request(id).await?;
            print_audit_entries(&entries);
        }
    }

    Ok(())
}

fn print_audit_entries(entries: &[gatekeeper_core::domains::audit::AuditEntry]) {
    if entries.is_empty() {
        println!("No audit entries.");
        return;
    }
    for entry in entries {
        println!(
            "[{}] {:<28} actor={} request={} details={}",
            entry.timestamp.to_rfc3339(),
            entry.event_type,
            entry.actor,
            entry.request_id.map(|id| id.to_string()).unwrap_or_else(|| "-".into()),
            entry.details,
        );
    }
}

fn key_status(key: &gatekeeper_core::domains::api_keys::ApiKey) -> &'static str {
    let now = chrono::Utc::now();
    if key.is_revoked() {
        "revoked"
    } else if key.is_expired(now) {
        "expired"
    } else {
        "active"
    }
}

/// Non-secret prefix of a raw api-key secret shown in listings (spec §3:
/// "short display prefix"). `sk_write_4f2a1c…` keeps enough to recognize
/// a key at a glance without reconstructing it.
fn display_prefix(raw_secret: &str) -> String {
    let cut = raw_secret.len().min(13);
    format!("{}…", &raw_secret[..cut])
}

fn parse_key_id(s: &str) -> Result<ApiKeyId> {
    ApiKeyId::parse(s).context("malformed key id (expected key_<uuid>)")
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}…", &s[..max.saturating_sub(1)])
    }
}
