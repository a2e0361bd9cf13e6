//! parley application binary - composition root.
//!
//! Ties together the parley crates into a single executable:
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Open the administrative SQLite database (migrations run on open)
//! 3. Run the requested administrative command, or build the query
//!    pipeline (generation command -> SQLite agent -> orchestrator) for
//!    `ask` and `feedback`
//! 4. Print the result as JSON on stdout; logs go to stderr

mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::json;

use parley_chat::{
    CommandGenerator, Orchestrator, SchemaResolver, SqliteAgent, TextGenerator, TimeoutGenerator,
};
use parley_core::config::ParleyConfig;
use parley_core::error::ParleyError;
use parley_core::schema::SchemaDocument;
use parley_core::types::User;
use parley_storage::{Database, SchemaRepository, TenantRepository};

use cli::{resolve_token, CliArgs, Command};

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Expand ~ to home directory in a path string.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if data_dir.starts_with("~/") || data_dir.starts_with("~\\") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(&data_dir[2..])
    } else {
        PathBuf::from(data_dir)
    }
}

fn print_json(value: &impl serde::Serialize) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_schema_file(path: &Path) -> AppResult<serde_json::Value> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn authenticate(
    registry: &TenantRepository,
    tenant: &str,
    token: &Option<String>,
) -> AppResult<User> {
    let token = resolve_token(token).ok_or_else(|| {
        ParleyError::InvalidCredentials("no token given (use --token or PARLEY_TOKEN)".to_string())
    })?;
    Ok(registry.authenticate(tenant, &token)?)
}

/// Build the query pipeline from the `[generation]` and `[execution]` sections.
fn build_orchestrator(db: Arc<Database>, config: &ParleyConfig) -> AppResult<Orchestrator> {
    let generator: Arc<dyn TextGenerator> =
        Arc::new(CommandGenerator::from_config(&config.generation)?);
    let agent_generator: Arc<dyn TextGenerator> = Arc::new(TimeoutGenerator::new(
        Arc::clone(&generator),
        Duration::from_secs(config.generation.timeout_secs),
    ));
    let agent = Arc::new(SqliteAgent::new(agent_generator, config.execution.max_rows));
    Ok(Orchestrator::new(db, generator, agent, config))
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = ParleyConfig::load_or_default(&config_file);
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }

    // Tracing.
    let filter = match args.resolve_log_level() {
        Some(level) => tracing_subscriber::EnvFilter::new(level),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("Starting parley v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!(path = %config_file.display(), "Configuration loaded");

    // Storage.
    let data_dir = resolve_data_dir(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    let db_path = data_dir.join("parley.db");
    let db = Arc::new(Database::new(&db_path)?);
    tracing::debug!(path = %db_path.display(), "SQLite database opened");

    let registry = TenantRepository::new(Arc::clone(&db));

    match args.command {
        Command::Init => {
            if !config_file.exists() {
                if let Some(parent) = config_file.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                config.save(&config_file)?;
            }
            print_json(&json!({
                "config": config_file.display().to_string(),
                "database": db_path.display().to_string(),
            }))?;
        }

        Command::AddTenant { name } => {
            let tenant = registry.ensure_tenant(&name)?;
            print_json(&tenant)?;
        }

        Command::AddDatabase {
            tenant,
            name,
            data_source,
            schema,
        } => {
            let data_source = std::fs::canonicalize(&data_source).unwrap_or_else(|_| {
                tracing::warn!(path = %data_source.display(), "Data source does not exist yet");
                data_source.clone()
            });
            let schema = match schema {
                Some(path) => Some(SchemaDocument::from_json(&read_schema_file(&path)?)?),
                None => None,
            };
            let database =
                registry.register_database(&tenant, &name, &data_source, schema.as_ref())?;
            print_json(&database)?;
        }

        Command::SetSchema {
            tenant,
            database,
            file,
        } => {
            let resolver = SchemaResolver::new(SchemaRepository::new(Arc::clone(&db)));
            resolver.set(&tenant, &database, &read_schema_file(&file)?)?;
            print_json(&resolver.resolve(&tenant, &database)?)?;
        }

        Command::ListDatabases { tenant } => {
            print_json(&registry.list_databases(&tenant)?)?;
        }

        Command::AddUser { tenant, name } => {
            let (user, token) = registry.create_user(&tenant, &name)?;
            print_json(&json!({ "user": user, "token": token }))?;
        }

        Command::Ask {
            tenant,
            database,
            question,
            token,
        } => {
            let user = authenticate(&registry, &tenant, &token)?;
            let orchestrator = build_orchestrator(Arc::clone(&db), &config)?;
            let response = orchestrator
                .submit_question(&tenant, &database, &user.name, &question)
                .await?;
            print_json(&response)?;
        }

        Command::Feedback {
            tenant,
            database,
            feedback,
            token,
        } => {
            let user = authenticate(&registry, &tenant, &token)?;
            let orchestrator = build_orchestrator(Arc::clone(&db), &config)?;
            let response = orchestrator
                .submit_feedback(&tenant, &database, &user.name, &feedback)
                .await?;
            print_json(&response)?;
        }

        Command::History { tenant, token } => {
            let user = authenticate(&registry, &tenant, &token)?;
            let history = parley_storage::TurnRepository::new(Arc::clone(&db))
                .list(&tenant, &user.name)?;
            print_json(&history)?;
        }
    }

    Ok(())
}
