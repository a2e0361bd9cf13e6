//! CLI argument definitions for the parley application.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// parley: ask questions about your data in plain language.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the administrative database.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a default config file (if missing) and create the data directory.
    Init,

    /// Create a tenant.
    AddTenant { name: String },

    /// Register a logical database for a tenant, replacing any existing binding.
    AddDatabase {
        tenant: String,
        name: String,
        /// SQLite file holding the tenant's data.
        data_source: PathBuf,
        /// JSON file with the semantic schema.
        #[arg(long)]
        schema: Option<PathBuf>,
    },

    /// Replace the semantic schema of a logical database.
    SetSchema {
        tenant: String,
        database: String,
        /// JSON file with the semantic schema.
        file: PathBuf,
    },

    /// List a tenant's logical databases.
    ListDatabases { tenant: String },

    /// Create a user and print its access token.
    AddUser { tenant: String, name: String },

    /// Ask a question about a logical database.
    Ask {
        tenant: String,
        database: String,
        question: String,
        /// User token (falls back to PARLEY_TOKEN).
        #[arg(long)]
        token: Option<String>,
    },

    /// Give feedback on the last explanation.
    Feedback {
        tenant: String,
        database: String,
        feedback: String,
        /// User token (falls back to PARLEY_TOKEN).
        #[arg(long)]
        token: Option<String>,
    },

    /// Print the conversation history of a user.
    History {
        tenant: String,
        /// User token (falls back to PARLEY_TOKEN).
        #[arg(long)]
        token: Option<String>,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > PARLEY_CONFIG env var > platform default (~/.parley/config.toml).
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("PARLEY_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the data directory path.
    ///
    /// Priority: --data-dir flag > config file value.
    /// Returns `None` if not overridden (use config default).
    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    /// Returns `None` if not overridden.
    pub fn resolve_log_level(&self) -> Option<String> {
        self.log_level.clone()
    }
}

/// Resolve a user token: --token flag > PARLEY_TOKEN env var.
pub fn resolve_token(token: &Option<String>) -> Option<String> {
    token
        .clone()
        .or_else(|| std::env::var("PARLEY_TOKEN").ok())
        .filter(|t| !t.trim().is_empty())
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".parley").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".parley").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ask() {
        let args = CliArgs::try_parse_from([
            "parley",
            "ask",
            "acme",
            "sales",
            "How many orders last month?",
            "--token",
            "abc",
        ])
        .unwrap();
        match args.command {
            Command::Ask {
                tenant,
                database,
                question,
                token,
            } => {
                assert_eq!(tenant, "acme");
                assert_eq!(database, "sales");
                assert_eq!(question, "How many orders last month?");
                assert_eq!(token.as_deref(), Some("abc"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = CliArgs::try_parse_from([
            "parley",
            "add-tenant",
            "acme",
            "--config",
            "/tmp/parley.toml",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/parley.toml"));
        assert_eq!(args.resolve_log_level().as_deref(), Some("debug"));
        assert!(args.resolve_data_dir().is_none());
    }

    #[test]
    fn test_add_database_with_schema() {
        let args = CliArgs::try_parse_from([
            "parley",
            "add-database",
            "acme",
            "sales",
            "/data/sales.db",
            "--schema",
            "schema.json",
        ])
        .unwrap();
        assert!(matches!(
            args.command,
            Command::AddDatabase { schema: Some(_), .. }
        ));
    }

    #[test]
    fn test_missing_subcommand_is_error() {
        assert!(CliArgs::try_parse_from(["parley"]).is_err());
    }

    #[test]
    fn test_resolve_token_prefers_flag() {
        assert_eq!(
            resolve_token(&Some("flag-token".to_string())).as_deref(),
            Some("flag-token")
        );
    }
}
