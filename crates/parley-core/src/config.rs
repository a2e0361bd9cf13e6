use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ParleyError, Result};

/// Top-level configuration for parley.
///
/// Loaded from `~/.parley/config.toml` by default. Each section corresponds
/// to one concern of the query pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl ParleyConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ParleyConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ParleyError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory holding the administrative SQLite database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.parley/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Conversational memory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Estimated-token budget of the context window fed to each stage.
    pub token_budget: usize,
    /// Budget for the history given to reformulation. `None` uses the full history.
    pub reformulation_token_budget: Option<usize>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_budget: 2000,
            reformulation_token_budget: None,
        }
    }
}

/// Text-generation capability settings.
///
/// The capability is an external program: the prompt is written to its
/// stdin and its stdout is taken as the generated text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Program to run. Empty means generation is not configured.
    pub command: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Seconds to wait for one generation before giving up.
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            args: vec![],
            timeout_secs: 60,
        }
    }
}

/// Structured-query execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Seconds to wait for one agent run before treating it as failed.
    pub timeout_secs: u64,
    /// Maximum rows rendered into a query result.
    pub max_rows: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            max_rows: 200,
        }
    }
}

/// Request validation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Maximum length of a question or feedback, in characters.
    pub max_question_length: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_question_length: 2000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = ParleyConfig::default();
        assert_eq!(config.general.data_dir, "~/.parley/data");
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.context.token_budget, 2000);
        assert!(config.context.reformulation_token_budget.is_none());
        assert!(config.generation.command.is_empty());
        assert_eq!(config.generation.timeout_secs, 60);
        assert_eq!(config.execution.timeout_secs, 60);
        assert_eq!(config.execution.max_rows, 200);
        assert_eq!(config.chat.max_question_length, 2000);
    }

    #[test]
    fn test_config_load_partial_toml() {
        let file = create_temp_config(
            r#"
[context]
token_budget = 500
reformulation_token_budget = 4000

[generation]
command = "llm"
args = ["-m", "gemini-2.5-flash"]
"#,
        );
        let config = ParleyConfig::load(file.path()).unwrap();
        assert_eq!(config.context.token_budget, 500);
        assert_eq!(config.context.reformulation_token_budget, Some(4000));
        assert_eq!(config.generation.command, "llm");
        assert_eq!(config.generation.args, vec!["-m", "gemini-2.5-flash"]);
        // Unspecified fields keep their defaults.
        assert_eq!(config.generation.timeout_secs, 60);
        assert_eq!(config.execution.max_rows, 200);
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let file = create_temp_config("this is {{ not valid TOML");
        let result = ParleyConfig::load(file.path());
        assert!(matches!(result, Err(ParleyError::Config(_))));
    }

    #[test]
    fn test_config_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = ParleyConfig::load_or_default(&dir.path().join("absent.toml"));
        assert_eq!(config.context.token_budget, 2000);
    }

    #[test]
    fn test_config_save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("dir").join("config.toml");

        let mut config = ParleyConfig::default();
        config.execution.max_rows = 25;
        config.save(&path).unwrap();

        assert!(path.exists());
        let reloaded = ParleyConfig::load(&path).unwrap();
        assert_eq!(reloaded.execution.max_rows, 25);
        assert_eq!(reloaded.general.log_level, "info");
    }

    #[test]
    fn test_config_empty_toml_uses_all_defaults() {
        let file = create_temp_config("");
        let config = ParleyConfig::load(file.path()).unwrap();
        assert_eq!(config.general.data_dir, "~/.parley/data");
        assert_eq!(config.chat.max_question_length, 2000);
    }
}
