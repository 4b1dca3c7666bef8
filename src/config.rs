use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::session::TurnMode;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub connection_string: String,
    pub pool_size: usize,
    /// Upper bound on rows fetched for a single generated query.
    pub max_rows: usize,
    /// Create and populate the `jobs` table when it is missing or empty.
    pub seed_demo_data: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    OpenAi,
    Ollama,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Selectable models; the first one is the default.
    pub models: Vec<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Name of the environment variable holding the API key.
    pub api_key_env: Option<String>,
    pub api_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmConfig {
    pub default_provider: String,
    pub default_mode: TurnMode,
    pub providers: BTreeMap<String, ProviderConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub web: WebConfig,
    pub llm: LlmConfig,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to the DuckDB database file
    #[arg(long, value_name = "FILE")]
    pub database: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Seed the demo database and exit without starting the server
    #[arg(long)]
    pub seed_only: bool,
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        // Built-in defaults are the lowest layer
        let mut config_builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

        // Add configuration from file if specified
        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            // Check for config in default locations
            let default_locations = vec![
                "config.toml",
                "config/config.toml",
                "/etc/nl2sql/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        // NL2SQL__WEB__PORT=8080 and friends
        config_builder = config_builder.add_source(
            Environment::with_prefix("NL2SQL")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;

        // Override with command line args if provided
        if let Some(host) = &args.host {
            config.web.host = host.clone();
        }
        if let Some(port) = args.port {
            config.web.port = port;
        }
        if let Some(database) = &args.database {
            config.database.connection_string = database.clone();
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.llm.providers.contains_key(&self.llm.default_provider) {
            return Err(ConfigError::Message(format!(
                "default provider '{}' is not configured",
                self.llm.default_provider
            )));
        }
        if let Some((name, _)) = self.llm.providers.iter().find(|(_, p)| p.models.is_empty()) {
            return Err(ConfigError::Message(format!(
                "provider '{}' must list at least one model",
                name
            )));
        }
        if self.database.pool_size == 0 {
            return Err(ConfigError::Message("database.pool_size must be at least 1".to_string()));
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut providers = BTreeMap::new();
        providers.insert(
            "gemini".to_string(),
            ProviderConfig {
                kind: ProviderKind::Gemini,
                models: vec!["gemini-1.5-flash".to_string()],
                temperature: 0.7,
                max_tokens: None,
                api_key_env: Some("GEMINI_API_KEY".to_string()),
                api_url: None,
            },
        );
        providers.insert(
            "groq".to_string(),
            ProviderConfig {
                kind: ProviderKind::OpenAi,
                models: vec![
                    "llama3-8b-8192".to_string(),
                    "llama3-70b-8192".to_string(),
                    "llama2-70b-4096".to_string(),
                ],
                temperature: 0.1,
                max_tokens: Some(1000),
                api_key_env: Some("GROQ_API_KEY".to_string()),
                api_url: None,
            },
        );

        Self {
            database: DatabaseConfig {
                connection_string: "data/jobs.duckdb".to_string(),
                pool_size: 4,
                max_rows: 200,
                seed_demo_data: true,
            },
            web: WebConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            llm: LlmConfig {
                default_provider: "gemini".to_string(),
                default_mode: TurnMode::ExecuteAndExplain,
                providers,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args_with_config(path: PathBuf) -> CliArgs {
        CliArgs {
            config: Some(path),
            host: None,
            port: Some(8088),
            database: None,
            log_format: LogFormat::Text,
            seed_only: false,
        }
    }

    #[test]
    fn file_values_layer_over_defaults_and_cli_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[web]
port = 4000

[llm]
default_provider = "groq"
"#
        )
        .unwrap();

        let config = AppConfig::new(&args_with_config(path)).unwrap();

        assert_eq!(config.web.port, 8088);
        assert_eq!(config.web.host, "127.0.0.1");
        assert_eq!(config.llm.default_provider, "groq");
        assert_eq!(config.llm.providers["groq"].models[0], "llama3-8b-8192");
        assert_eq!(config.database.max_rows, 200);
    }

    #[test]
    fn unknown_default_provider_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[llm]\ndefault_provider = \"missing\"\n").unwrap();

        let err = AppConfig::new(&args_with_config(path)).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
