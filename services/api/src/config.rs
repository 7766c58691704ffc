use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Defines the supported completion providers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    OpenAI,
}

impl Provider {
    fn default_model(&self) -> &'static str {
        match self {
            Provider::Anthropic => "claude-3-5-sonnet-20241022",
            Provider::OpenAI => "gpt-4o",
        }
    }
}

/// Connection details for the blob store that holds uploaded study materials.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageConfig {
    pub url: String,
    pub service_key: String,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub provider: Provider,
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub chat_model: String,
    pub log_level: Level,
    pub prompts_path: PathBuf,
    pub storage: Option<StorageConfig>,
    pub redis_url: Option<String>,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window_ms: u64,
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let provider_str =
            std::env::var("COMPLETION_PROVIDER").unwrap_or_else(|_| "anthropic".to_string());
        let provider = match provider_str.to_lowercase().as_str() {
            "anthropic" | "claude" => Provider::Anthropic,
            "openai" => Provider::OpenAI,
            other => {
                return Err(ConfigError::InvalidValue(
                    "COMPLETION_PROVIDER".to_string(),
                    format!("'{}' is not a supported provider", other),
                ));
            }
        };

        let anthropic_api_key = std::env::var("ANTHROPIC_API_KEY")
            .or_else(|_| std::env::var("CLAUDE_API_KEY"))
            .ok();
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();

        let chat_model =
            std::env::var("CHAT_MODEL").unwrap_or_else(|_| provider.default_model().to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let prompts_path = std::env::var("PROMPTS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./prompts"));

        let storage = match std::env::var("STORAGE_URL") {
            Ok(url) => {
                let service_key = std::env::var("STORAGE_SERVICE_KEY").map_err(|_| {
                    ConfigError::MissingVar(
                        "STORAGE_SERVICE_KEY must be set when STORAGE_URL is set".to_string(),
                    )
                })?;
                Some(StorageConfig { url, service_key })
            }
            Err(_) => None,
        };

        let redis_url = std::env::var("REDIS_URL").ok();

        let rate_limit_max_requests = parse_var("RATE_LIMIT_MAX_REQUESTS", 20u32)?;
        let rate_limit_window_ms = parse_var("RATE_LIMIT_WINDOW_MS", 60_000u64)?;
        if rate_limit_window_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "RATE_LIMIT_WINDOW_MS".to_string(),
                "window must be greater than zero".to_string(),
            ));
        }

        match provider {
            Provider::Anthropic => {
                if anthropic_api_key.is_none() {
                    return Err(ConfigError::MissingVar(
                        "ANTHROPIC_API_KEY must be set for 'anthropic' provider".to_string(),
                    ));
                }
            }
            Provider::OpenAI => {
                if openai_api_key.is_none() {
                    return Err(ConfigError::MissingVar(
                        "OPENAI_API_KEY must be set for 'openai' provider".to_string(),
                    ));
                }
            }
        }

        Ok(Self {
            bind_address,
            database_url,
            provider,
            anthropic_api_key,
            openai_api_key,
            chat_model,
            log_level,
            prompts_path,
            storage,
            redis_url,
            rate_limit_max_requests,
            rate_limit_window_ms,
        })
    }
}
