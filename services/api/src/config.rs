use emote_core::config::GameConfig;
use emote_core::error::GameError;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Defines the supported text-generation providers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Gemini,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: Option<String>,
    pub provider: Provider,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub chat_model: String,
    pub log_level: Level,
    pub prompts_path: PathBuf,
    pub required_challenges: usize,
    pub match_threshold: f64,
    pub hold_time: Duration,
    pub coaching_interval: Duration,
    pub tick_interval: Duration,
    pub generation_timeout: Duration,
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_millis(name: &str, default_ms: u64) -> Result<Duration, ConfigError> {
    parse_var(name, default_ms).map(Duration::from_millis)
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
            .ok()
            .filter(|url| !url.trim().is_empty());

        let provider_str = std::env::var("TEXT_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let provider = match provider_str.to_lowercase().as_str() {
            "gemini" => Provider::Gemini,
            _ => Provider::OpenAI,
        };

        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let gemini_api_key = std::env::var("GEMINI_API_KEY").ok();

        let chat_model =
            std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

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

        let required_challenges = parse_var("REQUIRED_CHALLENGES", 3usize)?;
        let match_threshold = parse_var("MATCH_THRESHOLD", 70.0f64)?;
        let hold_time = parse_millis("HOLD_TIME_MS", 800)?;
        let coaching_interval = parse_millis("COACHING_INTERVAL_MS", 8000)?;
        let tick_interval = parse_millis("TICK_INTERVAL_MS", 50)?;
        let generation_timeout = parse_millis("GENERATION_TIMEOUT_MS", 10_000)?;

        match provider {
            Provider::OpenAI => {
                if openai_api_key.is_none() {
                    return Err(ConfigError::MissingVar(
                        "OPENAI_API_KEY must be set for 'openai' provider".to_string(),
                    ));
                }
            }
            Provider::Gemini => {
                if gemini_api_key.is_none() {
                    return Err(ConfigError::MissingVar(
                        "GEMINI_API_KEY must be set for 'gemini' provider".to_string(),
                    ));
                }
            }
        }

        let config = Self {
            bind_address,
            database_url,
            provider,
            openai_api_key,
            gemini_api_key,
            chat_model,
            log_level,
            prompts_path,
            required_challenges,
            match_threshold,
            hold_time,
            coaching_interval,
            tick_interval,
            generation_timeout,
        };
        config.game_config().validate().map_err(|e| {
            let var = match e {
                GameError::InvalidConfig(_) => "MATCH_THRESHOLD/TICK_INTERVAL_MS",
                _ => "REQUIRED_CHALLENGES",
            };
            ConfigError::InvalidValue(var.to_string(), e.to_string())
        })?;
        Ok(config)
    }

    /// Game constants for a new session, over the default label set.
    pub fn game_config(&self) -> GameConfig {
        GameConfig {
            required_count: self.required_challenges,
            match_threshold: self.match_threshold,
            hold_time: self.hold_time,
            coaching_interval: self.coaching_interval,
            tick_interval: self.tick_interval,
            generation_timeout: self.generation_timeout,
            ..GameConfig::default()
        }
    }
}
