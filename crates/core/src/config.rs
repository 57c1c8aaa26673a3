use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub email: EmailConfig,
    pub agent: AgentConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct EmailConfig {
    /// HTTP relay endpoint the confirmation worker posts to. Empty means
    /// the noop transport (useful for local runs and tests).
    pub endpoint: Option<String>,
    pub api_key: Option<SecretString>,
    pub from_address: String,
    pub queue_capacity: usize,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Turns retained per session before FIFO eviction kicks in.
    pub history_cap: usize,
    /// Upper bound on a single capability dispatch.
    pub dispatch_timeout_secs: u64,
    /// Default search result window when the utterance does not say.
    pub search_limit: u32,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub email_endpoint: Option<String>,
    pub email_api_key: Option<String>,
    pub email_from_address: Option<String>,
    pub history_cap: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://cartly.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            email: EmailConfig {
                endpoint: None,
                api_key: None,
                from_address: "orders@cartly.local".to_string(),
                queue_capacity: 64,
                max_retries: 3,
                base_delay_ms: 250,
                max_delay_ms: 5_000,
            },
            agent: AgentConfig { history_cap: 20, dispatch_timeout_secs: 10, search_limit: 15 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    email: Option<EmailPatch>,
    agent: Option<AgentPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EmailPatch {
    endpoint: Option<String>,
    api_key: Option<String>,
    from_address: Option<String>,
    queue_capacity: Option<usize>,
    max_retries: Option<u32>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    history_cap: Option<usize>,
    dispatch_timeout_secs: Option<u64>,
    search_limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("cartly.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(email) = patch.email {
            if let Some(endpoint) = email.endpoint {
                self.email.endpoint = Some(endpoint);
            }
            if let Some(api_key_value) = email.api_key {
                self.email.api_key = Some(api_key_value.into());
            }
            if let Some(from_address) = email.from_address {
                self.email.from_address = from_address;
            }
            if let Some(queue_capacity) = email.queue_capacity {
                self.email.queue_capacity = queue_capacity;
            }
            if let Some(max_retries) = email.max_retries {
                self.email.max_retries = max_retries;
            }
            if let Some(base_delay_ms) = email.base_delay_ms {
                self.email.base_delay_ms = base_delay_ms;
            }
            if let Some(max_delay_ms) = email.max_delay_ms {
                self.email.max_delay_ms = max_delay_ms;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(history_cap) = agent.history_cap {
                self.agent.history_cap = history_cap;
            }
            if let Some(dispatch_timeout_secs) = agent.dispatch_timeout_secs {
                self.agent.dispatch_timeout_secs = dispatch_timeout_secs;
            }
            if let Some(search_limit) = agent.search_limit {
                self.agent.search_limit = search_limit;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CARTLY_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("CARTLY_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("CARTLY_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("CARTLY_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("CARTLY_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CARTLY_EMAIL_ENDPOINT") {
            self.email.endpoint = Some(value);
        }
        if let Some(value) = read_env("CARTLY_EMAIL_API_KEY") {
            self.email.api_key = Some(value.into());
        }
        if let Some(value) = read_env("CARTLY_EMAIL_FROM") {
            self.email.from_address = value;
        }
        if let Some(value) = read_env("CARTLY_EMAIL_MAX_RETRIES") {
            self.email.max_retries = parse_u32("CARTLY_EMAIL_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("CARTLY_HISTORY_CAP") {
            self.agent.history_cap = parse_u64("CARTLY_HISTORY_CAP", &value)? as usize;
        }
        if let Some(value) = read_env("CARTLY_DISPATCH_TIMEOUT_SECS") {
            self.agent.dispatch_timeout_secs =
                parse_u64("CARTLY_DISPATCH_TIMEOUT_SECS", &value)?;
        }

        let log_level = read_env("CARTLY_LOGGING_LEVEL").or_else(|| read_env("CARTLY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CARTLY_LOGGING_FORMAT").or_else(|| read_env("CARTLY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(endpoint) = overrides.email_endpoint {
            self.email.endpoint = Some(endpoint);
        }
        if let Some(api_key) = overrides.email_api_key {
            self.email.api_key = Some(api_key.into());
        }
        if let Some(from_address) = overrides.email_from_address {
            self.email.from_address = from_address;
        }
        if let Some(history_cap) = overrides.history_cap {
            self.agent.history_cap = history_cap;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_email(&self.email)?;
        validate_agent(&self.agent)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("cartly.toml"), PathBuf::from("config/cartly.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_email(email: &EmailConfig) -> Result<(), ConfigError> {
    if let Some(endpoint) = &email.endpoint {
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(ConfigError::Validation(
                "email.endpoint must be an http(s) URL".to_string(),
            ));
        }
        let has_key = email.api_key.as_ref().is_some_and(|key| !key.expose_secret().is_empty());
        if !has_key {
            return Err(ConfigError::Validation(
                "email.api_key is required when email.endpoint is set".to_string(),
            ));
        }
    }

    if !crate::domain::order::is_well_formed_email(&email.from_address) {
        return Err(ConfigError::Validation(format!(
            "email.from_address `{}` is not a valid address",
            email.from_address
        )));
    }

    if email.queue_capacity == 0 {
        return Err(ConfigError::Validation(
            "email.queue_capacity must be greater than zero".to_string(),
        ));
    }

    if email.base_delay_ms == 0 || email.max_delay_ms < email.base_delay_ms {
        return Err(ConfigError::Validation(
            "email retry delays must satisfy 0 < base_delay_ms <= max_delay_ms".to_string(),
        ));
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.history_cap == 0 {
        return Err(ConfigError::Validation(
            "agent.history_cap must be greater than zero".to_string(),
        ));
    }
    if agent.dispatch_timeout_secs == 0 || agent.dispatch_timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "agent.dispatch_timeout_secs must be in range 1..=120".to_string(),
        ));
    }
    if agent.search_limit == 0 || agent.search_limit > crate::query::MAX_RESULT_LIMIT {
        return Err(ConfigError::Validation(format!(
            "agent.search_limit must be in range 1..={}",
            crate::query::MAX_RESULT_LIMIT
        )));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    match logging.level.trim().to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        other => Err(ConfigError::Validation(format!(
            "unsupported logging.level `{other}` (expected trace|debug|info|warn|error)"
        ))),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}
