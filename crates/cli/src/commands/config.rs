use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use cartly_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let source = |key_path: &str, env_key: Option<&str>| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", Some("CARTLY_DATABASE_URL")),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", Some("CARTLY_DATABASE_MAX_CONNECTIONS")),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", Some("CARTLY_DATABASE_TIMEOUT_SECS")),
    ));

    lines.push(render_line(
        "email.endpoint",
        config.email.endpoint.as_deref().unwrap_or("<unset> (noop transport)"),
        source("email.endpoint", Some("CARTLY_EMAIL_ENDPOINT")),
    ));
    let api_key = if config.email.api_key.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "email.api_key",
        api_key,
        source("email.api_key", Some("CARTLY_EMAIL_API_KEY")),
    ));
    lines.push(render_line(
        "email.from_address",
        &config.email.from_address,
        source("email.from_address", Some("CARTLY_EMAIL_FROM")),
    ));
    lines.push(render_line(
        "email.max_retries",
        &config.email.max_retries.to_string(),
        source("email.max_retries", Some("CARTLY_EMAIL_MAX_RETRIES")),
    ));

    lines.push(render_line(
        "agent.history_cap",
        &config.agent.history_cap.to_string(),
        source("agent.history_cap", Some("CARTLY_HISTORY_CAP")),
    ));
    lines.push(render_line(
        "agent.dispatch_timeout_secs",
        &config.agent.dispatch_timeout_secs.to_string(),
        source("agent.dispatch_timeout_secs", Some("CARTLY_DISPATCH_TIMEOUT_SECS")),
    ));
    lines.push(render_line(
        "agent.search_limit",
        &config.agent.search_limit.to_string(),
        source("agent.search_limit", None),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", Some("CARTLY_LOGGING_LEVEL")),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", Some("CARTLY_LOGGING_FORMAT")),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("cartly.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/cartly.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
