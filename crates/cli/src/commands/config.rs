use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use mostrador_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "store.backend",
        &format!("{:?}", config.store.backend),
        source("store.backend", "MOSTRADOR_STORE_BACKEND"),
    ));
    lines.push(render_line(
        "store.spreadsheet_id",
        config.store.spreadsheet_id.as_deref().unwrap_or("<unset>"),
        source("store.spreadsheet_id", "MOSTRADOR_STORE_SPREADSHEET_ID"),
    ));
    let store_token = match &config.store.api_token {
        Some(token) => redact_token(token.expose_secret()),
        None => "<unset>".to_string(),
    };
    lines.push(render_line(
        "store.api_token",
        &store_token,
        source("store.api_token", "MOSTRADOR_STORE_API_TOKEN"),
    ));
    lines.push(render_line(
        "store.base_url",
        &config.store.base_url,
        source("store.base_url", "MOSTRADOR_STORE_BASE_URL"),
    ));

    lines.push(render_line(
        "assistant.base_url",
        &config.assistant.base_url,
        source("assistant.base_url", "MOSTRADOR_ASSISTANT_BASE_URL"),
    ));
    let api_key = match &config.assistant.api_key {
        Some(key) => redact_token(key.expose_secret()),
        None => "<unset>".to_string(),
    };
    lines.push(render_line(
        "assistant.api_key",
        &api_key,
        source("assistant.api_key", "MOSTRADOR_ASSISTANT_API_KEY"),
    ));
    lines.push(render_line(
        "assistant.assistant_id",
        config.assistant.assistant_id.as_deref().unwrap_or("<unset>"),
        source("assistant.assistant_id", "MOSTRADOR_ASSISTANT_ID"),
    ));
    lines.push(render_line(
        "assistant.poll_interval_ms",
        &config.assistant.poll_interval_ms.to_string(),
        source("assistant.poll_interval_ms", "MOSTRADOR_ASSISTANT_POLL_INTERVAL_MS"),
    ));
    lines.push(render_line(
        "assistant.run_timeout_secs",
        &config.assistant.run_timeout_secs.to_string(),
        source("assistant.run_timeout_secs", "MOSTRADOR_ASSISTANT_RUN_TIMEOUT_SECS"),
    ));
    lines.push(render_line(
        "assistant.request_timeout_secs",
        &config.assistant.request_timeout_secs.to_string(),
        source("assistant.request_timeout_secs", "MOSTRADOR_ASSISTANT_REQUEST_TIMEOUT_SECS"),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", "MOSTRADOR_SERVER_BIND_ADDRESS"),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", "MOSTRADOR_SERVER_PORT"),
    ));
    lines.push(render_line(
        "server.public_base_url",
        &config.server.public_base_url,
        source("server.public_base_url", "MOSTRADOR_SERVER_PUBLIC_BASE_URL"),
    ));

    lines.push(render_line(
        "channel.enabled",
        &config.channel.enabled.to_string(),
        source("channel.enabled", "MOSTRADOR_CHANNEL_ENABLED"),
    ));
    lines.push(render_line(
        "channel.allowed_senders",
        &format!("{} sender(s)", config.channel.allowed_senders.len()),
        source("channel.allowed_senders", "MOSTRADOR_CHANNEL_ALLOWED_SENDERS"),
    ));
    lines.push(render_line(
        "channel.country_prefix",
        &config.channel.country_prefix,
        source("channel.country_prefix", "MOSTRADOR_CHANNEL_COUNTRY_PREFIX"),
    ));

    lines.push(render_line(
        "sessions.idle_timeout_secs",
        &config.sessions.idle_timeout_secs.to_string(),
        source("sessions.idle_timeout_secs", "MOSTRADOR_SESSIONS_IDLE_TIMEOUT_SECS"),
    ));
    lines.push(render_line(
        "sessions.sweep_interval_secs",
        &config.sessions.sweep_interval_secs.to_string(),
        source("sessions.sweep_interval_secs", "MOSTRADOR_SESSIONS_SWEEP_INTERVAL_SECS"),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", "MOSTRADOR_LOGGING_LEVEL"),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", "MOSTRADOR_LOGGING_FORMAT"),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("mostrador.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/mostrador.toml");
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
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
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

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
