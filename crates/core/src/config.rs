use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub assistant: AssistantConfig,
    pub server: ServerConfig,
    pub channel: ChannelConfig,
    pub sessions: SessionConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub spreadsheet_id: Option<String>,
    pub api_token: Option<SecretString>,
    pub base_url: String,
}

#[derive(Clone, Debug)]
pub struct AssistantConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub assistant_id: Option<String>,
    pub poll_interval_ms: u64,
    pub run_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub public_base_url: String,
}

#[derive(Clone, Debug)]
pub struct ChannelConfig {
    pub enabled: bool,
    pub allowed_senders: Vec<String>,
    pub country_prefix: String,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Sheets,
    Memory,
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
    pub store_backend: Option<StoreBackend>,
    pub store_spreadsheet_id: Option<String>,
    pub store_api_token: Option<String>,
    pub assistant_base_url: Option<String>,
    pub assistant_api_key: Option<String>,
    pub assistant_id: Option<String>,
    pub channel_enabled: Option<bool>,
    pub log_level: Option<String>,
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
            store: StoreConfig {
                backend: StoreBackend::Sheets,
                spreadsheet_id: None,
                api_token: None,
                base_url: "https://sheets.googleapis.com/v4".to_string(),
            },
            assistant: AssistantConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: None,
                assistant_id: None,
                poll_interval_ms: 1_000,
                run_timeout_secs: 120,
                request_timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 3000,
                public_base_url: "http://localhost:3000".to_string(),
            },
            channel: ChannelConfig {
                enabled: false,
                allowed_senders: Vec::new(),
                country_prefix: "549".to_string(),
            },
            sessions: SessionConfig { idle_timeout_secs: 3_600, sweep_interval_secs: 300 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sheets" => Ok(Self::Sheets),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::Validation(format!(
                "unsupported store backend `{other}` (expected sheets|memory)"
            ))),
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

impl AppConfig {
    /// Layered load: defaults, then an optional TOML file, then `MOSTRADOR_*`
    /// environment variables, then programmatic overrides, then validation.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("mostrador.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(store) = patch.store {
            if let Some(backend) = store.backend {
                self.store.backend = backend;
            }
            if let Some(spreadsheet_id) = store.spreadsheet_id {
                self.store.spreadsheet_id = Some(spreadsheet_id);
            }
            if let Some(api_token_value) = store.api_token {
                self.store.api_token = Some(secret_value(api_token_value));
            }
            if let Some(base_url) = store.base_url {
                self.store.base_url = base_url;
            }
        }

        if let Some(assistant) = patch.assistant {
            if let Some(base_url) = assistant.base_url {
                self.assistant.base_url = base_url;
            }
            if let Some(api_key_value) = assistant.api_key {
                self.assistant.api_key = Some(secret_value(api_key_value));
            }
            if let Some(assistant_id) = assistant.assistant_id {
                self.assistant.assistant_id = Some(assistant_id);
            }
            if let Some(poll_interval_ms) = assistant.poll_interval_ms {
                self.assistant.poll_interval_ms = poll_interval_ms;
            }
            if let Some(run_timeout_secs) = assistant.run_timeout_secs {
                self.assistant.run_timeout_secs = run_timeout_secs;
            }
            if let Some(request_timeout_secs) = assistant.request_timeout_secs {
                self.assistant.request_timeout_secs = request_timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(public_base_url) = server.public_base_url {
                self.server.public_base_url = public_base_url;
            }
        }

        if let Some(channel) = patch.channel {
            if let Some(enabled) = channel.enabled {
                self.channel.enabled = enabled;
            }
            if let Some(allowed_senders) = channel.allowed_senders {
                self.channel.allowed_senders = allowed_senders;
            }
            if let Some(country_prefix) = channel.country_prefix {
                self.channel.country_prefix = country_prefix;
            }
        }

        if let Some(sessions) = patch.sessions {
            if let Some(idle_timeout_secs) = sessions.idle_timeout_secs {
                self.sessions.idle_timeout_secs = idle_timeout_secs;
            }
            if let Some(sweep_interval_secs) = sessions.sweep_interval_secs {
                self.sessions.sweep_interval_secs = sweep_interval_secs;
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
        if let Some(value) = read_env("MOSTRADOR_STORE_BACKEND") {
            self.store.backend = value.parse()?;
        }
        if let Some(value) = read_env("MOSTRADOR_STORE_SPREADSHEET_ID") {
            self.store.spreadsheet_id = Some(value);
        }
        if let Some(value) = read_env("MOSTRADOR_STORE_API_TOKEN") {
            self.store.api_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("MOSTRADOR_STORE_BASE_URL") {
            self.store.base_url = value;
        }

        if let Some(value) = read_env("MOSTRADOR_ASSISTANT_BASE_URL") {
            self.assistant.base_url = value;
        }
        if let Some(value) = read_env("MOSTRADOR_ASSISTANT_API_KEY") {
            self.assistant.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("MOSTRADOR_ASSISTANT_ID") {
            self.assistant.assistant_id = Some(value);
        }
        if let Some(value) = read_env("MOSTRADOR_ASSISTANT_POLL_INTERVAL_MS") {
            self.assistant.poll_interval_ms =
                parse_u64("MOSTRADOR_ASSISTANT_POLL_INTERVAL_MS", &value)?;
        }
        if let Some(value) = read_env("MOSTRADOR_ASSISTANT_RUN_TIMEOUT_SECS") {
            self.assistant.run_timeout_secs =
                parse_u64("MOSTRADOR_ASSISTANT_RUN_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("MOSTRADOR_ASSISTANT_REQUEST_TIMEOUT_SECS") {
            self.assistant.request_timeout_secs =
                parse_u64("MOSTRADOR_ASSISTANT_REQUEST_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("MOSTRADOR_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("MOSTRADOR_SERVER_PORT") {
            self.server.port = parse_u16("MOSTRADOR_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("MOSTRADOR_SERVER_PUBLIC_BASE_URL") {
            self.server.public_base_url = value;
        }

        if let Some(value) = read_env("MOSTRADOR_CHANNEL_ENABLED") {
            self.channel.enabled = parse_bool("MOSTRADOR_CHANNEL_ENABLED", &value)?;
        }
        if let Some(value) = read_env("MOSTRADOR_CHANNEL_ALLOWED_SENDERS") {
            self.channel.allowed_senders = value
                .split(',')
                .map(str::trim)
                .filter(|sender| !sender.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = read_env("MOSTRADOR_CHANNEL_COUNTRY_PREFIX") {
            self.channel.country_prefix = value;
        }

        if let Some(value) = read_env("MOSTRADOR_SESSIONS_IDLE_TIMEOUT_SECS") {
            self.sessions.idle_timeout_secs =
                parse_u64("MOSTRADOR_SESSIONS_IDLE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("MOSTRADOR_SESSIONS_SWEEP_INTERVAL_SECS") {
            self.sessions.sweep_interval_secs =
                parse_u64("MOSTRADOR_SESSIONS_SWEEP_INTERVAL_SECS", &value)?;
        }

        let log_level =
            read_env("MOSTRADOR_LOGGING_LEVEL").or_else(|| read_env("MOSTRADOR_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("MOSTRADOR_LOGGING_FORMAT").or_else(|| read_env("MOSTRADOR_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(store_backend) = overrides.store_backend {
            self.store.backend = store_backend;
        }
        if let Some(store_spreadsheet_id) = overrides.store_spreadsheet_id {
            self.store.spreadsheet_id = Some(store_spreadsheet_id);
        }
        if let Some(store_api_token) = overrides.store_api_token {
            self.store.api_token = Some(secret_value(store_api_token));
        }
        if let Some(assistant_base_url) = overrides.assistant_base_url {
            self.assistant.base_url = assistant_base_url;
        }
        if let Some(assistant_api_key) = overrides.assistant_api_key {
            self.assistant.api_key = Some(secret_value(assistant_api_key));
        }
        if let Some(assistant_id) = overrides.assistant_id {
            self.assistant.assistant_id = Some(assistant_id);
        }
        if let Some(channel_enabled) = overrides.channel_enabled {
            self.channel.enabled = channel_enabled;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_store(&self.store)?;
        validate_assistant(&self.assistant)?;
        validate_server(&self.server)?;
        validate_channel(&self.channel)?;
        validate_sessions(&self.sessions)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("mostrador.toml"), PathBuf::from("config/mostrador.toml")]
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

/// Replaces `${VAR}` expressions with the value of the named environment
/// variable. A reference to an unset variable is an error rather than an
/// empty string so that missing credentials fail loudly.
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

fn validate_store(store: &StoreConfig) -> Result<(), ConfigError> {
    if store.backend == StoreBackend::Sheets {
        let missing_id =
            store.spreadsheet_id.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
        if missing_id {
            return Err(ConfigError::Validation(
                "store.spreadsheet_id is required for the sheets backend".to_string(),
            ));
        }

        let missing_token = store
            .api_token
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing_token {
            return Err(ConfigError::Validation(
                "store.api_token is required for the sheets backend".to_string(),
            ));
        }
    }

    if !store.base_url.starts_with("http://") && !store.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "store.base_url must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_assistant(assistant: &AssistantConfig) -> Result<(), ConfigError> {
    let missing_key = assistant
        .api_key
        .as_ref()
        .map(|value| value.expose_secret().trim().is_empty())
        .unwrap_or(true);
    if missing_key {
        return Err(ConfigError::Validation(
            "assistant.api_key is required to talk to the completion service".to_string(),
        ));
    }

    let missing_id =
        assistant.assistant_id.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
    if missing_id {
        return Err(ConfigError::Validation(
            "assistant.assistant_id is required to start runs".to_string(),
        ));
    }

    if assistant.poll_interval_ms < 100 {
        return Err(ConfigError::Validation(
            "assistant.poll_interval_ms must be at least 100".to_string(),
        ));
    }

    if assistant.run_timeout_secs == 0 || assistant.run_timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "assistant.run_timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if assistant.request_timeout_secs == 0 || assistant.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "assistant.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    let base_url = server.public_base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "server.public_base_url must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_channel(channel: &ChannelConfig) -> Result<(), ConfigError> {
    if channel.enabled && channel.allowed_senders.is_empty() {
        return Err(ConfigError::Validation(
            "channel.enabled is true but channel.allowed_senders is empty; \
             the allow-list is the only admission control on the channel"
                .to_string(),
        ));
    }

    if !channel.country_prefix.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(ConfigError::Validation(
            "channel.country_prefix must contain digits only".to_string(),
        ));
    }

    Ok(())
}

fn validate_sessions(sessions: &SessionConfig) -> Result<(), ConfigError> {
    if sessions.idle_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "sessions.idle_timeout_secs must be greater than zero".to_string(),
        ));
    }

    if sessions.sweep_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "sessions.sweep_interval_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    store: Option<StorePatch>,
    assistant: Option<AssistantPatch>,
    server: Option<ServerPatch>,
    channel: Option<ChannelPatch>,
    sessions: Option<SessionsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct StorePatch {
    backend: Option<StoreBackend>,
    spreadsheet_id: Option<String>,
    api_token: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AssistantPatch {
    base_url: Option<String>,
    api_key: Option<String>,
    assistant_id: Option<String>,
    poll_interval_ms: Option<u64>,
    run_timeout_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    public_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChannelPatch {
    enabled: Option<bool>,
    allowed_senders: Option<Vec<String>>,
    country_prefix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionsPatch {
    idle_timeout_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
