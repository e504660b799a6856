use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub payments: PaymentsConfig,
    pub storage: StorageConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
    /// Optional TOML file overriding the built-in command catalog.
    pub catalog_path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub base_url: String,
    pub service_token: SecretString,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PaymentsConfig {
    pub api_base_url: String,
    pub secret_key: SecretString,
    pub webhook_secret: SecretString,
    pub webhook_tolerance_secs: u64,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub base_url: String,
    pub access_token: SecretString,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_token: SecretString,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub max_prompt_bytes: usize,
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
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
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
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8787,
                graceful_shutdown_secs: 15,
            },
            backend: BackendConfig {
                base_url: String::new(),
                service_token: String::new().into(),
                timeout_secs: 10,
            },
            payments: PaymentsConfig {
                api_base_url: "https://api.stripe.com".to_string(),
                secret_key: String::new().into(),
                webhook_secret: String::new().into(),
                webhook_tolerance_secs: 300,
                timeout_secs: 15,
            },
            storage: StorageConfig {
                base_url: String::new(),
                access_token: String::new().into(),
                timeout_secs: 30,
            },
            llm: LlmConfig {
                base_url: String::new(),
                api_token: String::new().into(),
                model: "@cf/meta/llama-3.1-8b-instruct".to_string(),
                timeout_secs: 10,
                max_retries: 2,
                max_prompt_bytes: 4096,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            catalog_path: None,
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
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
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("opsgate.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(backend) = patch.backend {
            if let Some(base_url) = backend.base_url {
                self.backend.base_url = base_url;
            }
            if let Some(service_token_value) = backend.service_token {
                self.backend.service_token = secret_value(service_token_value);
            }
            if let Some(timeout_secs) = backend.timeout_secs {
                self.backend.timeout_secs = timeout_secs;
            }
        }

        if let Some(payments) = patch.payments {
            if let Some(api_base_url) = payments.api_base_url {
                self.payments.api_base_url = api_base_url;
            }
            if let Some(secret_key_value) = payments.secret_key {
                self.payments.secret_key = secret_value(secret_key_value);
            }
            if let Some(webhook_secret_value) = payments.webhook_secret {
                self.payments.webhook_secret = secret_value(webhook_secret_value);
            }
            if let Some(webhook_tolerance_secs) = payments.webhook_tolerance_secs {
                self.payments.webhook_tolerance_secs = webhook_tolerance_secs;
            }
            if let Some(timeout_secs) = payments.timeout_secs {
                self.payments.timeout_secs = timeout_secs;
            }
        }

        if let Some(storage) = patch.storage {
            if let Some(base_url) = storage.base_url {
                self.storage.base_url = base_url;
            }
            if let Some(access_token_value) = storage.access_token {
                self.storage.access_token = secret_value(access_token_value);
            }
            if let Some(timeout_secs) = storage.timeout_secs {
                self.storage.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(api_token_value) = llm.api_token {
                self.llm.api_token = secret_value(api_token_value);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
            if let Some(max_prompt_bytes) = llm.max_prompt_bytes {
                self.llm.max_prompt_bytes = max_prompt_bytes;
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

        if let Some(catalog_path) = patch.catalog_path {
            self.catalog_path = Some(PathBuf::from(catalog_path));
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("OPSGATE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("OPSGATE_SERVER_PORT") {
            self.server.port = parse_u16("OPSGATE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("OPSGATE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("OPSGATE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("OPSGATE_BACKEND_BASE_URL") {
            self.backend.base_url = value;
        }
        if let Some(value) = read_env("OPSGATE_BACKEND_SERVICE_TOKEN") {
            self.backend.service_token = secret_value(value);
        }
        if let Some(value) = read_env("OPSGATE_BACKEND_TIMEOUT_SECS") {
            self.backend.timeout_secs = parse_u64("OPSGATE_BACKEND_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("OPSGATE_PAYMENTS_API_BASE_URL") {
            self.payments.api_base_url = value;
        }
        if let Some(value) = read_env("OPSGATE_PAYMENTS_SECRET_KEY") {
            self.payments.secret_key = secret_value(value);
        }
        if let Some(value) = read_env("OPSGATE_PAYMENTS_WEBHOOK_SECRET") {
            self.payments.webhook_secret = secret_value(value);
        }
        if let Some(value) = read_env("OPSGATE_PAYMENTS_WEBHOOK_TOLERANCE_SECS") {
            self.payments.webhook_tolerance_secs =
                parse_u64("OPSGATE_PAYMENTS_WEBHOOK_TOLERANCE_SECS", &value)?;
        }
        if let Some(value) = read_env("OPSGATE_PAYMENTS_TIMEOUT_SECS") {
            self.payments.timeout_secs = parse_u64("OPSGATE_PAYMENTS_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("OPSGATE_STORAGE_BASE_URL") {
            self.storage.base_url = value;
        }
        if let Some(value) = read_env("OPSGATE_STORAGE_ACCESS_TOKEN") {
            self.storage.access_token = secret_value(value);
        }
        if let Some(value) = read_env("OPSGATE_STORAGE_TIMEOUT_SECS") {
            self.storage.timeout_secs = parse_u64("OPSGATE_STORAGE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("OPSGATE_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("OPSGATE_LLM_API_TOKEN") {
            self.llm.api_token = secret_value(value);
        }
        if let Some(value) = read_env("OPSGATE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("OPSGATE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("OPSGATE_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("OPSGATE_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("OPSGATE_LLM_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("OPSGATE_LLM_MAX_PROMPT_BYTES") {
            self.llm.max_prompt_bytes =
                parse_u64("OPSGATE_LLM_MAX_PROMPT_BYTES", &value)? as usize;
        }

        let log_level = read_env("OPSGATE_LOGGING_LEVEL").or_else(|| read_env("OPSGATE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("OPSGATE_LOGGING_FORMAT").or_else(|| read_env("OPSGATE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        if let Some(value) = read_env("OPSGATE_CATALOG_PATH") {
            self.catalog_path = Some(PathBuf::from(value));
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_server(&self.server)?;
        validate_backend(&self.backend)?;
        validate_payments(&self.payments)?;
        validate_storage(&self.storage)?;
        validate_llm(&self.llm)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("opsgate.toml"), PathBuf::from("config/opsgate.toml")]
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

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }
    if server.graceful_shutdown_secs > 120 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be at most 120".to_string(),
        ));
    }
    Ok(())
}

fn validate_backend(backend: &BackendConfig) -> Result<(), ConfigError> {
    validate_base_url("backend.base_url", &backend.base_url)?;
    if backend.service_token.expose_secret().is_empty() {
        return Err(ConfigError::Validation(
            "backend.service_token is required (service-to-service credential)".to_string(),
        ));
    }
    validate_timeout("backend.timeout_secs", backend.timeout_secs, 60)
}

fn validate_payments(payments: &PaymentsConfig) -> Result<(), ConfigError> {
    validate_base_url("payments.api_base_url", &payments.api_base_url)?;
    if payments.secret_key.expose_secret().is_empty() {
        return Err(ConfigError::Validation("payments.secret_key is required".to_string()));
    }
    if payments.webhook_secret.expose_secret().is_empty() {
        return Err(ConfigError::Validation("payments.webhook_secret is required".to_string()));
    }
    validate_timeout("payments.timeout_secs", payments.timeout_secs, 60)
}

fn validate_storage(storage: &StorageConfig) -> Result<(), ConfigError> {
    validate_base_url("storage.base_url", &storage.base_url)?;
    validate_timeout("storage.timeout_secs", storage.timeout_secs, 120)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    validate_base_url("llm.base_url", &llm.base_url)?;
    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }
    if llm.max_retries > 5 {
        return Err(ConfigError::Validation("llm.max_retries must be at most 5".to_string()));
    }
    if llm.max_prompt_bytes == 0 {
        return Err(ConfigError::Validation(
            "llm.max_prompt_bytes must be greater than zero".to_string(),
        ));
    }
    validate_timeout("llm.timeout_secs", llm.timeout_secs, 60)
}

fn validate_base_url(key: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Validation(format!("{key} is required")));
    }
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(ConfigError::Validation(format!("{key} must be an http(s) URL")));
    }
    Ok(())
}

fn validate_timeout(key: &str, value: u64, max: u64) -> Result<(), ConfigError> {
    if value == 0 || value > max {
        return Err(ConfigError::Validation(format!("{key} must be in range 1..={max}")));
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
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

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    server: Option<ServerPatch>,
    backend: Option<BackendPatch>,
    payments: Option<PaymentsPatch>,
    storage: Option<StoragePatch>,
    llm: Option<LlmPatch>,
    logging: Option<LoggingPatch>,
    catalog_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct BackendPatch {
    base_url: Option<String>,
    service_token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PaymentsPatch {
    api_base_url: Option<String>,
    secret_key: Option<String>,
    webhook_secret: Option<String>,
    webhook_tolerance_secs: Option<u64>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    base_url: Option<String>,
    access_token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    base_url: Option<String>,
    api_token: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    max_prompt_bytes: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
