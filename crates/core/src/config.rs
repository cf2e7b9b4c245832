use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::family::is_e164;
use crate::time::{self, TimeError};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub messenger: MessengerConfig,
    pub signal: SignalConfig,
    pub whatsapp: WhatsAppConfig,
    pub llm: LlmConfig,
    pub calendar: CalendarConfig,
    pub family: FamilyConfig,
    pub conversation: ConversationConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct MessengerConfig {
    pub transport: MessengerTransport,
}

#[derive(Clone, Debug)]
pub struct SignalConfig {
    pub account: String,
    pub rpc_address: String,
    pub max_concurrent: usize,
    pub send_interval_ms: u64,
}

#[derive(Clone, Debug)]
pub struct WhatsAppConfig {
    pub access_token: Option<SecretString>,
    pub phone_number_id: Option<String>,
    pub app_secret: Option<SecretString>,
    pub verify_token: Option<SecretString>,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

#[derive(Clone, Debug)]
pub struct CalendarConfig {
    pub calendar_id: String,
    pub timezone: String,
    pub access_token: SecretString,
    pub api_base_url: String,
    pub timeout_secs: u64,
}

impl CalendarConfig {
    pub fn tz(&self) -> Result<Tz, TimeError> {
        time::parse_timezone(&self.timezone)
    }
}

#[derive(Clone, Debug)]
pub struct FamilyConfig {
    pub members_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct ConversationConfig {
    pub session_ttl_minutes: u64,
    pub max_history: usize,
    pub processed_retention_days: u64,
    pub rejection_cooldown_secs: u64,
    pub search_window_days: u64,
    pub cleanup_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessengerTransport {
    Signal,
    Whatsapp,
}

impl MessengerTransport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Signal => "signal",
            Self::Whatsapp => "whatsapp",
        }
    }
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
    pub transport: Option<MessengerTransport>,
    pub llm_model: Option<String>,
    pub calendar_timezone: Option<String>,
    pub members_path: Option<PathBuf>,
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
                url: "sqlite://famcal.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            messenger: MessengerConfig { transport: MessengerTransport::Signal },
            signal: SignalConfig {
                account: String::new(),
                rpc_address: "127.0.0.1:7583".to_string(),
                max_concurrent: 5,
                send_interval_ms: 200,
            },
            whatsapp: WhatsAppConfig {
                access_token: None,
                phone_number_id: None,
                app_secret: None,
                verify_token: None,
                api_base_url: "https://graph.facebook.com/v21.0".to_string(),
            },
            llm: LlmConfig {
                api_key: String::new().into(),
                base_url: "https://api.anthropic.com".to_string(),
                model: "claude-sonnet-4-20250514".to_string(),
                timeout_secs: 30,
                max_tokens: 1024,
            },
            calendar: CalendarConfig {
                calendar_id: String::new(),
                timezone: "Europe/Berlin".to_string(),
                access_token: String::new().into(),
                api_base_url: "https://www.googleapis.com/calendar/v3".to_string(),
                timeout_secs: 15,
            },
            family: FamilyConfig { members_path: PathBuf::from("config/family-members.toml") },
            conversation: ConversationConfig {
                session_ttl_minutes: 30,
                max_history: 5,
                processed_retention_days: 7,
                rejection_cooldown_secs: 300,
                search_window_days: 30,
                cleanup_interval_secs: 6 * 60 * 60,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for MessengerTransport {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "signal" => Ok(Self::Signal),
            "whatsapp" => Ok(Self::Whatsapp),
            other => Err(ConfigError::Validation(format!(
                "unsupported messenger transport `{other}` (expected signal|whatsapp)"
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
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("famcal.toml"));
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

        if let Some(transport) = patch.messenger.and_then(|messenger| messenger.transport) {
            self.messenger.transport = transport;
        }

        if let Some(signal) = patch.signal {
            if let Some(account) = signal.account {
                self.signal.account = account;
            }
            if let Some(rpc_address) = signal.rpc_address {
                self.signal.rpc_address = rpc_address;
            }
            if let Some(max_concurrent) = signal.max_concurrent {
                self.signal.max_concurrent = max_concurrent;
            }
            if let Some(send_interval_ms) = signal.send_interval_ms {
                self.signal.send_interval_ms = send_interval_ms;
            }
        }

        if let Some(whatsapp) = patch.whatsapp {
            if let Some(access_token) = whatsapp.access_token {
                self.whatsapp.access_token = Some(secret_value(access_token));
            }
            if let Some(phone_number_id) = whatsapp.phone_number_id {
                self.whatsapp.phone_number_id = Some(phone_number_id);
            }
            if let Some(app_secret) = whatsapp.app_secret {
                self.whatsapp.app_secret = Some(secret_value(app_secret));
            }
            if let Some(verify_token) = whatsapp.verify_token {
                self.whatsapp.verify_token = Some(secret_value(verify_token));
            }
            if let Some(api_base_url) = whatsapp.api_base_url {
                self.whatsapp.api_base_url = api_base_url;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = secret_value(api_key);
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
        }

        if let Some(calendar) = patch.calendar {
            if let Some(calendar_id) = calendar.calendar_id {
                self.calendar.calendar_id = calendar_id;
            }
            if let Some(timezone) = calendar.timezone {
                self.calendar.timezone = timezone;
            }
            if let Some(access_token) = calendar.access_token {
                self.calendar.access_token = secret_value(access_token);
            }
            if let Some(api_base_url) = calendar.api_base_url {
                self.calendar.api_base_url = api_base_url;
            }
            if let Some(timeout_secs) = calendar.timeout_secs {
                self.calendar.timeout_secs = timeout_secs;
            }
        }

        if let Some(members_path) = patch.family.and_then(|family| family.members_path) {
            self.family.members_path = members_path;
        }

        if let Some(conversation) = patch.conversation {
            if let Some(session_ttl_minutes) = conversation.session_ttl_minutes {
                self.conversation.session_ttl_minutes = session_ttl_minutes;
            }
            if let Some(max_history) = conversation.max_history {
                self.conversation.max_history = max_history;
            }
            if let Some(processed_retention_days) = conversation.processed_retention_days {
                self.conversation.processed_retention_days = processed_retention_days;
            }
            if let Some(rejection_cooldown_secs) = conversation.rejection_cooldown_secs {
                self.conversation.rejection_cooldown_secs = rejection_cooldown_secs;
            }
            if let Some(search_window_days) = conversation.search_window_days {
                self.conversation.search_window_days = search_window_days;
            }
            if let Some(cleanup_interval_secs) = conversation.cleanup_interval_secs {
                self.conversation.cleanup_interval_secs = cleanup_interval_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
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
        if let Some(value) = read_env("FAMCAL_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("FAMCAL_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("FAMCAL_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("FAMCAL_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("FAMCAL_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("FAMCAL_MESSENGER_TRANSPORT") {
            self.messenger.transport = value.parse()?;
        }

        if let Some(value) = read_env("FAMCAL_SIGNAL_ACCOUNT") {
            self.signal.account = value;
        }
        if let Some(value) = read_env("FAMCAL_SIGNAL_RPC_ADDRESS") {
            self.signal.rpc_address = value;
        }
        if let Some(value) = read_env("FAMCAL_SIGNAL_MAX_CONCURRENT") {
            self.signal.max_concurrent = parse_usize("FAMCAL_SIGNAL_MAX_CONCURRENT", &value)?;
        }
        if let Some(value) = read_env("FAMCAL_SIGNAL_SEND_INTERVAL_MS") {
            self.signal.send_interval_ms = parse_u64("FAMCAL_SIGNAL_SEND_INTERVAL_MS", &value)?;
        }

        if let Some(value) = read_env("FAMCAL_WHATSAPP_ACCESS_TOKEN") {
            self.whatsapp.access_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("FAMCAL_WHATSAPP_PHONE_NUMBER_ID") {
            self.whatsapp.phone_number_id = Some(value);
        }
        if let Some(value) = read_env("FAMCAL_WHATSAPP_APP_SECRET") {
            self.whatsapp.app_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env("FAMCAL_WHATSAPP_VERIFY_TOKEN") {
            self.whatsapp.verify_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("FAMCAL_WHATSAPP_API_BASE_URL") {
            self.whatsapp.api_base_url = value;
        }

        if let Some(value) = read_env("FAMCAL_LLM_API_KEY") {
            self.llm.api_key = secret_value(value);
        }
        if let Some(value) = read_env("FAMCAL_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("FAMCAL_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("FAMCAL_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("FAMCAL_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("FAMCAL_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_u32("FAMCAL_LLM_MAX_TOKENS", &value)?;
        }

        if let Some(value) = read_env("FAMCAL_CALENDAR_ID") {
            self.calendar.calendar_id = value;
        }
        if let Some(value) = read_env("FAMCAL_CALENDAR_TIMEZONE") {
            self.calendar.timezone = value;
        }
        if let Some(value) = read_env("FAMCAL_CALENDAR_ACCESS_TOKEN") {
            self.calendar.access_token = secret_value(value);
        }
        if let Some(value) = read_env("FAMCAL_CALENDAR_API_BASE_URL") {
            self.calendar.api_base_url = value;
        }
        if let Some(value) = read_env("FAMCAL_CALENDAR_TIMEOUT_SECS") {
            self.calendar.timeout_secs = parse_u64("FAMCAL_CALENDAR_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("FAMCAL_FAMILY_MEMBERS_PATH") {
            self.family.members_path = PathBuf::from(value);
        }

        if let Some(value) = read_env("FAMCAL_CONVERSATION_SESSION_TTL_MINUTES") {
            self.conversation.session_ttl_minutes =
                parse_u64("FAMCAL_CONVERSATION_SESSION_TTL_MINUTES", &value)?;
        }
        if let Some(value) = read_env("FAMCAL_CONVERSATION_MAX_HISTORY") {
            self.conversation.max_history =
                parse_usize("FAMCAL_CONVERSATION_MAX_HISTORY", &value)?;
        }
        if let Some(value) = read_env("FAMCAL_CONVERSATION_PROCESSED_RETENTION_DAYS") {
            self.conversation.processed_retention_days =
                parse_u64("FAMCAL_CONVERSATION_PROCESSED_RETENTION_DAYS", &value)?;
        }
        if let Some(value) = read_env("FAMCAL_CONVERSATION_REJECTION_COOLDOWN_SECS") {
            self.conversation.rejection_cooldown_secs =
                parse_u64("FAMCAL_CONVERSATION_REJECTION_COOLDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("FAMCAL_CONVERSATION_SEARCH_WINDOW_DAYS") {
            self.conversation.search_window_days =
                parse_u64("FAMCAL_CONVERSATION_SEARCH_WINDOW_DAYS", &value)?;
        }
        if let Some(value) = read_env("FAMCAL_CONVERSATION_CLEANUP_INTERVAL_SECS") {
            self.conversation.cleanup_interval_secs =
                parse_u64("FAMCAL_CONVERSATION_CLEANUP_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("FAMCAL_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("FAMCAL_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port = parse_u16("FAMCAL_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("FAMCAL_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("FAMCAL_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("FAMCAL_LOGGING_LEVEL").or_else(|| read_env("FAMCAL_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("FAMCAL_LOGGING_FORMAT").or_else(|| read_env("FAMCAL_LOG_FORMAT"));
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
        if let Some(transport) = overrides.transport {
            self.messenger.transport = transport;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(timezone) = overrides.calendar_timezone {
            self.calendar.timezone = timezone;
        }
        if let Some(members_path) = overrides.members_path {
            self.family.members_path = members_path;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        match self.messenger.transport {
            MessengerTransport::Signal => validate_signal(&self.signal)?,
            MessengerTransport::Whatsapp => validate_whatsapp(&self.whatsapp)?,
        }
        validate_llm(&self.llm)?;
        validate_calendar(&self.calendar)?;
        validate_family(&self.family)?;
        validate_conversation(&self.conversation)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("famcal.toml"), PathBuf::from("config/famcal.toml")]
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

fn validate_signal(signal: &SignalConfig) -> Result<(), ConfigError> {
    if !is_e164(signal.account.trim()) {
        return Err(ConfigError::Validation(
            "signal.account is required and must be E.164 (e.g. +4915112345678)".to_string(),
        ));
    }

    if signal.rpc_address.trim().is_empty() {
        return Err(ConfigError::Validation(
            "signal.rpc_address is required (host:port of the signal-cli JSON-RPC daemon)"
                .to_string(),
        ));
    }

    if signal.max_concurrent == 0 {
        return Err(ConfigError::Validation(
            "signal.max_concurrent must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_whatsapp(whatsapp: &WhatsAppConfig) -> Result<(), ConfigError> {
    let missing_secret = |value: &Option<SecretString>| {
        value.as_ref().map(|secret| secret.expose_secret().trim().is_empty()).unwrap_or(true)
    };

    if missing_secret(&whatsapp.access_token) {
        return Err(ConfigError::Validation(
            "whatsapp.access_token is required when messenger.transport = \"whatsapp\"".to_string(),
        ));
    }
    if whatsapp.phone_number_id.as_deref().map(str::trim).unwrap_or_default().is_empty() {
        return Err(ConfigError::Validation(
            "whatsapp.phone_number_id is required when messenger.transport = \"whatsapp\""
                .to_string(),
        ));
    }
    if missing_secret(&whatsapp.app_secret) {
        return Err(ConfigError::Validation(
            "whatsapp.app_secret is required to verify webhook signatures".to_string(),
        ));
    }
    if missing_secret(&whatsapp.verify_token) {
        return Err(ConfigError::Validation(
            "whatsapp.verify_token is required for webhook verification".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "llm.api_key is required. Create one at https://console.anthropic.com".to_string(),
        ));
    }

    if !llm.base_url.starts_with("http://") && !llm.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }

    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_tokens must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_calendar(calendar: &CalendarConfig) -> Result<(), ConfigError> {
    if calendar.calendar_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "calendar.calendar_id is required (Google Calendar settings > Integrate calendar)"
                .to_string(),
        ));
    }

    if let Err(error) = calendar.tz() {
        return Err(ConfigError::Validation(format!("calendar.timezone is invalid: {error}")));
    }

    if calendar.access_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "calendar.access_token is required for the Google Calendar API".to_string(),
        ));
    }

    if calendar.timeout_secs == 0 || calendar.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "calendar.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_family(family: &FamilyConfig) -> Result<(), ConfigError> {
    if family.members_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation("family.members_path is required".to_string()));
    }

    Ok(())
}

fn validate_conversation(conversation: &ConversationConfig) -> Result<(), ConfigError> {
    if conversation.session_ttl_minutes == 0 {
        return Err(ConfigError::Validation(
            "conversation.session_ttl_minutes must be greater than zero".to_string(),
        ));
    }

    if conversation.max_history == 0 || conversation.max_history > 50 {
        return Err(ConfigError::Validation(
            "conversation.max_history must be in range 1..=50".to_string(),
        ));
    }

    if conversation.processed_retention_days == 0 {
        return Err(ConfigError::Validation(
            "conversation.processed_retention_days must be greater than zero".to_string(),
        ));
    }

    if conversation.search_window_days == 0 || conversation.search_window_days > 366 {
        return Err(ConfigError::Validation(
            "conversation.search_window_days must be in range 1..=366".to_string(),
        ));
    }

    if conversation.cleanup_interval_secs < 60 {
        return Err(ConfigError::Validation(
            "conversation.cleanup_interval_secs must be at least 60".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
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

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    messenger: Option<MessengerPatch>,
    signal: Option<SignalPatch>,
    whatsapp: Option<WhatsAppPatch>,
    llm: Option<LlmPatch>,
    calendar: Option<CalendarPatch>,
    family: Option<FamilyPatch>,
    conversation: Option<ConversationPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct MessengerPatch {
    transport: Option<MessengerTransport>,
}

#[derive(Debug, Default, Deserialize)]
struct SignalPatch {
    account: Option<String>,
    rpc_address: Option<String>,
    max_concurrent: Option<usize>,
    send_interval_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WhatsAppPatch {
    access_token: Option<String>,
    phone_number_id: Option<String>,
    app_secret: Option<String>,
    verify_token: Option<String>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct CalendarPatch {
    calendar_id: Option<String>,
    timezone: Option<String>,
    access_token: Option<String>,
    api_base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FamilyPatch {
    members_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationPatch {
    session_ttl_minutes: Option<u64>,
    max_history: Option<usize>,
    processed_retention_days: Option<u64>,
    rejection_cooldown_secs: Option<u64>,
    search_window_days: Option<u64>,
    cleanup_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
