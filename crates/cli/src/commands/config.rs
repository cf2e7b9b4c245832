use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use famcal_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

struct Field {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

fn field(key: &'static str, env_key: &'static str, value: impl ToString) -> Field {
    Field { key, env_key, value: value.to_string() }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    for entry in fields(&config) {
        let source = field_source(
            entry.key,
            Some(entry.env_key),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(entry.key, &entry.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let whatsapp = &config.whatsapp;
    vec![
        field("database.url", "FAMCAL_DATABASE_URL", &config.database.url),
        field(
            "database.max_connections",
            "FAMCAL_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections,
        ),
        field(
            "database.timeout_secs",
            "FAMCAL_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs,
        ),
        field(
            "messenger.transport",
            "FAMCAL_MESSENGER_TRANSPORT",
            config.messenger.transport.as_str(),
        ),
        field("signal.account", "FAMCAL_SIGNAL_ACCOUNT", or_unset(&config.signal.account)),
        field("signal.rpc_address", "FAMCAL_SIGNAL_RPC_ADDRESS", &config.signal.rpc_address),
        field(
            "signal.max_concurrent",
            "FAMCAL_SIGNAL_MAX_CONCURRENT",
            config.signal.max_concurrent,
        ),
        field(
            "signal.send_interval_ms",
            "FAMCAL_SIGNAL_SEND_INTERVAL_MS",
            config.signal.send_interval_ms,
        ),
        field(
            "whatsapp.access_token",
            "FAMCAL_WHATSAPP_ACCESS_TOKEN",
            redact_optional(whatsapp.access_token.as_ref()),
        ),
        field(
            "whatsapp.phone_number_id",
            "FAMCAL_WHATSAPP_PHONE_NUMBER_ID",
            whatsapp.phone_number_id.as_deref().unwrap_or("<unset>"),
        ),
        field(
            "whatsapp.app_secret",
            "FAMCAL_WHATSAPP_APP_SECRET",
            redact_optional(whatsapp.app_secret.as_ref()),
        ),
        field(
            "whatsapp.verify_token",
            "FAMCAL_WHATSAPP_VERIFY_TOKEN",
            redact_optional(whatsapp.verify_token.as_ref()),
        ),
        field("whatsapp.api_base_url", "FAMCAL_WHATSAPP_API_BASE_URL", &whatsapp.api_base_url),
        field(
            "llm.api_key",
            "FAMCAL_LLM_API_KEY",
            redact_token(config.llm.api_key.expose_secret()),
        ),
        field("llm.base_url", "FAMCAL_LLM_BASE_URL", &config.llm.base_url),
        field("llm.model", "FAMCAL_LLM_MODEL", &config.llm.model),
        field("llm.timeout_secs", "FAMCAL_LLM_TIMEOUT_SECS", config.llm.timeout_secs),
        field("llm.max_tokens", "FAMCAL_LLM_MAX_TOKENS", config.llm.max_tokens),
        field(
            "calendar.calendar_id",
            "FAMCAL_CALENDAR_ID",
            or_unset(&config.calendar.calendar_id),
        ),
        field("calendar.timezone", "FAMCAL_CALENDAR_TIMEZONE", &config.calendar.timezone),
        field(
            "calendar.access_token",
            "FAMCAL_CALENDAR_ACCESS_TOKEN",
            redact_token(config.calendar.access_token.expose_secret()),
        ),
        field(
            "family.members_path",
            "FAMCAL_FAMILY_MEMBERS_PATH",
            config.family.members_path.display(),
        ),
        field(
            "conversation.session_ttl_minutes",
            "FAMCAL_CONVERSATION_SESSION_TTL_MINUTES",
            config.conversation.session_ttl_minutes,
        ),
        field(
            "conversation.max_history",
            "FAMCAL_CONVERSATION_MAX_HISTORY",
            config.conversation.max_history,
        ),
        field(
            "conversation.processed_retention_days",
            "FAMCAL_CONVERSATION_PROCESSED_RETENTION_DAYS",
            config.conversation.processed_retention_days,
        ),
        field(
            "conversation.rejection_cooldown_secs",
            "FAMCAL_CONVERSATION_REJECTION_COOLDOWN_SECS",
            config.conversation.rejection_cooldown_secs,
        ),
        field(
            "conversation.search_window_days",
            "FAMCAL_CONVERSATION_SEARCH_WINDOW_DAYS",
            config.conversation.search_window_days,
        ),
        field(
            "conversation.cleanup_interval_secs",
            "FAMCAL_CONVERSATION_CLEANUP_INTERVAL_SECS",
            config.conversation.cleanup_interval_secs,
        ),
        field("server.bind_address", "FAMCAL_SERVER_BIND_ADDRESS", &config.server.bind_address),
        field(
            "server.health_check_port",
            "FAMCAL_SERVER_HEALTH_CHECK_PORT",
            config.server.health_check_port,
        ),
        field(
            "server.graceful_shutdown_secs",
            "FAMCAL_SERVER_GRACEFUL_SHUTDOWN_SECS",
            config.server.graceful_shutdown_secs,
        ),
        field("logging.level", "FAMCAL_LOG_LEVEL", &config.logging.level),
        field("logging.format", "FAMCAL_LOG_FORMAT", format!("{:?}", config.logging.format)),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("famcal.toml"), PathBuf::from("config/famcal.toml")]
        .into_iter()
        .find(|path| path.exists())
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

fn or_unset(value: &str) -> &str {
    if value.trim().is_empty() {
        "<unset>"
    } else {
        value
    }
}

fn redact_optional(secret: Option<&SecretString>) -> String {
    secret.map(|secret| redact_token(secret.expose_secret())).unwrap_or_else(|| "<unset>".into())
}

/// Keeps a recognisable prefix (`sk-***`, `ya29.***`) and hides the rest.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<unset>".to_string();
    }

    if let Some(index) = trimmed.find(['-', '.']) {
        if index > 0 && index <= 8 {
            return format!("{}***", &trimmed[..=index]);
        }
    }

    "<redacted>".to_string()
}
