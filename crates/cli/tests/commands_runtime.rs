use std::env;
use std::io::Write;
use std::sync::{Mutex, OnceLock};

use famcal_cli::commands::{cleanup, config, doctor, migrate};
use serde_json::Value;

const VALID_ENV: [(&str, &str); 5] = [
    ("FAMCAL_SIGNAL_ACCOUNT", "+4915100000000"),
    ("FAMCAL_LLM_API_KEY", "sk-test-key"),
    ("FAMCAL_CALENDAR_ID", "family@group.calendar.google.com"),
    ("FAMCAL_CALENDAR_ACCESS_TOKEN", "ya29.test-token"),
    ("FAMCAL_DATABASE_URL", "sqlite::memory:"),
];

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&VALID_ENV, || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_without_secrets() {
    with_env(&[], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn cleanup_reports_purge_counts_on_fresh_database() {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let database_url = format!("sqlite://{}", dir.path().join("famcal.db").display());
    let mut vars = VALID_ENV[..4].to_vec();
    vars.push(("FAMCAL_DATABASE_URL", database_url.as_str()));

    with_env(&vars, || {
        let result = cleanup::run();
        assert_eq!(result.exit_code, 0, "expected successful cleanup run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "cleanup");
        assert_eq!(payload["status"], "ok");
        assert_eq!(
            payload["message"],
            "purged 0 expired conversations and 0 processed message ids"
        );
    });
}

#[test]
fn config_output_redacts_secrets_and_names_env_sources() {
    with_env(&VALID_ENV, || {
        let output = config::run();

        assert!(output.contains("FAMCAL_LLM_API_KEY"));
        assert!(!output.contains("sk-test-key"), "api key must not be printed");
        assert!(!output.contains("ya29.test-token"), "calendar token must not be printed");
    });
}

#[test]
fn doctor_passes_with_members_file_and_valid_env() {
    let mut members = tempfile::NamedTempFile::new().expect("members file");
    writeln!(members, "[[members]]\nphone = \"+4915100000001\"\nname = \"Anna\"")
        .expect("write members");
    let members_path = members.path().display().to_string();

    let mut vars = VALID_ENV.to_vec();
    vars.push(("FAMCAL_FAMILY_MEMBERS_PATH", members_path.as_str()));

    with_env(&vars, || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 0, "expected doctor pass: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "pass");
        let checks = payload["checks"].as_array().expect("checks array");
        let names = checks.iter().map(|check| check["name"].as_str()).collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                Some("config_validation"),
                Some("database_connectivity"),
                Some("family_whitelist"),
                Some("calendar_timezone"),
            ]
        );
        assert!(checks[2]["details"].as_str().unwrap_or_default().starts_with("1 family members"));
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_fails() {
    with_env(&[], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 1, "expected doctor failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][0]["status"], "fail");
        assert_eq!(payload["checks"][1]["status"], "skipped");
        assert_eq!(payload["checks"][3]["status"], "skipped");
    });
}

#[test]
fn doctor_human_output_marks_missing_whitelist() {
    let mut vars = VALID_ENV.to_vec();
    vars.push(("FAMCAL_FAMILY_MEMBERS_PATH", "/nonexistent/family-members.toml"));

    with_env(&vars, || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 1);
        assert!(result.output.starts_with("doctor: one or more readiness checks failed"));
        assert!(result.output.contains("- [fail] family_whitelist:"));
        assert!(result.output.contains("- [ok] calendar_timezone:"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "FAMCAL_DATABASE_URL",
        "FAMCAL_DATABASE_MAX_CONNECTIONS",
        "FAMCAL_DATABASE_TIMEOUT_SECS",
        "FAMCAL_MESSENGER_TRANSPORT",
        "FAMCAL_SIGNAL_ACCOUNT",
        "FAMCAL_SIGNAL_RPC_ADDRESS",
        "FAMCAL_WHATSAPP_ACCESS_TOKEN",
        "FAMCAL_WHATSAPP_PHONE_NUMBER_ID",
        "FAMCAL_WHATSAPP_APP_SECRET",
        "FAMCAL_WHATSAPP_VERIFY_TOKEN",
        "FAMCAL_LLM_API_KEY",
        "FAMCAL_LLM_BASE_URL",
        "FAMCAL_LLM_MODEL",
        "FAMCAL_CALENDAR_ID",
        "FAMCAL_CALENDAR_TIMEZONE",
        "FAMCAL_CALENDAR_ACCESS_TOKEN",
        "FAMCAL_FAMILY_MEMBERS_PATH",
        "FAMCAL_SERVER_BIND_ADDRESS",
        "FAMCAL_SERVER_HEALTH_CHECK_PORT",
        "FAMCAL_LOGGING_LEVEL",
        "FAMCAL_LOGGING_FORMAT",
        "FAMCAL_LOG_LEVEL",
        "FAMCAL_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
