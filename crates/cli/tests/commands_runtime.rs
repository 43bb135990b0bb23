use std::env;
use std::sync::{Mutex, OnceLock};

use procura_cli::commands::{config, doctor, migrate, seed};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = sqlite_url(&dir, "migrate.db");
    with_env(&[("PROCURA_DATABASE_URL", &url)], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("PROCURA_DATABASE_URL", "postgres://localhost/procura")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_loads_demo_directory_and_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = sqlite_url(&dir, "seed.db");
    with_env(&[("PROCURA_DATABASE_URL", &url)], || {
        let first = seed::run(false);
        assert_eq!(first.exit_code, 0, "expected first seed invocation success: {}", first.output);
        let first_payload = parse_payload(&first.output);
        let message = first_payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("7 members"), "{message}");
        assert!(message.contains("u-kofi"), "{message}");

        let second = seed::run(true);
        assert_eq!(second.exit_code, 0, "expected clean reseed success: {}", second.output);
        let second_payload = parse_payload(&second.output);
        assert_eq!(first_payload["message"], second_payload["message"]);
    });
}

#[test]
fn doctor_reports_unmigrated_schema_then_passes_after_seed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = sqlite_url(&dir, "doctor.db");
    with_env(&[("PROCURA_DATABASE_URL", &url)], || {
        let report = parse_payload(&doctor::run(true));
        assert_eq!(report["overall_status"], "fail");
        assert_eq!(check_status(&report, "database_connectivity"), "pass");
        assert_eq!(check_status(&report, "schema_migrations"), "fail");
        assert_eq!(check_status(&report, "directory_coverage"), "skipped");

        assert_eq!(seed::run(false).exit_code, 0);

        let report = parse_payload(&doctor::run(true));
        assert_eq!(report["overall_status"], "pass", "{report}");
        assert_eq!(check_status(&report, "directory_coverage"), "pass");
    });
}

#[test]
fn doctor_skips_database_checks_when_config_is_invalid() {
    with_env(&[("PROCURA_DATABASE_URL", "mysql://nope")], || {
        let report = parse_payload(&doctor::run(true));
        assert_eq!(report["overall_status"], "fail");
        assert_eq!(check_status(&report, "config_validation"), "fail");
        assert_eq!(check_status(&report, "schema_migrations"), "skipped");
    });
}

#[test]
fn config_attributes_env_sources_and_redacts_token() {
    with_env(
        &[
            ("PROCURA_AUTH_API_TOKEN", "procura-secret-token-value"),
            ("PROCURA_SERVER_PORT", "9090"),
        ],
        || {
            let output = config::run();
            assert!(output.contains("- server.port = 9090 (source: env (PROCURA_SERVER_PORT))"));
            assert!(output.contains("- auth.api_token = proc***"));
            assert!(!output.contains("procura-secret-token-value"));
        },
    );
}

fn sqlite_url(dir: &tempfile::TempDir, file: &str) -> String {
    format!("sqlite://{}", dir.path().join(file).display())
}

fn check_status(report: &Value, name: &str) -> String {
    report["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .and_then(|check| check["status"].as_str())
        .unwrap_or("missing")
        .to_string()
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "PROCURA_DATABASE_URL",
        "PROCURA_DATABASE_MAX_CONNECTIONS",
        "PROCURA_DATABASE_TIMEOUT_SECS",
        "PROCURA_SERVER_BIND_ADDRESS",
        "PROCURA_SERVER_PORT",
        "PROCURA_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "PROCURA_AUTH_API_TOKEN",
        "PROCURA_WORKFLOW_REQUIRE_REJECT_COMMENTS",
        "PROCURA_WORKFLOW_CASH_REQUEST_ROLES",
        "PROCURA_WORKFLOW_SUPPLIER_ROLES",
        "PROCURA_WORKFLOW_CONTRACT_ROLES",
        "PROCURA_WORKFLOW_JUSTIFICATION_ROLES",
        "PROCURA_CLIENT_BASE_URL",
        "PROCURA_LOGGING_LEVEL",
        "PROCURA_LOGGING_FORMAT",
        "PROCURA_LOG_LEVEL",
        "PROCURA_LOG_FORMAT",
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
