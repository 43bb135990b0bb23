use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use procura_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    render(&config, config_file_doc.as_ref(), config_file_path.as_deref())
}

fn render(config: &AppConfig, doc: Option<&Value>, path: Option<&Path>) -> String {
    let api_token = config
        .auth
        .api_token
        .as_ref()
        .map_or_else(|| "<unset>".to_string(), |token| redact_token(token.expose_secret()));

    let fields: Vec<(&str, String, &str)> = vec![
        ("database.url", config.database.url.clone(), "PROCURA_DATABASE_URL"),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            "PROCURA_DATABASE_MAX_CONNECTIONS",
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            "PROCURA_DATABASE_TIMEOUT_SECS",
        ),
        ("server.bind_address", config.server.bind_address.clone(), "PROCURA_SERVER_BIND_ADDRESS"),
        ("server.port", config.server.port.to_string(), "PROCURA_SERVER_PORT"),
        (
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            "PROCURA_SERVER_GRACEFUL_SHUTDOWN_SECS",
        ),
        ("auth.api_token", api_token, "PROCURA_AUTH_API_TOKEN"),
        (
            "workflow.require_reject_comments",
            config.workflow.require_reject_comments.to_string(),
            "PROCURA_WORKFLOW_REQUIRE_REJECT_COMMENTS",
        ),
        (
            "workflow.cash_request_roles",
            config.workflow.cash_request_roles.join(","),
            "PROCURA_WORKFLOW_CASH_REQUEST_ROLES",
        ),
        (
            "workflow.supplier_roles",
            config.workflow.supplier_roles.join(","),
            "PROCURA_WORKFLOW_SUPPLIER_ROLES",
        ),
        (
            "workflow.contract_roles",
            config.workflow.contract_roles.join(","),
            "PROCURA_WORKFLOW_CONTRACT_ROLES",
        ),
        (
            "workflow.justification_roles",
            config.workflow.justification_roles.join(","),
            "PROCURA_WORKFLOW_JUSTIFICATION_ROLES",
        ),
        ("client.base_url", config.client.base_url.clone(), "PROCURA_CLIENT_BASE_URL"),
        ("logging.level", config.logging.level.clone(), "PROCURA_LOGGING_LEVEL"),
        ("logging.format", format!("{:?}", config.logging.format), "PROCURA_LOGGING_FORMAT"),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(fields.into_iter().map(|(key, value, env_key)| {
        render_line(key, &value, field_source(key, Some(env_key), doc, path))
    }));
    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    ["procura.toml", "config/procura.toml"]
        .into_iter()
        .map(PathBuf::from)
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

/// Keeps the first four characters so operators can tell tokens apart.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    let prefix: String = trimmed.chars().take(4).collect();
    format!("{prefix}***")
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use procura_core::config::AppConfig;
    use secrecy::SecretString;
    use toml::Value;

    use super::{contains_path, redact_token, render};

    #[test]
    fn token_is_redacted_to_a_short_prefix() {
        assert_eq!(redact_token("procura-secret-token-value"), "proc***");
        assert_eq!(redact_token("   "), "<empty>");
    }

    #[test]
    fn file_keys_are_attributed_to_the_file() {
        let doc: Value = "[workflow]\nrequire_reject_comments = false\n".parse().expect("toml");
        assert!(contains_path(&doc, "workflow.require_reject_comments"));
        assert!(!contains_path(&doc, "workflow.contract_roles"));

        let mut config = AppConfig::default();
        config.auth.api_token = Some(SecretString::from("procura-secret-token-value".to_string()));
        let output = render(&config, Some(&doc), Some(Path::new("procura.toml")));

        assert!(output.contains(
            "- workflow.require_reject_comments = true (source: file (procura.toml))"
        ));
        assert!(output.contains("- auth.api_token = proc***"));
        assert!(!output.contains("procura-secret-token-value"));
    }
}
