//! Environment variable handling for Tunnelgate.
//!
//! Configuration values are read from `TUNNELGATE__SECTION__KEY` variables,
//! secrets from `TUNNELGATE_SECRET_SECTION_KEY` with a fallback to the legacy
//! `SECTION_KEY` form (e.g. `PANEL_PASSWORD`).

use std::env;
use tracing::warn;

/// The default prefix for configuration environment variables
pub const DEFAULT_PREFIX: &str = "TUNNELGATE";

/// The prefix for secret environment variables
pub const SECRET_PREFIX: &str = "TUNNELGATE_SECRET";

/// The separator for configuration environment variables
pub const CONFIG_SEPARATOR: &str = "__";

/// The separator for secret environment variables
pub const SECRET_SEPARATOR: &str = "_";

/// Marker value in config files that asks for the value to be taken from the environment.
pub const SECRET_MARKER: &str = "secret_from_env";

/// Get the prefix for configuration environment variables
pub fn get_config_prefix() -> String {
    env::var("PREFIX").unwrap_or_else(|_| DEFAULT_PREFIX.to_string())
}

/// Convert a configuration path to an environment variable name
///
/// `"server.host"` becomes `"TUNNELGATE__SERVER__HOST"`.
pub fn config_path_to_env_var(path: &str) -> String {
    let prefix = get_config_prefix();
    let path = path.replace('.', CONFIG_SEPARATOR);
    format!("{}{}{}", prefix, CONFIG_SEPARATOR, path).to_uppercase()
}

/// Convert a secret path to an environment variable name
///
/// `"panel.password"` becomes `"TUNNELGATE_SECRET_PANEL_PASSWORD"`.
pub fn secret_path_to_env_var(path: &str) -> String {
    let path = path.replace('.', SECRET_SEPARATOR);
    format!("{}{}{}", SECRET_PREFIX, SECRET_SEPARATOR, path).to_uppercase()
}

/// Convert a secret path to its short legacy form.
///
/// `"payment.webhook_secret"` becomes `"PAYMENT_WEBHOOK_SECRET"`.
pub fn legacy_secret_path_to_env_var(path: &str) -> String {
    let parts: Vec<&str> = path.split('.').collect();
    if parts.len() < 2 {
        return path.to_uppercase();
    }

    let service = parts[0];
    let key = parts[1..].join(SECRET_SEPARATOR);
    format!("{}_{}", service, key).to_uppercase()
}

/// Get an environment variable for a configuration path
pub fn get_config_env_var(path: &str) -> Option<String> {
    let env_var = config_path_to_env_var(path);
    env::var(&env_var).ok()
}

/// Get an environment variable for a secret path, trying the prefixed name
/// first and the legacy name second.
pub fn get_secret_env_var(path: &str) -> Option<String> {
    let env_var = secret_path_to_env_var(path);
    if let Ok(value) = env::var(&env_var) {
        return Some(value);
    }

    let legacy_env_var = legacy_secret_path_to_env_var(path);
    env::var(&legacy_env_var).ok()
}

/// Check if a path is a secret path
///
/// Paths containing "secret", "key", "password" or "token" are considered secret.
pub fn is_secret_path(path: &str) -> bool {
    let path_lower = path.to_lowercase();
    path_lower.contains("secret")
        || path_lower.contains("key")
        || path_lower.contains("password")
        || path_lower.contains("token")
}

/// Get an environment variable for a path, secret or not.
pub fn get_env_var(path: &str) -> Option<String> {
    if is_secret_path(path) {
        get_secret_env_var(path)
    } else {
        get_config_env_var(path)
    }
}

/// Inject environment variables into a JSON value
///
/// Recursively replaces every `"secret_from_env"` string with the value of the
/// matching environment variable. Returns `true` if anything was replaced.
/// Markers without a matching variable are left in place; the client that
/// consumes the section rejects them at construction.
pub fn inject_env_vars(value: &mut serde_json::Value) -> bool {
    use serde_json::Value;

    fn walk(path: Vec<String>, obj: &mut Value) -> bool {
        let mut replaced = false;

        match obj {
            Value::Object(map) => {
                for (k, v) in map.iter_mut() {
                    let mut new_path = path.clone();
                    new_path.push(k.to_string());
                    replaced |= walk(new_path, v);
                }
            }
            Value::Array(arr) => {
                for (i, v) in arr.iter_mut().enumerate() {
                    let mut new_path = path.clone();
                    new_path.push(i.to_string());
                    replaced |= walk(new_path, v);
                }
            }
            Value::String(s) if s == SECRET_MARKER => {
                let path_str = path.join(".");
                if let Some(env_val) = get_env_var(&path_str) {
                    *s = env_val;
                    replaced = true;
                } else {
                    warn!("env var for {} not found", path_str);
                }
            }
            _ => {}
        }

        replaced
    }

    walk(vec![], value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_to_env_var() {
        assert_eq!(
            config_path_to_env_var("server.host"),
            "TUNNELGATE__SERVER__HOST"
        );
        assert_eq!(
            config_path_to_env_var("panel.url"),
            "TUNNELGATE__PANEL__URL"
        );
    }

    #[test]
    fn test_secret_path_to_env_var() {
        assert_eq!(
            secret_path_to_env_var("panel.password"),
            "TUNNELGATE_SECRET_PANEL_PASSWORD"
        );
        assert_eq!(
            secret_path_to_env_var("payment.webhook_secret"),
            "TUNNELGATE_SECRET_PAYMENT_WEBHOOK_SECRET"
        );
    }

    #[test]
    fn test_legacy_secret_path_to_env_var() {
        assert_eq!(
            legacy_secret_path_to_env_var("panel.password"),
            "PANEL_PASSWORD"
        );
        assert_eq!(
            legacy_secret_path_to_env_var("payment.api_key"),
            "PAYMENT_API_KEY"
        );
    }

    #[test]
    fn test_is_secret_path() {
        assert!(is_secret_path("panel.password"));
        assert!(is_secret_path("payment.api_key"));
        assert!(is_secret_path("payment.webhook_secret"));
        assert!(!is_secret_path("server.host"));
        assert!(!is_secret_path("panel.url"));
    }

    #[test]
    fn test_inject_replaces_marker_from_env() {
        env::set_var(
            "TUNNELGATE_SECRET_INJECTTEST_API_SECRET",
            "from-the-environment",
        );
        let mut value = serde_json::json!({
            "injecttest": { "api_secret": "secret_from_env", "host": "localhost" }
        });

        assert!(inject_env_vars(&mut value));
        assert_eq!(value["injecttest"]["api_secret"], "from-the-environment");
        assert_eq!(value["injecttest"]["host"], "localhost");
    }

    #[test]
    fn test_inject_leaves_marker_when_env_missing() {
        let mut value = serde_json::json!({
            "nosuchsection": { "password": "secret_from_env" }
        });

        assert!(!inject_env_vars(&mut value));
        assert_eq!(value["nosuchsection"]["password"], SECRET_MARKER);
    }
}
