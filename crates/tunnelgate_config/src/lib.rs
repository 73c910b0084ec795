use config::{Config, ConfigError, Environment, File};
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub mod env_vars;
pub mod models;

pub use models::*;

/// Loads the application configuration.
///
/// Sources, later ones overriding earlier ones:
/// 1. `<CONFIG_DIR>/default.{toml,yaml,json}`
/// 2. `<CONFIG_DIR>/<RUN_ENV>.{toml,yaml,json}` (RUN_ENV defaults to "debug")
/// 3. `TUNNELGATE__SECTION__KEY` environment variables
///
/// Afterwards every `"secret_from_env"` value is replaced from the environment.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    ensure_dotenv_loaded();
    let config_dir = env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
    load_config_from(Path::new(&config_dir))
}

/// Same as [`load_config`] but with an explicit config directory.
pub fn load_config_from(config_dir: &Path) -> Result<AppConfig, ConfigError> {
    let run_env = env::var("RUN_ENV").unwrap_or_else(|_| "debug".to_string());
    let prefix = env_vars::get_config_prefix();

    let default_path: PathBuf = config_dir.join("default");
    let env_path: PathBuf = config_dir.join(&run_env);

    debug!(
        "Loading config: default={}, env={}",
        default_path.display(),
        env_path.display()
    );

    let builder = Config::builder()
        .add_source(File::from(default_path).required(false))
        .add_source(File::from(env_path).required(false))
        .add_source(Environment::with_prefix(&prefix).separator("__"));

    let raw_config: AppConfig = builder.build()?.try_deserialize()?;
    let config = apply_env_overrides_from_marker(raw_config)?;
    info!(
        "Configuration loaded (RUN_ENV={}, use_panel={}, use_payment={})",
        run_env, config.use_panel, config.use_payment
    );
    Ok(config)
}

/// Applies environment overrides based on "secret_from_env" markers in serialized config
pub fn apply_env_overrides_from_marker(config: AppConfig) -> Result<AppConfig, ConfigError> {
    let mut json: Value = serde_json::to_value(&config)
        .map_err(|err| ConfigError::Message(format!("failed to serialize config: {err}")))?;
    env_vars::inject_env_vars(&mut json);
    serde_json::from_value(json)
        .map_err(|err| ConfigError::Message(format!("failed to rebuild config: {err}")))
}

static INIT_DOTENV: OnceCell<()> = OnceCell::new();

/// Loads the dotenv file into the process environment, once.
///
/// The path is taken from `DOTENV_OVERRIDE`, then from the first command line
/// argument if it starts with `.env`, and falls back to `.env`. A missing file is
/// not an error. Returns the path that was used.
pub fn ensure_dotenv_loaded() -> String {
    let dotenv_path_override = env::var("DOTENV_OVERRIDE").ok();
    let dotenv_path_arg = env::args().nth(1).filter(|s| s.starts_with(".env"));

    let dotenv_path = dotenv_path_override
        .or(dotenv_path_arg)
        .unwrap_or_else(|| ".env".to_string());

    INIT_DOTENV.get_or_init(|| {
        dotenv::from_filename(&dotenv_path).ok();
    });

    dotenv_path
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_config_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("tunnelgate-config-{}-{}", name, std::process::id()));
        fs::create_dir_all(&dir).expect("create temp config dir");
        dir
    }

    #[test]
    fn test_load_config_from_toml_with_defaults() {
        let dir = temp_config_dir("defaults");
        fs::write(
            dir.join("default.toml"),
            r#"
use_panel = true

[server]
host = "127.0.0.1"
port = 8080

[panel]
url = "https://panel.example.com"
username = "admin"
password = "hunter2"
"#,
        )
        .expect("write default.toml");

        let config = load_config_from(&dir).expect("config should load");
        assert!(config.use_panel);
        assert!(!config.use_payment);
        assert!(config.payment.is_none());

        let panel = config.panel.expect("panel section");
        assert_eq!(panel.url, "https://panel.example.com");
        assert_eq!(panel.max_attempts, 3);
        assert_eq!(panel.retry_base_delay_ms, 1000);
        assert_eq!(panel.token_lifetime_secs, 23 * 60 * 60);
        assert_eq!(panel.vless_port, 443);
    }

    #[test]
    fn test_secret_marker_is_resolved() {
        env::set_var("TUNNELGATE_SECRET_PAYMENT_WEBHOOK_SECRET", "whsec_marker_test");
        let dir = temp_config_dir("marker");
        fs::write(
            dir.join("default.toml"),
            r#"
[server]
host = "0.0.0.0"
port = 3000

[payment]
api_url = "https://pay.example.com/v1"
api_key = "key"
api_secret = "secret"
webhook_secret = "secret_from_env"

[[payment.plans]]
id = "month"
duration_days = 30
unit_amount = 500
"#,
        )
        .expect("write default.toml");

        let config = load_config_from(&dir).expect("config should load");
        let payment = config.payment.expect("payment section");
        assert_eq!(payment.webhook_secret, "whsec_marker_test");
        assert_eq!(payment.plan("month").map(|p| p.duration_days), Some(30));
        assert!(payment.plan("year").is_none());
    }
}
