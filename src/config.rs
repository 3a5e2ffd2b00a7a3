//! Runtime settings from an optional config file and the environment
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("invoices.db")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Reads `invoice-factoring.{toml,yaml,json}` if present, then `INVOICE__*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::load_from("invoice-factoring")
    }

    pub fn load_from(file: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(file).required(false))
            .add_source(Environment::with_prefix("INVOICE").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent");
        let settings = Settings::load_from(missing.to_str().unwrap()).unwrap();

        assert_eq!(settings.database_path, PathBuf::from("invoices.db"));
        assert_eq!(settings.log_level, "info");
        assert!(!settings.json_logs);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("settings.toml"),
            "database_path = \"/var/lib/invoices\"\nlog_level = \"debug\"\njson_logs = true\n",
        )
        .unwrap();

        let base = dir.path().join("settings");
        let settings = Settings::load_from(base.to_str().unwrap()).unwrap();

        assert_eq!(settings.database_path, PathBuf::from("/var/lib/invoices"));
        assert_eq!(settings.log_level, "debug");
        assert!(settings.json_logs);
    }
}
