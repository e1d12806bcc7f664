use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "MEDIASWEEP_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/mediasweep.toml";
const ENV_PREFIX: &str = "MEDIASWEEP";
const ENV_SEPARATOR: &str = "__";
const LIST_SEPARATOR: &str = ",";

/// Resolve the config file from `MEDIASWEEP_CONFIG` (after reading `.env`)
/// and load it with environment overrides on top.
pub fn load() -> Result<Config, ConfigError> {
    // Missing .env is fine
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    load_from_sources(config_path)
}

/// Defaults, then `config_path` when it exists, then `MEDIASWEEP__*` variables.
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // MEDIASWEEP__WORKER__BATCH_SIZE -> worker.batch_size
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .list_separator(LIST_SEPARATOR)
            .with_list_parse_key("validator.ignore_keywords")
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.worker.batch_size, 50);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "127.0.0.1:9000"

[validator]
timeout = "2s"
max_redirects = 3
ignore_keywords = ["127.0.0.1:9199"]
unvalidatable_policy = "fail"

[worker]
batch_size = 25

[collections.yachts]
fixable = true
max_documents = 200

[collections.users]
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.validator.timeout.as_millis(), 2_000);
        assert_eq!(config.validator.max_redirects, 3);
        assert_eq!(config.validator.ignore_keywords, vec!["127.0.0.1:9199"]);
        assert_eq!(
            config.validator.unvalidatable_policy,
            crate::config::UnvalidatablePolicy::Fail
        );
        assert_eq!(config.worker.batch_size, 25);
        assert_eq!(config.worker.write_batch_size, 500);

        assert_eq!(config.collections.len(), 2);
        assert!(config.collections["yachts"].fixable);
        assert_eq!(config.collections["yachts"].max_documents, Some(200));
        assert!(!config.collections["users"].fixable);
    }

    #[test]
    fn test_placeholders_and_base_urls() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[validator]
base_url = "https://app.example.com/"

[repair]
base_url = "https://cdn.example.com/"

[repair.placeholders]
image = "https://cdn.example.com/placeholder.jpg"

[scheduler]
task_retention = "3d"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(
            config.validator.base_url.as_ref().map(|u| u.as_str()),
            Some("https://app.example.com/")
        );
        assert_eq!(
            config.repair.placeholders.image.as_str(),
            "https://cdn.example.com/placeholder.jpg"
        );
        // untouched placeholders keep their defaults
        assert_eq!(
            config.repair.placeholders.video,
            crate::config::PlaceholderConfig::default().video
        );
        assert_eq!(config.scheduler.task_retention.as_millis(), 3 * 86_400_000);
    }
}
