use super::models::Config;
use thiserror::Error;
use url::Url;

/// Largest number of mutations a single store commit accepts.
pub const MAX_WRITE_BATCH: usize = 500;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} must be positive")]
    NotPositive { field: String },

    #[error("worker.write_batch_size ({actual}) exceeds the store limit of {limit}")]
    WriteBatchTooLarge { actual: usize, limit: usize },

    #[error("{field} must be an absolute http(s) URL, got '{value}'")]
    InvalidUrl { field: String, value: String },

    #[error("Collection names must not be empty")]
    EmptyCollectionName,

    #[error("Message topic name must not be empty")]
    EmptyTopic,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_validator(config)?;
    validate_repair(config)?;
    validate_worker(config)?;
    validate_scheduler(config)?;
    validate_collections(config)?;
    Ok(())
}

fn validate_validator(config: &Config) -> Result<(), ValidationError> {
    if config.validator.timeout.is_zero() {
        return Err(not_positive("validator.timeout"));
    }

    if config.validator.max_concurrency == 0 {
        return Err(not_positive("validator.max_concurrency"));
    }

    if let Some(ref base) = config.validator.base_url {
        check_http_url("validator.base_url", base)?;
    }

    Ok(())
}

fn validate_repair(config: &Config) -> Result<(), ValidationError> {
    if let Some(ref base) = config.repair.base_url {
        check_http_url("repair.base_url", base)?;
    }

    let placeholders = &config.repair.placeholders;
    for (name, url) in [
        ("repair.placeholders.image", &placeholders.image),
        ("repair.placeholders.video", &placeholders.video),
        ("repair.placeholders.avatar", &placeholders.avatar),
        ("repair.placeholders.thumbnail", &placeholders.thumbnail),
        ("repair.placeholders.yacht", &placeholders.yacht),
        ("repair.placeholders.addon", &placeholders.addon),
    ] {
        check_http_url(name, url)?;
    }

    Ok(())
}

fn validate_worker(config: &Config) -> Result<(), ValidationError> {
    let worker = &config.worker;

    if worker.batch_size == 0 {
        return Err(not_positive("worker.batch_size"));
    }

    if worker.write_batch_size == 0 {
        return Err(not_positive("worker.write_batch_size"));
    }

    if worker.write_batch_size > MAX_WRITE_BATCH {
        return Err(ValidationError::WriteBatchTooLarge {
            actual: worker.write_batch_size,
            limit: MAX_WRITE_BATCH,
        });
    }

    if worker.max_documents_per_collection == 0 {
        return Err(not_positive("worker.max_documents_per_collection"));
    }

    Ok(())
}

fn validate_scheduler(config: &Config) -> Result<(), ValidationError> {
    let scheduler = &config.scheduler;

    if scheduler.topic.trim().is_empty() {
        return Err(ValidationError::EmptyTopic);
    }

    if scheduler.task_retention.is_zero() {
        return Err(not_positive("scheduler.task_retention"));
    }

    if scheduler.cleanup_interval.is_zero() {
        return Err(not_positive("scheduler.cleanup_interval"));
    }

    if scheduler.channel_size == 0 {
        return Err(not_positive("scheduler.channel_size"));
    }

    Ok(())
}

fn validate_collections(config: &Config) -> Result<(), ValidationError> {
    for (name, collection) in &config.collections {
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyCollectionName);
        }
        if collection.max_documents == Some(0) {
            return Err(not_positive(&format!("collections.{}.max_documents", name)));
        }
    }

    Ok(())
}

fn check_http_url(field: &str, url: &Url) -> Result<(), ValidationError> {
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(()),
        _ => Err(ValidationError::InvalidUrl {
            field: field.to_string(),
            value: url.to_string(),
        }),
    }
}

fn not_positive(field: &str) -> ValidationError {
    ValidationError::NotPositive {
        field: field.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::models::*;
    use super::*;
    use crate::humanize::HumanDuration;

    fn create_test_config() -> Config {
        let mut config = Config::default();
        config.collections.insert(
            "yachts".to_string(),
            CollectionConfig {
                fixable: true,
                max_documents: None,
            },
        );
        config
    }

    #[test]
    fn test_valid_config() {
        let config = create_test_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_batch_size() {
        let mut config = create_test_config();
        config.worker.batch_size = 0;

        let result = validate(&config);
        assert!(matches!(result, Err(ValidationError::NotPositive { .. })));
    }

    #[test]
    fn test_write_batch_limit() {
        let mut config = create_test_config();
        config.worker.write_batch_size = 501;

        let result = validate(&config);
        assert!(matches!(
            result,
            Err(ValidationError::WriteBatchTooLarge { actual: 501, .. })
        ));
    }

    #[test]
    fn test_zero_timeout() {
        let mut config = create_test_config();
        config.validator.timeout = HumanDuration::from_millis(0);

        assert!(matches!(
            validate(&config),
            Err(ValidationError::NotPositive { .. })
        ));
    }

    #[test]
    fn test_non_http_placeholder() {
        let mut config = create_test_config();
        config.repair.placeholders.video = Url::parse("ftp://files.example.com/v.mp4").unwrap();

        let result = validate(&config);
        assert!(matches!(result, Err(ValidationError::InvalidUrl { .. })));
    }

    #[test]
    fn test_non_http_base_url() {
        let mut config = create_test_config();
        config.repair.base_url = Some(Url::parse("file:///srv/media/").unwrap());

        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_zero_collection_cap() {
        let mut config = create_test_config();
        config.collections.get_mut("yachts").unwrap().max_documents = Some(0);

        assert!(matches!(
            validate(&config),
            Err(ValidationError::NotPositive { .. })
        ));
    }

    #[test]
    fn test_zero_retention() {
        let mut config = create_test_config();
        config.scheduler.task_retention = HumanDuration::from_millis(0);

        assert!(matches!(
            validate(&config),
            Err(ValidationError::NotPositive { .. })
        ));
    }
}
