use crate::config::types::{
    CacheBackend, CacheConfig, Config, PipelineSettings, RateLimitConfig, RetryConfig,
    UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_pipeline_settings(&config.pipeline)?;
    validate_retry_config(&config.retry)?;
    validate_rate_limit_config(&config.rate_limit)?;
    validate_cache_config(&config.cache)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_targets(&config.targets)?;
    Ok(())
}

/// Validates worker pool and deadline settings
fn validate_pipeline_settings(config: &PipelineSettings) -> Result<(), ConfigError> {
    if let Some(workers) = config.max_workers {
        if !(1..=256).contains(&workers) {
            return Err(ConfigError::Validation(format!(
                "max_workers must be between 1 and 256, got {}",
                workers
            )));
        }
    }

    if config.job_timeout_ms == Some(0) {
        return Err(ConfigError::Validation(
            "job_timeout_ms must be > 0 when set".to_string(),
        ));
    }

    if config.batch_timeout_ms == Some(0) {
        return Err(ConfigError::Validation(
            "batch_timeout_ms must be > 0 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates the retry policy
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be <= 10, got {}",
            config.max_retries
        )));
    }

    if config.backoff_base_ms > config.backoff_max_ms {
        return Err(ConfigError::Validation(format!(
            "backoff_base_ms ({}) must not exceed backoff_max_ms ({})",
            config.backoff_base_ms, config.backoff_max_ms
        )));
    }

    Ok(())
}

/// Validates per-host limits
fn validate_rate_limit_config(config: &RateLimitConfig) -> Result<(), ConfigError> {
    if !config.requests_per_second.is_finite() || config.requests_per_second <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "requests_per_second must be a positive number, got {}",
            config.requests_per_second
        )));
    }

    if config.burst < 1 {
        return Err(ConfigError::Validation("burst must be >= 1".to_string()));
    }

    if config.max_concurrent_per_host < 1 {
        return Err(ConfigError::Validation(
            "max_concurrent_per_host must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates cache settings
fn validate_cache_config(config: &CacheConfig) -> Result<(), ConfigError> {
    if config.ttl_secs < 1 {
        return Err(ConfigError::Validation("ttl_secs must be >= 1".to_string()));
    }

    if config.max_entries < 1 {
        return Err(ConfigError::Validation(
            "max_entries must be >= 1".to_string(),
        ));
    }

    if config.sweep_interval_secs == Some(0) {
        return Err(ConfigError::Validation(
            "sweep_interval_secs must be > 0 when set".to_string(),
        ));
    }

    let needs_path = matches!(config.backend, CacheBackend::File | CacheBackend::Sqlite);
    let has_path = config.path.as_deref().is_some_and(|p| !p.is_empty());
    if needs_path && !has_path {
        return Err(ConfigError::Validation(format!(
            "cache backend '{}' requires a path",
            config.backend.as_str()
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates the default target list
fn validate_targets(targets: &[String]) -> Result<(), ConfigError> {
    for target in targets {
        let url = Url::parse(target).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid target URL '{}': {}", target, e))
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(format!(
                "Target URL '{}' must use http or https",
                target
            )));
        }
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_workers() {
        let mut config = Config::default();
        config.pipeline.max_workers = Some(0);
        assert!(validate(&config).is_err());

        config.pipeline.max_workers = Some(257);
        assert!(validate(&config).is_err());

        config.pipeline.max_workers = Some(16);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_validate_backoff_bounds() {
        let mut config = Config::default();
        config.retry.backoff_base_ms = 5_000;
        config.retry.backoff_max_ms = 1_000;
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_rate_limit() {
        let mut config = Config::default();
        config.rate_limit.requests_per_second = 0.0;
        assert!(validate(&config).is_err());

        config.rate_limit.requests_per_second = f64::NAN;
        assert!(validate(&config).is_err());

        config.rate_limit.requests_per_second = 0.5;
        config.rate_limit.burst = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_file_backend_requires_path() {
        let mut config = Config::default();
        config.cache.backend = CacheBackend::File;
        assert!(validate(&config).is_err());

        config.cache.path = Some("./cache".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_validate_targets() {
        let mut config = Config::default();
        config.targets = vec!["https://example.com/".to_string()];
        assert!(validate(&config).is_ok());

        config.targets = vec!["ftp://example.com/".to_string()];
        assert!(matches!(validate(&config), Err(ConfigError::InvalidUrl(_))));

        config.targets = vec!["not a url".to_string()];
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("admin@sub.example.com").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@domain").is_err());
    }
}
