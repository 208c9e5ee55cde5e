use crate::config::types::{Config, FetcherConfig, PartitionConfig, PolitenessConfig, UserAgentConfig};
use crate::partition::HashRange;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_fetcher_config(&config.fetcher)?;
    validate_politeness_config(&config.politeness)?;
    validate_user_agent_config(&config.user_agent)?;
    if let Some(partition) = &config.partition {
        partition_range(partition)?;
    }
    Ok(())
}

/// Parses the configured partition into a hash range
pub fn partition_range(config: &PartitionConfig) -> Result<HashRange, ConfigError> {
    let min = config
        .min
        .parse()
        .map_err(|e| ConfigError::InvalidPartition(format!("min: {}", e)))?;
    let max = config
        .max
        .parse()
        .map_err(|e| ConfigError::InvalidPartition(format!("max: {}", e)))?;
    HashRange::new(min, max).map_err(|e| ConfigError::InvalidPartition(e.to_string()))
}

fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_fetches < 1 || config.max_concurrent_fetches > 100_000 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_fetches must be between 1 and 100000, got {}",
            config.max_concurrent_fetches
        )));
    }

    if config.valve_wait_ms < 1 {
        return Err(ConfigError::Validation(
            "valve_wait_ms must be >= 1ms".to_string(),
        ));
    }

    if config.slot_wait_log_ms < 1 || config.status_interval_ms < 1 {
        return Err(ConfigError::Validation(
            "slot_wait_log_ms and status_interval_ms must be >= 1ms".to_string(),
        ));
    }

    Ok(())
}

fn validate_politeness_config(config: &PolitenessConfig) -> Result<(), ConfigError> {
    if config.min_fetch_interval_ms < 1 {
        return Err(ConfigError::Validation(format!(
            "min_fetch_interval_ms must be >= 1ms, got {}ms",
            config.min_fetch_interval_ms
        )));
    }

    if config.host_cache_capacity < 1 {
        return Err(ConfigError::Validation(
            "host_cache_capacity must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    // The name doubles as the robots.txt product token
    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters, hyphens and underscores, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::Validation(format!("Invalid contact_url: {}", e)))?;

    if !config.contact_email.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid contact_email '{}'",
            config.contact_email
        )));
    }

    Ok(())
}
