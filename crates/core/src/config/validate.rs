use super::{types::Config, ConfigError};
use crate::placer::validate_pattern;

/// Validate configuration beyond what serde enforces.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    if config.indexers.is_empty() {
        return Err(invalid("at least one [[indexers]] entry is required"));
    }
    for (i, indexer) in config.indexers.iter().enumerate() {
        if indexer.name.trim().is_empty() {
            return Err(invalid(&format!("indexers[{}].name cannot be empty", i)));
        }
        if indexer.base_url.trim().is_empty() {
            return Err(invalid(&format!(
                "indexers[{}].base_url cannot be empty",
                i
            )));
        }
    }
    let mut names: Vec<&str> = config.indexers.iter().map(|i| i.name.as_str()).collect();
    names.sort_unstable();
    if names.windows(2).any(|w| w[0] == w[1]) {
        return Err(invalid("indexer names must be unique"));
    }

    if config.download_client.url.trim().is_empty() {
        return Err(invalid("download_client.url cannot be empty"));
    }

    let health = &config.health;
    if health.cooldown_after == 0 || health.cooldown_after >= health.disable_after {
        return Err(invalid(
            "health.cooldown_after must be positive and below health.disable_after",
        ));
    }

    let backoff = &config.backoff;
    if backoff.base_minutes <= 0 || backoff.base_minutes > backoff.max_minutes {
        return Err(invalid(
            "backoff.base_minutes must be positive and not above backoff.max_minutes",
        ));
    }

    let threshold = config.resolver.similarity_threshold;
    if !(threshold > 0.0 && threshold <= 1.0) {
        return Err(invalid("resolver.similarity_threshold must be in (0, 1]"));
    }

    if config.pipeline.parallelism == 0 {
        return Err(invalid("pipeline.parallelism cannot be 0"));
    }

    for (key, pattern) in [
        ("library.artist_pattern", &config.library.artist_pattern),
        ("library.album_pattern", &config.library.album_pattern),
        ("library.disc_pattern", &config.library.disc_pattern),
        ("library.track_pattern", &config.library.track_pattern),
    ] {
        validate_pattern(pattern).map_err(|e| invalid(&format!("{}: {}", key, e)))?;
    }

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn config() -> Config {
        load_config_from_str(
            r#"
[[indexers]]
name = "a"
base_url = "http://a"

[download_client]
url = "http://qbt"
username = "u"
password = "p"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&config()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = config();
        config.server.port = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_requires_indexer() {
        let mut config = config();
        config.indexers.clear();
        assert!(validate_config(&config).is_err());

        let mut config = self::config();
        config.indexers[0].base_url = " ".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = self::config();
        let duplicate = config.indexers[0].clone();
        config.indexers.push(duplicate);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_threshold_order() {
        let mut config = config();
        config.health.cooldown_after = 20;
        config.health.disable_after = 20;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_backoff_bounds() {
        let mut config = config();
        config.backoff.base_minutes = 90;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_similarity_threshold() {
        let mut config = config();
        config.resolver.similarity_threshold = 0.0;
        assert!(validate_config(&config).is_err());
        config.resolver.similarity_threshold = 1.0;
        assert!(validate_config(&config).is_ok());
        config.resolver.similarity_threshold = 1.5;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_patterns() {
        let mut config = config();
        config.library.track_pattern = String::new();
        assert!(validate_config(&config).is_err());

        let mut config = self::config();
        config.library.album_pattern = "{Year} - {Album".to_string();
        assert!(validate_config(&config).is_err());
    }
}
