use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with `HARVEST_` environment overrides.
///
/// Nested keys use a double underscore: `HARVEST_LIBRARY__ROOT=/srv/music`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("HARVEST_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BASE: &str = r#"
[[indexers]]
name = "rutracker"
base_url = "http://jackett:9117/api/v2.0/indexers/rutracker/results/torznab"
api_key = "k"

[download_client]
url = "http://qbittorrent:8080"
username = "admin"
password = "adminadmin"
"#;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = format!("{}\n[server]\nport = 9000\n", BASE);
        let config = load_config_from_str(&toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.indexers[0].name, "rutracker");
    }

    #[test]
    fn test_load_config_from_str_missing_indexers() {
        let toml = r#"
[download_client]
url = "http://qbittorrent:8080"
username = "admin"
password = "x"
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            "{}\n[server]\nhost = \"127.0.0.1\"\nport = 3000\n\n[pipeline]\nparallelism = 4\n",
            BASE
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
        assert_eq!(config.pipeline.parallelism, 4);
    }
}
