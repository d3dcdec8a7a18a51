use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::{env, path::PathBuf};
use tracing::{debug, warn};

/// Largest batch the archive endpoint accepts
pub const MAX_BATCH_SIZE: usize = 100;
/// Largest page the list and search endpoints return
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Private app access token, sent as a bearer credential
    pub token: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_base_url() -> String {
    "https://api.hubapi.com".to_string()
}
const fn default_timeout_seconds() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: default_base_url(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[allow(clippy::struct_field_names)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Identifiers per archive call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Records requested per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Records per chunked output file
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Records fetched for a data sample
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
    /// Pause between page requests
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
}

const fn default_batch_size() -> usize {
    MAX_BATCH_SIZE
}
const fn default_page_size() -> usize {
    MAX_PAGE_SIZE
}
const fn default_chunk_size() -> usize {
    2000
}
const fn default_sample_size() -> usize {
    100
}
const fn default_page_delay_ms() -> u64 {
    100
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            page_size: default_page_size(),
            chunk_size: default_chunk_size(),
            sample_size: default_sample_size(),
            page_delay_ms: default_page_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after a failed page request
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub delay_seconds: u64,
}

const fn default_max_retries() -> u32 {
    3
}
const fn default_retry_delay() -> u64 {
    5
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            delay_seconds: default_retry_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Folder scanned for `<object>.csv` deletion lists
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
    /// Folder receiving every exported artifact
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("delete")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("extract")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Reads an environment variable, treating empty values as unset
fn env_value(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Resolves a `${NAME}` reference from the environment; other values pass through
#[must_use]
pub fn expand_env_reference(value: String) -> Option<String> {
    match value.strip_prefix("${").and_then(|v| v.strip_suffix('}')) {
        Some(name) => env_value(name),
        None => Some(value),
    }
}

/// Settings taken from the command line. `None` leaves the loaded value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub token: Option<String>,
    pub base_url: Option<String>,
    pub batch_size: Option<usize>,
    pub chunk_size: Option<usize>,
    pub sample_size: Option<usize>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file at the specified path.
    ///
    /// A token written as `${NAME}` is read from that environment variable.
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - The file cannot be read
    /// - The TOML content cannot be parsed into the Config structure
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&contents)?;
        config.api.token = config.api.token.and_then(expand_env_reference);
        Ok(config)
    }

    /// Load configuration from environment variables
    ///
    /// `HUBTOOLS_TOKEN` wins over the legacy `HUBSPOT_TOKEN`.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable does not parse.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(token) = env_value("HUBTOOLS_TOKEN").or_else(|| env_value("HUBSPOT_TOKEN")) {
            self.api.token = Some(token);
        }
        if let Some(base_url) = env_value("HUBTOOLS_BASE_URL") {
            self.api.base_url = base_url;
        }
        if let Some(timeout) = env_value("HUBTOOLS_TIMEOUT") {
            self.api.timeout_seconds = timeout.parse()?;
        }

        if let Some(batch_size) = env_value("HUBTOOLS_BATCH_SIZE") {
            self.batch.batch_size = batch_size.parse()?;
        }
        if let Some(page_size) = env_value("HUBTOOLS_PAGE_SIZE") {
            self.batch.page_size = page_size.parse()?;
        }
        if let Some(chunk_size) = env_value("HUBTOOLS_CHUNK_SIZE") {
            self.batch.chunk_size = chunk_size.parse()?;
        }
        if let Some(sample_size) = env_value("HUBTOOLS_SAMPLE_SIZE") {
            self.batch.sample_size = sample_size.parse()?;
        }

        if let Some(retries) = env_value("HUBTOOLS_MAX_RETRIES") {
            self.retry.max_retries = retries.parse()?;
        }
        if let Some(delay) = env_value("HUBTOOLS_RETRY_DELAY") {
            self.retry.delay_seconds = delay.parse()?;
        }

        if let Some(input_dir) = env_value("HUBTOOLS_INPUT_DIR") {
            self.paths.input_dir = PathBuf::from(input_dir);
        }
        if let Some(output_dir) = env_value("HUBTOOLS_OUTPUT_DIR") {
            self.paths.output_dir = PathBuf::from(output_dir);
        }

        if let Some(level) = env_value("HUBTOOLS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = env_value("HUBTOOLS_LOG_FORMAT") {
            self.logging.format = format;
        }
        Ok(())
    }

    /// Candidate config files, most specific first
    #[must_use]
    pub fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("hubtools.toml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("hubtools/config.toml"));
        }
        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".config/hubtools/config.toml"));
        }
        paths
    }

    /// Load configuration from `.env`, the first config file found, and the
    /// environment, in increasing order of precedence. An explicit path must
    /// exist; the default locations are optional.
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - An explicitly requested file cannot be read or parsed
    /// - An environment variable holds an invalid value
    pub fn load(explicit: Option<&PathBuf>) -> Result<Self> {
        // A missing .env is the common case
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "Loaded .env");
        }

        let mut config = if let Some(path) = explicit {
            Self::from_file(path)
                .map_err(|e| anyhow!("failed to load config {}: {e}", path.display()))?
        } else {
            let mut found = None;
            for path in Self::default_paths() {
                if !path.exists() {
                    continue;
                }
                match Self::from_file(&path) {
                    Ok(file_config) => {
                        debug!(path = %path.display(), "Loaded config file");
                        found = Some(file_config);
                        break;
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                    }
                }
            }
            found.unwrap_or_default()
        };

        config.apply_env()?;
        Ok(config)
    }

    /// Apply command-line settings; every field that was given wins
    pub fn merge(&mut self, overrides: ConfigOverrides) {
        if let Some(token) = overrides.token {
            self.api.token = Some(token);
        }
        if let Some(base_url) = overrides.base_url {
            self.api.base_url = base_url;
        }
        if let Some(batch_size) = overrides.batch_size {
            self.batch.batch_size = batch_size;
        }
        if let Some(chunk_size) = overrides.chunk_size {
            self.batch.chunk_size = chunk_size;
        }
        if let Some(sample_size) = overrides.sample_size {
            self.batch.sample_size = sample_size;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        if let Some(format) = overrides.log_format {
            self.logging.format = format;
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - The access token is missing or blank
    /// - The base URL is not an http(s) URL
    /// - A batch, page or chunk size is out of range
    pub fn validate(&self) -> Result<()> {
        match self.api.token.as_deref() {
            Some(token) if !token.trim().is_empty() => {}
            _ => {
                return Err(anyhow!(
                    "access token is required (set HUBSPOT_TOKEN in .env or pass --token)"
                ))
            }
        }

        let url = url::Url::parse(&self.api.base_url)
            .map_err(|e| anyhow!("invalid base_url {}: {e}", self.api.base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!("base_url must use http or https"));
        }

        if !(1..=MAX_BATCH_SIZE).contains(&self.batch.batch_size) {
            return Err(anyhow!("batch_size must be between 1 and {MAX_BATCH_SIZE}"));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.batch.page_size) {
            return Err(anyhow!("page_size must be between 1 and {MAX_PAGE_SIZE}"));
        }
        if self.batch.chunk_size == 0 {
            return Err(anyhow!("chunk_size must be greater than 0"));
        }
        if self.batch.sample_size == 0 {
            return Err(anyhow!("sample_size must be greater than 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::EnvGuard;
    use std::fs;
    use tempfile::tempdir;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.api.token = Some("pat-test".to_string());
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api.token, None);
        assert_eq!(config.api.base_url, "https://api.hubapi.com");
        assert_eq!(config.batch.batch_size, 100);
        assert_eq!(config.batch.page_size, 100);
        assert_eq!(config.batch.chunk_size, 2000);
        assert_eq!(config.batch.page_delay_ms, 100);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.delay_seconds, 5);
        assert_eq!(config.paths.input_dir, PathBuf::from("delete"));
        assert_eq!(config.paths.output_dir, PathBuf::from("extract"));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_err()); // no token

        config.api.token = Some("   ".to_string());
        assert!(config.validate().is_err());

        let mut config = valid_config();
        assert!(config.validate().is_ok());

        config.batch.batch_size = 101;
        assert!(config.validate().is_err());
        config.batch.batch_size = 0;
        assert!(config.validate().is_err());
        config.batch.batch_size = 50;
        assert!(config.validate().is_ok());

        config.batch.chunk_size = 0;
        assert!(config.validate().is_err());
        config.batch.chunk_size = 10;
        config.retry.max_retries = 0;
        assert!(config.validate().is_ok());

        config.api.base_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());
        config.api.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_merge() {
        let mut base = valid_config();
        base.batch.chunk_size = 500;

        base.merge(ConfigOverrides {
            token: Some("cli-token".to_string()),
            base_url: Some("http://localhost:9999".to_string()),
            batch_size: Some(25),
            ..ConfigOverrides::default()
        });

        assert_eq!(base.api.token.as_deref(), Some("cli-token"));
        assert_eq!(base.api.base_url, "http://localhost:9999");
        assert_eq!(base.batch.batch_size, 25);
        // unset overrides leave loaded values alone
        assert_eq!(base.batch.chunk_size, 500);
    }

    #[test]
    fn test_merge_applies_values_equal_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hubtools.toml");
        fs::write(
            &path,
            r#"
            [api]
            token = "pat-file"

            [batch]
            batch_size = 50
            chunk_size = 10

            [logging]
            level = "warn"
            "#,
        )
        .unwrap();
        let mut config = Config::from_file(&path).unwrap();

        config.merge(ConfigOverrides {
            batch_size: Some(100),
            chunk_size: Some(2000),
            log_level: Some("info".to_string()),
            ..ConfigOverrides::default()
        });

        assert_eq!(config.batch.batch_size, 100);
        assert_eq!(config.batch.chunk_size, 2000);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.api.token.as_deref(), Some("pat-file"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hubtools.toml");
        fs::write(
            &path,
            r#"
            [api]
            token = "pat-file"

            [batch]
            chunk_size = 50

            [paths]
            output_dir = "out"
            "#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.api.token.as_deref(), Some("pat-file"));
        assert_eq!(config.api.base_url, "https://api.hubapi.com");
        assert_eq!(config.batch.chunk_size, 50);
        assert_eq!(config.batch.batch_size, 100);
        assert_eq!(config.paths.output_dir, PathBuf::from("out"));
    }

    #[test]
    fn test_token_reference_and_env_override() {
        let _guard = EnvGuard::new(vec![
            "HUBTOOLS_TEST_TOKEN",
            "HUBTOOLS_TOKEN",
            "HUBSPOT_TOKEN",
            "HUBTOOLS_CHUNK_SIZE",
        ]);
        env::remove_var("HUBTOOLS_TOKEN");
        env::remove_var("HUBSPOT_TOKEN");
        env::set_var("HUBTOOLS_TEST_TOKEN", "pat-from-env");
        env::set_var("HUBTOOLS_CHUNK_SIZE", "250");

        let dir = tempdir().unwrap();
        let path = dir.path().join("hubtools.toml");
        fs::write(&path, "[api]\ntoken = \"${HUBTOOLS_TEST_TOKEN}\"\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.api.token.as_deref(), Some("pat-from-env"));
        assert_eq!(config.batch.chunk_size, 250);

        env::set_var("HUBSPOT_TOKEN", "pat-legacy");
        let config = Config::from_env().unwrap();
        assert_eq!(config.api.token.as_deref(), Some("pat-legacy"));

        env::set_var("HUBTOOLS_CHUNK_SIZE", "many");
        assert!(Config::from_env().is_err());
    }

    #[test]
    fn test_unset_token_reference_is_none() {
        assert_eq!(expand_env_reference("${HUBTOOLS_SURELY_UNSET_VAR}".into()), None);
        assert_eq!(expand_env_reference("pat-1".into()), Some("pat-1".into()));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = valid_config();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.api.token, config.api.token);
        assert_eq!(parsed.batch.chunk_size, config.batch.chunk_size);
    }
}
