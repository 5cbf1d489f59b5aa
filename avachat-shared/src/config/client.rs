use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{env, fs, path::PathBuf, time::Duration};
use thiserror::Error;
use url::Url;

/// Backend base URL.
pub const ENV_BACKEND_URL: &str = "AVACHAT_BACKEND_URL";
/// Token flush interval in milliseconds.
pub const ENV_FLUSH_INTERVAL_MS: &str = "AVACHAT_FLUSH_INTERVAL_MS";
/// Log level or filter directive.
pub const ENV_LOG_LEVEL: &str = "AVACHAT_LOG_LEVEL";
/// `text` or `json`.
pub const ENV_LOG_FORMAT: &str = "AVACHAT_LOG_FORMAT";
/// File holding the per-locale conversation ids.
pub const ENV_STORAGE_PATH: &str = "AVACHAT_STORAGE_PATH";

/// Errors raised while resolving the client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
    /// The YAML file did not parse.
    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yml::Error),
    /// The JSON file did not parse.
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
    /// The file extension is neither YAML nor JSON.
    #[error("Unsupported configuration format. Use 'yaml' or 'json'.")]
    UnsupportedFormat,
    /// An environment variable holds a value that cannot be used.
    #[error("Invalid {name} value: {reason}")]
    InvalidEnv {
        /// Variable name.
        name: &'static str,
        /// What is wrong with its value.
        reason: String,
    },
    /// A resolved value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Output format for log lines.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Log verbosity and output format.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level or `EnvFilter` directive, used when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Pacing and limits for outgoing messages and incoming token streams.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct StreamConfig {
    /// Delay between the first buffered token and the flush into the message.
    pub flush_interval_ms: u64,
    /// Longest message the composer accepts, in characters.
    pub max_message_chars: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 50,
            max_message_chars: 500,
        }
    }
}

impl StreamConfig {
    /// The flush interval as a [`Duration`].
    #[must_use]
    pub const fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

/// Where per-locale conversation ids are persisted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    /// Prefix of every storage key (`<namespace>_<locale>_sessionId`).
    pub namespace: String,
    /// Explicit storage file; the user config directory is used when absent.
    pub path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            namespace: "chat".to_string(),
            path: None,
        }
    }
}

impl StorageConfig {
    /// The configured path, or the default location.
    #[must_use]
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(default_storage_path)
    }
}

/// Default location of the conversation id file.
#[must_use]
pub fn default_storage_path() -> PathBuf {
    BaseDirs::new()
        .map(|dirs| dirs.config_dir().join("avachat").join("conversations.json"))
        .unwrap_or_else(|| PathBuf::from("./conversations.json"))
}

/// The main configuration structure for the Avachat client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend base URL. Every API call fails fast while this is unset.
    pub backend_url: Option<Url>,
    /// Token pacing and message limits.
    pub stream: StreamConfig,
    /// Number of most recent history messages kept when a conversation loads.
    pub history_limit: usize,
    /// How long a user-visible error stays on screen.
    pub error_display_secs: u64,
    /// Conversation id storage.
    pub storage: StorageConfig,
    /// Log output.
    pub logging: LoggingConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ClientConfig {
    /// Generates a default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            backend_url: None,
            stream: StreamConfig::default(),
            history_limit: 50,
            error_display_secs: 5,
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Loads the configuration from a file, environment variables, or defaults.
    ///
    /// Values found in the file win over environment variables; the
    /// `backend_override` (usually a CLI flag) wins over both.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, an environment
    /// variable is malformed, or the resolved configuration is invalid.
    pub fn load_config(
        config_path: Option<PathBuf>,
        backend_override: Option<Url>,
    ) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) => {
                let content = fs::read_to_string(&path)?;
                match path.extension().and_then(|ext| ext.to_str()) {
                    Some("yaml" | "yml") => serde_yml::from_str(&content)?,
                    Some("json") => serde_json::from_str(&content)?,
                    _ => return Err(ConfigError::UnsupportedFormat),
                }
            }
            None => Self::with_defaults(),
        };

        config.apply_env_overrides()?;

        if let Some(url) = backend_override {
            config.backend_url = Some(url);
        }

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let defaults = Self::with_defaults();

        if self.backend_url.is_none()
            && let Some(raw) = non_empty_env(ENV_BACKEND_URL)
        {
            let url = Url::parse(&raw).map_err(|err| ConfigError::InvalidEnv {
                name: ENV_BACKEND_URL,
                reason: err.to_string(),
            })?;
            self.backend_url = Some(url);
        }
        if self.stream.flush_interval_ms == defaults.stream.flush_interval_ms
            && let Some(raw) = non_empty_env(ENV_FLUSH_INTERVAL_MS)
        {
            self.stream.flush_interval_ms =
                raw.parse().map_err(|_| ConfigError::InvalidEnv {
                    name: ENV_FLUSH_INTERVAL_MS,
                    reason: "must be a whole number of milliseconds".to_string(),
                })?;
        }
        if self.logging.level == defaults.logging.level
            && let Some(level) = non_empty_env(ENV_LOG_LEVEL)
        {
            self.logging.level = level;
        }
        if self.logging.format == defaults.logging.format
            && let Some(raw) = non_empty_env(ENV_LOG_FORMAT)
        {
            self.logging.format = raw.parse().map_err(|reason| ConfigError::InvalidEnv {
                name: ENV_LOG_FORMAT,
                reason,
            })?;
        }
        if self.storage.path.is_none()
            && let Some(path) = non_empty_env(ENV_STORAGE_PATH)
        {
            self.storage.path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Validates the resolved configuration.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] describing the first offending value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream.flush_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "stream.flush_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.stream.max_message_chars == 0 {
            return Err(ConfigError::Invalid(
                "stream.max_message_chars must be greater than 0".to_string(),
            ));
        }
        if self.history_limit == 0 {
            return Err(ConfigError::Invalid(
                "history_limit must be greater than 0".to_string(),
            ));
        }
        if self.error_display_secs == 0 {
            return Err(ConfigError::Invalid(
                "error_display_secs must be greater than 0".to_string(),
            ));
        }
        if self.storage.namespace.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "storage.namespace must not be empty".to_string(),
            ));
        }
        if let Some(url) = &self.backend_url
            && url.cannot_be_a_base()
        {
            return Err(ConfigError::Invalid(format!(
                "backend_url '{url}' cannot be used as a base URL"
            )));
        }
        Ok(())
    }

    /// How long an error notice stays visible.
    #[must_use]
    pub const fn error_display(&self) -> Duration {
        Duration::from_secs(self.error_display_secs)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn cleanup_env_vars() {
        unsafe {
            env::remove_var(ENV_BACKEND_URL);
            env::remove_var(ENV_FLUSH_INTERVAL_MS);
            env::remove_var(ENV_LOG_LEVEL);
            env::remove_var(ENV_LOG_FORMAT);
            env::remove_var(ENV_STORAGE_PATH);
        }
    }

    #[test]
    fn test_config_with_defaults() {
        let config = ClientConfig::with_defaults();

        assert!(config.backend_url.is_none());
        assert_eq!(config.stream.flush_interval(), Duration::from_millis(50));
        assert_eq!(config.stream.max_message_chars, 500);
        assert_eq!(config.history_limit, 50);
        assert_eq!(config.error_display(), Duration::from_secs(5));
        assert_eq!(config.storage.namespace, "chat");
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    #[serial]
    fn test_load_config_without_backend_is_allowed() {
        cleanup_env_vars();
        let config = ClientConfig::load_config(None, None).unwrap();
        assert!(config.backend_url.is_none());
    }

    #[test]
    #[serial]
    fn test_load_config_with_environment_variables() {
        cleanup_env_vars();
        unsafe {
            env::set_var(ENV_BACKEND_URL, "http://localhost:4000");
            env::set_var(ENV_FLUSH_INTERVAL_MS, "16");
            env::set_var(ENV_LOG_LEVEL, "debug");
            env::set_var(ENV_LOG_FORMAT, "json");
            env::set_var(ENV_STORAGE_PATH, "/tmp/avachat.json");
        }

        let config = ClientConfig::load_config(None, None).unwrap();

        assert_eq!(
            config.backend_url.as_ref().map(Url::as_str),
            Some("http://localhost:4000/")
        );
        assert_eq!(config.stream.flush_interval_ms, 16);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(
            config.storage.resolved_path(),
            PathBuf::from("/tmp/avachat.json")
        );

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_backend_override_wins_over_environment() {
        cleanup_env_vars();
        unsafe {
            env::set_var(ENV_BACKEND_URL, "http://env.example");
        }

        let override_url = Url::parse("http://flag.example").unwrap();
        let config = ClientConfig::load_config(None, Some(override_url.clone())).unwrap();

        assert_eq!(config.backend_url, Some(override_url));
        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_invalid_flush_interval_environment() {
        cleanup_env_vars();
        unsafe {
            env::set_var(ENV_FLUSH_INTERVAL_MS, "soon");
        }

        let err = ClientConfig::load_config(None, None).unwrap_err();
        assert!(err.to_string().contains("Invalid AVACHAT_FLUSH_INTERVAL_MS"));
        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_empty_backend_environment_is_ignored() {
        cleanup_env_vars();
        unsafe {
            env::set_var(ENV_BACKEND_URL, "  ");
        }

        let config = ClientConfig::load_config(None, None).unwrap();
        assert!(config.backend_url.is_none());
        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_load_config_from_yaml_file() -> Result<(), Box<dyn std::error::Error>> {
        cleanup_env_vars();
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("avachat.yaml");
        fs::write(
            &path,
            r#"
backend_url: "https://chat.example.com"
stream:
  flush_interval_ms: 30
history_limit: 20
storage:
  namespace: "demo"
"#,
        )?;

        let config = ClientConfig::load_config(Some(path), None)?;

        assert_eq!(
            config.backend_url.as_ref().map(Url::as_str),
            Some("https://chat.example.com/")
        );
        assert_eq!(config.stream.flush_interval_ms, 30);
        assert_eq!(config.stream.max_message_chars, 500);
        assert_eq!(config.history_limit, 20);
        assert_eq!(config.storage.namespace, "demo");
        Ok(())
    }

    #[test]
    #[serial]
    fn test_file_values_win_over_environment() -> Result<(), Box<dyn std::error::Error>> {
        cleanup_env_vars();
        unsafe {
            env::set_var(ENV_BACKEND_URL, "http://env.example");
        }
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("avachat.json");
        fs::write(&path, r#"{"backend_url":"http://file.example"}"#)?;

        let config = ClientConfig::load_config(Some(path), None)?;

        assert_eq!(
            config.backend_url.as_ref().map(Url::as_str),
            Some("http://file.example/")
        );
        cleanup_env_vars();
        Ok(())
    }

    #[test]
    fn test_load_config_unsupported_format() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("avachat.toml");
        fs::write(&path, "backend_url = 'x'").unwrap();

        let err = ClientConfig::load_config(Some(path), None).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat));
    }

    #[test]
    fn test_load_config_nonexistent_file() {
        let result = ClientConfig::load_config(Some(PathBuf::from("/nope/avachat.yaml")), None);
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_validate_rejects_zero_flush_interval() {
        let mut config = ClientConfig::with_defaults();
        config.stream.flush_interval_ms = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("flush_interval_ms"));
    }

    #[test]
    fn test_validate_rejects_zero_error_display() {
        let mut config = ClientConfig::with_defaults();
        config.error_display_secs = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("error_display_secs"));
    }

    #[test]
    #[serial]
    fn test_load_config_rejects_zero_error_display() -> Result<(), Box<dyn std::error::Error>> {
        cleanup_env_vars();
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("avachat.json");
        fs::write(&path, r#"{"error_display_secs":0}"#)?;

        let result = ClientConfig::load_config(Some(path), None);

        assert!(matches!(result, Err(ConfigError::Invalid(_))));
        Ok(())
    }

    #[test]
    fn test_validate_rejects_blank_namespace() {
        let mut config = ClientConfig::with_defaults();
        config.storage.namespace = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
