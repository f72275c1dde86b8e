use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable that overrides `mailbox.password`
pub const PASSWORD_ENV: &str = "MAILBOX_PASSWORD";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// How often to scan the mailbox (seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// How many of the most recent messages each scan looks at
    #[serde(default = "default_max_messages")]
    pub max_messages_per_scan: u32,

    /// Wait before the next scan after a scan failed (seconds)
    #[serde(default = "default_error_cooldown")]
    pub error_cooldown_secs: u64,

    /// Slice of the idle wait after which shutdown is re-checked (seconds)
    #[serde(default = "default_shutdown_check")]
    pub shutdown_check_secs: u64,

    /// File holding the ids of already-processed messages
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// IANA timezone attached to every created event
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Years below this are coerced to the current year (defaults to the current year)
    #[serde(default)]
    pub plausible_year_floor: Option<i32>,

    /// Leave messages unmarked when a backend call fails so the next scan retries them
    #[serde(default)]
    pub retry_transport_failures: bool,

    pub mailbox: MailboxConfig,

    #[serde(default)]
    pub inference: InferenceConfig,

    #[serde(default)]
    pub calendar: CalendarConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxConfig {
    /// IMAP server hostname
    pub host: String,

    #[serde(default = "default_imap_port")]
    pub port: u16,

    /// Login, usually the email address
    pub user: String,

    /// Password or app password; may come from MAILBOX_PASSWORD instead
    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_folder")]
    pub folder: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Ollama-compatible generate endpoint
    #[serde(default = "default_inference_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_inference_timeout")]
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_inference_endpoint(),
            model: default_model(),
            timeout_secs: default_inference_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// Path to Google OAuth client credentials JSON file
    #[serde(default = "default_credentials_path")]
    pub credentials_path: String,

    /// Path to store the OAuth token cache
    #[serde(default = "default_token_cache")]
    pub token_cache_path: String,

    /// Calendar to insert events into
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            credentials_path: default_credentials_path(),
            token_cache_path: default_token_cache(),
            calendar_id: default_calendar_id(),
        }
    }
}

fn default_poll_interval() -> u64 {
    300 // 5 minutes
}

fn default_max_messages() -> u32 {
    10
}

fn default_error_cooldown() -> u64 {
    30
}

fn default_shutdown_check() -> u64 {
    10
}

fn default_state_path() -> PathBuf {
    PathBuf::from("state/processed_ids.json")
}

fn default_timezone() -> String {
    "Europe/Madrid".to_string()
}

fn default_imap_port() -> u16 {
    993
}

fn default_folder() -> String {
    "INBOX".to_string()
}

fn default_inference_endpoint() -> String {
    "http://localhost:11434/api/generate".to_string()
}

fn default_model() -> String {
    "llama3:8b-instruct-q4_K_M".to_string()
}

fn default_inference_timeout() -> u64 {
    120
}

fn default_credentials_path() -> String {
    "credentials/credentials.json".to_string()
}

fn default_token_cache() -> String {
    "credentials/token.json".to_string()
}

fn default_calendar_id() -> String {
    "primary".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(e.to_string()))
    }

    /// Fill settings that may be supplied through the environment
    pub fn apply_env_overrides(&mut self) {
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            if !password.is_empty() {
                self.mailbox.password = Some(password);
            }
        }
    }

    /// Reject settings the service cannot start without
    pub fn validate(&self) -> Result<()> {
        if self.mailbox.host.trim().is_empty() {
            return Err(Error::config("mailbox.host must be set"));
        }
        if self.mailbox.user.trim().is_empty() {
            return Err(Error::config("mailbox.user must be set"));
        }
        if self.mailbox.password.as_deref().unwrap_or("").is_empty() {
            return Err(Error::config(format!(
                "mailbox.password or {} must be set",
                PASSWORD_ENV
            )));
        }
        if self.poll_interval_secs == 0 {
            return Err(Error::config("poll_interval_secs must be positive"));
        }
        if self.max_messages_per_scan == 0 {
            return Err(Error::config("max_messages_per_scan must be positive"));
        }
        if self.inference.endpoint.trim().is_empty() || self.inference.model.trim().is_empty() {
            return Err(Error::config("inference.endpoint and inference.model must be set"));
        }
        if self.calendar.calendar_id.trim().is_empty() {
            return Err(Error::config("calendar.calendar_id must be set"));
        }
        self.timezone()?;
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.timezone
            .parse()
            .map_err(|_| Error::config(format!("Invalid timezone: {}", self.timezone)))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn error_cooldown(&self) -> Duration {
        Duration::from_secs(self.error_cooldown_secs)
    }

    pub fn shutdown_check(&self) -> Duration {
        // Zero would make the idle wait spin
        Duration::from_secs(self.shutdown_check_secs.max(1))
    }

    pub fn example() -> Self {
        Config {
            poll_interval_secs: 300,
            max_messages_per_scan: 10,
            error_cooldown_secs: 30,
            shutdown_check_secs: 10,
            state_path: default_state_path(),
            timezone: default_timezone(),
            plausible_year_floor: None,
            retry_transport_failures: false,
            mailbox: MailboxConfig {
                host: "imap.example.com".to_string(),
                port: 993,
                user: "you@example.com".to_string(),
                password: Some("your-app-password".to_string()),
                folder: "INBOX".to_string(),
            },
            inference: InferenceConfig::default(),
            calendar: CalendarConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [mailbox]
        host = "imap.mail.eu"
        user = "me@mail.eu"
        password = "secret"
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.poll_interval_secs, 300);
        assert_eq!(config.max_messages_per_scan, 10);
        assert_eq!(config.mailbox.port, 993);
        assert_eq!(config.mailbox.folder, "INBOX");
        assert_eq!(config.inference.timeout_secs, 120);
        assert_eq!(config.calendar.calendar_id, "primary");
        assert_eq!(config.timezone().unwrap(), chrono_tz::Europe::Madrid);
        assert!(config.plausible_year_floor.is_none());
        assert!(!config.retry_transport_failures);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_mailbox_section_is_config_error() {
        let err = Config::from_toml("poll_interval_secs = 60").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_password_rejected() {
        let mut config = Config::from_toml(MINIMAL).unwrap();
        config.mailbox.password = None;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("mailbox.password"));
    }

    #[test]
    fn test_invalid_timezone_rejected() {
        let mut config = Config::from_toml(MINIMAL).unwrap();
        config.timezone = "Mars/Olympus_Mons".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = Config::from_toml(MINIMAL).unwrap();
        config.poll_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shutdown_check_never_zero() {
        let mut config = Config::from_toml(MINIMAL).unwrap();
        config.shutdown_check_secs = 0;
        assert_eq!(config.shutdown_check(), Duration::from_secs(1));
    }

    #[test]
    fn test_example_round_trips() {
        let example = Config::example();
        let text = toml::to_string_pretty(&example).unwrap();
        let parsed = Config::from_toml(&text).unwrap();
        assert_eq!(parsed.mailbox.host, "imap.example.com");
        assert!(parsed.validate().is_ok());
    }
}
