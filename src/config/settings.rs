use std::fmt;
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::paths::ProjectPaths;
use super::reconnect_config::ReconnectConfig;
use crate::transport::{Position, SessionParams};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("cannot determine the config directory")]
    NoConfigDir,

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    pub username: String,
    /// Account password for servers that check it at connect time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            username: "AfkBot".to_string(),
            password: None,
        }
    }
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl fmt::Display for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.username)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Protocol version string announced at login.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 25565,
            version: "1.20.1".to_string(),
        }
    }
}

impl fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Substrings that settle one challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengePatterns {
    #[serde(default)]
    pub success: Vec<String>,
    #[serde(default)]
    pub failure: Vec<String>,
}

impl ChallengePatterns {
    fn new(success: &[&str], failure: &[&str]) -> Self {
        Self {
            success: success.iter().map(|s| s.to_string()).collect(),
            failure: failure.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn register_defaults() -> Self {
        Self::new(
            &["successfully registered", "already registered"],
            &["registration is disabled", "invalid password"],
        )
    }

    pub fn login_defaults() -> Self {
        Self::new(
            &["successfully logged in", "already logged in"],
            &["invalid password", "not registered"],
        )
    }
}

fn default_register_patterns() -> ChallengePatterns {
    ChallengePatterns::register_defaults()
}

fn default_login_patterns() -> ChallengePatterns {
    ChallengePatterns::login_defaults()
}

fn default_auth_timeout_ms() -> u64 {
    10_000
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AutoAuthConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Shared by `/register` and `/login`.
    #[serde(default)]
    pub password: String,

    /// Per-challenge reply timeout.
    #[serde(default = "default_auth_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_register_patterns")]
    pub register: ChallengePatterns,

    #[serde(default = "default_login_patterns")]
    pub login: ChallengePatterns,
}

impl Default for AutoAuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            password: String::new(),
            timeout_ms: default_auth_timeout_ms(),
            register: ChallengePatterns::register_defaults(),
            login: ChallengePatterns::login_defaults(),
        }
    }
}

impl AutoAuthConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl fmt::Debug for AutoAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoAuthConfig")
            .field("enabled", &self.enabled)
            .field("password", &"<redacted>")
            .field("timeout_ms", &self.timeout_ms)
            .field("register", &self.register)
            .field("login", &self.login)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionConfig {
    pub enabled: bool,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl PositionConfig {
    pub fn target(&self) -> Position {
        Position::new(self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AntiAfkConfig {
    pub enabled: bool,
    /// Also toggle sneak alongside jump.
    pub sneak: bool,
}

impl Default for AntiAfkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sneak: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub enabled: bool,
    pub bind: String,
    /// Lines shown on the status page.
    pub max_lines: usize,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "0.0.0.0:5000".to_string(),
            max_lines: 500,
        }
    }
}

impl StatusConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("status.bind {:?}: {}", self.bind, e)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub connect_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
        }
    }
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Everything the bot reads at startup. Never mutated afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub account: AccountConfig,
    pub server: ServerConfig,
    pub auto_auth: AutoAuthConfig,
    pub position: PositionConfig,
    pub anti_afk: AntiAfkConfig,
    pub reconnect: ReconnectConfig,
    pub status: StatusConfig,
    pub transport: TransportConfig,
}

const EXAMPLE_CONFIG: &str = r#"# afkbot configuration

[account]
username = "AfkBot"

[server]
host = "127.0.0.1"
port = 25565
version = "1.20.1"

[auto_auth]
enabled = true
password = "change-me"
timeout_ms = 10000

[position]
enabled = false
x = 0.0
y = 64.0
z = 0.0

[anti_afk]
enabled = true
sneak = false

[reconnect]
enabled = true
base_delay_ms = 5000
max_delay_ms = 600000
max_attempts = 10

[status]
enabled = true
bind = "0.0.0.0:5000"
max_lines = 500
"#;

impl Settings {
    /// Return the contents written by `afkbot --init`.
    pub fn example() -> &'static str {
        EXAMPLE_CONFIG
    }

    pub fn config_path() -> Result<PathBuf, ConfigError> {
        ProjectPaths::new("afkbot")
            .map(|paths| paths.config_file())
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load the settings from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_toml(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(settings)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Saved config to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.account.username.trim().is_empty() {
            return invalid("account.username must not be empty");
        }
        if self.server.host.trim().is_empty() {
            return invalid("server.host must not be empty");
        }
        if self.server.port == 0 {
            return invalid("server.port must be non-zero");
        }
        if self.server.version.trim().is_empty() {
            return invalid("server.version must not be empty");
        }
        if self.auto_auth.enabled && self.auto_auth.password.is_empty() {
            return invalid("auto_auth.password is required when auto_auth is enabled");
        }
        if self.auto_auth.enabled && self.auto_auth.timeout_ms == 0 {
            return invalid("auto_auth.timeout_ms must be non-zero");
        }
        if self.reconnect.base_delay_ms == 0 {
            return invalid("reconnect.base_delay_ms must be non-zero");
        }
        if self.reconnect.max_delay_ms < self.reconnect.base_delay_ms {
            return invalid("reconnect.max_delay_ms must be at least reconnect.base_delay_ms");
        }
        if self.status.enabled {
            self.status.bind_addr()?;
        }
        Ok(())
    }

    pub fn session_params(&self) -> SessionParams {
        SessionParams {
            username: self.account.username.clone(),
            password: self.account.password.clone(),
            host: self.server.host.clone(),
            port: self.server.port,
            version: self.server.version.clone(),
        }
    }
}
