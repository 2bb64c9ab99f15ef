mod paths;
mod reconnect_config;
mod settings;

pub use paths::ProjectPaths;
pub use reconnect_config::ReconnectConfig;
pub use settings::{
    AccountConfig, AntiAfkConfig, AutoAuthConfig, ChallengePatterns, ConfigError, PositionConfig,
    ServerConfig, Settings, StatusConfig, TransportConfig,
};
