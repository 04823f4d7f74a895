use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, #[source] source: std::io::Error },

    #[error("malformed config TOML at {path}: {source}")]
    Parse { path: String, #[source] source: Box<toml::de::Error> },

    #[error("invalid capability override entry {0:?}: unrecognized agent or task type")]
    BadCapabilityOverride(String),

    #[error("invalid NTM_ environment override {key}: {message}")]
    BadEnvOverride { key: String, message: String },
}
