//! Error taxonomy for the publishing pipeline.
//!
//! Component-level errors stay local to their module; the orchestrator folds
//! them into [`PublishError`], whose `Display` form is the single string that
//! ends up on a failed [`crate::PublishingResult`].

/// Pipeline-level errors.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The release descriptor or one of its assets is defective.
    #[error("Validation failed:\n{}", .0.join("\n"))]
    Validation(Vec<String>),

    /// An upload or portal call failed at the network boundary.
    #[error("{stage} failed: {message}")]
    Transport { stage: String, message: String },

    /// The minting collaborator reported a failure.
    #[error("NFT creation failed: {0}")]
    Delegate(String),

    /// A cancellation signal arrived between stages.
    #[error("Publishing cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PublishError {
    /// Build a transport error for a named pipeline stage (e.g. "Icon upload").
    pub fn transport(stage: impl Into<String>, message: impl std::fmt::Display) -> Self {
        PublishError::Transport {
            stage: stage.into(),
            message: message.to_string(),
        }
    }
}

/// Errors raised while loading a release descriptor or pipeline settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read descriptor {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported descriptor format: {0} (expected .json or .toml)")]
    UnsupportedFormat(String),

    #[error("invalid JSON descriptor: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid TOML descriptor: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid setting {key}: {value}")]
    InvalidSetting { key: String, value: String },
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PublishError>;
