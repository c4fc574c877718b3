use thiserror::Error;

/// Typed error hierarchy for picobot.
///
/// Used at module boundaries (config validation, provider calls, MCP
/// transports). Internal/leaf functions use `anyhow::Result` - the
/// `Internal` variant converts seamlessly via the `?` operator.
#[derive(Debug, Error)]
pub enum PicobotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("MCP transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
