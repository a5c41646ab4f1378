use shared::error::NameError;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),
    #[error("invalid parameter pair {lower_key}/{upper_key}: {reason}")]
    InvalidPair {
        lower_key: String,
        upper_key: String,
        reason: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum CommitError {
    #[error(transparent)]
    InvalidName(#[from] NameError),
    #[error("Failed to save configuration: {0:#}")]
    Remote(anyhow::Error),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("calibration session must be created inside a tokio runtime")]
    NoRuntime,
    #[error("invalid server url '{url}': {source}")]
    InvalidServerUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error(transparent)]
    Engine(#[from] EngineError),
}
