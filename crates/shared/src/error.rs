use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejections raised before a configuration name ever reaches the network.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameError {
    #[error("Please enter a name.")]
    Empty,
    #[error("Name cannot contain spaces.")]
    ContainsWhitespace,
}
