use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::ParameterValue;

pub const SLIDER_PATH: &str = "/api/slider";
pub const SUBMIT_COLOUR_PATH: &str = "/api/submitColour";
pub const CACHE_BUSTER_PARAM: &str = "t";

/// Body of `POST /api/slider`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliderUpdate {
    pub slider_name: String,
    pub slider_value: ParameterValue,
}

/// A single entry of the `GET /api/slider` body.
///
/// The authority is not strict about number encoding, so integers, floats and
/// numeric strings are all accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SnapshotValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl SnapshotValue {
    pub fn as_parameter_value(&self) -> Option<ParameterValue> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Float(value) if value.is_finite() => Some(value.trunc() as ParameterValue),
            Self::Float(_) => None,
            Self::Text(raw) => raw.trim().parse::<ParameterValue>().ok(),
        }
    }
}

pub type SnapshotBody = HashMap<String, SnapshotValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Original,
    Modified,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 2] = [ArtifactKind::Original, ArtifactKind::Modified];

    pub fn path(self) -> &'static str {
        match self {
            Self::Original => "/api/originalImage",
            Self::Modified => "/api/modifiedImage",
        }
    }

    pub fn file_stem(self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Modified => "modified",
        }
    }
}
