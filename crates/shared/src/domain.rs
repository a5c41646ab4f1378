use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::NameError;

pub type ParameterValue = i64;

/// A lower/upper bound pair sharing one domain `[0, limit]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterPair {
    pub lower_key: String,
    pub upper_key: String,
    pub limit: ParameterValue,
}

impl ParameterPair {
    pub fn new(
        lower_key: impl Into<String>,
        upper_key: impl Into<String>,
        limit: ParameterValue,
    ) -> Self {
        Self {
            lower_key: lower_key.into(),
            upper_key: upper_key.into(),
            limit,
        }
    }

    pub fn bound_of(&self, key: &str) -> Option<Bound> {
        if key == self.lower_key {
            Some(Bound::Lower)
        } else if key == self.upper_key {
            Some(Bound::Upper)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bound {
    Lower,
    Upper,
}

/// Hue, saturation and value ranges in OpenCV's HSV encoding.
pub fn hsv_pairs() -> Vec<ParameterPair> {
    vec![
        ParameterPair::new("hueMin", "hueMax", 179),
        ParameterPair::new("satMin", "satMax", 255),
        ParameterPair::new("valMin", "valMax", 255),
    ]
}

/// Current value of every parameter key, as shown to the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterState(BTreeMap<String, ParameterValue>);

impl ParameterState {
    /// Every pair starts fully open: `0 .. limit`.
    pub fn with_defaults(pairs: &[ParameterPair]) -> Self {
        let mut state = Self::default();
        for pair in pairs {
            state.set(&pair.lower_key, 0);
            state.set(&pair.upper_key, pair.limit);
        }
        state
    }

    pub fn get(&self, key: &str) -> Option<ParameterValue> {
        self.0.get(key).copied()
    }

    pub fn set(&mut self, key: &str, value: ParameterValue) {
        self.0.insert(key.to_string(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ParameterValue)> {
        self.0.iter().map(|(key, value)| (key.as_str(), *value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairBounds {
    pub lower_key: String,
    pub lower: ParameterValue,
    pub upper_key: String,
    pub upper: ParameterValue,
}

/// The bounds being persisted under `name` by a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedConfiguration {
    pub name: String,
    pub bounds: Vec<PairBounds>,
}

impl NamedConfiguration {
    pub fn capture(name: impl Into<String>, pairs: &[ParameterPair], state: &ParameterState) -> Self {
        let bounds = pairs
            .iter()
            .map(|pair| PairBounds {
                lower_key: pair.lower_key.clone(),
                lower: state.get(&pair.lower_key).unwrap_or(0),
                upper_key: pair.upper_key.clone(),
                upper: state.get(&pair.upper_key).unwrap_or(pair.limit),
            })
            .collect();
        Self {
            name: name.into(),
            bounds,
        }
    }
}

/// Returns the trimmed name that will be sent to the authority.
pub fn validate_configuration_name(raw: &str) -> Result<&str, NameError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name.chars().any(char::is_whitespace) {
        return Err(NameError::ContainsWhitespace);
    }
    Ok(name)
}
