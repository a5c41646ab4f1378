use std::{
    collections::{BTreeMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde::Serialize;
use shared::domain::{Bound, ParameterPair, ParameterState, ParameterValue};

use crate::error::EngineError;

pub const DEFAULT_CONFIGURATION_NAME: &str = "MyColour";

pub type SharedEngine = Arc<Mutex<ConstraintEngine>>;

pub(crate) fn lock_engine(engine: &Mutex<ConstraintEngine>) -> MutexGuard<'_, ConstraintEngine> {
    engine.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Result of reconciling one local edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOutcome {
    pub key: String,
    pub value: ParameterValue,
    /// The partner bound, when it had to move to keep `lower < upper`.
    pub adjusted: Option<(String, ParameterValue)>,
}

impl EditOutcome {
    /// Every value the remote authority has to learn about, edited key first.
    pub fn writes(&self) -> impl Iterator<Item = (&str, ParameterValue)> {
        std::iter::once((self.key.as_str(), self.value)).chain(
            self.adjusted
                .iter()
                .map(|(key, value)| (key.as_str(), *value)),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalibrationView {
    pub readouts: BTreeMap<String, String>,
    pub pending_name: String,
    pub snippet: String,
}

/// Keeps every pair ordered and renders what the operator sees.
pub struct ConstraintEngine {
    pairs: Vec<ParameterPair>,
    state: ParameterState,
    readouts: BTreeMap<String, String>,
    pending_name: String,
    snippet: String,
}

impl ConstraintEngine {
    pub fn new(pairs: Vec<ParameterPair>) -> Result<Self, EngineError> {
        let mut seen = HashSet::new();
        for pair in &pairs {
            let invalid = |reason| EngineError::InvalidPair {
                lower_key: pair.lower_key.clone(),
                upper_key: pair.upper_key.clone(),
                reason,
            };
            if pair.limit < 1 {
                return Err(invalid("limit must be at least 1"));
            }
            if !seen.insert(pair.lower_key.as_str()) || !seen.insert(pair.upper_key.as_str()) {
                return Err(invalid("keys must be unique"));
            }
        }

        let state = ParameterState::with_defaults(&pairs);
        let mut engine = Self {
            pairs,
            state,
            readouts: BTreeMap::new(),
            pending_name: String::new(),
            snippet: String::new(),
        };
        for (key, value) in engine.state.clone().iter() {
            engine.render_readout(key, value);
        }
        engine.refresh_snippet();
        Ok(engine)
    }

    pub fn pairs(&self) -> &[ParameterPair] {
        &self.pairs
    }

    pub fn state(&self) -> &ParameterState {
        &self.state
    }

    pub fn value(&self, key: &str) -> Option<ParameterValue> {
        self.state.get(key)
    }

    pub fn readout(&self, key: &str) -> Option<&str> {
        self.readouts.get(key).map(String::as_str)
    }

    pub fn snippet(&self) -> &str {
        &self.snippet
    }

    pub fn pending_name(&self) -> &str {
        &self.pending_name
    }

    pub fn is_known(&self, key: &str) -> bool {
        self.pair_of(key).is_some()
    }

    /// Applies an operator edit and moves the partner bound by the minimum
    /// needed to keep `0 <= lower < upper <= limit`.
    pub fn apply_edit(
        &mut self,
        key: &str,
        value: ParameterValue,
    ) -> Result<EditOutcome, EngineError> {
        let (pair, bound) = self
            .pair_of(key)
            .map(|(pair, bound)| (pair.clone(), bound))
            .ok_or_else(|| EngineError::UnknownParameter(key.to_string()))?;

        let limit = pair.limit;
        let value = value.clamp(0, limit);
        let mut lower = self.state.get(&pair.lower_key).unwrap_or(0);
        let mut upper = self.state.get(&pair.upper_key).unwrap_or(limit);

        let outcome = match bound {
            Bound::Lower => {
                // The top of the range leaves no room above it.
                lower = value.min(limit - 1);
                let adjusted = if lower >= upper {
                    upper = lower + 1;
                    Some((pair.upper_key.clone(), upper))
                } else {
                    None
                };
                EditOutcome {
                    key: pair.lower_key.clone(),
                    value: lower,
                    adjusted,
                }
            }
            Bound::Upper => {
                upper = value.max(1);
                let adjusted = if upper <= lower {
                    lower = upper - 1;
                    Some((pair.lower_key.clone(), lower))
                } else {
                    None
                };
                EditOutcome {
                    key: pair.upper_key.clone(),
                    value: upper,
                    adjusted,
                }
            }
        };

        self.set(&pair.lower_key, lower);
        self.set(&pair.upper_key, upper);
        self.refresh_snippet();
        Ok(outcome)
    }

    /// Stores a value read from the authority, clamped to the control range
    /// like any other control input. Pair order is not reconciled here.
    /// Returns `false` for keys that no pair owns.
    pub fn apply_remote(&mut self, key: &str, value: ParameterValue) -> bool {
        let Some((pair, _)) = self.pair_of(key) else {
            return false;
        };
        let value = value.clamp(0, pair.limit);
        self.set(key, value);
        true
    }

    pub fn set_pending_name(&mut self, name: &str) {
        self.pending_name = name.to_string();
        self.refresh_snippet();
    }

    pub fn refresh_snippet(&mut self) {
        let name = match self.pending_name.trim() {
            "" => DEFAULT_CONFIGURATION_NAME,
            trimmed => trimmed,
        };
        let scalar = |values: Vec<ParameterValue>| {
            let mut parts = values
                .iter()
                .map(ParameterValue::to_string)
                .collect::<Vec<_>>();
            parts.push("0".to_string());
            format!("new Scalar({})", parts.join(", "))
        };
        let lowers = self
            .pairs
            .iter()
            .map(|pair| self.state.get(&pair.lower_key).unwrap_or(0))
            .collect();
        let uppers = self
            .pairs
            .iter()
            .map(|pair| self.state.get(&pair.upper_key).unwrap_or(pair.limit))
            .collect();

        self.snippet = format!(
            "ColourObj {} = new ColourObj(\"{name}\", {}, {});",
            to_camel_case(name),
            scalar(lowers),
            scalar(uppers)
        );
    }

    pub fn view(&self) -> CalibrationView {
        CalibrationView {
            readouts: self.readouts.clone(),
            pending_name: self.pending_name.clone(),
            snippet: self.snippet.clone(),
        }
    }

    fn pair_of(&self, key: &str) -> Option<(&ParameterPair, Bound)> {
        self.pairs
            .iter()
            .find_map(|pair| pair.bound_of(key).map(|bound| (pair, bound)))
    }

    fn set(&mut self, key: &str, value: ParameterValue) {
        self.state.set(key, value);
        self.render_readout(key, value);
    }

    fn render_readout(&mut self, key: &str, value: ParameterValue) {
        self.readouts.insert(key.to_string(), value.to_string());
    }
}

/// Turns an operator-typed name into a Java-style identifier: the first
/// character is lower-cased, each word start is upper-cased and whitespace is
/// dropped.
pub fn to_camel_case(name: &str) -> String {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let mut out = String::with_capacity(name.len());
    let mut previous: Option<char> = None;

    for (index, c) in name.chars().enumerate() {
        if index == 0 && is_word(c) {
            out.extend(c.to_lowercase());
        } else if c.is_uppercase() || (is_word(c) && !previous.is_some_and(is_word)) {
            out.extend(c.to_uppercase());
        } else if !c.is_whitespace() {
            out.push(c);
        }
        previous = Some(c);
    }
    out
}

#[cfg(test)]
#[path = "tests/constraint_tests.rs"]
mod tests;
