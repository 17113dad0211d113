//! Per-key distribution overrides supplied with a request.
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::sampler::WeightedSampler;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RandomizationRule {
    UniformInt {
        min: i64,
        max: i64,
    },
    /// Clamped below to `min`, or to the generator's floor when `min` is absent.
    NormalDouble {
        mean: f64,
        stddev: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    Bool {
        #[serde(rename = "trueRatio")]
        true_ratio: f64,
    },
    OneOf {
        values: Vec<Value>,
    },
    /// Reorder the key's resolved string array.
    Shuffle,
}

impl RandomizationRule {
    /// Reason the rule cannot be evaluated, if any.
    pub fn problem(&self) -> Option<String> {
        match self {
            Self::UniformInt { min, max } if min > max => {
                Some(format!("UniformInt min {min} exceeds max {max}"))
            }
            Self::NormalDouble { mean, stddev, .. } if !mean.is_finite() || !stddev.is_finite() => {
                Some("NormalDouble parameters must be finite".into())
            }
            Self::NormalDouble { stddev, .. } if *stddev < 0.0 => {
                Some(format!("NormalDouble stddev {stddev} is negative"))
            }
            Self::NormalDouble {
                min: Some(lo),
                max: Some(hi),
                ..
            } if lo > hi => Some(format!("NormalDouble min {lo} exceeds max {hi}")),
            Self::Bool { true_ratio } if !(0.0..=1.0).contains(true_ratio) => {
                Some(format!("Bool trueRatio {true_ratio} outside [0, 1]"))
            }
            Self::OneOf { values } if values.is_empty() => Some("OneOf has no values".into()),
            _ => None,
        }
    }

    /// Draw a value for every rule except [`RandomizationRule::Shuffle`], which
    /// operates on an existing value instead (see [`shuffle_value`]).
    pub fn draw(&self, sampler: &mut WeightedSampler, normal_floor: f64) -> Option<Value> {
        match self {
            Self::UniformInt { min, max } => Some(Value::Int(sampler.uniform_int(*min, *max))),
            Self::NormalDouble {
                mean,
                stddev,
                min,
                max,
            } => {
                let raw = mean + stddev * sampler.standard_normal();
                let floored = raw.max(min.unwrap_or(normal_floor));
                Some(Value::Double(max.map_or(floored, |hi| floored.min(hi))))
            }
            Self::Bool { true_ratio } => Some(Value::Bool(sampler.next_f64() < *true_ratio)),
            Self::OneOf { values } => Some(values[sampler.index(values.len())].clone()),
            Self::Shuffle => None,
        }
    }
}

/// Shuffled copy of a string array; any other value is reported back unchanged.
pub fn shuffle_value(value: &Value, sampler: &mut WeightedSampler) -> Result<Value, String> {
    match value {
        Value::StringArray(items) => {
            let mut items = items.clone();
            sampler.shuffle(&mut items);
            Ok(Value::StringArray(items))
        }
        other => Err(format!("Shuffle needs a string array, found {other}")),
    }
}

/// A plan slot as received. Unparseable or invalid rules are kept so the
/// generator can report them and fall back to catalog sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Json", into = "Json")]
pub enum PlanEntry {
    Rule(RandomizationRule),
    Malformed { raw: Json, reason: String },
}

impl PlanEntry {
    pub fn parse(raw: Json) -> Self {
        match serde_json::from_value::<RandomizationRule>(raw.clone()) {
            Ok(rule) => match rule.problem() {
                Some(reason) => Self::Malformed { raw, reason },
                None => Self::Rule(rule),
            },
            Err(e) => Self::Malformed {
                raw,
                reason: e.to_string(),
            },
        }
    }
}

impl From<RandomizationRule> for PlanEntry {
    fn from(rule: RandomizationRule) -> Self {
        match rule.problem() {
            Some(reason) => Self::Malformed {
                raw: serde_json::to_value(&rule).unwrap_or(Json::Null),
                reason,
            },
            None => Self::Rule(rule),
        }
    }
}

impl From<Json> for PlanEntry {
    fn from(raw: Json) -> Self {
        Self::parse(raw)
    }
}

impl From<PlanEntry> for Json {
    fn from(entry: PlanEntry) -> Self {
        match entry {
            PlanEntry::Rule(rule) => serde_json::to_value(rule).unwrap_or(Json::Null),
            PlanEntry::Malformed { raw, .. } => raw,
        }
    }
}
