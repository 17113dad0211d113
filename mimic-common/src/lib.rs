//! Common types and utilities shared across Mimic crates.
//!
//! This crate defines engine tunables, observability helpers, and the shared
//! error type used throughout the Mimic workspace. It is intentionally
//! lightweight so that every crate can depend on it without pulling in the
//! engine itself.
//!
//! # Overview
//!
//! - [`GeneratorSettings`]: knobs read by the profile generator
//! - [`BatchSettings`]: iteration cap for batch generation
//! - [`observability`]: Centralised tracing/logging initialisation
//! - [`MimicError`] and [`Result`]: Shared error handling
//!
//! # Examples
//!
//! ```rust
//! use mimic_common::{BatchSettings, GeneratorSettings};
//!
//! let generator = GeneratorSettings::default();
//! assert_eq!(generator.font_subset_size, 30);
//! assert_eq!(BatchSettings::default().attempt_cap(10), 40);
//! ```
use serde::{Deserialize, Serialize};

pub mod observability;

/// Tunables for a single profile generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorSettings {
    /// Number of fonts drawn when a custom font list has to be sampled.
    pub font_subset_size: usize,
    /// Lower clamp for `NormalDouble` plan rules that carry no explicit `min`.
    pub normal_floor: f64,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            font_subset_size: 30,
            normal_floor: 0.0,
        }
    }
}

/// Tunables for batch generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Multiplier applied to the requested count to bound the number of attempts.
    pub attempt_factor: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self { attempt_factor: 4 }
    }
}

impl BatchSettings {
    /// Maximum number of generator calls for a batch of `requested` profiles.
    pub fn attempt_cap(&self, requested: usize) -> usize {
        requested.saturating_mul(self.attempt_factor.max(1))
    }
}

/// Error types used across the Mimic system.
#[derive(thiserror::Error, Debug)]
pub enum MimicError {
    /// A catalog document was structurally valid JSON but semantically invalid.
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// A meta-profile request could not be interpreted.
    #[error("Request error: {0}")]
    Request(String),

    /// A JSON value has no representation in the trait value union.
    #[error("Value error: {0}")]
    Value(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration was incomplete or invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenient alias for results that use [`MimicError`].
pub type Result<T> = std::result::Result<T, MimicError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_cap_never_drops_below_requested() {
        let settings = BatchSettings { attempt_factor: 0 };
        assert_eq!(settings.attempt_cap(7), 7);
    }

    #[test]
    fn settings_fill_missing_fields_from_defaults() {
        let parsed: GeneratorSettings =
            serde_json::from_str(r#"{ "font_subset_size": 12 }"#).unwrap();
        assert_eq!(parsed.font_subset_size, 12);
        assert_eq!(parsed.normal_floor, 0.0);
    }
}
