//! Repeated generation with near-duplicate suppression.
use std::collections::HashSet;

use mimic_common::BatchSettings;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::generator::{GeneratedProfile, ProfileGenerator, ResolvedProfile};
use crate::keys::DEDUPE_FIELDS;
use crate::request::MetaProfileRequest;

/// Seed for batch iteration `index`: the first eight bytes, little endian, of
/// the BLAKE3 hash of `"{base}:{index}"`.
pub fn batch_seed(base: u64, index: usize) -> u64 {
    let hash = blake3::hash(format!("{base}:{index}").as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

/// Ordered tuple of identity-bearing fields; missing fields compare as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupeKey(Vec<String>);

impl DedupeKey {
    pub fn of(profile: &ResolvedProfile) -> Self {
        Self(
            DEDUPE_FIELDS
                .iter()
                .map(|key| profile.get(key).map_or_else(|| "null".to_string(), |v| v.canonical()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub requested: usize,
    pub produced: usize,
    pub duplicates_skipped: usize,
    pub failed: usize,
    pub attempts: usize,
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub profiles: Vec<GeneratedProfile>,
    pub summary: BatchSummary,
}

/// Runs a generator until `requested` distinct profiles exist or the attempt cap is hit.
///
/// The dedupe set is owned by the call, so iteration order and results are
/// deterministic for a given template request.
pub struct BatchDeduper<'g, 'a> {
    generator: &'g ProfileGenerator<'a>,
    settings: BatchSettings,
}

impl<'g, 'a> BatchDeduper<'g, 'a> {
    pub fn new(generator: &'g ProfileGenerator<'a>) -> Self {
        Self::with_settings(generator, BatchSettings::default())
    }

    pub fn with_settings(generator: &'g ProfileGenerator<'a>, settings: BatchSettings) -> Self {
        Self {
            generator,
            settings,
        }
    }

    /// Iteration `i` uses `template` with its seed replaced by
    /// [`batch_seed`]`(template.seed, i)`.
    pub fn run(&self, template: &MetaProfileRequest, requested: usize) -> BatchOutcome {
        let cap = self.settings.attempt_cap(requested);
        let mut seen = HashSet::new();
        let mut profiles = Vec::with_capacity(requested);
        let mut summary = BatchSummary {
            requested,
            ..BatchSummary::default()
        };

        for index in 0..cap {
            if profiles.len() == requested {
                break;
            }
            summary.attempts += 1;
            let request = template.clone().with_seed(batch_seed(template.seed, index));
            match self.generator.generate(&request) {
                Ok(generated) => {
                    if seen.insert(DedupeKey::of(&generated.profile)) {
                        profiles.push(generated);
                    } else {
                        summary.duplicates_skipped += 1;
                        debug!(index, seed = request.seed, "batch.duplicate_skipped");
                    }
                }
                Err(failure) => {
                    summary.failed += 1;
                    debug!(index, error = %failure, "batch.generation_failed");
                }
            }
        }

        summary.produced = profiles.len();
        if summary.produced < requested {
            warn!(
                requested,
                produced = summary.produced,
                attempts = summary.attempts,
                "batch.cap_reached"
            );
        } else {
            info!(
                requested,
                duplicates = summary.duplicates_skipped,
                failed = summary.failed,
                "batch.completed"
            );
        }
        BatchOutcome { profiles, summary }
    }
}
