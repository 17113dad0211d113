//! Trait resolution and consistency engine for synthetic browser profiles.
//!
//! A [`catalog::TraitCatalog`] holds typed trait definitions with weighted,
//! context-tagged options. [`generator::ProfileGenerator`] turns a
//! [`request::MetaProfileRequest`] into a flat, internally consistent trait
//! map, deterministically for a given seed.
//!
//! - [`catalog`]: definitions, options, GPU/font sub-catalogs, JSON import/export
//! - [`filter`] and [`sampler`]: context narrowing and seeded weighted picks
//! - [`plan`]: per-key distribution overrides
//! - [`resolver`]: the tier table and derived traits (platform, UA, client hints)
//! - [`validator`]: post-resolution rules with a single repair pass
//! - [`generator`] and [`batch`]: public entry points
//! - [`io`]: file helpers for callers that persist documents
pub mod batch;
pub mod catalog;
pub mod diagnostics;
pub mod filter;
pub mod generator;
pub mod io;
pub mod keys;
pub mod plan;
pub mod request;
pub mod resolver;
pub mod sampler;
pub mod validator;
pub mod value;

pub use batch::{BatchDeduper, BatchOutcome, BatchSummary};
pub use catalog::{CatalogDocument, ImportMode, TraitCatalog};
pub use diagnostics::{Diagnostic, Severity};
pub use generator::{GeneratedProfile, GenerationFailure, ProfileGenerator, ResolvedProfile};
pub use request::{MetaProfileRequest, RequestContext};
pub use value::{Value, ValueKind};
