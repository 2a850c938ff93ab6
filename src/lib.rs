//! Miya Vitality - Family wearable scoring and trend engine
//!
//! Vitality turns raw wearable data into a 0-100 vitality score through a
//! deterministic pipeline: provider adaptation → benchmark normalization →
//! pillar scoring → composite and progress → breakdown.
//!
//! ## Modules
//!
//! - **Scoring**: Sleep, Movement and Stress pillars against age-group benchmarks
//! - **Freshness**: Gates family views on how recently a member was scored
//! - **Trends**: Baseline vs recent deviations per family member and pillar
//! - **Badges**: Daily and weekly family competitions

pub mod adapters;
pub mod badges;
pub mod baseline;
pub mod benchmarks;
pub mod config;
pub mod error;
pub mod explain;
pub mod features;
pub mod freshness;
pub mod normalizer;
pub mod pipeline;
pub mod scoring;
pub mod trends;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use adapters::{Provider, ProviderPayloadAdapter};
pub use config::VitalityConfig;
pub use error::VitalityError;
pub use explain::{explain, ScoreBreakdown};
pub use freshness::{FreshnessGate, ScoreFreshness};
pub use pipeline::{provider_to_vitality, summary_to_vitality, VitalityProcessor};
pub use scoring::ScoringEngine;
pub use types::{Pillar, RawMetrics, RiskBand, VitalitySnapshot};

/// Engine version reported by the CLI and FFI
pub const VITALITY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name reported by diagnostics
pub const ENGINE_NAME: &str = "miya-vitality";
