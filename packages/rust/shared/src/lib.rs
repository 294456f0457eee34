//! Shared types, error model, and configuration for RoofScout.
//!
//! This crate is the foundation depended on by all other RoofScout crates.
//! It provides:
//! - [`RoofScoutError`], the unified error type
//! - Domain types ([`Lead`], [`EnrichmentFields`], [`ProgressSnapshot`], [`Region`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, GeminiConfig, OriginConfig, PacingConfig, PipelineConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from, resolve_api_key,
};
pub use error::{RATE_LIMIT_STATUS, RESOURCE_EXHAUSTED, Result, RoofScoutError};
pub use types::{
    COMMERCIAL_BUSINESS_TYPE, DISCOVERY_NOTE, EnrichmentFields, FALLBACK_NOTE, Lead, LeadId,
    PENDING_ANALYSIS, PENDING_PHONE, PENDING_SQ_FT, ProgressSnapshot, Region, RoofCondition,
    RunStatus,
};
