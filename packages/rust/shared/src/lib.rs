//! Shared types, error model, and configuration for tenderwatch.
//!
//! This crate is the foundation depended on by all other tenderwatch crates.
//! It provides:
//! - [`TenderError`] — the unified error type
//! - Domain types ([`ProjectSummary`], [`ProjectDetail`], [`CompanyProfile`], [`EnrichmentResult`])
//! - Configuration ([`AppConfig`], config loading, secret resolution)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ModelConfig, ModelProvider, NotifyConfig, RunConfig, SourceConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, resolve_secret,
};
pub use error::{Result, TenderError};
pub use types::{
    CompanyProfile, CpvCode, CriteriaSignals, Criterion, EnrichmentResult, MissingField,
    ProjectDetail, ProjectInfo, ProjectSummary, Team, localized, value_to_string,
};
