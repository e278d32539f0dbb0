//! Shared types, error model, and configuration for ContextPack.
//!
//! This crate is the foundation depended on by all other ContextPack crates.
//! It provides:
//! - [`ContextPackError`]: the unified error type
//! - Domain types ([`ScrapeResult`], [`ConfidentField`], [`ExtractionResult`], [`ContextPack`])
//! - Configuration ([`AppConfig`], [`ScanConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, OpenRouterConfig, ScanConfig, ScanPoliciesConfig, StorageConfig, config_dir,
    config_file_path, db_path, init_config, load_config, load_config_from, resolve_api_key,
};
pub use error::{ContextPackError, FieldError, Result};
pub use types::{
    BusinessModelExtraction, BusinessModelSection, Citation, Confidence, ConfidentField,
    ContextPack, DRAFT_VERSION, ExtractionResult, FieldRef, IcpExtraction, IcpSection, IcpSegment,
    NOT_EXTRACTED_REASON, PageKind, ProductSection, ScrapeResult, ScrapedPage,
};
