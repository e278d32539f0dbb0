//! Company-site fetcher.
//!
//! This crate provides:
//! - [`candidate_urls`]: the fixed page set derived from a company URL
//! - [`Fetcher`]: concurrent, failure-isolated page fetching into a [`ScrapeResult`]
//!
//! [`ScrapeResult`]: contextpack_shared::ScrapeResult

pub mod fetcher;

pub use fetcher::{CandidatePage, Fetcher, candidate_urls};
