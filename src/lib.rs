//! Stable RSS feeds from periodic scrapes.
//!
//! Extractors pull raw records from third-party pages and APIs; the feed
//! pipeline normalizes, deduplicates and orders them, compares the result
//! with the previously published document, and only rewrites that document
//! when the ordered set of items actually changed.

pub mod config;
pub mod extract;
pub mod feed;
pub mod storage;
pub mod util;
