//! Utility functions shared by the normalizer and the extractors.
//!
//! - **Link repair**: resolve scraped hrefs to canonical absolute http(s) URLs
//! - **Text processing**: HTML escaping, control-character stripping, price formatting
//!
//! # Examples
//!
//! ```
//! use stablefeed::util::{escape_html, format_amount, resolve_link};
//!
//! let url = resolve_link("//cdn.example.com/a.jpg", None).unwrap();
//! assert_eq!(url.as_str(), "https://cdn.example.com/a.jpg");
//!
//! assert_eq!(format_amount(12100), "12,100");
//! assert_eq!(escape_html("A & B"), "A &amp; B");
//! ```

mod links;
mod text;

pub use links::{resolve_link, LinkError};
pub use text::{escape_html, first_line, format_amount, normalize_price_text, strip_control_chars};
