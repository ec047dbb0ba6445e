//! Feed synthesis and change detection.
//!
//! This module turns raw extracted records into a stable RSS document and
//! decides whether that document needs to be republished:
//!
//! - **Normalizing**: canonical ids, absolute links, parsed timestamps and
//!   HTML-safe descriptions, deduplicated first-wins across sources
//! - **Ordering**: newest first when every item is dated, source order otherwise
//! - **Change detection**: ordered identity comparison against the prior
//!   document, with a guard against publishing an empty feed over a full one
//! - **Assembly**: RSS 2.0 rendering and tolerant reading of prior documents
//!
//! # Architecture
//!
//! - [`normalizer`] - raw records to [`NormalizedItem`]s, with a drop report
//! - [`orderer`] - deterministic presentation order
//! - [`change`] - [`ChangeDecision`] from prior and new identity sequences
//! - [`assembler`] - [`FeedDocument`] from channel metadata and ordered items
//! - [`document`] - RSS reading and writing
//! - [`pipeline`] - [`run`] and its store-backed wrappers [`plan`] and [`publish`]
//!
//! # Example
//!
//! ```
//! use stablefeed::feed::{run, ChannelMeta, PipelineOptions, RawItem, Source};
//!
//! let channel = ChannelMeta {
//!     title: "Example".to_string(),
//!     link: "https://example.com/list".to_string(),
//!     ..ChannelMeta::default()
//! };
//! let sources = vec![Source::new(
//!     "list",
//!     vec![RawItem::new().with("id", "42").with("link", "/items/42")],
//! )];
//!
//! let outcome = run(&sources, &channel, None, &PipelineOptions::default());
//! assert!(outcome.changed);
//! assert_eq!(outcome.document.identity_sequence(), vec!["42"]);
//! ```

pub mod assembler;
pub mod change;
pub mod dates;
pub mod document;
pub mod item;
pub mod normalizer;
pub mod orderer;
pub mod pipeline;

pub use assembler::assemble;
pub use change::{detect, ChangeDecision, ChangePolicy, ChangeReason};
pub use document::{ChannelMeta, DocumentError, FeedDocument, FeedEntry};
pub use item::{
    DropReason, DroppedRecord, NormalizeReport, NormalizedItem, OrderedItem, RawItem,
    RecordWarning, Source,
};
pub use normalizer::{normalize, NormalizeOptions, Normalized};
pub use orderer::order;
pub use pipeline::{plan, publish, run, PipelineError, PipelineOptions, RunOutcome};
