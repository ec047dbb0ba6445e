//! Extractors: the source-specific side of a run.
//!
//! An [`Extractor`] turns one site or API into [`RawItem`]s. Adding a new
//! source means adding an implementer; nothing in [`crate::feed`] changes.
//! [`gather`] drives a list of extractors with bounded concurrency and
//! returns their output in caller order, so merge precedence never depends
//! on which request finished first.

mod json_api;
mod json_file;

pub use json_api::{JsonApiExtractor, RequireFilter};
pub use json_file::JsonFileExtractor;

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use thiserror::Error;
use url::Url;

use crate::feed::{RawItem, Source};

/// Errors an extractor can report. None of them abort a run: a failed
/// extractor contributes zero items.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Extractor exceeded its time budget
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Body was not the JSON shape the extractor expects
    #[error("Unexpected response shape: {0}")]
    Shape(String),
    /// Local input could not be read
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// Invalid JSON
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Extractor could not be constructed from its settings
    #[error("Invalid extractor settings: {0}")]
    Config(String),
}

/// A source of raw records for one feed.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Name used in logs and drop reports.
    fn name(&self) -> &str;

    /// Base URL for relative links in this source's records.
    fn base(&self) -> Option<&Url> {
        None
    }

    /// Prefix for explicit record identifiers.
    fn id_prefix(&self) -> Option<&str> {
        None
    }

    /// Fetches the current records. Zero records is a valid result.
    async fn extract(&self) -> Result<Vec<RawItem>, ExtractError>;
}

/// Limits applied by [`gather`].
#[derive(Debug, Clone)]
pub struct GatherOptions {
    /// Extractors in flight at once.
    pub max_concurrency: usize,
    /// Records kept per extractor; the rest are discarded with a warning.
    pub max_items: usize,
    /// Budget for a single extractor call, retries included.
    pub timeout: Duration,
}

impl Default for GatherOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            max_items: 200,
            timeout: Duration::from_secs(30),
        }
    }
}

/// What happened to one extractor during [`gather`].
#[derive(Debug)]
pub struct SourceReport {
    pub name: String,
    /// Records handed on, or the error that left the source empty.
    pub result: Result<usize, ExtractError>,
    /// Records discarded by the `max_items` cap.
    pub truncated: usize,
}

/// Runs every extractor and pairs its output with a report.
///
/// The returned vector has one entry per extractor, in the same order as
/// `extractors`. A failed or timed-out extractor yields an empty [`Source`].
pub async fn gather(
    extractors: &[Box<dyn Extractor>],
    options: &GatherOptions,
) -> Vec<(Source, SourceReport)> {
    stream::iter(extractors.iter())
        .map(|extractor| async move {
            let extractor = extractor.as_ref();
            let result = tokio::time::timeout(options.timeout, extractor.extract())
                .await
                .unwrap_or(Err(ExtractError::Timeout(options.timeout)));

            let mut source = Source::new(extractor.name(), Vec::new());
            source.base = extractor.base().cloned();
            source.id_prefix = extractor.id_prefix().map(str::to_string);

            let mut truncated = 0;
            let result = match result {
                Ok(mut items) => {
                    if items.len() > options.max_items {
                        truncated = items.len() - options.max_items;
                        items.truncate(options.max_items);
                        tracing::warn!(
                            source = %extractor.name(),
                            kept = options.max_items,
                            discarded = truncated,
                            "Source exceeded item cap"
                        );
                    }
                    tracing::debug!(source = %extractor.name(), items = items.len(), "Source extracted");
                    let count = items.len();
                    source.items = items;
                    Ok(count)
                }
                Err(e) => {
                    tracing::warn!(
                        source = %extractor.name(),
                        error = %e,
                        "Source failed, contributing zero items"
                    );
                    Err(e)
                }
            };

            let report = SourceReport {
                name: extractor.name().to_string(),
                result,
                truncated,
            };
            (source, report)
        })
        .buffered(options.max_concurrency.max(1))
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Fixed {
        name: String,
        delay: Duration,
        items: usize,
        fail: bool,
    }

    #[async_trait]
    impl Extractor for Fixed {
        fn name(&self) -> &str {
            &self.name
        }

        async fn extract(&self) -> Result<Vec<RawItem>, ExtractError> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(ExtractError::HttpStatus(503));
            }
            Ok((0..self.items)
                .map(|i| RawItem::new().with("id", format!("{}-{i}", self.name)))
                .collect())
        }
    }

    fn fixed(name: &str, delay_ms: u64, items: usize) -> Box<dyn Extractor> {
        Box::new(Fixed {
            name: name.to_string(),
            delay: Duration::from_millis(delay_ms),
            items,
            fail: false,
        })
    }

    #[tokio::test]
    async fn test_results_follow_caller_order() {
        // First extractor finishes last
        let extractors = vec![fixed("slow", 50, 1), fixed("fast", 0, 1)];
        let results = gather(&extractors, &GatherOptions::default()).await;

        let names: Vec<&str> = results.iter().map(|(s, _)| s.name.as_str()).collect();
        assert_eq!(names, vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn test_failed_extractor_yields_empty_source() {
        let extractors: Vec<Box<dyn Extractor>> = vec![
            Box::new(Fixed {
                name: "broken".to_string(),
                delay: Duration::ZERO,
                items: 3,
                fail: true,
            }),
            fixed("ok", 0, 2),
        ];
        let results = gather(&extractors, &GatherOptions::default()).await;

        assert!(results[0].0.items.is_empty());
        assert!(matches!(
            results[0].1.result,
            Err(ExtractError::HttpStatus(503))
        ));
        assert_eq!(results[1].0.items.len(), 2);
    }

    #[tokio::test]
    async fn test_timeout_yields_empty_source() {
        let extractors = vec![fixed("stuck", 5_000, 1)];
        let options = GatherOptions {
            timeout: Duration::from_millis(20),
            ..GatherOptions::default()
        };
        let results = gather(&extractors, &options).await;

        assert!(results[0].0.items.is_empty());
        assert!(matches!(results[0].1.result, Err(ExtractError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_item_cap_truncates() {
        let extractors = vec![fixed("big", 0, 10)];
        let options = GatherOptions {
            max_items: 4,
            ..GatherOptions::default()
        };
        let results = gather(&extractors, &options).await;

        assert_eq!(results[0].0.items.len(), 4);
        assert_eq!(results[0].1.truncated, 6);
        assert!(matches!(results[0].1.result, Ok(4)));
    }

    struct Counting {
        name: String,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Extractor for Counting {
        fn name(&self) -> &str {
            &self.name
        }

        async fn extract(&self) -> Result<Vec<RawItem>, ExtractError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let extractors: Vec<Box<dyn Extractor>> = (0..8)
            .map(|i| {
                Box::new(Counting {
                    name: format!("c{i}"),
                    active: active.clone(),
                    peak: peak.clone(),
                }) as Box<dyn Extractor>
            })
            .collect();
        let options = GatherOptions {
            max_concurrency: 2,
            ..GatherOptions::default()
        };
        gather(&extractors, &options).await;

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_source_carries_extractor_settings() {
        struct WithBase(Url);

        #[async_trait]
        impl Extractor for WithBase {
            fn name(&self) -> &str {
                "based"
            }
            fn base(&self) -> Option<&Url> {
                Some(&self.0)
            }
            fn id_prefix(&self) -> Option<&str> {
                Some("works-")
            }
            async fn extract(&self) -> Result<Vec<RawItem>, ExtractError> {
                Ok(Vec::new())
            }
        }

        let base = Url::parse("https://example.com/").unwrap();
        let extractors: Vec<Box<dyn Extractor>> = vec![Box::new(WithBase(base.clone()))];
        let results = gather(&extractors, &GatherOptions::default()).await;

        assert_eq!(results[0].0.base.as_ref(), Some(&base));
        assert_eq!(results[0].0.id_prefix.as_deref(), Some("works-"));
    }
}
