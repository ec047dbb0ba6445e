use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use super::{ExtractError, Extractor};
use crate::feed::RawItem;

const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB

/// Reads records that an out-of-process scraper (a headless browser script,
/// for example) dumped as a JSON array of objects.
///
/// A missing file is an error, not an empty source: it means the scraper did
/// not run, and that must not look like the listing went empty.
#[derive(Debug, Clone)]
pub struct JsonFileExtractor {
    name: String,
    path: PathBuf,
    base: Option<Url>,
    id_prefix: Option<String>,
}

impl JsonFileExtractor {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            base: None,
            id_prefix: None,
        }
    }

    pub fn with_base(mut self, base: Url) -> Self {
        self.base = Some(base);
        self
    }

    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = Some(prefix.into());
        self
    }

    fn io_error(&self, source: std::io::Error) -> ExtractError {
        ExtractError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl Extractor for JsonFileExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn base(&self) -> Option<&Url> {
        self.base.as_ref()
    }

    fn id_prefix(&self) -> Option<&str> {
        self.id_prefix.as_deref()
    }

    async fn extract(&self) -> Result<Vec<RawItem>, ExtractError> {
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        if metadata.len() > MAX_FILE_SIZE {
            return Err(ExtractError::ResponseTooLarge);
        }

        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        let Value::Array(records) = serde_json::from_slice::<Value>(&bytes)? else {
            return Err(ExtractError::Shape("expected a JSON array of records".into()));
        };

        let total = records.len();
        let items: Vec<RawItem> = records
            .into_iter()
            .filter_map(|record| match record {
                Value::Object(map) => Some(RawItem::from(map)),
                _ => None,
            })
            .collect();

        if items.len() < total {
            tracing::debug!(
                source = %self.name,
                skipped = total - items.len(),
                "Non-object records skipped"
            );
        }
        Ok(items)
    }
}
