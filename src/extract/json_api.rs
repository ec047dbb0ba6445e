use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::{ExtractError, Extractor};
use crate::feed::RawItem;

const MAX_RETRIES: u32 = 3;
const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Keep only records whose value at `pointer` equals `equals`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RequireFilter {
    pub pointer: String,
    pub equals: Value,
}

impl RequireFilter {
    fn matches(&self, record: &Value) -> bool {
        record.pointer(&self.pointer) == Some(&self.equals)
    }
}

/// Pulls records out of a JSON HTTP API.
///
/// Sends a GET, or a POST when a body is configured (GraphQL endpoints),
/// selects the record array with a JSON pointer and maps each record onto
/// the normalizer's field names. With an offset parameter set it keeps
/// requesting pages until one comes back empty or `max_pages` is reached.
#[derive(Debug)]
pub struct JsonApiExtractor {
    name: String,
    client: reqwest::Client,
    url: Url,
    body: Option<Value>,
    headers: Vec<(String, String)>,
    secret_headers: Vec<(String, SecretString)>,
    items_pointer: String,
    fields: Vec<(String, String)>,
    require: Option<RequireFilter>,
    offset_param: Option<String>,
    max_pages: usize,
    base: Option<Url>,
    id_prefix: Option<String>,
    retry_delay: Duration,
}

impl JsonApiExtractor {
    pub fn new(name: impl Into<String>, client: reqwest::Client, url: Url) -> Self {
        Self {
            name: name.into(),
            client,
            url,
            body: None,
            headers: Vec::new(),
            secret_headers: Vec::new(),
            items_pointer: String::new(),
            fields: Vec::new(),
            require: None,
            offset_param: None,
            max_pages: 1,
            base: None,
            id_prefix: None,
            retry_delay: Duration::from_secs(1),
        }
    }

    /// Sends `body` as a JSON POST instead of a GET.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Header whose value is a credential; never logged.
    pub fn with_secret_header(mut self, name: impl Into<String>, value: SecretString) -> Self {
        self.secret_headers.push((name.into(), value));
        self
    }

    /// JSON pointer to the record array. Empty means the body itself.
    pub fn with_items_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.items_pointer = pointer.into();
        self
    }

    /// Copies the value at `pointer` (relative to a record) into `field`.
    /// Without any field mappings records are passed through whole.
    pub fn with_field(mut self, field: impl Into<String>, pointer: impl Into<String>) -> Self {
        self.fields.push((field.into(), pointer.into()));
        self
    }

    pub fn with_require(mut self, filter: RequireFilter) -> Self {
        self.require = Some(filter);
        self
    }

    /// Enables offset pagination through query parameter `param`.
    pub fn with_pagination(mut self, param: impl Into<String>, max_pages: usize) -> Self {
        self.offset_param = Some(param.into());
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn with_base(mut self, base: Url) -> Self {
        self.base = Some(base);
        self
    }

    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = Some(prefix.into());
        self
    }

    /// First backoff delay; doubles on every retry.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn page_url(&self, offset: usize) -> Url {
        let mut url = self.url.clone();
        if let Some(param) = &self.offset_param {
            url.query_pairs_mut().append_pair(param, &offset.to_string());
        }
        url
    }

    fn request(&self, url: &Url) -> Result<reqwest::RequestBuilder, ExtractError> {
        let mut request = match &self.body {
            Some(body) => self
                .client
                .post(url.as_str())
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(serde_json::to_vec(body)?),
            None => self.client.get(url.as_str()),
        };

        request = request.header(reqwest::header::ACCEPT, "application/json");
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        for (name, value) in &self.secret_headers {
            request = request.header(name.as_str(), value.expose_secret());
        }
        Ok(request)
    }

    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, ExtractError> {
        let mut retry_count = 0;

        loop {
            let response = self.request(url)?.send().await?;
            let status = response.status();

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                if retry_count >= MAX_RETRIES {
                    return Err(if status.is_server_error() {
                        ExtractError::HttpStatus(status.as_u16())
                    } else {
                        ExtractError::RateLimited(MAX_RETRIES)
                    });
                }

                let delay = self.retry_delay * 2u32.pow(retry_count);
                tracing::warn!(
                    source = %self.name,
                    status = %status,
                    retry = retry_count,
                    delay_ms = delay.as_millis() as u64,
                    "Retryable response, backing off"
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
                continue;
            }

            // 4xx errors fail immediately
            if !status.is_success() {
                return Err(ExtractError::HttpStatus(status.as_u16()));
            }

            return read_limited_bytes(response, MAX_RESPONSE_SIZE).await;
        }
    }

    fn map_record(&self, record: &Value) -> Option<RawItem> {
        if self.fields.is_empty() {
            return match record {
                Value::Object(map) => Some(RawItem::from(map.clone())),
                _ => None,
            };
        }

        let mut item = RawItem::new();
        for (field, pointer) in &self.fields {
            if let Some(value) = record.pointer(pointer).filter(|v| !v.is_null()) {
                item.insert(field, value.clone());
            }
        }
        (!item.is_empty()).then_some(item)
    }
}

#[async_trait]
impl Extractor for JsonApiExtractor {
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
        let mut items = Vec::new();
        let mut offset = 0;

        for page in 0..self.max_pages {
            let bytes = self.fetch(&self.page_url(offset)).await?;
            let body: Value = serde_json::from_slice(&bytes)?;

            let records = if self.items_pointer.is_empty() {
                &body
            } else {
                body.pointer(&self.items_pointer).ok_or_else(|| {
                    ExtractError::Shape(format!("nothing at {}", self.items_pointer))
                })?
            };
            let records = records.as_array().ok_or_else(|| {
                ExtractError::Shape(format!("expected an array at '{}'", self.items_pointer))
            })?;

            if records.is_empty() {
                break;
            }

            let mut skipped = 0;
            for record in records {
                if let Some(filter) = &self.require {
                    if !filter.matches(record) {
                        continue;
                    }
                }
                match self.map_record(record) {
                    Some(item) => items.push(item),
                    None => skipped += 1,
                }
            }
            if skipped > 0 {
                tracing::debug!(source = %self.name, page = page, skipped = skipped, "Records without mappable fields skipped");
            }

            offset += records.len();
            if self.offset_param.is_none() {
                break;
            }
        }

        Ok(items)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, ExtractError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ExtractError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ExtractError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
