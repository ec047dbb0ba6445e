//! Configuration file parser for the feeds to publish (`feeds.toml`).
//!
//! The config file is optional: a missing file yields `Config::default()`,
//! which publishes nothing. Unknown keys are accepted by serde but logged as
//! warnings, since they are usually typos.
use chrono::FixedOffset;
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::extract::{
    Extractor, GatherOptions, JsonApiExtractor, JsonFileExtractor, RequireFilter,
};
use crate::feed::dates::parse_offset;
use crate::feed::{ChangePolicy, ChannelMeta, NormalizeOptions, PipelineOptions};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// Parsed, but a value makes no sense (bad URL, unknown offset, ...).
    #[error("Invalid config for {context}: {message}")]
    Invalid { context: String, message: String },

    /// A secret header refers to an environment variable that is not set.
    #[error("Feed '{feed}': header '{header}' needs environment variable {var}, which is not set")]
    MissingSecret {
        feed: String,
        header: String,
        var: String,
    },
}

fn invalid(context: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        context: context.into(),
        message: message.into(),
    }
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Reference UTC offset for naive timestamps, e.g. `"+09:00"`.
    pub timezone: String,

    /// Extractors of one feed running at once.
    pub max_concurrency: usize,

    /// Time budget per extractor, retries included.
    pub timeout_secs: u64,

    /// Records kept per source.
    pub max_items: usize,

    /// User-Agent sent by HTTP extractors.
    pub user_agent: String,

    /// Feeds, processed in file order.
    #[serde(rename = "feed")]
    pub feeds: Vec<FeedConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timezone: "+09:00".to_string(),
            max_concurrency: 4,
            timeout_secs: 30,
            max_items: 200,
            user_agent: concat!("stablefeed/", env!("CARGO_PKG_VERSION")).to_string(),
            feeds: Vec::new(),
        }
    }
}

/// One published feed: where it goes, what its channel says, where its items
/// come from.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub name: String,
    /// Path of the RSS file this feed is published to.
    pub output: PathBuf,
    pub title: String,
    /// Canonical link of the listing page; also the fallback base URL.
    pub link: String,
    pub description: String,
    pub language: String,
    pub image: Option<String>,
    pub change_policy: ChangePolicy,
    /// Keep only the newest N entries.
    pub max_entries: Option<usize>,
    /// Label of the date line in composed descriptions.
    pub date_label: String,
    /// Sources in merge-precedence order.
    #[serde(rename = "source")]
    pub sources: Vec<SourceConfig>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            output: PathBuf::new(),
            title: String::new(),
            link: String::new(),
            description: String::new(),
            language: "ja".to_string(),
            image: None,
            change_policy: ChangePolicy::default(),
            max_entries: None,
            date_label: "Updated".to_string(),
            sources: Vec::new(),
        }
    }
}

/// A `[[feed.source]]` table, selected by its `kind` key.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    JsonApi(JsonApiSource),
    JsonFile(JsonFileSource),
}

/// `kind = "json_api"`
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct JsonApiSource {
    pub name: Option<String>,
    pub url: String,
    /// JSON body; switches the request to POST.
    pub body: Option<Value>,
    /// JSON pointer to the record array.
    pub items_pointer: String,
    /// Normalizer field name → JSON pointer inside a record.
    pub fields: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    /// Header name → environment variable holding its value.
    pub secret_headers: BTreeMap<String, String>,
    pub require: Option<RequireFilter>,
    pub offset_param: Option<String>,
    pub max_pages: Option<usize>,
    pub base: Option<String>,
    pub id_prefix: Option<String>,
}

/// SEC-015: Header values can carry credentials; Debug shows names only.
impl std::fmt::Debug for JsonApiSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonApiSource")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("body", &self.body.as_ref().map(|_| "[JSON]"))
            .field("items_pointer", &self.items_pointer)
            .field("fields", &self.fields)
            .field(
                "headers",
                &self
                    .headers
                    .keys()
                    .map(|k| (k.as_str(), "[REDACTED]"))
                    .collect::<BTreeMap<_, _>>(),
            )
            .field("secret_headers", &self.secret_headers)
            .field("require", &self.require)
            .field("offset_param", &self.offset_param)
            .field("max_pages", &self.max_pages)
            .field("base", &self.base)
            .field("id_prefix", &self.id_prefix)
            .finish()
    }
}

/// `kind = "json_file"`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JsonFileSource {
    pub name: Option<String>,
    pub path: PathBuf,
    pub base: Option<String>,
    pub id_prefix: Option<String>,
}

// ============================================================================
// Loading
// ============================================================================

const KNOWN_KEYS: &[&str] = &[
    "timezone",
    "max_concurrency",
    "timeout_secs",
    "max_items",
    "user_agent",
    "feed",
];

const KNOWN_FEED_KEYS: &[&str] = &[
    "name",
    "output",
    "title",
    "link",
    "description",
    "language",
    "image",
    "change_policy",
    "max_entries",
    "date_label",
    "source",
];

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading to prevent memory exhaustion
        // from a maliciously large or corrupted config file.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            warn_unknown_keys(&raw);
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), feeds = config.feeds.len(), "Loaded configuration");
        Ok(config)
    }

    /// The reference timezone as a fixed offset.
    pub fn timezone_offset(&self) -> Result<FixedOffset, ConfigError> {
        parse_offset(&self.timezone)
            .ok_or_else(|| invalid("timezone", format!("'{}' is not a UTC offset", self.timezone)))
    }

    pub fn gather_options(&self) -> GatherOptions {
        GatherOptions {
            max_concurrency: self.max_concurrency.max(1),
            max_items: self.max_items,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

fn warn_unknown_keys(raw: &toml::Table) {
    for key in raw.keys() {
        if !KNOWN_KEYS.contains(&key.as_str()) {
            tracing::warn!(key = %key, "Unknown key in config file, ignoring");
        }
    }

    let feeds = raw.get("feed").and_then(toml::Value::as_array);
    for feed in feeds.into_iter().flatten().filter_map(toml::Value::as_table) {
        for key in feed.keys() {
            if !KNOWN_FEED_KEYS.contains(&key.as_str()) {
                tracing::warn!(key = %key, "Unknown key in [[feed]] table, ignoring");
            }
        }
    }
}

// ============================================================================
// Building runtime values
// ============================================================================

impl FeedConfig {
    /// Checks what serde cannot: required values and URL syntax.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let context = || format!("feed '{}'", self.name);

        if self.name.trim().is_empty() {
            return Err(invalid("feed", "missing name"));
        }
        if self.output.as_os_str().is_empty() {
            return Err(invalid(context(), "missing output path"));
        }
        parse_url(&self.link).map_err(|m| invalid(context(), format!("link: {m}")))?;
        if self.sources.is_empty() {
            return Err(invalid(context(), "no [[feed.source]] tables"));
        }
        Ok(())
    }

    pub fn channel(&self) -> ChannelMeta {
        ChannelMeta {
            title: if self.title.is_empty() {
                self.name.clone()
            } else {
                self.title.clone()
            },
            link: self.link.clone(),
            description: self.description.clone(),
            language: self.language.clone(),
            image: self.image.clone(),
        }
    }

    pub fn pipeline_options(&self, timezone: FixedOffset) -> PipelineOptions {
        PipelineOptions {
            normalize: NormalizeOptions {
                timezone,
                fallback_base: Url::parse(&self.link).ok(),
                date_label: self.date_label.clone(),
            },
            policy: self.change_policy,
            max_entries: self.max_entries,
        }
    }

    /// Builds the feed's extractors in source order.
    ///
    /// Secret header values are read from the environment here, so a missing
    /// variable fails this feed before any request is made.
    pub fn extractors(
        &self,
        client: &reqwest::Client,
    ) -> Result<Vec<Box<dyn Extractor>>, ConfigError> {
        self.sources
            .iter()
            .enumerate()
            .map(|(index, source)| source.build(&self.name, index, client))
            .collect()
    }
}

impl SourceConfig {
    fn build(
        &self,
        feed: &str,
        index: usize,
        client: &reqwest::Client,
    ) -> Result<Box<dyn Extractor>, ConfigError> {
        let context = format!("feed '{feed}' source #{index}");

        match self {
            SourceConfig::JsonApi(api) => {
                let name = api.name.clone().unwrap_or_else(|| format!("{feed}#{index}"));
                let url = parse_url(&api.url).map_err(|m| invalid(&context, format!("url: {m}")))?;

                let mut extractor = JsonApiExtractor::new(name, client.clone(), url)
                    .with_items_pointer(api.items_pointer.clone());
                if let Some(body) = &api.body {
                    extractor = extractor.with_body(body.clone());
                }
                for (header, value) in &api.headers {
                    extractor = extractor.with_header(header.clone(), value.clone());
                }
                for (header, var) in &api.secret_headers {
                    let value = std::env::var(var).map_err(|_| ConfigError::MissingSecret {
                        feed: feed.to_string(),
                        header: header.clone(),
                        var: var.clone(),
                    })?;
                    extractor = extractor.with_secret_header(header.clone(), SecretString::from(value));
                }
                for (field, pointer) in &api.fields {
                    extractor = extractor.with_field(field.clone(), pointer.clone());
                }
                if let Some(filter) = &api.require {
                    extractor = extractor.with_require(filter.clone());
                }
                if let Some(param) = &api.offset_param {
                    extractor = extractor.with_pagination(param.clone(), api.max_pages.unwrap_or(20));
                }
                if let Some(base) = &api.base {
                    let base = parse_url(base).map_err(|m| invalid(&context, format!("base: {m}")))?;
                    extractor = extractor.with_base(base);
                }
                if let Some(prefix) = &api.id_prefix {
                    extractor = extractor.with_id_prefix(prefix.clone());
                }
                Ok(Box::new(extractor))
            }
            SourceConfig::JsonFile(file) => {
                if file.path.as_os_str().is_empty() {
                    return Err(invalid(context, "missing path"));
                }
                let name = file.name.clone().unwrap_or_else(|| format!("{feed}#{index}"));

                let mut extractor = JsonFileExtractor::new(name, file.path.clone());
                if let Some(base) = &file.base {
                    let base = parse_url(base).map_err(|m| invalid(&context, format!("base: {m}")))?;
                    extractor = extractor.with_base(base);
                }
                if let Some(prefix) = &file.id_prefix {
                    extractor = extractor.with_id_prefix(prefix.clone());
                }
                Ok(Box::new(extractor))
            }
        }
    }
}

fn parse_url(s: &str) -> Result<Url, String> {
    let url = Url::parse(s.trim()).map_err(|e| format!("'{s}': {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("'{s}': only http and https are supported"));
    }
    Ok(url)
}

// ============================================================================
// Tests
// ============================================================================
