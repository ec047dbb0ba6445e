//! The persisted syndication document and its RSS 2.0 representation.

use std::io::Cursor;

use chrono::{DateTime, FixedOffset};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

/// Errors from reading or writing a feed document.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The XML layer rejected the input or failed to write.
    #[error("XML error: {0}")]
    Xml(String),

    /// Well-formed (so far) but not a complete RSS channel.
    #[error("Malformed feed document: {0}")]
    Malformed(&'static str),
}

fn xml_err(e: impl std::fmt::Display) -> DocumentError {
    DocumentError::Xml(e.to_string())
}

/// Channel-level metadata supplied by the caller for every run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelMeta {
    pub title: String,
    /// Canonical link of the listing page the feed mirrors.
    pub link: String,
    pub description: String,
    pub language: String,
    pub image: Option<String>,
}

/// One `<item>` of a feed document.
///
/// `guid` and `link` are optional because prior documents are read back
/// tolerantly; documents produced by this crate always carry both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedEntry {
    pub guid: Option<String>,
    pub title: String,
    pub link: Option<String>,
    pub description: String,
    pub pub_date: Option<DateTime<FixedOffset>>,
}

/// The only state that survives between runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedDocument {
    pub title: String,
    pub link: String,
    pub description: String,
    pub language: String,
    pub image: Option<String>,
    pub items: Vec<FeedEntry>,
}

impl FeedDocument {
    /// Ordered identities of the document's entries: each entry's `guid`,
    /// or its `link` when the guid is missing. Entries with neither are skipped.
    pub fn identity_sequence(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter_map(|entry| {
                entry
                    .guid
                    .as_deref()
                    .map(str::trim)
                    .filter(|g| !g.is_empty())
                    .or_else(|| entry.link.as_deref().map(str::trim).filter(|l| !l.is_empty()))
            })
            .collect()
    }

    /// Renders the document as an RSS 2.0 XML string.
    ///
    /// Entries are written in `items` order; guids are marked
    /// `isPermaLink="false"` and `pubDate` is emitted only when present.
    pub fn to_rss(&self) -> Result<String, DocumentError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_err)?;

        let mut rss = BytesStart::new("rss");
        rss.push_attribute(("version", "2.0"));
        writer.write_event(Event::Start(rss)).map_err(xml_err)?;
        writer
            .write_event(Event::Start(BytesStart::new("channel")))
            .map_err(xml_err)?;

        write_text_element(&mut writer, "title", &self.title)?;
        write_text_element(&mut writer, "link", &self.link)?;
        write_text_element(&mut writer, "description", &self.description)?;
        if !self.language.is_empty() {
            write_text_element(&mut writer, "language", &self.language)?;
        }

        if let Some(ref image) = self.image {
            writer
                .write_event(Event::Start(BytesStart::new("image")))
                .map_err(xml_err)?;
            write_text_element(&mut writer, "url", image)?;
            write_text_element(&mut writer, "title", &self.title)?;
            write_text_element(&mut writer, "link", &self.link)?;
            writer
                .write_event(Event::End(BytesEnd::new("image")))
                .map_err(xml_err)?;
        }

        for entry in &self.items {
            writer
                .write_event(Event::Start(BytesStart::new("item")))
                .map_err(xml_err)?;
            write_text_element(&mut writer, "title", &entry.title)?;
            if let Some(ref link) = entry.link {
                write_text_element(&mut writer, "link", link)?;
            }
            write_text_element(&mut writer, "description", &entry.description)?;
            if let Some(ref guid) = entry.guid {
                writer
                    .create_element("guid")
                    .with_attribute(("isPermaLink", "false"))
                    .write_text_content(BytesText::new(guid))
                    .map_err(xml_err)?;
            }
            if let Some(pub_date) = entry.pub_date {
                write_text_element(&mut writer, "pubDate", &pub_date.to_rfc2822())?;
            }
            writer
                .write_event(Event::End(BytesEnd::new("item")))
                .map_err(xml_err)?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("channel")))
            .map_err(xml_err)?;
        writer
            .write_event(Event::End(BytesEnd::new("rss")))
            .map_err(xml_err)?;

        let mut bytes = writer.into_inner().into_inner();
        bytes.push(b'\n');
        String::from_utf8(bytes).map_err(xml_err)
    }

    /// Reads a document previously produced by [`FeedDocument::to_rss`] (or
    /// any reasonably shaped RSS 2.0 feed).
    ///
    /// Element matching uses local names, so namespaced copies of the
    /// document still yield their items. A document that ends before its
    /// `</channel>` is rejected as truncated.
    ///
    /// # Security
    ///
    /// SEC-002: `quick-xml` 0.37 never expands `<!ENTITY>` declarations;
    /// custom entity references surface as an unescape error.
    pub fn from_rss(content: &str) -> Result<Self, DocumentError> {
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(true);

        let mut doc = FeedDocument::default();
        let mut buf = Vec::new();
        let mut path: Vec<Vec<u8>> = Vec::new();
        let mut text = String::new();
        let mut entry: Option<FeedEntry> = None;
        let mut saw_channel = false;
        let mut channel_closed = false;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    let local = e.local_name().as_ref().to_vec();
                    if local == b"channel" {
                        saw_channel = true;
                    }
                    if local == b"item" && entry.is_none() {
                        entry = Some(FeedEntry::default());
                    }
                    // Namespaced children (atom:link, dc:date, ...) are not ours
                    let ours = e.name().prefix().is_none();
                    path.push(if ours { local } else { Vec::new() });
                    text.clear();
                }
                Ok(Event::Text(t)) => {
                    text.push_str(&t.unescape().map_err(xml_err)?);
                }
                Ok(Event::CData(c)) => {
                    text.push_str(&String::from_utf8_lossy(&c));
                }
                Ok(Event::End(_)) => {
                    let Some(name) = path.pop() else {
                        return Err(DocumentError::Malformed("unbalanced end tag"));
                    };
                    let parent = path.last().map(Vec::as_slice);
                    let value = std::mem::take(&mut text);

                    match (parent, name.as_slice()) {
                        (_, b"item") => {
                            if let Some(done) = entry.take() {
                                doc.items.push(done);
                            }
                        }
                        (Some(b"item"), field) => {
                            if let Some(ref mut current) = entry {
                                apply_entry_field(current, field, value);
                            }
                        }
                        (Some(b"image"), b"url") => doc.image = Some(value),
                        (Some(b"channel"), b"title") => doc.title = value,
                        (Some(b"channel"), b"link") => doc.link = value,
                        (Some(b"channel"), b"description") => doc.description = value,
                        (Some(b"channel"), b"language") => doc.language = value,
                        (_, b"channel") => channel_closed = true,
                        _ => {}
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(xml_err(e)),
                _ => {}
            }
            buf.clear();
        }

        if !saw_channel {
            return Err(DocumentError::Malformed("no <channel> element"));
        }
        if !channel_closed {
            return Err(DocumentError::Malformed("document truncated before </channel>"));
        }
        Ok(doc)
    }
}

fn apply_entry_field(entry: &mut FeedEntry, field: &[u8], value: String) {
    match field {
        b"guid" => entry.guid = Some(value),
        b"title" => entry.title = value,
        b"link" => entry.link = Some(value),
        b"description" => entry.description = value,
        b"pubDate" => entry.pub_date = DateTime::parse_from_rfc2822(value.trim()).ok(),
        _ => {}
    }
}

fn write_text_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    text: &str,
) -> Result<(), DocumentError> {
    writer
        .create_element(name)
        .write_text_content(BytesText::new(text))
        .map_err(xml_err)?;
    Ok(())
}
