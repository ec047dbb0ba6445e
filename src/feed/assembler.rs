use super::document::{ChannelMeta, FeedDocument, FeedEntry};
use super::item::OrderedItem;

/// Builds a [`FeedDocument`] from channel metadata and ordered items.
///
/// Items map 1:1 onto entries in exactly the given order: the first ordered
/// item is the first entry. `pub_date` is carried over only when the item has
/// a resolved timestamp.
pub fn assemble(channel: &ChannelMeta, items: &[OrderedItem]) -> FeedDocument {
    FeedDocument {
        title: channel.title.clone(),
        link: channel.link.clone(),
        description: channel.description.clone(),
        language: channel.language.clone(),
        image: channel.image.clone(),
        items: items
            .iter()
            .map(|ordered| {
                let item = &ordered.item;
                FeedEntry {
                    guid: Some(item.id.clone()),
                    title: item.title.clone(),
                    link: Some(item.link.to_string()),
                    description: item.description_html.clone(),
                    pub_date: item.published_at,
                }
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::item::NormalizedItem;
    use chrono::{FixedOffset, TimeZone};
    use url::Url;

    fn channel() -> ChannelMeta {
        ChannelMeta {
            title: "pixivコミック".to_string(),
            link: "https://comic.pixiv.net/works/7912".to_string(),
            description: "更新feed".to_string(),
            language: "ja".to_string(),
            image: None,
        }
    }

    fn ordered(position: usize, id: &str, dated: bool) -> OrderedItem {
        let published_at = dated.then(|| {
            FixedOffset::east_opt(9 * 3600)
                .unwrap()
                .with_ymd_and_hms(2026, 2, 2, 0, 0, 0)
                .unwrap()
        });
        OrderedItem {
            position,
            item: NormalizedItem {
                id: id.to_string(),
                link: Url::parse(&format!("https://comic.pixiv.net/viewer/{id}")).unwrap(),
                title: format!("Episode {id}"),
                published_at,
                description_html: "<br>".to_string(),
            },
        }
    }

    #[test]
    fn test_entries_follow_given_order() {
        let doc = assemble(
            &channel(),
            &[ordered(0, "c", false), ordered(1, "a", false), ordered(2, "b", false)],
        );
        assert_eq!(doc.identity_sequence(), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_channel_metadata_copied() {
        let mut meta = channel();
        meta.image = Some("https://comic.pixiv.net/favicon.ico".to_string());
        let doc = assemble(&meta, &[]);
        assert_eq!(doc.title, "pixivコミック");
        assert_eq!(doc.link, "https://comic.pixiv.net/works/7912");
        assert_eq!(doc.language, "ja");
        assert_eq!(doc.image.as_deref(), Some("https://comic.pixiv.net/favicon.ico"));
        assert!(doc.items.is_empty());
    }

    #[test]
    fn test_entry_fields_mapped() {
        let doc = assemble(&channel(), &[ordered(0, "501", true)]);
        let entry = &doc.items[0];
        assert_eq!(entry.guid.as_deref(), Some("501"));
        assert_eq!(entry.title, "Episode 501");
        assert_eq!(
            entry.link.as_deref(),
            Some("https://comic.pixiv.net/viewer/501")
        );
        assert_eq!(entry.description, "<br>");
        assert!(entry.pub_date.is_some());
    }

    #[test]
    fn test_missing_timestamp_not_synthesized() {
        let doc = assemble(&channel(), &[ordered(0, "a", false)]);
        assert!(doc.items[0].pub_date.is_none());
    }
}
