use super::item::{NormalizedItem, OrderedItem};

/// Produces the deterministic presentation order.
///
/// When every item carries a resolved timestamp the list is sorted newest
/// first; ties keep their encounter order (`sort_by` is stable). If any item
/// lacks a timestamp the source order is kept as is: re-sorting on a missing
/// key would shuffle the list and read as a content change downstream.
pub fn order(items: Vec<NormalizedItem>) -> Vec<OrderedItem> {
    let mut items = items;

    if items.iter().all(|i| i.published_at.is_some()) {
        items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    } else {
        tracing::debug!(
            items = items.len(),
            "Timestamps incomplete, preserving source order"
        );
    }

    items
        .into_iter()
        .enumerate()
        .map(|(position, item)| OrderedItem { position, item })
        .collect()
}
