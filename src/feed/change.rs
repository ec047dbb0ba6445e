use serde::Deserialize;

use super::document::FeedDocument;
use super::item::OrderedItem;

/// How two identity sequences are compared.
///
/// Whether a pure reshuffle of the same items is a real update is a per-feed
/// call, so it is a named policy rather than a hard-coded rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangePolicy {
    /// Sequences must be equal as ordered lists. A permutation is a change.
    #[default]
    Ordered,
    /// Only membership counts. Use for sources whose ordering is unstable
    /// without any content change.
    Membership,
}

/// Why the detector decided what it decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeReason {
    /// No prior document (missing or unreadable): always regenerate.
    NoPriorState,
    /// Same identities in the same order (or same set, under `Membership`).
    Unchanged,
    /// Identities were added and/or removed.
    MembershipChanged { added: usize, removed: usize },
    /// Same identities, different order.
    Reordered,
    /// Nothing was extracted while the prior document has entries. Treated as
    /// an extraction outage; the prior document must not be replaced.
    EmptyExtraction { prior_entries: usize },
}

impl std::fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeReason::NoPriorState => write!(f, "no prior feed document"),
            ChangeReason::Unchanged => write!(f, "item identities unchanged"),
            ChangeReason::MembershipChanged { added, removed } => {
                write!(f, "{added} item(s) added, {removed} removed")
            }
            ChangeReason::Reordered => write!(f, "same items in a different order"),
            ChangeReason::EmptyExtraction { prior_entries } => write!(
                f,
                "no items extracted while prior feed has {prior_entries}; refusing to publish an empty feed"
            ),
        }
    }
}

/// Outcome of change detection for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeDecision {
    pub changed: bool,
    pub reason: ChangeReason,
}

impl ChangeDecision {
    fn changed(reason: ChangeReason) -> Self {
        Self {
            changed: true,
            reason,
        }
    }

    fn unchanged(reason: ChangeReason) -> Self {
        Self {
            changed: false,
            reason,
        }
    }

    /// True when the run was declined by the systemic-emptiness guard.
    pub fn is_outage(&self) -> bool {
        matches!(self.reason, ChangeReason::EmptyExtraction { .. })
    }
}

/// The ordered identity sequence of a run's items.
pub fn identity_sequence(items: &[OrderedItem]) -> Vec<&str> {
    items.iter().map(OrderedItem::id).collect()
}

/// Decides whether the feed must be regenerated.
///
/// `prior` is `None` when the stored document is missing or unreadable; that
/// always forces a write. A non-empty prior with an empty new sequence is
/// declined as an extraction outage regardless of `policy`.
pub fn detect(
    prior: Option<&FeedDocument>,
    new_ids: &[&str],
    policy: ChangePolicy,
) -> ChangeDecision {
    let Some(prior) = prior else {
        return ChangeDecision::changed(ChangeReason::NoPriorState);
    };

    let old_ids = prior.identity_sequence();

    if new_ids.is_empty() && !old_ids.is_empty() {
        return ChangeDecision::unchanged(ChangeReason::EmptyExtraction {
            prior_entries: old_ids.len(),
        });
    }

    if old_ids.as_slice() == new_ids {
        return ChangeDecision::unchanged(ChangeReason::Unchanged);
    }

    let added = new_ids.iter().filter(|id| !old_ids.contains(*id)).count();
    let removed = old_ids.iter().filter(|id| !new_ids.contains(*id)).count();

    if added == 0 && removed == 0 && old_ids.len() == new_ids.len() {
        return match policy {
            ChangePolicy::Ordered => ChangeDecision::changed(ChangeReason::Reordered),
            ChangePolicy::Membership => ChangeDecision::unchanged(ChangeReason::Unchanged),
        };
    }

    ChangeDecision::changed(ChangeReason::MembershipChanged { added, removed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::document::FeedEntry;

    fn prior(ids: &[&str]) -> FeedDocument {
        FeedDocument {
            items: ids
                .iter()
                .map(|id| FeedEntry {
                    guid: Some(id.to_string()),
                    ..FeedEntry::default()
                })
                .collect(),
            ..FeedDocument::default()
        }
    }

    #[test]
    fn test_identical_sequence_unchanged() {
        let doc = prior(&["x", "y", "z"]);
        let decision = detect(Some(&doc), &["x", "y", "z"], ChangePolicy::Ordered);
        assert!(!decision.changed);
        assert_eq!(decision.reason, ChangeReason::Unchanged);
    }

    #[test]
    fn test_reorder_is_change_under_ordered_policy() {
        let doc = prior(&["x", "y", "z"]);
        let decision = detect(Some(&doc), &["y", "x", "z"], ChangePolicy::Ordered);
        assert!(decision.changed);
        assert_eq!(decision.reason, ChangeReason::Reordered);
    }

    #[test]
    fn test_reorder_ignored_under_membership_policy() {
        let doc = prior(&["x", "y", "z"]);
        let decision = detect(Some(&doc), &["z", "y", "x"], ChangePolicy::Membership);
        assert!(!decision.changed);
    }

    #[test]
    fn test_membership_change_counted() {
        let doc = prior(&["x", "y", "z"]);
        let decision = detect(Some(&doc), &["w", "x", "y"], ChangePolicy::Ordered);
        assert!(decision.changed);
        assert_eq!(
            decision.reason,
            ChangeReason::MembershipChanged {
                added: 1,
                removed: 1
            }
        );
    }

    #[test]
    fn test_membership_policy_still_sees_additions() {
        let doc = prior(&["x", "y"]);
        let decision = detect(Some(&doc), &["x", "y", "z"], ChangePolicy::Membership);
        assert!(decision.changed);
    }

    #[test]
    fn test_no_prior_forces_write() {
        let decision = detect(None, &["x"], ChangePolicy::Ordered);
        assert!(decision.changed);
        assert_eq!(decision.reason, ChangeReason::NoPriorState);

        let decision = detect(None, &[], ChangePolicy::Ordered);
        assert!(decision.changed);
    }

    #[test]
    fn test_empty_extraction_with_prior_declined() {
        let doc = prior(&["x", "y", "z"]);
        let decision = detect(Some(&doc), &[], ChangePolicy::Ordered);
        assert!(!decision.changed);
        assert!(decision.is_outage());
        assert_eq!(
            decision.reason,
            ChangeReason::EmptyExtraction { prior_entries: 3 }
        );
    }

    #[test]
    fn test_empty_prior_and_empty_new_unchanged() {
        let doc = prior(&[]);
        let decision = detect(Some(&doc), &[], ChangePolicy::Ordered);
        assert!(!decision.changed);
        assert!(!decision.is_outage());
    }

    #[test]
    fn test_prior_link_used_when_guid_absent() {
        let doc = FeedDocument {
            items: vec![FeedEntry {
                guid: None,
                link: Some("https://example.com/a".to_string()),
                ..FeedEntry::default()
            }],
            ..FeedDocument::default()
        };
        let decision = detect(Some(&doc), &["https://example.com/a"], ChangePolicy::Ordered);
        assert!(!decision.changed);
    }

    #[test]
    fn test_reason_display() {
        let reason = ChangeReason::MembershipChanged {
            added: 2,
            removed: 0,
        };
        assert_eq!(reason.to_string(), "2 item(s) added, 0 removed");
    }
}
