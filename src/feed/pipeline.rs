//! The run: normalize, order, detect, assemble, and the conditional write.

use thiserror::Error;
use url::Url;

use super::assembler::assemble;
use super::change::{detect, identity_sequence, ChangeDecision, ChangePolicy};
use super::document::{ChannelMeta, FeedDocument};
use super::item::{NormalizeReport, Source};
use super::normalizer::{normalize, NormalizeOptions};
use super::orderer::order;
use crate::storage::{FeedStore, StoreError};

/// Per-feed settings for one run.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub normalize: NormalizeOptions,
    pub policy: ChangePolicy,
    /// Keep only the first N ordered items. Applied before change detection so
    /// the cap never reads as a removal.
    pub max_entries: Option<usize>,
}

/// Result of [`run`].
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The document to publish when `changed`, otherwise the prior document.
    pub document: FeedDocument,
    pub changed: bool,
    pub decision: ChangeDecision,
    pub report: NormalizeReport,
}

/// Errors that stop a publish from landing.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The new document could not be durably written. The stored document is
    /// unchanged and the same change will be detected again next run.
    #[error("Feed update was not written: {0}")]
    Write(#[source] StoreError),
}

/// Runs the pure pipeline against an already-loaded prior document.
///
/// `sources` are in merge-precedence order. `prior` is `None` when nothing is
/// stored or what is stored cannot be read. When the outcome is not
/// `changed`, the returned document is the prior one, untouched.
pub fn run(
    sources: &[Source],
    channel: &ChannelMeta,
    prior: Option<&FeedDocument>,
    options: &PipelineOptions,
) -> RunOutcome {
    let mut normalize_options = options.normalize.clone();
    if normalize_options.fallback_base.is_none() {
        normalize_options.fallback_base = Url::parse(&channel.link).ok();
    }

    let normalized = normalize(sources, &normalize_options);
    let mut ordered = order(normalized.items);
    if let Some(max) = options.max_entries {
        ordered.truncate(max);
    }

    let decision = detect(prior, &identity_sequence(&ordered), options.policy);

    let document = match prior {
        Some(prior) if !decision.changed => prior.clone(),
        _ => assemble(channel, &ordered),
    };

    RunOutcome {
        document,
        changed: decision.changed,
        decision,
        report: normalized.report,
    }
}

/// Loads the prior document from `store` and runs the pipeline without
/// writing anything.
///
/// An unreadable prior document is logged and treated as absent.
pub fn plan(
    store: &impl FeedStore,
    sources: &[Source],
    channel: &ChannelMeta,
    options: &PipelineOptions,
) -> RunOutcome {
    let prior = match store.load() {
        Ok(prior) => prior,
        Err(e) => {
            tracing::warn!(error = %e, "Prior feed document unusable, treating as empty baseline");
            None
        }
    };

    run(sources, channel, prior.as_ref(), options)
}

/// [`plan`] followed by a full replace of the stored document when the run
/// decided the feed changed.
///
/// # Errors
///
/// Returns [`PipelineError::Write`] when the store could not persist the new
/// document. Everything else (bad records, failed sources, unreadable prior
/// state, an extraction outage) is reported in the outcome instead.
pub fn publish(
    store: &impl FeedStore,
    sources: &[Source],
    channel: &ChannelMeta,
    options: &PipelineOptions,
) -> Result<RunOutcome, PipelineError> {
    let outcome = plan(store, sources, channel, options);

    if outcome.decision.is_outage() {
        tracing::warn!(
            reason = %outcome.decision.reason,
            "Keeping existing feed document"
        );
        return Ok(outcome);
    }

    if !outcome.changed {
        tracing::info!(reason = %outcome.decision.reason, "Feed unchanged, skipping write");
        return Ok(outcome);
    }

    store.save(&outcome.document).map_err(PipelineError::Write)?;
    tracing::info!(
        reason = %outcome.decision.reason,
        entries = outcome.document.items.len(),
        "Feed document written"
    );

    Ok(outcome)
}
