//! Reclassification of breaking changes into risky ones.

use crate::{
    ApiKind, ChangeSummary, ChangeType, Diff, ImpactedOperationSummary, JsonPath,
    OperationChanges,
};

/// Turns a breaking `diff` into a risky one and keeps both summaries consistent.
///
/// The breaking counter loses one and the risky counter gains one. The impacted flags follow:
/// breaking stays set while breaking diffs remain, risky is set. Returns `false` and changes
/// nothing when `diff` is not breaking, so reclassifying twice is harmless.
pub fn mark_change_as_risky(
    diff: &mut Diff,
    change_summary: &mut ChangeSummary,
    impacted_summary: &mut ImpactedOperationSummary,
) -> bool {
    if diff.change_type != ChangeType::Breaking {
        return false;
    }
    diff.change_type = ChangeType::Risky;
    change_summary.breaking = change_summary.breaking.saturating_sub(1);
    change_summary.risky += 1;
    impacted_summary.breaking = change_summary.breaking > 0;
    impacted_summary.risky = true;
    true
}

impl OperationChanges {
    /// [`mark_change_as_risky`] for the diff at `index`. `false` when out of range.
    pub fn mark_risky(&mut self, index: usize) -> bool {
        let Self {
            diffs,
            change_summary,
            impacted_summary,
            ..
        } = self;
        match diffs.get_mut(index) {
            Some(diff) => mark_change_as_risky(diff, change_summary, impacted_summary),
            None => false,
        }
    }
}

/// What the previous version says about an operation.
#[derive(Debug, Default, Clone)]
pub struct RiskPolicy {
    /// The operation was deprecated in the previous version.
    pub previous_deprecated: bool,
    /// Declarations already deprecated in the previous version.
    pub deprecated_paths: Vec<JsonPath>,
}

/// Lowers every breaking diff that hits something already deprecated, or an operation marked
/// `no-bwc` on either side. Returns the number of reclassified diffs.
pub fn reclassify_risky_changes(changes: &mut OperationChanges, policy: &RiskPolicy) -> usize {
    let no_bwc =
        changes.api_kind == ApiKind::NoBwc || changes.previous_api_kind == Some(ApiKind::NoBwc);

    let candidates: Vec<usize> = changes
        .diffs
        .iter()
        .enumerate()
        .filter(|(_, diff)| diff.change_type == ChangeType::Breaking)
        .filter(|(_, diff)| {
            no_bwc
                || policy.previous_deprecated
                || policy
                    .deprecated_paths
                    .iter()
                    .any(|deprecated| diff.path.starts_with(deprecated))
        })
        .map(|(i, _)| i)
        .collect();

    candidates
        .into_iter()
        .filter(|i| changes.mark_risky(*i))
        .count()
}
