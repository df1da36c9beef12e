use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ApiAudience, ApiKind, ApiType, JsonPath};

/// Severity class of a [`Diff`].
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeType {
    /// Can make a previously valid request/response pairing fail.
    Breaking,
    /// Safe for existing clients.
    NonBreaking,
    /// Breaking, but on an element already deprecated or marked `no-bwc`.
    Risky,
    /// Documentation only.
    Annotation,
    /// Something became deprecated.
    Deprecated,
    /// The engine could not decide.
    Unclassified,
}

impl ChangeType {
    /// All classes, most severe first.
    pub const ALL: [ChangeType; 6] = [
        ChangeType::Breaking,
        ChangeType::Risky,
        ChangeType::Deprecated,
        ChangeType::NonBreaking,
        ChangeType::Annotation,
        ChangeType::Unclassified,
    ];
}

/// What happened at a [`Diff`] path.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum DiffAction {
    Add,
    Remove,
    Replace,
    Rename,
}

/// One detected difference between two operation documents.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Diff {
    /// What happened at `path`.
    pub action: DiffAction,
    /// Location in the operation data. Empty for the operation itself.
    pub path: JsonPath,
    /// Value in the previous version, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_value: Option<Value>,
    /// Value in the current version, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_value: Option<Value>,
    /// Severity class.
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    /// Human-readable summary of the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Diff {
    /// A diff without values or description.
    pub fn new(action: DiffAction, path: JsonPath, change_type: ChangeType) -> Self {
        Self {
            action,
            path,
            before_value: None,
            after_value: None,
            change_type,
            description: None,
        }
    }

    /// Sets the previous value.
    pub fn before(mut self, value: Value) -> Self {
        self.before_value = Some(value);
        self
    }

    /// Sets the current value.
    pub fn after(mut self, value: Value) -> Self {
        self.after_value = Some(value);
        self
    }

    /// Sets the description.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Number of diffs per [`ChangeType`].
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ChangeSummary {
    /// Breaking diffs.
    pub breaking: u32,
    /// Non-breaking diffs.
    pub non_breaking: u32,
    /// Risky diffs, `semi-breaking` on the wire.
    #[serde(rename = "semi-breaking")]
    pub risky: u32,
    /// Annotation diffs.
    pub annotation: u32,
    /// Deprecation diffs.
    pub deprecated: u32,
    /// Unclassified diffs.
    pub unclassified: u32,
}

impl ChangeSummary {
    /// Counts `diffs` by class.
    pub fn from_diffs<'a>(diffs: impl IntoIterator<Item = &'a Diff>) -> Self {
        let mut summary = Self::default();
        for diff in diffs {
            summary.add(diff.change_type);
        }
        summary
    }

    /// The counter of `change_type`.
    pub fn get(&self, change_type: ChangeType) -> u32 {
        match change_type {
            ChangeType::Breaking => self.breaking,
            ChangeType::NonBreaking => self.non_breaking,
            ChangeType::Risky => self.risky,
            ChangeType::Annotation => self.annotation,
            ChangeType::Deprecated => self.deprecated,
            ChangeType::Unclassified => self.unclassified,
        }
    }

    /// The counter of `change_type`, mutably.
    pub fn get_mut(&mut self, change_type: ChangeType) -> &mut u32 {
        match change_type {
            ChangeType::Breaking => &mut self.breaking,
            ChangeType::NonBreaking => &mut self.non_breaking,
            ChangeType::Risky => &mut self.risky,
            ChangeType::Annotation => &mut self.annotation,
            ChangeType::Deprecated => &mut self.deprecated,
            ChangeType::Unclassified => &mut self.unclassified,
        }
    }

    /// Adds one diff of `change_type`.
    pub fn add(&mut self, change_type: ChangeType) {
        *self.get_mut(change_type) += 1;
    }

    /// Adds every counter of `other`.
    pub fn merge(&mut self, other: &ChangeSummary) {
        for change_type in ChangeType::ALL {
            *self.get_mut(change_type) += other.get(change_type);
        }
    }

    /// Number of diffs counted.
    pub fn total(&self) -> u32 {
        ChangeType::ALL.iter().map(|t| self.get(*t)).sum()
    }
}

/// Whether an operation has at least one diff of each class.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ImpactedOperationSummary {
    /// At least one breaking diff.
    pub breaking: bool,
    /// At least one non-breaking diff.
    pub non_breaking: bool,
    /// At least one risky diff, `semi-breaking` on the wire.
    #[serde(rename = "semi-breaking")]
    pub risky: bool,
    /// At least one annotation diff.
    pub annotation: bool,
    /// At least one deprecation diff.
    pub deprecated: bool,
    /// At least one unclassified diff.
    pub unclassified: bool,
}

impl ImpactedOperationSummary {
    /// Sets each flag whose counter in `summary` is non-zero.
    pub fn from_summary(summary: &ChangeSummary) -> Self {
        Self {
            breaking: summary.breaking > 0,
            non_breaking: summary.non_breaking > 0,
            risky: summary.risky > 0,
            annotation: summary.annotation > 0,
            deprecated: summary.deprecated > 0,
            unclassified: summary.unclassified > 0,
        }
    }

    /// The flag of `change_type`.
    pub fn get(&self, change_type: ChangeType) -> bool {
        match change_type {
            ChangeType::Breaking => self.breaking,
            ChangeType::NonBreaking => self.non_breaking,
            ChangeType::Risky => self.risky,
            ChangeType::Annotation => self.annotation,
            ChangeType::Deprecated => self.deprecated,
            ChangeType::Unclassified => self.unclassified,
        }
    }
}

/// Changes of one operation between two versions.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperationChanges {
    /// `None` when the operation was removed.
    pub operation_id: Option<String>,
    /// `None` when the operation was added.
    pub previous_operation_id: Option<String>,
    /// API flavour of the operation.
    pub api_type: ApiType,
    /// Kind in the current version, else in the previous one.
    pub api_kind: ApiKind,
    /// Kind in the previous version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_api_kind: Option<ApiKind>,
    /// Audience in the current version, else in the previous one.
    pub api_audience: ApiAudience,
    /// Audience in the previous version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_api_audience: Option<ApiAudience>,
    /// Diffs counted by class.
    pub change_summary: ChangeSummary,
    /// Classes present among the diffs.
    pub impacted_summary: ImpactedOperationSummary,
    /// Every diff of the operation.
    pub diffs: Vec<Diff>,
    /// `title`, plus `path` and `method` or `channel` and `action`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl OperationChanges {
    /// Recomputes both summaries from `diffs`.
    pub fn recount(&mut self) {
        self.change_summary = ChangeSummary::from_diffs(&self.diffs);
        self.impacted_summary = ImpactedOperationSummary::from_summary(&self.change_summary);
    }

    /// The id identifying the operation in the changelog: current, else previous.
    pub fn id(&self) -> Option<&str> {
        self.operation_id
            .as_deref()
            .or(self.previous_operation_id.as_deref())
    }
}

/// Aggregated changes of one [`ApiType`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperationTypeSummary {
    /// The API flavour summarized.
    pub api_type: ApiType,
    /// Diffs of all operations of this flavour, by class.
    pub change_summary: ChangeSummary,
    /// Number of operations having at least one diff of each class.
    pub number_of_impacted_operations: ChangeSummary,
}

/// Result of comparing two versions, or two groups of one version.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VersionsComparison {
    /// Package of the current version.
    pub package_id: String,
    /// The current version.
    pub version: String,
    /// Package of the previous version.
    pub previous_version_package_id: String,
    /// The previous version.
    pub previous_version: String,
    /// Path prefix compared as current, for group comparisons.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_group: Option<String>,
    /// Path prefix compared as previous, for group comparisons.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_group: Option<String>,
    /// Totals per API type.
    pub operation_types: Vec<OperationTypeSummary>,
    /// One entry per changed, added or removed operation.
    pub data: Vec<OperationChanges>,
    /// Set by callers that served the comparison from a cache.
    #[serde(default)]
    pub from_cache: bool,
}

impl VersionsComparison {
    /// Changes of the operation known as `operation_id` in either version.
    pub fn changes_of(&self, operation_id: &str) -> Option<&OperationChanges> {
        self.data.iter().find(|c| {
            c.operation_id.as_deref() == Some(operation_id)
                || c.previous_operation_id.as_deref() == Some(operation_id)
        })
    }

    /// Summary over every API type.
    pub fn total_summary(&self) -> ChangeSummary {
        let mut total = ChangeSummary::default();
        for summary in &self.operation_types {
            total.merge(&summary.change_summary);
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_wire_names() {
        let summary = ChangeSummary {
            risky: 2,
            non_breaking: 1,
            ..Default::default()
        };
        let value = serde_json::to_value(summary).unwrap();
        assert_eq!(value["semi-breaking"], 2);
        assert_eq!(value["non-breaking"], 1);
        assert_eq!(summary.total(), 3);
    }

    #[test]
    fn recount_matches_diffs() {
        let mut changes = OperationChanges {
            operation_id: Some("pets-get".into()),
            previous_operation_id: Some("pets-get".into()),
            api_type: ApiType::Rest,
            api_kind: ApiKind::Bwc,
            previous_api_kind: None,
            api_audience: ApiAudience::Unknown,
            previous_api_audience: None,
            change_summary: ChangeSummary::default(),
            impacted_summary: ImpactedOperationSummary::default(),
            diffs: vec![
                Diff::new(DiffAction::Remove, vec!["a".into()], ChangeType::Breaking),
                Diff::new(DiffAction::Add, vec!["b".into()], ChangeType::NonBreaking),
                Diff::new(DiffAction::Add, vec!["c".into()], ChangeType::NonBreaking),
            ],
            metadata: BTreeMap::new(),
        };
        changes.recount();
        assert_eq!(changes.change_summary.breaking, 1);
        assert_eq!(changes.change_summary.non_breaking, 2);
        assert!(changes.impacted_summary.breaking);
        assert!(!changes.impacted_summary.risky);
        assert_eq!(changes.change_summary.total() as usize, changes.diffs.len());
    }
}
