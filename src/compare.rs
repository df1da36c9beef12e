//! Pairing and diffing of the operations of two versions.

use std::collections::BTreeMap;
use std::sync::Arc;

use pathfinding::kuhn_munkres::kuhn_munkres_min;
use pathfinding::matrix::Matrix;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::diff_walker::DiffEngine;
use crate::hash::calculate_object_hash;
use crate::risky::{reclassify_risky_changes, RiskPolicy};
use crate::slug::normalized_rest_operation_id;
use crate::{
    ApiOperation, ApiType, ChangeSummary, ChangeType, Diff, DiffAction, Error,
    ImpactedOperationSummary, OperationChanges, OperationTypeSummary, VersionsComparison,
};

/// Metadata key holding the path with the group prefix stripped.
const GROUP_PATH: &str = "groupPath";

/// Minimum score for two unmatched operations to count as a rename.
const RENAME_THRESHOLD: i64 = 6;

/// The operations of one side of a comparison.
#[derive(Debug, Clone)]
pub struct VersionOperations {
    /// Package the operations belong to.
    pub package_id: String,
    /// Version the operations belong to.
    pub version: String,
    /// Path prefix the operations were selected by.
    pub group: Option<String>,
    /// The operations compared.
    pub operations: Vec<ApiOperation>,
}

impl VersionOperations {
    /// All operations of a version.
    pub fn new(
        package_id: impl Into<String>,
        version: impl Into<String>,
        operations: Vec<ApiOperation>,
    ) -> Self {
        Self {
            package_id: package_id.into(),
            version: version.into(),
            group: None,
            operations,
        }
    }

    /// Only the REST operations whose path starts with `prefix`, rewritten as if the prefix
    /// was not there, so that `/api/v2/pets` and `/api/v3/pets` pair up.
    pub fn grouped(
        package_id: impl Into<String>,
        version: impl Into<String>,
        operations: impl IntoIterator<Item = ApiOperation>,
        prefix: &str,
    ) -> Self {
        Self {
            package_id: package_id.into(),
            version: version.into(),
            group: Some(prefix.to_owned()),
            operations: operations
                .into_iter()
                .filter_map(|operation| regroup(operation, prefix))
                .collect(),
        }
    }

    fn key(&self, operation: &ApiOperation) -> String {
        match (&self.group, operation.meta_str(GROUP_PATH), operation.method()) {
            (Some(_), Some(path), Some(method)) => format!("{method} {path}"),
            _ => operation.operation_id.clone(),
        }
    }
}

fn regroup(mut operation: ApiOperation, prefix: &str) -> Option<ApiOperation> {
    if operation.api_type != ApiType::Rest {
        return None;
    }
    let stripped = format!("/{}", operation.path()?.strip_prefix(prefix)?);

    let mut data = (*operation.data).clone();
    let object = data.as_object_mut()?;
    let (old_key, item) = object
        .get("paths")?
        .as_object()?
        .iter()
        .next()
        .map(|(key, item)| (key.clone(), item.clone()))?;
    for key in ["servers", "host", "basePath"] {
        object.remove(key);
    }
    object.insert("paths".to_owned(), json!({ stripped.clone(): item }));

    for item in &mut operation.deprecated_items {
        for path in &mut item.declaration_json_paths {
            if path.len() > 1 && path[0] == "paths" && path[1] == old_key {
                path[1] = stripped.clone();
            }
        }
    }

    operation.data_hash = calculate_object_hash(&data);
    operation.data = Arc::new(data);
    operation.metadata.insert(GROUP_PATH.to_owned(), json!(stripped));
    Some(operation)
}

/// Compares `previous` with `current`.
///
/// Operations pair by id, or by stripped path for groups. The leftovers are matched as
/// renames when they look alike enough; whatever remains is reported as removed or added.
pub fn compare_operations(
    previous: &VersionOperations,
    current: &VersionOperations,
    engine: &dyn DiffEngine,
) -> Result<VersionsComparison, Error> {
    let previous_by_key: BTreeMap<String, &ApiOperation> = previous
        .operations
        .iter()
        .map(|op| (previous.key(op), op))
        .collect();
    let current_by_key: BTreeMap<String, &ApiOperation> = current
        .operations
        .iter()
        .map(|op| (current.key(op), op))
        .collect();

    let mut pairs = vec![];
    let mut added = vec![];
    for (key, operation) in &current_by_key {
        match previous_by_key.get(key) {
            Some(before) => pairs.push((*before, *operation, false)),
            None => added.push(*operation),
        }
    }
    let mut removed: Vec<&ApiOperation> = previous_by_key
        .iter()
        .filter(|(key, _)| !current_by_key.contains_key(*key))
        .map(|(_, op)| *op)
        .collect();

    let renames = match_renames(&removed, &added);
    for &(r, a) in &renames {
        debug!(
            from = %removed[r].operation_id,
            to = %added[a].operation_id,
            "operation renamed"
        );
        pairs.push((removed[r], added[a], true));
    }
    removed = removed
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !renames.iter().any(|(r, _)| r == i))
        .map(|(_, op)| op)
        .collect();
    added = added
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !renames.iter().any(|(_, a)| a == i))
        .map(|(_, op)| op)
        .collect();

    let mut data = vec![];
    for (before, after, renamed) in pairs {
        let mut diffs = vec![];
        if renamed {
            let change_type = if normalized_id(before) == normalized_id(after) {
                ChangeType::Annotation
            } else {
                ChangeType::Breaking
            };
            diffs.push(
                Diff::new(DiffAction::Rename, vec![], change_type)
                    .before(json!(before.operation_id))
                    .after(json!(after.operation_id))
                    .describe("operation renamed"),
            );
        }
        if before.data_hash != after.data_hash {
            let aligned = if renamed {
                align_location(&before.data, &after.data)
            } else {
                None
            };
            let after_data = aligned.as_ref().unwrap_or(&*after.data);
            diffs.extend(engine.diff(&before.data, after_data)?);
        }
        if diffs.is_empty() {
            continue;
        }

        let mut changes = operation_changes(after, Some(before), Some(after), diffs);
        let policy = RiskPolicy {
            previous_deprecated: before.deprecated,
            deprecated_paths: before
                .deprecated_items
                .iter()
                .flat_map(|item| item.declaration_json_paths.iter().cloned())
                .collect(),
        };
        let risky = reclassify_risky_changes(&mut changes, &policy);
        debug!(
            operation_id = %after.operation_id,
            diffs = changes.diffs.len(),
            risky,
            "operation changed"
        );
        data.push(changes);
    }

    for before in removed {
        let diff = Diff::new(DiffAction::Remove, vec![], ChangeType::Breaking)
            .before(json!(before.operation_id))
            .describe("operation removed");
        let mut changes = operation_changes(before, Some(before), None, vec![diff]);
        let policy = RiskPolicy {
            previous_deprecated: before.deprecated,
            ..Default::default()
        };
        reclassify_risky_changes(&mut changes, &policy);
        data.push(changes);
    }

    for after in added {
        let diff = Diff::new(DiffAction::Add, vec![], ChangeType::NonBreaking)
            .after(json!(after.operation_id))
            .describe("operation added");
        data.push(operation_changes(after, None, Some(after), vec![diff]));
    }

    let comparison = VersionsComparison {
        package_id: current.package_id.clone(),
        version: current.version.clone(),
        previous_version_package_id: previous.package_id.clone(),
        previous_version: previous.version.clone(),
        current_group: current.group.clone(),
        previous_group: previous.group.clone(),
        operation_types: operation_types(&data),
        data,
        from_cache: false,
    };
    let total = comparison.total_summary();
    info!(
        version = %comparison.version,
        previous_version = %comparison.previous_version,
        operations = comparison.data.len(),
        breaking = total.breaking,
        risky = total.risky,
        "versions compared"
    );
    Ok(comparison)
}

/// `after` with its path (or channel) renamed to the one of `before`, so that a rename does
/// not also show up as a removal plus an addition.
fn align_location(before: &Value, after: &Value) -> Option<Value> {
    for section in ["paths", "channels"] {
        let (Some(old), Some(new)) = (
            before.get(section).and_then(Value::as_object),
            after.get(section).and_then(Value::as_object),
        ) else {
            continue;
        };
        let (Some(old_key), Some((new_key, item))) = (old.keys().next(), new.iter().next()) else {
            continue;
        };
        if old_key == new_key {
            return None;
        }
        let mut aligned = after.clone();
        aligned[section] = json!({ old_key.clone(): item.clone() });
        return Some(aligned);
    }
    None
}

/// `main` is the current operation, or the previous one when it was removed.
fn operation_changes(
    main: &ApiOperation,
    before: Option<&ApiOperation>,
    after: Option<&ApiOperation>,
    diffs: Vec<Diff>,
) -> OperationChanges {
    let mut metadata = BTreeMap::new();
    for key in ["path", "method", "channel", "action"] {
        if let Some(value) = main.metadata.get(key) {
            metadata.insert(key.to_owned(), value.clone());
        }
    }
    metadata.insert("title".to_owned(), Value::String(main.title.clone()));

    let mut changes = OperationChanges {
        operation_id: after.map(|op| op.operation_id.clone()),
        previous_operation_id: before.map(|op| op.operation_id.clone()),
        api_type: main.api_type,
        api_kind: main.api_kind,
        previous_api_kind: before.map(|op| op.api_kind),
        api_audience: main.api_audience,
        previous_api_audience: before.map(|op| op.api_audience),
        change_summary: ChangeSummary::default(),
        impacted_summary: ImpactedOperationSummary::default(),
        diffs,
        metadata,
    };
    changes.recount();
    changes
}

fn operation_types(data: &[OperationChanges]) -> Vec<OperationTypeSummary> {
    let mut by_type: BTreeMap<ApiType, OperationTypeSummary> = BTreeMap::new();
    for changes in data {
        let summary = by_type
            .entry(changes.api_type)
            .or_insert_with(|| OperationTypeSummary {
                api_type: changes.api_type,
                change_summary: ChangeSummary::default(),
                number_of_impacted_operations: ChangeSummary::default(),
            });
        summary.change_summary.merge(&changes.change_summary);
        for change_type in ChangeType::ALL {
            if changes.impacted_summary.get(change_type) {
                *summary
                    .number_of_impacted_operations
                    .get_mut(change_type) += 1;
            }
        }
    }
    by_type.into_values().collect()
}

/// Path shape and method for REST, the plain id otherwise.
fn normalized_id(operation: &ApiOperation) -> String {
    let path = operation.meta_str(GROUP_PATH).or(operation.path());
    match (path, operation.method()) {
        (Some(path), Some(method)) => normalized_rest_operation_id("", path, method),
        _ => operation.operation_id.clone(),
    }
}

fn rename_score(before: &ApiOperation, after: &ApiOperation) -> i64 {
    if before.api_type != after.api_type {
        return 0;
    }
    let mut score = 0;
    if normalized_id(before) == normalized_id(after) {
        score += 4;
    }
    if before.method().is_some() && before.method() == after.method() {
        score += 2;
    }
    if before.tags.iter().any(|tag| after.tags.contains(tag)) {
        score += 1;
    }
    if before.data_hash == after.data_hash {
        score += 8;
    }
    score
}

/// Best one-to-one assignment of removed to added operations, keeping pairs that score at
/// least [`RENAME_THRESHOLD`].
fn match_renames(removed: &[&ApiOperation], added: &[&ApiOperation]) -> Vec<(usize, usize)> {
    if removed.is_empty() || added.is_empty() {
        return vec![];
    }

    // The solver needs at least as many columns as rows; pad to a square.
    let n = removed.len().max(added.len());
    let mut weights = Matrix::new(n, n, 0i64);
    for (r, before) in removed.iter().enumerate() {
        for (a, after) in added.iter().enumerate() {
            weights[(r, a)] = -rename_score(before, after);
        }
    }

    let (_, assignment) = kuhn_munkres_min(&weights);
    assignment
        .into_iter()
        .enumerate()
        .filter(|&(r, a)| r < removed.len() && a < added.len())
        .filter(|&(r, a)| -weights[(r, a)] >= RENAME_THRESHOLD)
        .collect()
}

/// Copies the deprecation history of unchanged deprecated declarations into `current`.
///
/// A current item inherits from the previous item of the same operation with the same hash
/// (or, failing that, the same tolerant hash), and `previous_version` is appended.
pub fn carry_deprecation_history<'a>(
    previous: &[ApiOperation],
    current: impl IntoIterator<Item = &'a mut ApiOperation>,
    previous_version: &str,
) {
    let previous: BTreeMap<&str, &ApiOperation> = previous
        .iter()
        .map(|op| (op.operation_id.as_str(), op))
        .collect();

    for operation in current {
        let Some(before) = previous.get(operation.operation_id.as_str()) else {
            continue;
        };
        for item in &mut operation.deprecated_items {
            let matching = before
                .deprecated_items
                .iter()
                .find(|old| old.hash.is_some() && old.hash == item.hash)
                .or_else(|| {
                    before.deprecated_items.iter().find(|old| {
                        old.tolerant_hash.is_some() && old.tolerant_hash == item.tolerant_hash
                    })
                });
            let Some(old) = matching else {
                continue;
            };
            let mut history = old.deprecated_in_previous_versions.clone();
            if !history.iter().any(|v| v == previous_version) {
                history.push(previous_version.to_owned());
            }
            item.deprecated_in_previous_versions = history;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff_walker::StructuralDiffEngine;
    use crate::document::deprecated_items;
    use crate::search_scope::SearchScopes;
    use crate::{ApiAudience, ApiKind};

    fn operation(path: &str, method: &str, body: Value) -> ApiOperation {
        let deprecated = body["deprecated"] == json!(true);
        let data = json!({ "openapi": "3.0.3", "paths": { path: { method: body } } });
        let mut metadata = BTreeMap::new();
        metadata.insert("path".to_owned(), json!(path));
        metadata.insert("method".to_owned(), json!(method));
        let mut used = Default::default();
        ApiOperation {
            operation_id: crate::slug::rest_operation_id("", path, method, &mut used),
            document_id: "doc".into(),
            api_type: ApiType::Rest,
            api_kind: ApiKind::Bwc,
            api_audience: ApiAudience::External,
            title: format!("{method} {path}"),
            deprecated,
            tags: vec!["pets".into()],
            search_scopes: SearchScopes::default(),
            deprecated_items: deprecated_items(&data),
            data_hash: calculate_object_hash(&data),
            metadata,
            data: Arc::new(data),
        }
    }

    fn compare(previous: Vec<ApiOperation>, current: Vec<ApiOperation>) -> VersionsComparison {
        compare_operations(
            &VersionOperations::new("pets", "1", previous),
            &VersionOperations::new("pets", "2", current),
            &StructuralDiffEngine,
        )
        .unwrap()
    }

    #[test]
    fn unchanged_operations_are_skipped() {
        let pets = operation("/pets", "get", json!({ "summary": "List" }));
        let comparison = compare(vec![pets.clone()], vec![pets]);
        assert!(comparison.data.is_empty());
        assert!(comparison.operation_types.is_empty());
    }

    #[test]
    fn added_removed_changed() {
        let comparison = compare(
            vec![
                operation("/pets", "get", json!({ "summary": "List" })),
                operation("/owners", "get", json!({})),
            ],
            vec![
                operation("/pets", "get", json!({ "summary": "List all" })),
                operation("/stores", "post", json!({})),
            ],
        );

        let changed = comparison.changes_of("pets-get").unwrap();
        assert_eq!(changed.change_summary.annotation, 1);

        let removed = comparison.changes_of("owners-get").unwrap();
        assert_eq!(removed.operation_id, None);
        assert_eq!(removed.diffs[0].action, DiffAction::Remove);
        assert_eq!(removed.change_summary.breaking, 1);

        let added = comparison.changes_of("stores-post").unwrap();
        assert_eq!(added.previous_operation_id, None);
        assert_eq!(added.change_summary.non_breaking, 1);

        let total = comparison.total_summary();
        assert_eq!((total.breaking, total.non_breaking, total.annotation), (1, 1, 1));
        assert_eq!(comparison.operation_types[0].number_of_impacted_operations.breaking, 1);
    }

    #[test]
    fn renamed_path_parameter() {
        let comparison = compare(
            vec![operation("/pets/{id}", "get", json!({}))],
            vec![operation("/pets/{petId}", "get", json!({}))],
        );
        assert_eq!(comparison.data.len(), 1);
        let changes = &comparison.data[0];
        assert_eq!(changes.previous_operation_id.as_deref(), Some("pets-{id}-get"));
        assert_eq!(changes.operation_id.as_deref(), Some("pets-{petId}-get"));
        assert_eq!(changes.diffs[0].action, DiffAction::Rename);
        assert_eq!(changes.diffs[0].change_type, ChangeType::Annotation);
    }

    #[test]
    fn unrelated_operations_are_not_renames() {
        let comparison = compare(
            vec![operation("/pets", "get", json!({}))],
            vec![operation("/owners", "delete", json!({}))],
        );
        assert_eq!(comparison.data.len(), 2);
    }

    #[test]
    fn deprecated_operations_change_riskily() {
        let comparison = compare(
            vec![
                operation("/pets", "get", json!({ "deprecated": true, "parameters": [{}] })),
                operation("/owners", "get", json!({ "deprecated": true })),
            ],
            vec![operation("/pets", "get", json!({ "deprecated": true }))],
        );
        let pets = comparison.changes_of("pets-get").unwrap();
        assert_eq!(pets.change_summary.breaking, 0);
        assert_eq!(pets.change_summary.risky, 1);

        let owners = comparison.changes_of("owners-get").unwrap();
        assert_eq!(owners.diffs[0].change_type, ChangeType::Risky);
        assert_eq!(comparison.total_summary().total(), 2);
    }

    #[test]
    fn groups_pair_by_stripped_path() {
        let v2 = operation("/api/v2/pets", "get", json!({ "summary": "List" }));
        let v3 = operation("/api/v3/pets", "get", json!({ "summary": "List" }));
        let other = operation("/internal/pets", "get", json!({}));
        let all = vec![v2, v3, other];

        let comparison = compare_operations(
            &VersionOperations::grouped("pets", "1", all.clone(), "/api/v2/"),
            &VersionOperations::grouped("pets", "1", all, "/api/v3/"),
            &StructuralDiffEngine,
        )
        .unwrap();
        assert!(comparison.data.is_empty(), "{:?}", comparison.data);
        assert_eq!(comparison.current_group.as_deref(), Some("/api/v3/"));
    }

    #[test]
    fn deprecation_history() {
        let body = json!({ "deprecated": true, "description": "old" });
        let previous = {
            let mut op = operation("/pets", "get", body.clone());
            op.deprecated_items[0].deprecated_in_previous_versions = vec!["0".into()];
            op
        };
        let mut current = vec![operation(
            "/pets",
            "get",
            json!({ "deprecated": true, "description": "reworded" }),
        )];

        carry_deprecation_history(&[previous], &mut current, "1");
        assert_eq!(
            current[0].deprecated_items[0].deprecated_in_previous_versions,
            ["0", "1"]
        );
    }
}
