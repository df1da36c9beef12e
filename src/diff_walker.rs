//! The default diff engine and the seam for replacing it.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::{ChangeType, Diff, DiffAction, Error, JsonPath};

/// Computes the diffs between two operation documents.
///
/// `before` is the operation in the previous version, `after` the operation in the current one.
pub trait DiffEngine {
    /// Every difference from `before` to `after`, classified.
    fn diff(&self, before: &Value, after: &Value) -> Result<Vec<Diff>, Error>;
}

/// Structural diff of two JSON trees with a small built-in classification.
///
/// Object members are matched by name. Arrays are matched by index, except `required`, `enum`
/// and `tags`, which are compared as sets.
#[derive(Default, Clone, Copy, Debug)]
pub struct StructuralDiffEngine;

impl DiffEngine for StructuralDiffEngine {
    fn diff(&self, before: &Value, after: &Value) -> Result<Vec<Diff>, Error> {
        let mut walker = DiffWalker { diffs: vec![] };
        walker.diff(&mut vec![], before, after);
        Ok(walker.diffs)
    }
}

const ANNOTATION_KEYS: &[&str] = &[
    "description",
    "summary",
    "title",
    "example",
    "examples",
    "externalDocs",
];

const SET_KEYS: &[&str] = &["required", "enum", "tags"];

/// Parents whose children are user-chosen names rather than keywords.
const NAME_CONTAINERS: &[&str] = &[
    "properties",
    "patternProperties",
    "paths",
    "channels",
    "schemas",
    "definitions",
    "responses",
    "headers",
    "content",
];

#[derive(Clone, Copy, PartialEq)]
enum Range {
    Minimum,
    Maximum,
}

struct DiffWalker {
    diffs: Vec<Diff>,
}

impl DiffWalker {
    fn push(
        &mut self,
        action: DiffAction,
        path: &[String],
        before: Option<&Value>,
        after: Option<&Value>,
    ) {
        let change_type = classify(action, path, before, after);
        let mut diff = Diff::new(action, path.to_vec(), change_type);
        diff.before_value = before.cloned();
        diff.after_value = after.cloned();
        self.diffs.push(diff);
    }

    fn diff_objects(
        &mut self,
        path: &mut JsonPath,
        lhs: &Map<String, Value>,
        rhs: &Map<String, Value>,
    ) {
        let lhs_keys: BTreeSet<&String> = lhs.keys().collect();
        let rhs_keys: BTreeSet<&String> = rhs.keys().collect();

        for removed in lhs_keys.difference(&rhs_keys) {
            path.push((*removed).clone());
            self.push(DiffAction::Remove, path, lhs.get(*removed), None);
            path.pop();
        }

        for added in rhs_keys.difference(&lhs_keys) {
            path.push((*added).clone());
            self.push(DiffAction::Add, path, None, rhs.get(*added));
            path.pop();
        }

        for common in lhs_keys.intersection(&rhs_keys) {
            path.push((*common).clone());
            self.diff(path, &lhs[common.as_str()], &rhs[common.as_str()]);
            path.pop();
        }
    }

    fn diff_sets(&mut self, path: &mut JsonPath, lhs: &[Value], rhs: &[Value]) {
        for (i, item) in lhs.iter().enumerate() {
            if !rhs.contains(item) {
                path.push(i.to_string());
                self.push(DiffAction::Remove, path, Some(item), None);
                path.pop();
            }
        }
        for (i, item) in rhs.iter().enumerate() {
            if !lhs.contains(item) {
                path.push(i.to_string());
                self.push(DiffAction::Add, path, None, Some(item));
                path.pop();
            }
        }
    }

    fn diff_arrays(&mut self, path: &mut JsonPath, lhs: &[Value], rhs: &[Value]) {
        for (i, (lhs_inner, rhs_inner)) in lhs.iter().zip(rhs.iter()).enumerate() {
            path.push(i.to_string());
            self.diff(path, lhs_inner, rhs_inner);
            path.pop();
        }
        for (i, removed) in lhs.iter().enumerate().skip(rhs.len()) {
            path.push(i.to_string());
            self.push(DiffAction::Remove, path, Some(removed), None);
            path.pop();
        }
        for (i, added) in rhs.iter().enumerate().skip(lhs.len()) {
            path.push(i.to_string());
            self.push(DiffAction::Add, path, None, Some(added));
            path.pop();
        }
    }

    fn diff(&mut self, path: &mut JsonPath, lhs: &Value, rhs: &Value) {
        if lhs == rhs {
            return;
        }
        match (lhs, rhs) {
            (Value::Object(lhs), Value::Object(rhs)) => self.diff_objects(path, lhs, rhs),
            (Value::Array(lhs), Value::Array(rhs)) if is_set_like(path) => {
                self.diff_sets(path, lhs, rhs)
            }
            (Value::Array(lhs), Value::Array(rhs)) => self.diff_arrays(path, lhs, rhs),
            _ => self.push(DiffAction::Replace, path, Some(lhs), Some(rhs)),
        }
    }
}

fn is_set_like(path: &[String]) -> bool {
    keyword(path).is_some_and(|k| SET_KEYS.contains(&k))
}

/// The last segment of `path` when it is a keyword rather than a user-chosen name.
fn keyword(path: &[String]) -> Option<&str> {
    match path {
        [.., parent, _] if NAME_CONTAINERS.contains(&parent.as_str()) => None,
        [.., last] => Some(last.as_str()),
        [] => None,
    }
}

/// Keyword owning an element of a set-like array, e.g. `required` for `.../required/2`.
fn set_keyword(path: &[String]) -> Option<&str> {
    match path {
        [.., key, index] if index.parse::<usize>().is_ok() => {
            let parent = &path[..path.len() - 1];
            keyword(parent).filter(|_| SET_KEYS.contains(&key.as_str()))
        }
        _ => None,
    }
}

fn is_annotation(path: &[String]) -> bool {
    (1..=path.len()).any(|end| {
        keyword(&path[..end])
            .is_some_and(|k| ANNOTATION_KEYS.contains(&k) || k.starts_with("x-"))
    })
}

fn range(keyword: &str) -> Option<Range> {
    match keyword {
        "minimum" | "exclusiveMinimum" | "minLength" | "minItems" | "minProperties" => {
            Some(Range::Minimum)
        }
        "maximum" | "exclusiveMaximum" | "maxLength" | "maxItems" | "maxProperties" => {
            Some(Range::Maximum)
        }
        _ => None,
    }
}

/// Rule of thumb: a change is breaking if something a client relied on is gone or tightened.
fn classify(
    action: DiffAction,
    path: &[String],
    before: Option<&Value>,
    after: Option<&Value>,
) -> ChangeType {
    if is_annotation(path) {
        return ChangeType::Annotation;
    }

    if let Some(set) = set_keyword(path) {
        return match (set, action) {
            ("required", DiffAction::Add) => ChangeType::Breaking,
            ("required", _) => ChangeType::NonBreaking,
            ("enum", DiffAction::Remove) => ChangeType::Breaking,
            ("enum", _) => ChangeType::NonBreaking,
            _ => ChangeType::Annotation,
        };
    }

    let keyword = keyword(path);
    if keyword == Some("deprecated") {
        let now_deprecated = after.and_then(Value::as_bool).unwrap_or(false);
        return if now_deprecated {
            ChangeType::Deprecated
        } else {
            ChangeType::NonBreaking
        };
    }

    match action {
        DiffAction::Add => match keyword.and_then(range) {
            Some(_) => ChangeType::Breaking,
            None if keyword == Some("required") => ChangeType::Breaking,
            None => ChangeType::NonBreaking,
        },
        DiffAction::Remove => match keyword.and_then(range) {
            Some(_) => ChangeType::NonBreaking,
            None => ChangeType::Breaking,
        },
        DiffAction::Replace => {
            let lhs_value = before.and_then(Value::as_f64);
            let rhs_value = after.and_then(Value::as_f64);
            match (keyword.and_then(range), lhs_value, rhs_value) {
                (Some(Range::Minimum), Some(l), Some(r)) if l < r => ChangeType::Breaking,
                (Some(Range::Maximum), Some(l), Some(r)) if l > r => ChangeType::Breaking,
                (Some(_), Some(_), Some(_)) => ChangeType::NonBreaking,
                _ => match keyword {
                    Some("type" | "format" | "in" | "$ref" | "pattern" | "nullable") => {
                        ChangeType::Breaking
                    }
                    _ => ChangeType::Unclassified,
                },
            }
        }
        DiffAction::Rename => ChangeType::Unclassified,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn diff(before: Value, after: Value) -> Vec<(String, DiffAction, ChangeType)> {
        StructuralDiffEngine
            .diff(&before, &after)
            .unwrap()
            .into_iter()
            .map(|d| (d.path.join("/"), d.action, d.change_type))
            .collect()
    }

    #[test]
    fn identical_documents() {
        let doc = json!({ "paths": { "/pets": { "get": {} } } });
        assert!(diff(doc.clone(), doc).is_empty());
    }

    #[test]
    fn property_add_remove() {
        let changes = diff(
            json!({ "properties": { "id": {}, "name": {} } }),
            json!({ "properties": { "id": {}, "age": {} } }),
        );
        assert_eq!(
            changes,
            [
                ("properties/name".into(), DiffAction::Remove, ChangeType::Breaking),
                ("properties/age".into(), DiffAction::Add, ChangeType::NonBreaking),
            ]
        );
    }

    #[test]
    fn required_is_a_set() {
        let changes = diff(
            json!({ "required": ["id", "name"] }),
            json!({ "required": ["name", "age"] }),
        );
        assert_eq!(
            changes,
            [
                ("required/0".into(), DiffAction::Remove, ChangeType::NonBreaking),
                ("required/1".into(), DiffAction::Add, ChangeType::Breaking),
            ]
        );
    }

    #[test]
    fn enum_values() {
        let changes = diff(json!({ "enum": ["a", "b"] }), json!({ "enum": ["b", "c"] }));
        assert_eq!(
            changes,
            [
                ("enum/0".into(), DiffAction::Remove, ChangeType::Breaking),
                ("enum/1".into(), DiffAction::Add, ChangeType::NonBreaking),
            ]
        );
    }

    #[test]
    fn annotations_and_deprecation() {
        let changes = diff(
            json!({ "summary": "old", "x-internal": 1, "deprecated": false }),
            json!({ "summary": "new", "x-internal": 2, "deprecated": true }),
        );
        assert_eq!(
            changes,
            [
                ("deprecated".into(), DiffAction::Replace, ChangeType::Deprecated),
                ("summary".into(), DiffAction::Replace, ChangeType::Annotation),
                ("x-internal".into(), DiffAction::Replace, ChangeType::Annotation),
            ]
        );
    }

    #[test]
    fn property_named_like_a_keyword() {
        let changes = diff(
            json!({ "properties": { "description": { "type": "string" } } }),
            json!({ "properties": {} }),
        );
        assert_eq!(
            changes,
            [(
                "properties/description".into(),
                DiffAction::Remove,
                ChangeType::Breaking
            )]
        );
    }

    #[test]
    fn ranges() {
        let changes = diff(
            json!({ "minimum": 1, "maximum": 10, "maxLength": 5 }),
            json!({ "minimum": 2, "maximum": 20, "minLength": 1 }),
        );
        assert_eq!(
            changes,
            [
                ("maxLength".into(), DiffAction::Remove, ChangeType::NonBreaking),
                ("minLength".into(), DiffAction::Add, ChangeType::Breaking),
                ("maximum".into(), DiffAction::Replace, ChangeType::NonBreaking),
                ("minimum".into(), DiffAction::Replace, ChangeType::Breaking),
            ]
        );
    }

    #[test]
    fn type_change_and_array_items() {
        let changes = diff(
            json!({ "parameters": [{ "name": "a", "schema": { "type": "string" } }] }),
            json!({ "parameters": [
                { "name": "a", "schema": { "type": "integer" } },
                { "name": "b" }
            ] }),
        );
        assert_eq!(
            changes,
            [
                ("parameters/0/schema/type".into(), DiffAction::Replace, ChangeType::Breaking),
                ("parameters/1".into(), DiffAction::Add, ChangeType::NonBreaking),
            ]
        );
    }
}
