//! Internal `$ref` targets of a document.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::JsonPath;

/// Lookup of the internal `$ref` targets of one document.
pub struct RefIndex {
    ref_lookup: BTreeMap<String, JsonPath>,
}

/// What an operation references, transitively.
#[derive(Debug, Default, PartialEq)]
pub struct CollectedRefs {
    /// Resolved internal references and their location in the document.
    pub components: BTreeMap<String, JsonPath>,
    /// Internal references pointing nowhere.
    pub broken: BTreeSet<String>,
    /// Files named by external references.
    pub external_files: BTreeSet<String>,
}

impl RefIndex {
    /// Indexes `#/components/<kind>/<name>` (OpenAPI 3, AsyncAPI) and `#/definitions/<name>`,
    /// `#/parameters/<name>`, `#/responses/<name>` (Swagger 2).
    pub fn for_document(document: &Value) -> Self {
        let mut ref_lookup = BTreeMap::new();

        if let Some(kinds) = document.get("components").and_then(Value::as_object) {
            for (kind, entries) in kinds {
                for name in entries.as_object().into_iter().flat_map(|e| e.keys()) {
                    ref_lookup.insert(
                        format!("#/components/{}/{}", escape(kind), escape(name)),
                        vec!["components".to_owned(), kind.clone(), name.clone()],
                    );
                }
            }
        }

        for section in ["definitions", "parameters", "responses"] {
            let names = document
                .get(section)
                .and_then(Value::as_object)
                .into_iter()
                .flat_map(|e| e.keys());
            for name in names {
                ref_lookup.insert(
                    format!("#/{section}/{}", escape(name)),
                    vec![section.to_owned(), name.clone()],
                );
            }
        }

        Self { ref_lookup }
    }

    /// Resolves a reference.
    ///
    /// `document` must be the same document that was used to construct the index.
    /// This is not checked.
    pub fn resolve<'a>(&self, document: &'a Value, reference: &str) -> Option<&'a Value> {
        let path = self.ref_lookup.get(reference)?;
        path.iter()
            .try_fold(document, |node, segment| node.get(segment.as_str()))
    }

    /// Follows every `$ref` reachable from `value`. Each component is visited once, so
    /// recursive schemas terminate.
    pub fn collect(&self, document: &Value, value: &Value) -> CollectedRefs {
        let mut collected = CollectedRefs::default();
        let mut pending = vec![value];

        while let Some(node) = pending.pop() {
            match node {
                Value::Object(map) => {
                    if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
                        self.follow(document, reference, &mut collected, &mut pending);
                    }
                    pending.extend(map.iter().filter(|(k, _)| *k != "$ref").map(|(_, v)| v));
                }
                Value::Array(items) => pending.extend(items),
                _ => (),
            }
        }

        collected
    }

    fn follow<'a>(
        &self,
        document: &'a Value,
        reference: &str,
        collected: &mut CollectedRefs,
        pending: &mut Vec<&'a Value>,
    ) {
        if !reference.starts_with('#') {
            let file = reference.split('#').next().unwrap_or_default();
            if !file.is_empty() {
                collected.external_files.insert(file.to_owned());
            }
            return;
        }
        if collected.components.contains_key(reference) {
            return;
        }
        match (self.ref_lookup.get(reference), self.resolve(document, reference)) {
            (Some(path), Some(target)) => {
                collected
                    .components
                    .insert(reference.to_owned(), path.clone());
                pending.push(target);
            }
            _ => {
                collected.broken.insert(reference.to_owned());
            }
        }
    }
}

fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn openapi3_components() {
        let document = json!({
            "components": {
                "schemas": { "A": {} },
                "parameters": { "limit": { "in": "query" } }
            }
        });
        let index = RefIndex::for_document(&document);

        assert!(index.resolve(&document, "#/components/schemas/A").is_some());
        assert_eq!(
            index.resolve(&document, "#/components/parameters/limit"),
            Some(&json!({ "in": "query" }))
        );
        assert!(index
            .resolve(&document, "#/components/schemas/not-there")
            .is_none());
    }

    #[test]
    fn swagger2_definitions() {
        let document = json!({ "definitions": { "A": { "type": "string" } } });
        let index = RefIndex::for_document(&document);

        assert!(index.resolve(&document, "#/definitions/A").is_some());
        assert!(index.resolve(&document, "#/definitions/B").is_none());
    }

    #[test]
    fn escaped_names() {
        let document = json!({ "components": { "schemas": { "a/b": {} } } });
        let index = RefIndex::for_document(&document);
        assert!(index
            .resolve(&document, "#/components/schemas/a~1b")
            .is_some());
    }

    #[test]
    fn collect_is_transitive_and_cycle_safe() {
        let document = json!({
            "components": {
                "schemas": {
                    "Pet": {
                        "properties": {
                            "owner": { "$ref": "#/components/schemas/Owner" },
                            "tag": { "$ref": "common.yaml#/components/schemas/Tag" }
                        }
                    },
                    "Owner": {
                        "properties": {
                            "pets": { "items": { "$ref": "#/components/schemas/Pet" } },
                            "extra": { "$ref": "#/components/schemas/Missing" }
                        }
                    },
                    "Unused": {}
                }
            }
        });
        let index = RefIndex::for_document(&document);
        let operation = json!({ "schema": { "$ref": "#/components/schemas/Pet" } });

        let collected = index.collect(&document, &operation);
        let names: Vec<&str> = collected.components.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            ["#/components/schemas/Owner", "#/components/schemas/Pet"]
        );
        assert!(collected.broken.contains("#/components/schemas/Missing"));
        assert!(collected.external_files.contains("common.yaml"));
    }
}
