//! Searchable tokens of an operation, grouped into named scopes.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rules::RuleNode;

/// Scope every token also lands in.
pub const ALL_SCOPE: &str = "all";

/// Which scopes a crawled value feeds.
///
/// Serialized as `{"#": [...]}` for value scopes or `{"##": [...]}` for key scopes.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ScopeRule {
    /// The value is indexed into these scopes.
    #[serde(rename = "#", default, skip_serializing_if = "Vec::is_empty")]
    pub value_scopes: Vec<String>,
    /// The key is indexed into these scopes.
    #[serde(rename = "##", default, skip_serializing_if = "Vec::is_empty")]
    pub key_scopes: Vec<String>,
}

impl ScopeRule {
    /// Indexes the value under `scopes`.
    pub fn values(scopes: &[&str]) -> Self {
        Self {
            value_scopes: scopes.iter().map(|s| s.to_string()).collect(),
            key_scopes: vec![],
        }
    }

    /// Indexes the key under `scopes`.
    pub fn keys(scopes: &[&str]) -> Self {
        Self {
            value_scopes: vec![],
            key_scopes: scopes.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Scope name to tokens.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct SearchScopes(BTreeMap<String, BTreeSet<String>>);

impl SearchScopes {
    /// Adds `token` to `scope`.
    pub fn insert(&mut self, scope: &str, token: String) {
        self.0.entry(scope.to_owned()).or_default().insert(token);
    }

    /// Tokens of `scope`.
    pub fn get(&self, scope: &str) -> Option<&BTreeSet<String>> {
        self.0.get(scope)
    }

    /// Whether `scope` holds `token`.
    pub fn contains(&self, scope: &str, token: &str) -> bool {
        self.0.get(scope).is_some_and(|tokens| tokens.contains(token))
    }

    /// Whether nothing was indexed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Names of the non-empty scopes.
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Indexes one crawled `key`/`value` pair according to `rule`.
///
/// With value scopes the token is derived from the value: arrays join with a space, objects
/// are stringified without their `$ref`, booleans index the key name, numbers their decimal
/// form. With key scopes only, the token is the key. Nothing is indexed otherwise, for an
/// empty key, or for `null`.
pub fn build_search_scope(
    key: Option<&str>,
    value: &Value,
    rule: &ScopeRule,
    scopes: &mut SearchScopes,
) {
    let (token, names) = if !rule.value_scopes.is_empty() {
        match value_token(key, value) {
            Some(token) => (token, &rule.value_scopes),
            None => return,
        }
    } else if !rule.key_scopes.is_empty() {
        match key {
            Some(key) if !key.is_empty() => (key.to_owned(), &rule.key_scopes),
            _ => return,
        }
    } else {
        return;
    };

    for name in names {
        scopes.insert(name, token.clone());
    }
    scopes.insert(ALL_SCOPE, token);
}

fn value_token(key: Option<&str>, value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => Some(
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(" "),
        ),
        Value::Object(map) => {
            let mut map = map.clone();
            map.remove("$ref");
            Some(Value::Object(map).to_string())
        }
        Value::Bool(_) => key.filter(|k| !k.is_empty()).map(str::to_owned),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
    }
}

/// Walks `value` and indexes every node whose path has a rule in `rules`.
pub fn crawl_search_scopes(value: &Value, rules: &RuleNode<ScopeRule>) -> SearchScopes {
    let mut scopes = SearchScopes::default();
    let mut path = vec![];
    crawl(value, &mut path, rules, &mut scopes);
    scopes
}

fn crawl(
    value: &Value,
    path: &mut Vec<String>,
    rules: &RuleNode<ScopeRule>,
    scopes: &mut SearchScopes,
) {
    let children: Vec<(String, &Value)> = match value {
        Value::Object(map) => map
            .iter()
            .filter(|(k, _)| k.as_str() != "$ref")
            .map(|(k, v)| (k.clone(), v))
            .collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => return,
    };

    for (key, child) in children {
        path.push(key);
        if let Some(rule) = rules.lookup(path.as_slice()) {
            build_search_scope(path.last().map(String::as_str), child, rule, scopes);
        }
        crawl(child, path, rules, scopes);
        path.pop();
    }
}

/// Rules for REST operation documents.
pub fn rest_search_rules() -> RuleNode<ScopeRule> {
    RuleNode::from_paths([
        ("/paths/*", ScopeRule::keys(&["path"])),
        ("/paths/*/*/summary", ScopeRule::values(&["annotation"])),
        ("/paths/*/*/description", ScopeRule::values(&["annotation"])),
        ("/paths/*/*/operationId", ScopeRule::values(&["annotation"])),
        ("/paths/*/*/tags", ScopeRule::values(&["tags"])),
        ("/paths/*/*/parameters/*/name", ScopeRule::values(&["request"])),
        (
            "/paths/*/*/requestBody/**/properties/*",
            ScopeRule::keys(&["request", "properties"]),
        ),
        (
            "/paths/*/*/responses/**/properties/*",
            ScopeRule::keys(&["response", "properties"]),
        ),
        ("/paths/*/*/responses/**/readOnly", ScopeRule::values(&["response"])),
        (
            "/components/schemas/**/properties/*",
            ScopeRule::keys(&["properties"]),
        ),
    ])
}

/// Rules for AsyncAPI operation documents.
pub fn asyncapi_search_rules() -> RuleNode<ScopeRule> {
    RuleNode::from_paths([
        ("/channels/*", ScopeRule::keys(&["channel"])),
        ("/channels/*/*/summary", ScopeRule::values(&["annotation"])),
        ("/channels/*/*/description", ScopeRule::values(&["annotation"])),
        ("/channels/*/*/operationId", ScopeRule::values(&["annotation"])),
        (
            "/channels/*/*/message/**/properties/*",
            ScopeRule::keys(&["message", "properties"]),
        ),
        (
            "/components/schemas/**/properties/*",
            ScopeRule::keys(&["properties"]),
        ),
    ])
}
