//! JSON-schema validation with a per-schema compile cache, and parse probes.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::hash::IdentityCache;
use crate::{BuildConfig, Error};

/// One validation failure.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SchemaError {
    /// JSON pointer into the validated data. Empty for schema-level failures.
    pub instance_path: String,
    /// What is wrong.
    pub message: String,
}

/// A compiled schema.
pub trait CompiledSchema: Send + Sync {
    /// Every error of `data`. Empty when valid.
    fn errors(&self, data: &Value) -> Vec<SchemaError>;
}

/// Turns a schema into a [`CompiledSchema`].
pub trait SchemaCompiler {
    /// Compiles `schema`, or explains why it is not a valid schema.
    fn compile(&self, schema: &Value) -> Result<Arc<dyn CompiledSchema>, SchemaError>;
}

/// Compiles with the `jsonschema` crate. The draft is detected from `$schema`.
#[derive(Default, Clone, Copy, Debug)]
pub struct JsonSchemaCompiler;

impl SchemaCompiler for JsonSchemaCompiler {
    fn compile(&self, schema: &Value) -> Result<Arc<dyn CompiledSchema>, SchemaError> {
        let validator = jsonschema::validator_for(schema).map_err(|e| SchemaError {
            instance_path: String::new(),
            message: e.to_string(),
        })?;
        Ok(Arc::new(validator))
    }
}

impl CompiledSchema for jsonschema::Validator {
    fn errors(&self, data: &Value) -> Vec<SchemaError> {
        self.iter_errors(data)
            .map(|error| SchemaError {
                instance_path: error.instance_path().to_string(),
                message: error.to_string(),
            })
            .collect()
    }
}

/// Validates documents, compiling each distinct schema allocation at most once.
pub struct ValidatorCache<C = JsonSchemaCompiler> {
    compiler: C,
    compiled: IdentityCache<Arc<dyn CompiledSchema>>,
}

impl Default for ValidatorCache<JsonSchemaCompiler> {
    fn default() -> Self {
        Self::new(JsonSchemaCompiler)
    }
}

impl<C: SchemaCompiler> ValidatorCache<C> {
    /// An empty cache compiling with `compiler`.
    pub fn new(compiler: C) -> Self {
        Self {
            compiler,
            compiled: IdentityCache::default(),
        }
    }

    /// Errors of `data` against `schema`. Never fails: a schema that does not compile yields a
    /// single error describing why.
    pub fn validate_document(&mut self, schema: &Arc<Value>, data: &Value) -> Vec<SchemaError> {
        let compiler = &self.compiler;
        match self
            .compiled
            .get_or_try_insert(schema, |schema| compiler.compile(schema))
        {
            Ok(validator) => validator.errors(data),
            Err(error) => vec![error],
        }
    }

    /// Number of schemas currently compiled.
    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    /// Whether no compiled schema is cached.
    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

/// Whether `text` parses as JSON.
pub fn is_json(text: &str) -> bool {
    serde_json::from_str::<serde::de::IgnoredAny>(text).is_ok()
}

/// Whether `text` parses as YAML. Every JSON document is also YAML.
pub fn is_yaml(text: &str) -> bool {
    serde_yaml::from_str::<serde_yaml::Value>(text).is_ok()
}

impl BuildConfig {
    /// JSON schema of the wire form of [`BuildConfig`].
    pub fn json_schema() -> Result<Value, Error> {
        Ok(serde_json::to_value(schemars::schema_for!(BuildConfig))?)
    }

    /// Checks `value` against [`BuildConfig::json_schema`], then deserializes it.
    pub fn from_json(value: Value) -> Result<Self, Error> {
        let schema = Arc::new(Self::json_schema()?);
        let errors = ValidatorCache::default().validate_document(&schema, &value);
        if !errors.is_empty() {
            let details: Vec<String> = errors
                .iter()
                .map(|e| match e.instance_path.as_str() {
                    "" => e.message.clone(),
                    path => format!("{path}: {}", e.message),
                })
                .collect();
            return Err(Error::validation(format!(
                "invalid build config: {}",
                details.join("; ")
            )));
        }
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct CountingCompiler {
        calls: AtomicUsize,
    }

    impl SchemaCompiler for &CountingCompiler {
        fn compile(&self, schema: &Value) -> Result<Arc<dyn CompiledSchema>, SchemaError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            JsonSchemaCompiler.compile(schema)
        }
    }

    fn pet_schema() -> Arc<Value> {
        Arc::new(json!({
            "type": "object",
            "required": ["name"],
            "properties": { "name": { "type": "string" } }
        }))
    }

    #[test]
    fn same_schema_compiles_once() {
        let compiler = CountingCompiler::default();
        let mut cache = ValidatorCache::new(&compiler);
        let schema = pet_schema();
        let data = json!({ "name": 1 });

        let first = cache.validate_document(&schema, &data);
        let second = cache.validate_document(&schema, &data);

        assert_eq!(compiler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].instance_path, "/name");
    }

    #[test]
    fn equal_but_distinct_schemas_compile_separately() {
        let compiler = CountingCompiler::default();
        let mut cache = ValidatorCache::new(&compiler);
        cache.validate_document(&pet_schema(), &json!({}));
        cache.validate_document(&pet_schema(), &json!({}));
        assert_eq!(compiler.calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty(), "both schemas were dropped");
    }

    #[test]
    fn valid_data_has_no_errors() {
        let mut cache = ValidatorCache::default();
        assert!(cache
            .validate_document(&pet_schema(), &json!({ "name": "Rex" }))
            .is_empty());
    }

    #[test]
    fn compile_failure_becomes_an_error_entry() {
        let mut cache = ValidatorCache::default();
        let broken = Arc::new(json!({ "type": 12 }));
        let errors = cache.validate_document(&broken, &json!({}));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].instance_path, "");
        assert!(cache.is_empty());
    }

    #[test]
    fn parse_probes() {
        assert!(is_json(r#"{"openapi": "3.0.0"}"#));
        assert!(!is_json("openapi: 3.0.0"));
        assert!(!is_json("{"));
        assert!(is_yaml("openapi: 3.0.0\ninfo:\n  title: x\n"));
        assert!(is_yaml(r#"{"a": 1}"#));
        assert!(!is_yaml("a: [1, 2"));
    }

    #[test]
    fn config_from_json() {
        let config = BuildConfig::from_json(json!({
            "packageId": "petstore",
            "version": "2",
            "previousVersion": "1",
            "buildType": "changelog"
        }))
        .unwrap();
        assert_eq!(config.previous_version.as_deref(), Some("1"));

        let err = BuildConfig::from_json(json!({
            "packageId": "petstore",
            "version": "2",
            "buildType": "nope"
        }))
        .unwrap_err();
        assert!(err.to_string().starts_with("invalid build config"));

        assert!(BuildConfig::from_json(json!({ "version": "2" })).is_err());
    }
}
