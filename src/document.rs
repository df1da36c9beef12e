//! Source files to documents and operations.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::hash::calculate_object_hash;
use crate::refs::RefIndex;
use crate::rules::RuleNode;
use crate::search_scope::{asyncapi_search_rules, crawl_search_scopes, rest_search_rules, ScopeRule};
use crate::slug::{join_path, rest_operation_id, slug, slugify, SlugOptions};
use crate::validation::{is_json, is_yaml};
use crate::{
    ApiAudience, ApiKind, ApiOperation, ApiType, BuildConfig, BuildConfigFile, DeprecateItem,
    Error, FileFormat, JsonPath, MessageSeverity, NotificationMessage, VersionDocument,
};

const REST_METHODS: &[&str] = &[
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

const ASYNCAPI_ACTIONS: &[&str] = &["publish", "subscribe"];

/// Keys ignored by [`DeprecateItem::tolerant_hash`].
const ANNOTATION_KEYS: &[&str] = &["description", "summary", "title", "example", "examples"];

/// A source file, parsed but not yet turned into operations.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFile {
    /// Id the file was resolved by.
    pub file_id: String,
    /// Detected source format.
    pub format: FileFormat,
    /// `None` when the content is not a recognized API document.
    pub api_type: Option<ApiType>,
    /// Parsed content. GraphQL sources are kept as a JSON string.
    pub data: Arc<Value>,
}

/// Detects the format and API type of `bytes` and parses them.
pub fn parse_file(file_id: &str, bytes: &[u8]) -> Result<ParsedFile, Error> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| Error::validation(format!("file {file_id:?} is not valid UTF-8")))?;
    let extension = file_id
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    let format = match extension.as_str() {
        "json" => FileFormat::Json,
        "yaml" | "yml" => FileFormat::Yaml,
        "graphql" | "gql" => FileFormat::Graphql,
        _ if is_json(text) => FileFormat::Json,
        _ if is_yaml(text) => FileFormat::Yaml,
        _ => FileFormat::Unknown,
    };

    let data = match format {
        FileFormat::Json => serde_json::from_str(text)?,
        FileFormat::Yaml => serde_yaml::from_str(text)?,
        FileFormat::Graphql | FileFormat::Unknown => Value::String(text.to_owned()),
    };

    let api_type = if format == FileFormat::Graphql {
        Some(ApiType::Graphql)
    } else if data.get("openapi").is_some() || data.get("swagger").is_some() {
        Some(ApiType::Rest)
    } else if data.get("asyncapi").is_some() {
        Some(ApiType::AsyncApi)
    } else {
        None
    };

    Ok(ParsedFile {
        file_id: file_id.to_owned(),
        format,
        api_type,
        data: Arc::new(data),
    })
}

/// Everything extracted from one file.
#[derive(Debug)]
pub struct DocumentOutput {
    /// The document, listing its operations.
    pub document: VersionDocument,
    /// Operations in document order.
    pub operations: Vec<ApiOperation>,
    /// Findings about this file, such as broken references.
    pub notifications: Vec<NotificationMessage>,
}

/// Extracts documents and operations for one build.
///
/// Document slugs are unique across every file handed to the same builder.
pub struct DocumentBuilder<'a> {
    config: &'a BuildConfig,
    document_slugs: BTreeSet<String>,
    rest_rules: RuleNode<ScopeRule>,
    asyncapi_rules: RuleNode<ScopeRule>,
}

impl<'a> DocumentBuilder<'a> {
    /// A builder with no slugs taken yet.
    pub fn new(config: &'a BuildConfig) -> Self {
        Self {
            config,
            document_slugs: BTreeSet::new(),
            rest_rules: rest_search_rules(),
            asyncapi_rules: asyncapi_search_rules(),
        }
    }

    /// Builds the document of `parsed` and its operations.
    ///
    /// Returns `None` for files that are not API documents; a warning is pushed for them.
    pub fn build(
        &mut self,
        file: &BuildConfigFile,
        parsed: ParsedFile,
        notifications: &mut Vec<NotificationMessage>,
    ) -> Option<DocumentOutput> {
        let Some(api_type) = parsed.api_type else {
            warn!(file_id = %file.file_id, "not an API document");
            notifications.push(
                NotificationMessage::new(
                    MessageSeverity::Warning,
                    "file is not an OpenAPI, AsyncAPI or GraphQL document and was skipped",
                )
                .with_file(&file.file_id),
            );
            return None;
        };

        let slug = slugify(
            &file.file_id,
            &SlugOptions::document_id(),
            &mut self.document_slugs,
        );
        let data = &parsed.data;
        let title = data
            .pointer("/info/title")
            .and_then(Value::as_str)
            .map(slug_title)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| file.file_id.clone());

        let mut output = DocumentOutput {
            document: VersionDocument {
                file_id: file.file_id.clone(),
                slug,
                title,
                api_type,
                format: parsed.format,
                version: data
                    .pointer("/info/version")
                    .and_then(Value::as_str)
                    .map(str::to_owned),
                operation_ids: vec![],
                dependencies: vec![],
                publish: file.publish,
                labels: file.labels.clone(),
                metadata: document_metadata(data),
                data: parsed.data.clone(),
            },
            operations: vec![],
            notifications: vec![],
        };

        let mut dependencies = BTreeSet::new();
        match api_type {
            ApiType::Rest => self.rest_operations(&mut output, &mut dependencies),
            ApiType::AsyncApi => self.asyncapi_operations(&mut output, &mut dependencies),
            ApiType::Graphql => output.notifications.push(
                NotificationMessage::new(
                    MessageSeverity::Info,
                    "GraphQL operations are not extracted",
                )
                .with_file(&file.file_id),
            ),
        }

        output.document.dependencies = dependencies.into_iter().collect();
        output.document.operation_ids = output
            .operations
            .iter()
            .map(|o| o.operation_id.clone())
            .collect();
        debug!(
            file_id = %file.file_id,
            slug = %output.document.slug,
            operations = output.operations.len(),
            "document built"
        );
        Some(output)
    }

    fn rest_operations(
        &mut self,
        output: &mut DocumentOutput,
        dependencies: &mut BTreeSet<String>,
    ) {
        let data = output.document.data.clone();
        let refs = RefIndex::for_document(&data);
        let base_path = rest_base_path(&data);
        let document_kind = api_kind(&data);
        let document_audience = api_audience(&data);
        let mut operation_ids = BTreeSet::new();

        let Some(paths) = data.get("paths").and_then(Value::as_object) else {
            return;
        };

        for (path, path_item) in paths {
            let path_parameters = path_item
                .get("parameters")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            for method in REST_METHODS {
                let Some(operation) = path_item.get(*method).and_then(Value::as_object) else {
                    continue;
                };
                let mut operation = operation.clone();
                merge_parameters(&mut operation, &path_parameters);
                let operation = Value::Object(operation);

                let operation_id = rest_operation_id(&base_path, path, method, &mut operation_ids);
                let full_path = join_path(&base_path, path);

                let mut single = Map::new();
                for key in ["openapi", "swagger", "servers", "host", "basePath"] {
                    if let Some(value) = data.get(key) {
                        single.insert(key.to_owned(), value.clone());
                    }
                }
                single.insert(
                    "paths".to_owned(),
                    json!({ path.clone(): { *method: operation.clone() } }),
                );

                let title = operation
                    .get("summary")
                    .and_then(Value::as_str)
                    .map(str::to_owned)
                    .unwrap_or_else(|| format!("{} {full_path}", method.to_uppercase()));
                let tags = operation
                    .get("tags")
                    .and_then(Value::as_array)
                    .map(|tags| {
                        tags.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_owned)
                            .collect()
                    })
                    .unwrap_or_default();

                let mut metadata = BTreeMap::new();
                metadata.insert("path".to_owned(), json!(full_path));
                metadata.insert("method".to_owned(), json!(method));
                if let Some(id) = operation.get("operationId") {
                    metadata.insert("originalOperationId".to_owned(), id.clone());
                }

                let seed = OperationSeed {
                    operation_id,
                    api_type: ApiType::Rest,
                    api_kind: api_kind(&operation).or(document_kind).unwrap_or_default(),
                    api_audience: api_audience(&operation)
                        .or(document_audience)
                        .unwrap_or_default(),
                    title,
                    deprecated: is_deprecated(&operation),
                    tags,
                    metadata,
                };
                self.finish_operation(output, dependencies, &refs, seed, &operation, single);
            }
        }
    }

    fn asyncapi_operations(
        &mut self,
        output: &mut DocumentOutput,
        dependencies: &mut BTreeSet<String>,
    ) {
        let data = output.document.data.clone();
        let refs = RefIndex::for_document(&data);
        let document_kind = api_kind(&data);
        let document_audience = api_audience(&data);
        let mut operation_ids = BTreeSet::new();

        let Some(channels) = data.get("channels").and_then(Value::as_object) else {
            return;
        };

        for (channel, channel_item) in channels {
            for action in ASYNCAPI_ACTIONS {
                let Some(operation) = channel_item.get(*action) else {
                    continue;
                };
                let operation_id = slugify(
                    &format!("{}-{action}", channel.trim_matches('/')),
                    &SlugOptions::operation_id(),
                    &mut operation_ids,
                );

                let mut single = Map::new();
                for key in ["asyncapi", "servers", "defaultContentType"] {
                    if let Some(value) = data.get(key) {
                        single.insert(key.to_owned(), value.clone());
                    }
                }
                single.insert(
                    "channels".to_owned(),
                    json!({ channel.clone(): { *action: operation.clone() } }),
                );

                let title = operation
                    .get("summary")
                    .and_then(Value::as_str)
                    .map(str::to_owned)
                    .unwrap_or_else(|| format!("{action} {channel}"));
                let tags = operation
                    .get("tags")
                    .and_then(Value::as_array)
                    .map(|tags| {
                        tags.iter()
                            .filter_map(|t| t.get("name").and_then(Value::as_str))
                            .map(str::to_owned)
                            .collect()
                    })
                    .unwrap_or_default();

                let mut metadata = BTreeMap::new();
                metadata.insert("channel".to_owned(), json!(channel));
                metadata.insert("action".to_owned(), json!(action));

                let seed = OperationSeed {
                    operation_id,
                    api_type: ApiType::AsyncApi,
                    api_kind: api_kind(operation).or(document_kind).unwrap_or_default(),
                    api_audience: api_audience(operation)
                        .or(document_audience)
                        .unwrap_or_default(),
                    title,
                    deprecated: is_deprecated(operation),
                    tags,
                    metadata,
                };
                self.finish_operation(output, dependencies, &refs, seed, operation, single);
            }
        }
    }

    /// Attaches used components, then hashes, indexes and inventories the operation.
    fn finish_operation(
        &mut self,
        output: &mut DocumentOutput,
        dependencies: &mut BTreeSet<String>,
        refs: &RefIndex,
        seed: OperationSeed,
        operation: &Value,
        mut single: Map<String, Value>,
    ) {
        let source = &output.document.data;
        let collected = refs.collect(source, operation);
        for reference in &collected.broken {
            output.notifications.push(
                NotificationMessage::new(
                    self.config.validation_rules_severity.broken_refs,
                    format!("$ref can't be resolved: {reference}"),
                )
                .with_file(&output.document.file_id)
                .with_operation(&seed.operation_id),
            );
        }
        dependencies.extend(collected.external_files.iter().cloned());

        let mut data = Value::Object(std::mem::take(&mut single));
        for path in collected.components.values() {
            if let Some(component) = path
                .iter()
                .try_fold(&**source, |node, segment| node.get(segment.as_str()))
            {
                insert_at(&mut data, path, component.clone());
            }
        }

        let rules = match seed.api_type {
            ApiType::AsyncApi => &self.asyncapi_rules,
            _ => &self.rest_rules,
        };
        let search_scopes = crawl_search_scopes(&data, rules);
        let deprecated_items = deprecated_items(&data);
        let data_hash = calculate_object_hash(&data);
        let data = Arc::new(data);

        output.operations.push(ApiOperation {
            operation_id: seed.operation_id,
            document_id: output.document.slug.clone(),
            api_type: seed.api_type,
            api_kind: seed.api_kind,
            api_audience: seed.api_audience,
            title: seed.title,
            deprecated: seed.deprecated,
            tags: seed.tags,
            search_scopes,
            deprecated_items,
            data_hash,
            metadata: seed.metadata,
            data,
        });
    }
}

struct OperationSeed {
    operation_id: String,
    api_type: ApiType,
    api_kind: ApiKind,
    api_audience: ApiAudience,
    title: String,
    deprecated: bool,
    tags: Vec<String>,
    metadata: BTreeMap<String, Value>,
}

fn slug_title(title: &str) -> String {
    slug(title, &SlugOptions::title())
}

fn document_metadata(data: &Value) -> BTreeMap<String, Value> {
    let mut metadata = BTreeMap::new();
    if let Some(description) = data.pointer("/info/description") {
        metadata.insert("description".to_owned(), description.clone());
    }
    if let Some(info) = data.get("info").and_then(Value::as_object) {
        for (key, value) in info.iter().filter(|(k, _)| k.starts_with("x-")) {
            metadata.insert(key.clone(), value.clone());
        }
    }
    if let Some(tags) = data.get("tags") {
        metadata.insert("tags".to_owned(), tags.clone());
    }
    metadata
}

fn rest_base_path(data: &Value) -> String {
    if let Some(base_path) = data.get("basePath").and_then(Value::as_str) {
        return base_path.to_owned();
    }
    let Some(url) = data.pointer("/servers/0/url").and_then(Value::as_str) else {
        return String::new();
    };
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    if url.contains("://") {
        without_scheme
            .find('/')
            .map(|i| without_scheme[i..].to_owned())
            .unwrap_or_default()
    } else {
        without_scheme.to_owned()
    }
}

fn api_kind(value: &Value) -> Option<ApiKind> {
    value
        .get("x-api-kind")
        .and_then(Value::as_str)
        .and_then(ApiKind::parse)
}

fn api_audience(value: &Value) -> Option<ApiAudience> {
    value
        .get("x-api-audience")
        .and_then(Value::as_str)
        .and_then(ApiAudience::parse)
}

fn is_deprecated(value: &Value) -> bool {
    value.get("deprecated").and_then(Value::as_bool) == Some(true)
}

/// Path-level parameters apply unless the operation redefines the same `name` and `in`.
fn merge_parameters(operation: &mut Map<String, Value>, path_parameters: &[Value]) {
    if path_parameters.is_empty() {
        return;
    }
    let key = |p: &Value| (p.get("name").cloned(), p.get("in").cloned(), p.get("$ref").cloned());
    let own: Vec<Value> = operation
        .get("parameters")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let own_keys: Vec<_> = own.iter().map(key).collect();
    let mut merged: Vec<Value> = path_parameters
        .iter()
        .filter(|p| !own_keys.contains(&key(p)))
        .cloned()
        .collect();
    merged.extend(own);
    operation.insert("parameters".to_owned(), Value::Array(merged));
}

fn insert_at(root: &mut Value, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut node = root;
    for segment in parents {
        let Some(map) = node.as_object_mut() else {
            return;
        };
        node = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if let Some(map) = node.as_object_mut() {
        map.insert(last.clone(), value);
    }
}

/// Every object with `deprecated: true` in `data`.
pub fn deprecated_items(data: &Value) -> Vec<DeprecateItem> {
    let mut items = vec![];
    let mut path = vec![];
    walk_deprecated(data, &mut path, &mut items);
    items
}

fn walk_deprecated(value: &Value, path: &mut JsonPath, items: &mut Vec<DeprecateItem>) {
    match value {
        Value::Object(map) => {
            if is_deprecated(value) {
                let mut tolerant = map.clone();
                tolerant.retain(|k, _| !ANNOTATION_KEYS.contains(&k.as_str()));
                items.push(DeprecateItem {
                    declaration_json_paths: vec![path.clone()],
                    description: describe_deprecation(path, value),
                    hash: Some(calculate_object_hash(value)),
                    tolerant_hash: Some(calculate_object_hash(&Value::Object(tolerant))),
                    deprecated_in_previous_versions: vec![],
                });
            }
            for (key, child) in map {
                path.push(key.clone());
                walk_deprecated(child, path, items);
                path.pop();
            }
        }
        Value::Array(children) => {
            for (i, child) in children.iter().enumerate() {
                path.push(i.to_string());
                walk_deprecated(child, path, items);
                path.pop();
            }
        }
        _ => (),
    }
}

fn describe_deprecation(path: &[String], value: &Value) -> String {
    match path {
        [root, location, action] if root == "paths" || root == "channels" => {
            format!("[Deprecated] operation {} {location}", action.to_uppercase())
        }
        [.., parameters, _] if parameters == "parameters" => format!(
            "[Deprecated] parameter '{}'",
            value.get("name").and_then(Value::as_str).unwrap_or("?")
        ),
        [.., properties, name] if properties == "properties" => {
            format!("[Deprecated] property '{name}'")
        }
        [.., schemas, name] if schemas == "schemas" || schemas == "definitions" => {
            format!("[Deprecated] schema '{name}'")
        }
        _ => format!("[Deprecated] declaration at /{}", path.join("/")),
    }
}

/// Lays a template under a merged specification. Template fields other than `paths` are
/// taken as they are, and template components fill in names the documents do not define.
pub fn apply_rest_template(merged: &mut Value, template: &Value) {
    let (Some(merged), Some(template)) = (merged.as_object_mut(), template.as_object()) else {
        return;
    };
    for (key, value) in template {
        match key.as_str() {
            "paths" => (),
            "components" => {
                let components = merged
                    .entry("components")
                    .or_insert_with(|| Value::Object(Map::new()));
                merge_missing(components, value);
            }
            _ => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
}

fn merge_missing(target: &mut Value, source: &Value) {
    let (Some(target), Some(source)) = (target.as_object_mut(), source.as_object()) else {
        return;
    };
    for (key, value) in source {
        match target.get_mut(key) {
            Some(existing) => merge_missing(existing, value),
            None => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Merges REST documents into one specification. On conflicting paths or components the
/// earlier document wins and a warning is returned.
pub fn merge_rest_documents<'d>(
    config: &BuildConfig,
    documents: impl IntoIterator<Item = &'d VersionDocument>,
) -> (Value, Vec<NotificationMessage>) {
    let mut notifications = vec![];
    let mut paths = Map::new();
    let mut components: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
    let mut openapi = None;

    for document in documents {
        if document.api_type != ApiType::Rest {
            continue;
        }
        let data = &document.data;
        openapi = openapi.or_else(|| data.get("openapi").cloned());
        let base_path = rest_base_path(data);

        for (path, item) in data.get("paths").and_then(Value::as_object).into_iter().flatten() {
            let full_path = join_path(&base_path, path);
            let merged = paths
                .entry(full_path.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            let (Some(merged), Some(item)) = (merged.as_object_mut(), item.as_object()) else {
                continue;
            };
            for (key, operation) in item {
                if merged.contains_key(key) && merged[key] != *operation {
                    notifications.push(
                        NotificationMessage::new(
                            MessageSeverity::Warning,
                            format!(
                                "{} {full_path} is defined in several documents",
                                key.to_uppercase()
                            ),
                        )
                        .with_file(&document.file_id),
                    );
                    continue;
                }
                merged.insert(key.clone(), operation.clone());
            }
        }

        let sections = data.get("components").and_then(Value::as_object).into_iter().flatten();
        for (kind, entries) in sections {
            let merged = components.entry(kind.clone()).or_default();
            for (name, component) in entries.as_object().into_iter().flatten() {
                match merged.get(name) {
                    Some(existing) if existing != component => notifications.push(
                        NotificationMessage::new(
                            MessageSeverity::Warning,
                            format!("component {kind}/{name} differs between documents"),
                        )
                        .with_file(&document.file_id),
                    ),
                    Some(_) => (),
                    None => {
                        merged.insert(name.clone(), component.clone());
                    }
                }
            }
        }
    }

    let mut merged = json!({
        "openapi": openapi.unwrap_or_else(|| json!("3.0.3")),
        "info": { "title": config.package_id, "version": config.version },
        "paths": paths,
    });
    if !components.is_empty() {
        merged["components"] = json!(components);
    }
    (merged, notifications)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PETSTORE: &str = r##"
openapi: 3.0.3
info:
  title: Pet Store
  version: 1.0.0
  x-owner: pets-team
servers:
  - url: https://example.com/api/v1
x-api-kind: bwc
paths:
  /pets/{petId}:
    parameters:
      - name: petId
        in: path
        required: true
        schema: { type: string }
    get:
      summary: Get a pet
      tags: [pets]
      responses:
        "200":
          content:
            application/json:
              schema:
                $ref: "#/components/schemas/Pet"
    delete:
      deprecated: true
      x-api-kind: no-bwc
      responses:
        "204": { description: gone }
components:
  schemas:
    Pet:
      properties:
        id: { type: string }
        nickname:
          type: string
          deprecated: true
          description: use name
        owner:
          $ref: "#/components/schemas/Missing"
    Unused:
      type: object
"##;

    fn build(
        config: &BuildConfig,
        file_id: &str,
        source: &str,
    ) -> (DocumentOutput, Vec<NotificationMessage>) {
        let parsed = parse_file(file_id, source.as_bytes()).unwrap();
        let mut notifications = vec![];
        let output = DocumentBuilder::new(config)
            .build(&BuildConfigFile::new(file_id), parsed, &mut notifications)
            .unwrap();
        (output, notifications)
    }

    #[test]
    fn detects_formats() {
        let json = parse_file("a.json", br#"{"openapi": "3.0.0"}"#).unwrap();
        assert_eq!(json.format, FileFormat::Json);
        assert_eq!(json.api_type, Some(ApiType::Rest));

        let yaml = parse_file("spec", b"asyncapi: 2.6.0\n").unwrap();
        assert_eq!(yaml.format, FileFormat::Yaml);
        assert_eq!(yaml.api_type, Some(ApiType::AsyncApi));

        let graphql = parse_file("schema.graphql", b"type Query { pets: [Pet] }").unwrap();
        assert_eq!(graphql.api_type, Some(ApiType::Graphql));

        let readme = parse_file("README", b"just text").unwrap();
        assert_eq!(readme.api_type, None);

        assert!(parse_file("bad.json", b"{").is_err());
        assert!(parse_file("bin.yaml", &[0xff, 0xfe]).is_err());
    }

    #[test]
    fn rest_document() {
        let config = BuildConfig::new("petstore", "1");
        let (output, _) = build(&config, "specs/petstore.yaml", PETSTORE);

        let document = &output.document;
        assert_eq!(document.slug, "specs-petstore-yaml");
        assert_eq!(document.title, "Pet Store");
        assert_eq!(document.version.as_deref(), Some("1.0.0"));
        assert_eq!(document.metadata["x-owner"], "pets-team");
        assert_eq!(
            document.operation_ids,
            ["api-v1-pets-{petId}-get", "api-v1-pets-{petId}-delete"]
        );

        let get = &output.operations[0];
        assert_eq!(get.path(), Some("/api/v1/pets/{petId}"));
        assert_eq!(get.method(), Some("get"));
        assert_eq!(get.title, "Get a pet");
        assert_eq!(get.tags, ["pets"]);
        assert_eq!(get.api_kind, ApiKind::Bwc);
        assert!(!get.deprecated);
        assert!(get.data.pointer("/components/schemas/Pet").is_some());
        assert!(get.data.pointer("/components/schemas/Unused").is_none());
        assert_eq!(
            get.data.pointer("/paths/~1pets~1{petId}/get/parameters/0/name"),
            Some(&json!("petId"))
        );
        assert!(get.search_scopes.contains("request", "petId"));
        assert!(get.search_scopes.contains("properties", "nickname"));
        assert_eq!(get.data_hash, calculate_object_hash(&get.data));

        assert_eq!(get.deprecated_items.len(), 1);
        let item = &get.deprecated_items[0];
        assert_eq!(item.description, "[Deprecated] property 'nickname'");
        assert_eq!(
            item.declaration_json_paths[0],
            ["components", "schemas", "Pet", "properties", "nickname"]
        );

        let delete = &output.operations[1];
        assert!(delete.deprecated);
        assert_eq!(delete.api_kind, ApiKind::NoBwc);
        assert_eq!(delete.title, "DELETE /api/v1/pets/{petId}");
        assert_eq!(
            delete.deprecated_items[0].description,
            "[Deprecated] operation DELETE /pets/{petId}"
        );
    }

    #[test]
    fn broken_refs_use_configured_severity() {
        let mut config = BuildConfig::new("petstore", "1");
        let (output, _) = build(&config, "petstore.yaml", PETSTORE);
        assert_eq!(output.notifications.len(), 1);
        assert_eq!(output.notifications[0].severity, MessageSeverity::Error);
        assert_eq!(
            output.notifications[0].operation_id.as_deref(),
            Some("api-v1-pets-{petId}-get")
        );

        config.validation_rules_severity.broken_refs = MessageSeverity::Warning;
        let (output, _) = build(&config, "petstore.yaml", PETSTORE);
        assert_eq!(output.notifications[0].severity, MessageSeverity::Warning);
    }

    #[test]
    fn tolerant_hash_ignores_descriptions() {
        let a = deprecated_items(&json!({ "deprecated": true, "description": "a" }));
        let b = deprecated_items(&json!({ "deprecated": true, "description": "b" }));
        assert_ne!(a[0].hash, b[0].hash);
        assert_eq!(a[0].tolerant_hash, b[0].tolerant_hash);
    }

    #[test]
    fn asyncapi_document() {
        let source = r#"{
            "asyncapi": "2.6.0",
            "info": { "title": "Events", "version": "1" },
            "channels": {
                "pets/created": {
                    "subscribe": {
                        "summary": "Pet created",
                        "tags": [{ "name": "pets" }],
                        "message": { "payload": { "properties": { "petId": {} } } }
                    }
                }
            }
        }"#;
        let config = BuildConfig::new("events", "1");
        let (output, _) = build(&config, "events.json", source);
        let operation = &output.operations[0];
        assert_eq!(operation.operation_id, "pets-created-subscribe");
        assert_eq!(operation.api_type, ApiType::AsyncApi);
        assert_eq!(operation.tags, ["pets"]);
        assert!(operation.search_scopes.contains("message", "petId"));
        assert!(operation.search_scopes.contains("channel", "pets/created"));
    }

    #[test]
    fn unknown_and_graphql_files() {
        let config = BuildConfig::new("p", "1");
        let mut builder = DocumentBuilder::new(&config);
        let mut notifications = vec![];

        let readme = parse_file("README.md", b"# hello").unwrap();
        assert!(builder
            .build(&BuildConfigFile::new("README.md"), readme, &mut notifications)
            .is_none());
        assert_eq!(notifications[0].severity, MessageSeverity::Warning);

        let graphql = parse_file("schema.graphql", b"type Query { a: Int }").unwrap();
        let output = builder
            .build(&BuildConfigFile::new("schema.graphql"), graphql, &mut notifications)
            .unwrap();
        assert!(output.operations.is_empty());
        assert_eq!(output.notifications[0].severity, MessageSeverity::Info);
    }

    #[test]
    fn server_base_paths() {
        assert_eq!(rest_base_path(&json!({ "basePath": "/v2" })), "/v2");
        assert_eq!(
            rest_base_path(&json!({ "servers": [{ "url": "https://h.io/api" }] })),
            "/api"
        );
        assert_eq!(
            rest_base_path(&json!({ "servers": [{ "url": "https://h.io" }] })),
            ""
        );
        assert_eq!(
            rest_base_path(&json!({ "servers": [{ "url": "/relative" }] })),
            "/relative"
        );
    }

    #[test]
    fn merge_documents() {
        let config = BuildConfig::new("petstore", "1");
        let a = build(&config, "a.json", r#"{
            "openapi": "3.0.3",
            "paths": { "/pets": { "get": { "summary": "a" } } },
            "components": { "schemas": { "Pet": { "type": "object" } } }
        }"#).0.document;
        let b = build(&config, "b.json", r#"{
            "openapi": "3.0.3",
            "paths": {
                "/pets": { "get": { "summary": "b" }, "post": {} },
                "/owners": { "get": {} }
            },
            "components": { "schemas": { "Pet": { "type": "string" } } }
        }"#).0.document;

        let (merged, notifications) = merge_rest_documents(&config, [&a, &b]);
        assert_eq!(merged["paths"]["/pets"]["get"]["summary"], "a");
        assert!(merged["paths"]["/pets"].get("post").is_some());
        assert!(merged["paths"].get("/owners").is_some());
        assert_eq!(merged["components"]["schemas"]["Pet"]["type"], "object");
        assert_eq!(merged["info"]["title"], "petstore");
        assert_eq!(notifications.len(), 2);
    }

    #[test]
    fn template_fills_the_merge() {
        let mut merged = json!({
            "openapi": "3.0.3",
            "info": { "title": "petstore", "version": "1" },
            "paths": { "/pets": { "get": {} } },
            "components": { "schemas": { "Pet": { "type": "object" } } }
        });
        let template = json!({
            "info": { "title": "Pet Store", "version": "1" },
            "servers": [{ "url": "https://pets.example.com" }],
            "paths": { "/ignored": {} },
            "components": {
                "schemas": { "Pet": { "type": "string" }, "Error": { "type": "object" } },
                "securitySchemes": { "key": { "type": "apiKey" } }
            }
        });
        apply_rest_template(&mut merged, &template);

        assert_eq!(merged["info"]["title"], "Pet Store");
        assert_eq!(merged["servers"][0]["url"], "https://pets.example.com");
        assert!(merged["paths"].get("/ignored").is_none());
        assert_eq!(merged["components"]["schemas"]["Pet"]["type"], "object");
        assert!(merged["components"]["schemas"].get("Error").is_some());
        assert!(merged["components"].get("securitySchemes").is_some());
    }
}
