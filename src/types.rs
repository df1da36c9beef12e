use std::collections::BTreeMap;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::changes::VersionsComparison;
use crate::search_scope::SearchScopes;

/// JSON path inside a document, one entry per segment.
pub type JsonPath = Vec<String>;

/// The kind of build a [`BuildConfig`] requests.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BuildType {
    /// Build a package version from source files.
    #[default]
    #[serde(rename = "build")]
    Build,
    /// Only compare two already published versions.
    #[serde(rename = "changelog")]
    Changelog,
    /// Export every document of a version. Not supported by this crate.
    #[serde(rename = "export_version")]
    ExportVersion,
    /// Export one REST document. Not supported by this crate.
    #[serde(rename = "export_rest_document")]
    ExportRestDocument,
    /// Export the REST operations of a group. Not supported by this crate.
    #[serde(rename = "export_rest_operations_group")]
    ExportRestOperationsGroup,
    /// Reduce source documents to their operations. Not supported by this crate.
    #[serde(rename = "reducedSourceSpecifications")]
    ReducedSourceSpecifications,
    /// Build, then merge all REST documents into one specification.
    #[serde(rename = "mergedSpecification")]
    MergedSpecification,
    /// Compare two path-prefix groups of the same version.
    #[serde(rename = "prefix-groups-changelog")]
    PrefixGroupsChangelog,
}

/// Publication status of a version.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum VersionStatus {
    #[default]
    Draft,
    Release,
    Archived,
}

/// One source file of a build.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfigFile {
    /// Identifier handed to [`crate::Resolvers::file_by_id`], usually a relative file name.
    pub file_id: String,
    /// Whether the document is published with the version.
    #[serde(default = "default_publish")]
    pub publish: bool,
    /// Free-form labels copied to the document.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    /// Content id of the file in the registry, if it is stored there.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_id: Option<String>,
}

fn default_publish() -> bool {
    true
}

impl BuildConfigFile {
    /// A published file without labels.
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            publish: true,
            ..Default::default()
        }
    }
}

/// Severity overrides for validation findings.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRulesSeverity {
    /// Severity of an internal `$ref` that points nowhere. Defaults to `error`.
    #[serde(default)]
    pub broken_refs: MessageSeverity,
}

/// Describes one build request. Immutable input to a build.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    /// Package being built.
    pub package_id: String,
    /// Version being built.
    pub version: String,
    /// Publication status of the version.
    #[serde(default)]
    pub status: VersionStatus,
    /// Version to compare against. No comparison is made when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<String>,
    /// Package of `previous_version`. Falls back to `package_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version_package_id: Option<String>,
    /// What to build.
    #[serde(default)]
    pub build_type: BuildType,
    /// Source files, in build order. Earlier files win conflicts.
    #[serde(default)]
    pub files: Vec<BuildConfigFile>,
    /// Opaque metadata carried through to the result.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
    /// Path prefix of the current group, e.g. `/api/v3/`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_group: Option<String>,
    /// Path prefix of the previous group, e.g. `/api/v2/`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_group: Option<String>,
    /// Severity overrides for validation findings.
    #[serde(default)]
    pub validation_rules_severity: ValidationRulesSeverity,
}

impl BuildConfig {
    /// A `build` request for `package_id` at `version`.
    pub fn new(package_id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    /// Package holding the previous version.
    pub fn previous_package_id(&self) -> &str {
        self.previous_version_package_id
            .as_deref()
            .unwrap_or(&self.package_id)
    }

    /// Checks the fields every build type needs.
    pub fn validate_required(&self) -> Result<(), Error> {
        for (name, value) in [("packageId", &self.package_id), ("version", &self.version)] {
            if value.trim().is_empty() {
                return Err(Error::validation(format!("{name} is required")));
            }
        }
        Ok(())
    }
}

/// API flavour of a document or an operation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[allow(missing_docs)]
pub enum ApiType {
    #[serde(rename = "rest")]
    Rest,
    #[serde(rename = "graphql")]
    Graphql,
    #[serde(rename = "asyncapi")]
    AsyncApi,
}

/// How strictly changes to an operation are classified.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ApiKind {
    #[default]
    #[serde(rename = "bwc")]
    Bwc,
    #[serde(rename = "no-bwc")]
    NoBwc,
    #[serde(rename = "experimental")]
    Experimental,
}

impl ApiKind {
    /// Parses an `x-api-kind` value, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "bwc" => Some(Self::Bwc),
            "no-bwc" | "nobwc" => Some(Self::NoBwc),
            "experimental" => Some(Self::Experimental),
            _ => None,
        }
    }
}

/// Who consumes an operation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum ApiAudience {
    Internal,
    External,
    #[default]
    Unknown,
}

impl ApiAudience {
    /// Parses an `x-api-audience` value, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "internal" => Some(Self::Internal),
            "external" => Some(Self::External),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// Source format of a file.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum FileFormat {
    Json,
    Yaml,
    Graphql,
    Unknown,
}

/// One parsed source file.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VersionDocument {
    /// Source file id.
    pub file_id: String,
    /// Unique within the build, derived from `file_id`.
    pub slug: String,
    /// `info.title`, else the file id.
    pub title: String,
    /// API flavour of the document.
    pub api_type: ApiType,
    /// Source format.
    pub format: FileFormat,
    /// `info.version` of the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Operations extracted from this document.
    pub operation_ids: Vec<String>,
    /// Other files this one references.
    pub dependencies: Vec<String>,
    /// Copied from [`BuildConfigFile::publish`].
    pub publish: bool,
    /// Copied from [`BuildConfigFile::labels`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    /// `info.description`, `info.x-*` extensions and the top-level `tags`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
    /// Parsed content. `null` when stored without its source.
    pub data: Arc<Value>,
}

/// One deprecated declaration inside an operation.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeprecateItem {
    /// Where the declaration sits in the operation data.
    pub declaration_json_paths: Vec<JsonPath>,
    /// Human-readable summary, e.g. `[Deprecated] parameter 'limit'`.
    pub description: String,
    /// Hash of the declaring object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Hash of the declaring object without annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerant_hash: Option<String>,
    /// Versions in which the same declaration was already deprecated, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deprecated_in_previous_versions: Vec<String>,
}

/// One logical API operation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiOperation {
    /// Unique within the version.
    pub operation_id: String,
    /// Slug of the owning [`VersionDocument`].
    pub document_id: String,
    /// API flavour of the operation.
    pub api_type: ApiType,
    /// `x-api-kind` of the operation, else of the document.
    pub api_kind: ApiKind,
    /// `x-api-audience` of the operation, else of the document.
    pub api_audience: ApiAudience,
    /// Summary, else the method and path or the action and channel.
    pub title: String,
    /// The operation itself is deprecated.
    pub deprecated: bool,
    /// Tag names of the operation.
    pub tags: Vec<String>,
    /// Searchable tokens grouped by scope.
    pub search_scopes: SearchScopes,
    /// Deprecated declarations found in `data`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deprecated_items: Vec<DeprecateItem>,
    /// Hash of `data`. Operations with equal hashes are not diffed.
    pub data_hash: String,
    /// `path` and `method` for REST, `channel` and `action` for AsyncAPI.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    /// Standalone document holding only this operation and the components it uses.
    pub data: Arc<Value>,
}

impl ApiOperation {
    /// A string entry of `metadata`.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// REST path, including the server base path.
    pub fn path(&self) -> Option<&str> {
        self.meta_str("path")
    }

    /// REST method, lower case.
    pub fn method(&self) -> Option<&str> {
        self.meta_str("method")
    }
}

/// Severity of a [`NotificationMessage`].
#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum MessageSeverity {
    #[default]
    Error,
    Warning,
    Info,
}

/// A diagnostic produced by a build.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMessage {
    /// How bad it is.
    pub severity: MessageSeverity,
    /// What happened.
    pub message: String,
    /// File the message is about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    /// Operation the message is about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
}

impl NotificationMessage {
    /// A message not tied to a file or an operation.
    pub fn new(severity: MessageSeverity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            file_id: None,
            operation_id: None,
        }
    }

    /// Attaches the file the message is about.
    pub fn with_file(mut self, file_id: impl Into<String>) -> Self {
        self.file_id = Some(file_id.into());
        self
    }

    /// Attaches the operation the message is about.
    pub fn with_operation(mut self, operation_id: impl Into<String>) -> Self {
        self.operation_id = Some(operation_id.into());
        self
    }
}

/// Output of a build. Owned by the build call that produced it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildResult {
    /// The request this result answers.
    pub config: BuildConfig,
    /// One entry per compared pair of versions or groups.
    pub comparisons: Vec<VersionsComparison>,
    /// Everything that went wrong, in the order it happened.
    pub notifications: Vec<NotificationMessage>,
    /// Keyed by document slug.
    pub documents: BTreeMap<String, VersionDocument>,
    /// Keyed by operation id.
    pub operations: BTreeMap<String, ApiOperation>,
    /// Present for `mergedSpecification` builds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged: Option<Value>,
}

impl BuildResult {
    /// An empty result echoing `config`.
    pub fn new(config: BuildConfig) -> Self {
        Self {
            config,
            comparisons: vec![],
            notifications: vec![],
            documents: BTreeMap::new(),
            operations: BTreeMap::new(),
            merged: None,
        }
    }

    /// Notifications at `severity`.
    pub fn notifications_of(
        &self,
        severity: MessageSeverity,
    ) -> impl Iterator<Item = &NotificationMessage> {
        self.notifications
            .iter()
            .filter(move |n| n.severity == severity)
    }
}

/// The errors that can happen in this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to parse JSON, or to convert a JSON value into one of our types.
    #[error("failed to parse JSON")]
    Serde(#[from] serde_json::Error),
    /// Failed to parse YAML.
    #[error("failed to parse YAML")]
    Yaml(#[from] serde_yaml::Error),
    /// The request is malformed. The message names the field and its value.
    #[error("{message}")]
    Validation {
        /// Names the offending field and its value.
        message: String,
    },
    /// The build type has no strategy in this crate.
    #[error("build type {0:?} is not supported")]
    UnsupportedBuildType(BuildType),
    /// A resolver had nothing for a required lookup.
    #[error("{what} not found")]
    NotFound {
        /// What was looked up, e.g. `operations of petstore@1`.
        what: String,
    },
    /// A resolver failed.
    #[error("resolver failed: {0}")]
    Resolver(String),
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_type_wire_names() {
        let names: Vec<String> = [
            BuildType::Build,
            BuildType::ExportRestOperationsGroup,
            BuildType::ReducedSourceSpecifications,
            BuildType::PrefixGroupsChangelog,
        ]
        .iter()
        .map(|t| serde_json::to_value(t).unwrap().as_str().unwrap().to_owned())
        .collect();
        assert_eq!(
            names,
            [
                "build",
                "export_rest_operations_group",
                "reducedSourceSpecifications",
                "prefix-groups-changelog"
            ]
        );
    }

    #[test]
    fn config_defaults() {
        let config: BuildConfig = serde_json::from_str(
            r#"{
                "packageId": "petstore",
                "version": "2024.1",
                "files": [{ "fileId": "pets.yaml" }]
            }"#,
        )
        .unwrap();
        assert_eq!(config.build_type, BuildType::Build);
        assert_eq!(config.status, VersionStatus::Draft);
        assert!(config.files[0].publish);
        assert_eq!(config.previous_package_id(), "petstore");
        assert_eq!(
            config.validation_rules_severity.broken_refs,
            MessageSeverity::Error
        );
    }

    #[test]
    fn required_fields() {
        let err = BuildConfig::new("petstore", " ").validate_required().unwrap_err();
        assert_eq!(err.to_string(), "version is required");
        assert!(BuildConfig::new("petstore", "1").validate_required().is_ok());
    }

    #[test]
    fn api_kind_parse() {
        assert_eq!(ApiKind::parse("No-BWC"), Some(ApiKind::NoBwc));
        assert_eq!(ApiKind::parse("whatever"), None);
        assert_eq!(ApiAudience::parse("INTERNAL"), Some(ApiAudience::Internal));
    }
}
