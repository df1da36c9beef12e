//! Lookups a build needs from the package registry.

use serde::{Deserialize, Serialize};

use crate::{ApiOperation, ApiType, Error, VersionDocument, VersionStatus};

/// Registry facts about one package version.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    /// Package of the version.
    pub package_id: String,
    /// The version.
    pub version: String,
    /// Publication status.
    #[serde(default)]
    pub status: VersionStatus,
    /// The version this one was published after.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<String>,
    /// Package of `previous_version`, when it is another package.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version_package_id: Option<String>,
}

/// A package version included by reference, as dashboards do.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VersionReference {
    /// Referenced package.
    pub package_id: String,
    /// Referenced version.
    pub version: String,
    /// Excluded references are listed but contribute nothing.
    #[serde(default)]
    pub excluded: bool,
}

/// Everything a build reads from outside.
///
/// Every lookup returns `Ok(None)` for "not found"; `Err` is reserved for a failing registry.
/// Only [`Resolvers::file_by_id`] and [`Resolvers::version_operations`] are mandatory.
#[allow(async_fn_in_trait)]
pub trait Resolvers {
    /// Raw bytes of a source file of the build.
    async fn file_by_id(&self, file_id: &str) -> Result<Option<Vec<u8>>, Error>;

    /// Registry facts about a version, including the version it follows.
    async fn version_info(
        &self,
        _package_id: &str,
        _version: &str,
    ) -> Result<Option<VersionInfo>, Error> {
        Ok(None)
    }

    /// Published operations of a version, optionally of one API type only.
    async fn version_operations(
        &self,
        package_id: &str,
        version: &str,
        api_type: Option<ApiType>,
    ) -> Result<Option<Vec<ApiOperation>>, Error>;

    /// Versions a dashboard version is made of.
    async fn version_references(
        &self,
        _package_id: &str,
        _version: &str,
    ) -> Result<Option<Vec<VersionReference>>, Error> {
        Ok(None)
    }

    /// Operations of a version that hold at least one deprecated item.
    async fn version_deprecated(
        &self,
        package_id: &str,
        version: &str,
    ) -> Result<Option<Vec<ApiOperation>>, Error> {
        let operations = self.version_operations(package_id, version, None).await?;
        Ok(operations.map(|operations| {
            operations
                .into_iter()
                .filter(|op| !op.deprecated_items.is_empty())
                .collect()
        }))
    }

    /// Documents of a version. `data` may be `null`, see [`Resolvers::raw_document`].
    async fn version_documents(
        &self,
        _package_id: &str,
        _version: &str,
    ) -> Result<Option<Vec<VersionDocument>>, Error> {
        Ok(None)
    }

    /// Source of one document of a version, by slug.
    async fn raw_document(
        &self,
        _package_id: &str,
        _version: &str,
        _slug: &str,
    ) -> Result<Option<Vec<u8>>, Error> {
        Ok(None)
    }

    /// JSON or YAML skeleton for the merged specification of a version, optionally of one
    /// group. Its top-level fields such as `info`, `servers` or `tags` are kept in the merge.
    async fn template(
        &self,
        _api_type: ApiType,
        _version: &str,
        _group: Option<&str>,
    ) -> Result<Option<String>, Error> {
        Ok(None)
    }
}

/// Operations of a version, following dashboard references when the version has none of its
/// own.
pub async fn load_operations<R: Resolvers>(
    resolvers: &R,
    package_id: &str,
    version: &str,
    api_type: Option<ApiType>,
) -> Result<Vec<ApiOperation>, Error> {
    if let Some(operations) = resolvers
        .version_operations(package_id, version, api_type)
        .await?
    {
        return Ok(operations);
    }

    let Some(references) = resolvers.version_references(package_id, version).await? else {
        return Err(Error::not_found(format!(
            "operations of {package_id}@{version}"
        )));
    };
    let mut operations = vec![];
    for reference in references.iter().filter(|r| !r.excluded) {
        let referenced = resolvers
            .version_operations(&reference.package_id, &reference.version, api_type)
            .await?
            .ok_or_else(|| {
                Error::not_found(format!(
                    "operations of {}@{}",
                    reference.package_id, reference.version
                ))
            })?;
        operations.extend(referenced);
    }
    Ok(operations)
}
