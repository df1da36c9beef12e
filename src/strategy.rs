//! One strategy per build type.

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::compare::{carry_deprecation_history, compare_operations, VersionOperations};
use crate::diff_walker::DiffEngine;
use crate::document::{apply_rest_template, merge_rest_documents, parse_file, DocumentBuilder};
use crate::resolver::{load_operations, Resolvers};
use crate::{
    ApiType, BuildConfig, BuildResult, Error, MessageSeverity, NotificationMessage,
    VersionDocument,
};

/// What a strategy may use besides the config.
pub struct BuildContext<'a, R> {
    /// Registry and file lookups.
    pub resolvers: &'a R,
    /// Diffs matched operation pairs.
    pub engine: &'a dyn DiffEngine,
}

/// Fills a [`BuildResult`] for one build type.
#[allow(async_fn_in_trait)]
pub trait BuildStrategy {
    /// Runs the build type of `config`, adding to `result`.
    async fn execute<R: Resolvers>(
        &self,
        config: &BuildConfig,
        result: &mut BuildResult,
        ctx: &BuildContext<'_, R>,
    ) -> Result<(), Error>;
}

/// Builds the files of the config into documents and operations, then compares with
/// `previous_version` when there is one.
#[derive(Default, Clone, Copy, Debug)]
pub struct BuildVersionStrategy;

impl BuildStrategy for BuildVersionStrategy {
    async fn execute<R: Resolvers>(
        &self,
        config: &BuildConfig,
        result: &mut BuildResult,
        ctx: &BuildContext<'_, R>,
    ) -> Result<(), Error> {
        let mut builder = DocumentBuilder::new(config);

        for file in &config.files {
            let Some(bytes) = ctx.resolvers.file_by_id(&file.file_id).await? else {
                result.notifications.push(
                    NotificationMessage::new(MessageSeverity::Error, "file not found")
                        .with_file(&file.file_id),
                );
                continue;
            };
            let parsed = match parse_file(&file.file_id, &bytes) {
                Ok(parsed) => parsed,
                Err(error) => {
                    warn!(file_id = %file.file_id, %error, "unparsable file");
                    result.notifications.push(
                        NotificationMessage::new(MessageSeverity::Error, error.to_string())
                            .with_file(&file.file_id),
                    );
                    continue;
                }
            };
            let Some(mut output) = builder.build(file, parsed, &mut result.notifications) else {
                continue;
            };
            result.notifications.append(&mut output.notifications);

            let mut dependencies: BTreeSet<String> =
                output.document.dependencies.drain(..).collect();
            for operation in output.operations {
                let Some(existing) = result.operations.get(&operation.operation_id) else {
                    result
                        .operations
                        .insert(operation.operation_id.clone(), operation);
                    continue;
                };
                let first_file = result
                    .documents
                    .get(&existing.document_id)
                    .map(|d| d.file_id.clone())
                    .unwrap_or_default();
                warn!(
                    operation_id = %operation.operation_id,
                    first = %first_file,
                    duplicate = %file.file_id,
                    "duplicate operation"
                );
                result.notifications.push(
                    NotificationMessage::new(
                        MessageSeverity::Warning,
                        format!(
                            "operation {} is defined in {} and {}, the first one is kept",
                            operation.operation_id, first_file, file.file_id
                        ),
                    )
                    .with_file(&file.file_id)
                    .with_operation(&operation.operation_id),
                );
                dependencies.insert(first_file);
            }
            output.document.dependencies = dependencies.into_iter().collect();
            result
                .documents
                .insert(output.document.slug.clone(), output.document);
        }

        info!(
            documents = result.documents.len(),
            operations = result.operations.len(),
            "version built"
        );

        let Some(previous_version) = &config.previous_version else {
            return Ok(());
        };
        let previous_package_id = config.previous_package_id();

        let previous_operations =
            load_operations(ctx.resolvers, previous_package_id, previous_version, None).await?;
        carry_deprecation_history(
            &previous_operations,
            result.operations.values_mut(),
            previous_version,
        );

        let previous = VersionOperations::new(
            previous_package_id,
            previous_version.clone(),
            previous_operations,
        );
        let current = VersionOperations::new(
            &config.package_id,
            &config.version,
            result.operations.values().cloned().collect(),
        );
        result
            .comparisons
            .push(compare_operations(&previous, &current, ctx.engine)?);
        Ok(())
    }
}

/// Compares two published versions.
#[derive(Default, Clone, Copy, Debug)]
pub struct ChangelogStrategy;

impl BuildStrategy for ChangelogStrategy {
    async fn execute<R: Resolvers>(
        &self,
        config: &BuildConfig,
        result: &mut BuildResult,
        ctx: &BuildContext<'_, R>,
    ) -> Result<(), Error> {
        let (previous_package_id, previous_version) = match &config.previous_version {
            Some(version) => (config.previous_package_id().to_owned(), version.clone()),
            None => {
                let info = ctx
                    .resolvers
                    .version_info(&config.package_id, &config.version)
                    .await?;
                match info.and_then(|i| Some((i.previous_version_package_id, i.previous_version?)))
                {
                    Some((package_id, version)) => (
                        package_id.unwrap_or_else(|| config.previous_package_id().to_owned()),
                        version,
                    ),
                    None => {
                        return Err(Error::validation(format!(
                            "previousVersion is required: {}@{} has no previous version",
                            config.package_id, config.version
                        )))
                    }
                }
            }
        };
        debug!(%previous_package_id, %previous_version, "changelog");

        let previous = VersionOperations::new(
            previous_package_id.clone(),
            previous_version.clone(),
            load_operations(ctx.resolvers, &previous_package_id, &previous_version, None).await?,
        );
        let current = VersionOperations::new(
            &config.package_id,
            &config.version,
            load_operations(ctx.resolvers, &config.package_id, &config.version, None).await?,
        );
        result
            .comparisons
            .push(compare_operations(&previous, &current, ctx.engine)?);
        Ok(())
    }
}

/// Compares two path-prefix groups of the same version, e.g. `/api/v2/` with `/api/v3/`.
#[derive(Default, Clone, Copy, Debug)]
pub struct PrefixGroupsChangelogStrategy;

impl PrefixGroupsChangelogStrategy {
    /// Both groups, or an error naming every bad one.
    pub fn validate(config: &BuildConfig) -> Result<(&str, &str), Error> {
        let current = check_group("currentGroup", config.current_group.as_deref());
        let previous = check_group("previousGroup", config.previous_group.as_deref());
        match (current, previous) {
            (Ok(current), Ok(previous)) => Ok((current, previous)),
            (current, previous) => {
                let messages: Vec<String> = [current.err(), previous.err()]
                    .into_iter()
                    .flatten()
                    .collect();
                Err(Error::validation(messages.join("; ")))
            }
        }
    }
}

const GROUP_SHAPE: &str = "must start and end with \"/\" and contain at least one character";

fn check_group<'a>(name: &str, group: Option<&'a str>) -> Result<&'a str, String> {
    match group {
        None | Some("") => Err(format!("{name} is required")),
        Some(group) if group.len() < 3 || !group.starts_with('/') || !group.ends_with('/') => {
            Err(format!("{name} \"{group}\" {GROUP_SHAPE}"))
        }
        Some(group) => Ok(group),
    }
}

impl BuildStrategy for PrefixGroupsChangelogStrategy {
    async fn execute<R: Resolvers>(
        &self,
        config: &BuildConfig,
        result: &mut BuildResult,
        ctx: &BuildContext<'_, R>,
    ) -> Result<(), Error> {
        let (current_group, previous_group) = Self::validate(config)?;

        let operations = load_operations(
            ctx.resolvers,
            &config.package_id,
            &config.version,
            Some(ApiType::Rest),
        )
        .await?;
        let previous = VersionOperations::grouped(
            &config.package_id,
            &config.version,
            operations.iter().cloned(),
            previous_group,
        );
        let current = VersionOperations::grouped(
            &config.package_id,
            &config.version,
            operations,
            current_group,
        );
        debug!(
            previous = previous.operations.len(),
            current = current.operations.len(),
            "grouped operations"
        );
        result
            .comparisons
            .push(compare_operations(&previous, &current, ctx.engine)?);
        Ok(())
    }
}

/// A [`BuildVersionStrategy`] build whose REST documents are then merged into one
/// specification. Without files the stored documents of the version are merged.
#[derive(Default, Clone, Copy, Debug)]
pub struct MergedSpecificationStrategy;

impl BuildStrategy for MergedSpecificationStrategy {
    async fn execute<R: Resolvers>(
        &self,
        config: &BuildConfig,
        result: &mut BuildResult,
        ctx: &BuildContext<'_, R>,
    ) -> Result<(), Error> {
        let documents = if config.files.is_empty() {
            stored_documents(config, ctx.resolvers).await?
        } else {
            BuildVersionStrategy.execute(config, result, ctx).await?;
            result.documents.values().cloned().collect()
        };

        let (mut merged, mut notifications) = merge_rest_documents(config, &documents);
        result.notifications.append(&mut notifications);

        let template = ctx
            .resolvers
            .template(
                ApiType::Rest,
                &config.version,
                config.current_group.as_deref(),
            )
            .await?;
        if let Some(template) = template {
            match serde_yaml::from_str::<Value>(&template) {
                Ok(template) => apply_rest_template(&mut merged, &template),
                Err(e) => result.notifications.push(NotificationMessage::new(
                    MessageSeverity::Warning,
                    format!("merge template ignored: {e}"),
                )),
            }
        }
        result.merged = Some(merged);
        Ok(())
    }
}

async fn stored_documents<R: Resolvers>(
    config: &BuildConfig,
    resolvers: &R,
) -> Result<Vec<VersionDocument>, Error> {
    let Some(mut documents) = resolvers
        .version_documents(&config.package_id, &config.version)
        .await?
    else {
        return Err(Error::not_found(format!(
            "documents of {}@{}",
            config.package_id, config.version
        )));
    };

    for document in documents.iter_mut().filter(|d| d.data.is_null()) {
        let bytes = resolvers
            .raw_document(&config.package_id, &config.version, &document.slug)
            .await?
            .ok_or_else(|| Error::not_found(format!("document {}", document.slug)))?;
        document.data = parse_file(&document.file_id, &bytes)?.data;
    }
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups(current: Option<&str>, previous: Option<&str>) -> BuildConfig {
        BuildConfig {
            current_group: current.map(str::to_owned),
            previous_group: previous.map(str::to_owned),
            ..BuildConfig::new("petstore", "1")
        }
    }

    #[test]
    fn valid_groups() {
        let config = groups(Some("/api/v3/"), Some("/api/v2/"));
        let (current, previous) = PrefixGroupsChangelogStrategy::validate(&config).unwrap();
        assert_eq!((current, previous), ("/api/v3/", "/api/v2/"));
    }

    #[test]
    fn invalid_groups_are_named_with_their_value() {
        let config = groups(Some("/api/v3/"), Some("api/v2"));
        let message = PrefixGroupsChangelogStrategy::validate(&config)
            .unwrap_err()
            .to_string();
        assert!(message.contains("previousGroup"));
        assert!(message.contains("api/v2"));
        assert!(message.contains("start and end with \"/\""));

        let config = groups(Some("//"), None);
        let message = PrefixGroupsChangelogStrategy::validate(&config)
            .unwrap_err()
            .to_string();
        insta::assert_snapshot!(
            message.replace("; ", "\n"),
            @r###"
        currentGroup "//" must start and end with "/" and contain at least one character
        previousGroup is required
        "###
        );
    }
}
