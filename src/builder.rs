use tracing::info;

use crate::diff_walker::{DiffEngine, StructuralDiffEngine};
use crate::resolver::Resolvers;
use crate::strategy::{
    BuildContext, BuildStrategy, BuildVersionStrategy, ChangelogStrategy,
    MergedSpecificationStrategy, PrefixGroupsChangelogStrategy,
};
use crate::{BuildConfig, BuildResult, BuildType, Error};

/// Runs one build described by a [`BuildConfig`].
///
/// ```no_run
/// # use apihub_builder::{Error, Resolvers};
/// # async fn example(resolvers: impl Resolvers) -> Result<(), Error> {
/// use apihub_builder::{BuildConfig, PackageVersionBuilder};
///
/// let config = BuildConfig::new("petstore", "2024.1");
/// let result = PackageVersionBuilder::new(config, resolvers).run().await?;
/// println!("{} operations", result.operations.len());
/// # Ok(())
/// # }
/// ```
pub struct PackageVersionBuilder<R> {
    config: BuildConfig,
    resolvers: R,
    engine: Box<dyn DiffEngine>,
}

impl<R: Resolvers> PackageVersionBuilder<R> {
    /// A builder comparing with [`StructuralDiffEngine`].
    pub fn new(config: BuildConfig, resolvers: R) -> Self {
        Self {
            config,
            resolvers,
            engine: Box::new(StructuralDiffEngine),
        }
    }

    /// Replaces the diff engine.
    pub fn with_engine(mut self, engine: impl DiffEngine + 'static) -> Self {
        self.engine = Box::new(engine);
        self
    }

    /// The request this builder runs.
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Runs the strategy of the configured build type.
    pub async fn run(&self) -> Result<BuildResult, Error> {
        let config = &self.config;
        config.validate_required()?;
        info!(
            package_id = %config.package_id,
            version = %config.version,
            build_type = ?config.build_type,
            files = config.files.len(),
            "build started"
        );

        let ctx = BuildContext {
            resolvers: &self.resolvers,
            engine: self.engine.as_ref(),
        };
        let mut result = BuildResult::new(config.clone());
        match config.build_type {
            BuildType::Build => BuildVersionStrategy.execute(config, &mut result, &ctx).await?,
            BuildType::Changelog => ChangelogStrategy.execute(config, &mut result, &ctx).await?,
            BuildType::PrefixGroupsChangelog => {
                PrefixGroupsChangelogStrategy
                    .execute(config, &mut result, &ctx)
                    .await?
            }
            BuildType::MergedSpecification => {
                MergedSpecificationStrategy
                    .execute(config, &mut result, &ctx)
                    .await?
            }
            other @ (BuildType::ExportVersion
            | BuildType::ExportRestDocument
            | BuildType::ExportRestOperationsGroup
            | BuildType::ReducedSourceSpecifications) => {
                return Err(Error::UnsupportedBuildType(other))
            }
        }

        info!(
            documents = result.documents.len(),
            operations = result.operations.len(),
            comparisons = result.comparisons.len(),
            notifications = result.notifications.len(),
            "build finished"
        );
        Ok(result)
    }
}
