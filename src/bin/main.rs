use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Error};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use apihub_builder::slug::{slugify, SlugOptions};
use apihub_builder::validation::ValidatorCache;
use apihub_builder::{
    ApiOperation, ApiType, BuildConfig, BuildConfigFile, BuildResult, BuildType,
    PackageVersionBuilder, Resolvers, VersionDocument, VersionInfo, VersionReference,
};

/// Build API package versions and changelogs from OpenAPI and AsyncAPI documents
#[derive(Parser)]
#[clap(about, version)]
struct Args {
    /// More logging; RUST_LOG overrides this
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a version from source files, comparing it with its previous version if given
    Build(BuildArgs),
    /// Compare two versions already in the registry
    Changelog(ChangelogArgs),
    /// Validate JSON or YAML documents against a JSON schema
    Validate(ValidateArgs),
    /// Print the slug of each text
    Slug(SlugArgs),
}

#[derive(Parser)]
struct RegistryArgs {
    /// Registry directory laid out as <package>/<version>/{operations,documents,info}.json
    #[clap(long, env = "APIHUB_REGISTRY")]
    registry: Option<PathBuf>,
    /// Write operations.json, documents.json, notifications.json and comparisons.json here
    /// instead of printing the result
    #[clap(long)]
    out: Option<PathBuf>,
}

#[derive(Parser)]
struct BuildArgs {
    /// Build config as JSON. Flags below override its fields
    #[clap(long)]
    config: Option<PathBuf>,
    #[clap(long)]
    package_id: Option<String>,
    #[clap(long)]
    version: Option<String>,
    #[clap(long)]
    previous_version: Option<String>,
    /// Merge all REST documents into one specification
    #[clap(long)]
    merged: bool,
    /// File ids are resolved relative to this directory
    #[clap(long, default_value = ".")]
    root: PathBuf,
    #[clap(flatten)]
    registry: RegistryArgs,
    /// Source files, added to those of the config
    files: Vec<String>,
}

#[derive(Parser)]
struct ChangelogArgs {
    #[clap(long)]
    package_id: String,
    #[clap(long)]
    version: String,
    /// Defaults to the previous version recorded in the registry
    #[clap(long)]
    previous_version: Option<String>,
    #[clap(long)]
    previous_package_id: Option<String>,
    /// Compare two path prefixes of `version`, e.g. `--groups /api/v2/ /api/v3/`
    #[clap(long, num_args = 2, value_names = ["PREVIOUS", "CURRENT"])]
    groups: Option<Vec<String>>,
    #[clap(flatten)]
    registry: RegistryArgs,
}

#[derive(Parser)]
struct ValidateArgs {
    /// The JSON schema
    schema: PathBuf,
    /// Documents to validate
    documents: Vec<PathBuf>,
}

#[derive(Parser)]
struct SlugArgs {
    /// One of document-id, title, operation-id, normalized-operation-id
    #[clap(long, default_value = "document-id")]
    preset: String,
    texts: Vec<String>,
}

/// Reads source files from a directory and versions from a registry directory.
struct FsResolvers {
    root: PathBuf,
    registry: Option<PathBuf>,
}

impl FsResolvers {
    async fn read(path: &Path) -> Result<Option<Vec<u8>>, apihub_builder::Error> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(apihub_builder::Error::Resolver(format!(
                "{}: {e}",
                path.display()
            ))),
        }
    }

    async fn registry_json<T: DeserializeOwned>(
        &self,
        package_id: &str,
        version: &str,
        name: &str,
    ) -> Result<Option<T>, apihub_builder::Error> {
        let Some(registry) = &self.registry else {
            return Ok(None);
        };
        let path = registry.join(package_id).join(version).join(name);
        match Self::read(&path).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl Resolvers for FsResolvers {
    async fn file_by_id(&self, file_id: &str) -> Result<Option<Vec<u8>>, apihub_builder::Error> {
        Self::read(&self.root.join(file_id)).await
    }

    async fn version_info(
        &self,
        package_id: &str,
        version: &str,
    ) -> Result<Option<VersionInfo>, apihub_builder::Error> {
        self.registry_json(package_id, version, "info.json").await
    }

    async fn version_operations(
        &self,
        package_id: &str,
        version: &str,
        api_type: Option<ApiType>,
    ) -> Result<Option<Vec<ApiOperation>>, apihub_builder::Error> {
        let operations: Option<Vec<ApiOperation>> = self
            .registry_json(package_id, version, "operations.json")
            .await?;
        Ok(operations.map(|operations| {
            operations
                .into_iter()
                .filter(|op| api_type.map_or(true, |t| op.api_type == t))
                .collect()
        }))
    }

    async fn version_references(
        &self,
        package_id: &str,
        version: &str,
    ) -> Result<Option<Vec<VersionReference>>, apihub_builder::Error> {
        self.registry_json(package_id, version, "references.json")
            .await
    }

    async fn version_documents(
        &self,
        package_id: &str,
        version: &str,
    ) -> Result<Option<Vec<VersionDocument>>, apihub_builder::Error> {
        self.registry_json(package_id, version, "documents.json")
            .await
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "apihub_builder=info",
        1 => "apihub_builder=debug",
        _ => "apihub_builder=trace",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, Error> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
}

async fn write_json(dir: &Path, name: &str, value: &impl Serialize) -> Result<(), Error> {
    let path = dir.join(name);
    tokio::fs::write(&path, serde_json::to_vec_pretty(value)?)
        .await
        .with_context(|| format!("writing {}", path.display()))
}

async fn emit(result: &BuildResult, out: Option<&Path>) -> Result<(), Error> {
    let Some(out) = out else {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    };
    tokio::fs::create_dir_all(out).await?;
    let operations: Vec<&ApiOperation> = result.operations.values().collect();
    let documents: Vec<&VersionDocument> = result.documents.values().collect();
    write_json(out, "operations.json", &operations).await?;
    write_json(out, "documents.json", &documents).await?;
    write_json(out, "notifications.json", &result.notifications).await?;
    write_json(out, "comparisons.json", &result.comparisons).await?;
    if let Some(merged) = &result.merged {
        write_json(out, "merged.json", merged).await?;
    }
    Ok(())
}

async fn build(args: BuildArgs) -> Result<BuildResult, Error> {
    let mut config = match &args.config {
        Some(path) => BuildConfig::from_json(read_json(path).await?)?,
        None => BuildConfig::default(),
    };
    if let Some(package_id) = args.package_id {
        config.package_id = package_id;
    }
    if let Some(version) = args.version {
        config.version = version;
    }
    if args.previous_version.is_some() {
        config.previous_version = args.previous_version;
    }
    if args.merged {
        config.build_type = BuildType::MergedSpecification;
    }
    config
        .files
        .extend(args.files.into_iter().map(BuildConfigFile::new));

    let resolvers = FsResolvers {
        root: args.root,
        registry: args.registry.registry,
    };
    let result = PackageVersionBuilder::new(config, resolvers).run().await?;
    emit(&result, args.registry.out.as_deref()).await?;
    Ok(result)
}

async fn changelog(args: ChangelogArgs) -> Result<BuildResult, Error> {
    let mut config = BuildConfig::new(args.package_id, args.version);
    config.previous_version = args.previous_version;
    config.previous_version_package_id = args.previous_package_id;
    config.build_type = BuildType::Changelog;
    if let Some(groups) = args.groups {
        config.build_type = BuildType::PrefixGroupsChangelog;
        config.previous_group = groups.first().cloned();
        config.current_group = groups.get(1).cloned();
    }

    let resolvers = FsResolvers {
        root: PathBuf::from("."),
        registry: args.registry.registry,
    };
    let result = PackageVersionBuilder::new(config, resolvers).run().await?;
    emit(&result, args.registry.out.as_deref()).await?;
    Ok(result)
}

async fn validate(args: ValidateArgs) -> Result<usize, Error> {
    let schema: serde_json::Value = read_json(&args.schema).await?;
    let schema = Arc::new(schema);
    let mut cache = ValidatorCache::default();
    let mut invalid = 0;
    for path in &args.documents {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let file_id = path.to_string_lossy();
        let data = apihub_builder::document::parse_file(&file_id, &bytes)?.data;
        let errors = cache.validate_document(&schema, &data);
        if !errors.is_empty() {
            invalid += 1;
        }
        for error in errors {
            println!("{}: {}", path.display(), serde_json::to_string(&error)?);
        }
    }
    Ok(invalid)
}

fn slug(args: SlugArgs) -> Result<(), Error> {
    let options = match args.preset.as_str() {
        "document-id" => SlugOptions::document_id(),
        "title" => SlugOptions::title(),
        "operation-id" => SlugOptions::operation_id(),
        "normalized-operation-id" => SlugOptions::normalized_operation_id(),
        other => anyhow::bail!("unknown preset {other:?}"),
    };
    let mut used = BTreeSet::new();
    for text in &args.texts {
        println!("{}", slugify(text, &options, &mut used));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();
    init_tracing(args.verbose);

    match args.command {
        Command::Build(args) => {
            build(args).await?;
        }
        Command::Changelog(args) => {
            changelog(args).await?;
        }
        Command::Validate(args) => {
            let invalid = validate(args).await?;
            if invalid > 0 {
                anyhow::bail!("{invalid} invalid document(s)");
            }
        }
        Command::Slug(args) => slug(args)?,
    }
    Ok(())
}
