use crate::artifacts::{
    ArtifactActions, ArtifactHandler, ArtifactOptions, LiveActions, ProcessedArtifact,
};
use crate::workspace::Workspace;
use crate::CoreError;
use mason_runtime::{checkout_metadata, Language, LanguageRegistry};
use mason_schema::{BuildMetadata, UserConfig};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Per-invocation knobs shared by the test and build pipelines.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Branch to check out; empty keeps whatever the fetch produced.
    pub branch: String,
    /// Reuse this directory instead of a temporary workspace.
    pub workdir: Option<PathBuf>,
    pub skip_tests: bool,
    /// Comma-separated build target names to leave out.
    pub skip_targets: String,
    /// Passed through to the test runner; empty means none.
    pub timeout: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub artifacts: Vec<ProcessedArtifact>,
    pub extras: Vec<ProcessedArtifact>,
}

/// Drives whole runs: resolve the language strategy, scope a workspace, then
/// checkout → prep → test → build → artifact handling.
pub struct Engine {
    registry: LanguageRegistry,
    actions: Box<dyn ArtifactActions>,
}

impl Engine {
    /// An engine with the built-in languages and live sign/publish/collect.
    pub fn new(user: UserConfig) -> Self {
        Self::with_parts(LanguageRegistry::with_builtins(), Box::new(LiveActions::new(user)))
    }

    pub fn with_parts(registry: LanguageRegistry, actions: Box<dyn ArtifactActions>) -> Self {
        Self { registry, actions }
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    pub fn language(&self, meta: &BuildMetadata) -> Result<Arc<dyn Language>, CoreError> {
        self.registry
            .resolve(meta.language())
            .map_err(CoreError::Language)
    }

    fn prepare(
        &self,
        lang: &dyn Language,
        meta: &BuildMetadata,
        opts: &RunOptions,
        ws: &Workspace,
    ) -> Result<PathBuf, CoreError> {
        let root = lang
            .create_work_dir(ws.root())
            .map_err(CoreError::Workspace)?;
        debug!("{} workspace at {}", lang.name(), root.display());

        info!("checking out {}", meta.package);
        lang.checkout(&root, meta, &opts.branch)
            .map_err(CoreError::Checkout)?;

        info!("running prep commands");
        lang.prep(&root, meta).map_err(CoreError::Prep)?;
        Ok(root)
    }

    fn run_tests(
        lang: &dyn Language,
        root: &Path,
        meta: &BuildMetadata,
        opts: &RunOptions,
    ) -> Result<(), CoreError> {
        info!("testing {}", meta.package);
        lang.test(root, &meta.package, &opts.timeout)
            .map_err(CoreError::Test)
    }

    /// Check out, prep and test.
    pub fn test(&self, meta: &BuildMetadata, opts: &RunOptions) -> Result<(), CoreError> {
        let lang = self.language(meta)?;
        let ws = Workspace::open(opts.workdir.as_deref())?;
        let root = self.prepare(lang.as_ref(), meta, opts, &ws)?;
        Self::run_tests(lang.as_ref(), &root, meta, opts)
    }

    /// Check out, prep, optionally test, build, then run every built artifact
    /// and extra through `artifacts`, collecting into `dest_dir`.
    ///
    /// Artifact handling follows the metadata found in the checkout, which may
    /// differ from the caller's copy.
    pub fn run(
        &self,
        meta: &BuildMetadata,
        opts: &RunOptions,
        artifacts: ArtifactOptions,
        dest_dir: &Path,
    ) -> Result<RunReport, CoreError> {
        let lang = self.language(meta)?;
        let ws = Workspace::open(opts.workdir.as_deref())?;
        let root = self.prepare(lang.as_ref(), meta, opts, &ws)?;

        if opts.skip_tests {
            debug!("skipping tests");
        } else {
            Self::run_tests(lang.as_ref(), &root, meta, opts)?;
        }

        info!("building {}", meta.package);
        lang.build(&root, meta, &opts.skip_targets)
            .map_err(CoreError::Build)?;

        let built = checkout_metadata(lang.as_ref(), &root, meta).map_err(CoreError::Build)?;
        let output_dir = lang.output_dir(&root, &built);
        let handler = ArtifactHandler::new(self.actions.as_ref());
        let report = RunReport {
            artifacts: handler.handle_artifacts(
                &built,
                &output_dir,
                dest_dir,
                artifacts,
                &opts.skip_targets,
            )?,
            extras: handler.handle_extras(&built, &output_dir, dest_dir, artifacts)?,
        };
        Ok(report)
    }

    /// Sign (unless `skip-signing` is set) and publish each declared publish
    /// target from `source_dir`, without building anything.
    pub fn publish_prebuilt(
        &self,
        meta: &BuildMetadata,
        source_dir: &Path,
    ) -> Result<Vec<ProcessedArtifact>, CoreError> {
        let sign = !meta.publish_info.skip_signing;
        let mut processed = Vec::new();
        for target in meta.publish_info.targets() {
            let path = source_dir.join(&target.src);
            let mut result = ProcessedArtifact {
                path: path.clone(),
                ..ProcessedArtifact::default()
            };
            if sign {
                result.signature = Some(self.actions.sign(meta, &path)?);
            }
            result.published = self.actions.publish(meta, &path)?;
            processed.push(result);
        }
        Ok(processed)
    }
}
