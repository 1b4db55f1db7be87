use crate::extras::build_extras;
use crate::language::{checkout_metadata, Language};
use crate::RuntimeError;
use mason_schema::{parse_skip_list, BuildMetadata, METADATA_FILENAME};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Pipeline phase at which a [`MockLanguage`] is told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Checkout,
    Prep,
    Test,
    Build,
}

/// A toolchain-free strategy for tests and dry runs.
///
/// `checkout` copies an optional source directory into `<ws>/src/<package>` and
/// writes the caller's metadata there; `build` writes a placeholder file named
/// `<basename>_<os>_<arch>` per target, then renders the extras.
#[derive(Debug, Clone, Default)]
pub struct MockLanguage {
    source: Option<PathBuf>,
    failure: Option<MockFailure>,
}

impl MockLanguage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed each checkout with the files under `dir` (templates, fixtures).
    #[must_use]
    pub fn with_source(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source = Some(dir.into());
        self
    }

    #[must_use]
    pub fn failing_at(mut self, phase: MockFailure) -> Self {
        self.failure = Some(phase);
        self
    }

    fn fails_at(&self, phase: MockFailure) -> bool {
        self.failure == Some(phase)
    }

    /// File name prefix of built binaries: the last segment of the package path.
    pub fn binary_prefix(meta: &BuildMetadata) -> &str {
        meta.package.rsplit('/').next().unwrap_or(&meta.package)
    }
}

fn copy_tree(from: &Path, to: &Path) -> Result<(), RuntimeError> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

impl Language for MockLanguage {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn create_work_dir(&self, root: &Path) -> Result<PathBuf, RuntimeError> {
        let ws = root.join("mock");
        let src = ws.join("src");
        fs::create_dir_all(&src).map_err(|source| RuntimeError::Workspace { path: src, source })?;
        Ok(ws)
    }

    fn checkout(
        &self,
        workspace: &Path,
        meta: &BuildMetadata,
        branch: &str,
    ) -> Result<(), RuntimeError> {
        if self.fails_at(MockFailure::Checkout) {
            return Err(RuntimeError::FetchFailed {
                package: meta.package.clone(),
                detail: "mock checkout failure".to_owned(),
            });
        }

        let dir = self.output_dir(workspace, meta);
        match &self.source {
            Some(source) => copy_tree(source, &dir)?,
            None => fs::create_dir_all(&dir)?,
        }
        if !dir.join(METADATA_FILENAME).exists() {
            let json = serde_json::to_string_pretty(meta).map_err(|e| {
                RuntimeError::FetchFailed {
                    package: meta.package.clone(),
                    detail: e.to_string(),
                }
            })?;
            fs::write(dir.join(METADATA_FILENAME), json)?;
        }
        info!("mock checkout of {} (branch '{branch}')", meta.package);
        Ok(())
    }

    fn prep(&self, workspace: &Path, meta: &BuildMetadata) -> Result<(), RuntimeError> {
        let md = checkout_metadata(self, workspace, meta)?;
        if self.fails_at(MockFailure::Prep) {
            return Err(RuntimeError::CommandFailed {
                command: md.build_info.prep_commands.first().cloned().unwrap_or_default(),
                detail: "mock prep failure".to_owned(),
            });
        }
        debug!(
            "mock prep: skipping {} command(s)",
            md.build_info.prep_commands.len()
        );
        Ok(())
    }

    fn test(&self, _workspace: &Path, module: &str, _timeout: &str) -> Result<(), RuntimeError> {
        if self.fails_at(MockFailure::Test) {
            return Err(RuntimeError::TestFailed(format!("mock failure in {module}")));
        }
        Ok(())
    }

    fn build(
        &self,
        workspace: &Path,
        meta: &BuildMetadata,
        skip_targets: &str,
    ) -> Result<(), RuntimeError> {
        let md = checkout_metadata(self, workspace, meta)?;
        let dir = self.output_dir(workspace, &md);
        fs::create_dir_all(&dir)?;
        let skip = parse_skip_list(skip_targets);
        let prefix = Self::binary_prefix(&md);

        for target in &md.build_info.targets {
            if skip.contains(&target.name) {
                info!("skipping target {}", target.name);
                continue;
            }
            if self.fails_at(MockFailure::Build) {
                return Err(RuntimeError::CompileFailed {
                    target: target.name.clone(),
                    detail: "mock build failure".to_owned(),
                });
            }
            let (os, arch) = target.os_arch().ok_or_else(|| RuntimeError::CompileFailed {
                target: target.name.clone(),
                detail: "target name must be <os>/<arch>".to_owned(),
            })?;
            let path = dir.join(format!("{prefix}_{os}_{arch}"));
            fs::write(
                &path,
                format!("mock binary {} {} {}\n", md.package, md.version, target.name),
            )?;
            debug!("wrote {}", path.display());
        }

        build_extras(&md, &dir)
    }

    fn output_dir(&self, workspace: &Path, meta: &BuildMetadata) -> PathBuf {
        workspace.join("src").join(&meta.package)
    }
}
