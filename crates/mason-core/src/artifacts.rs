use crate::CoreError;
use mason_remote::Publisher;
use mason_schema::{parse_skip_list, BuildMetadata, UserConfig};
use mason_signing::{resolve_signing_identity, sign_file, signature_path};
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Which per-artifact steps to run. The three are independent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArtifactOptions {
    pub sign: bool,
    pub publish: bool,
    pub collect: bool,
}

/// What happened to one artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessedArtifact {
    pub path: PathBuf,
    pub signature: Option<PathBuf>,
    /// URLs written; empty when not published or when no publish target names
    /// this file.
    pub published: Vec<String>,
    pub collected: Option<PathBuf>,
}

/// The sign, publish and collect steps applied to each artifact.
pub trait ArtifactActions {
    fn sign(&self, meta: &BuildMetadata, path: &Path) -> Result<PathBuf, CoreError>;
    fn publish(&self, meta: &BuildMetadata, path: &Path) -> Result<Vec<String>, CoreError>;
    fn collect(&self, path: &Path, dest_dir: &Path) -> Result<PathBuf, CoreError>;
}

/// Signs with the external signing program, publishes through a [`Publisher`]
/// and copies into the destination directory.
pub struct LiveActions {
    user: UserConfig,
    publisher: Publisher,
}

impl LiveActions {
    pub fn new(user: UserConfig) -> Self {
        let publisher = Publisher::new(user.clone());
        Self { user, publisher }
    }

    pub fn with_publisher(user: UserConfig, publisher: Publisher) -> Self {
        Self { user, publisher }
    }
}

impl ArtifactActions for LiveActions {
    fn sign(&self, meta: &BuildMetadata, path: &Path) -> Result<PathBuf, CoreError> {
        let wrap = |source| CoreError::Sign {
            path: path.to_path_buf(),
            source,
        };
        let identity = resolve_signing_identity(meta, &self.user).map_err(wrap)?;
        sign_file(path, &identity, meta).map_err(wrap)
    }

    fn publish(&self, meta: &BuildMetadata, path: &Path) -> Result<Vec<String>, CoreError> {
        let report = self
            .publisher
            .publish_file(meta, path)
            .map_err(|source| CoreError::Publish {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(report.map(|r| r.urls).unwrap_or_default())
    }

    fn collect(&self, path: &Path, dest_dir: &Path) -> Result<PathBuf, CoreError> {
        collect_file_and_signature(path, dest_dir).map_err(|source| CoreError::Collect {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Copy `path`, and `<path>.asc` when present, into `dest_dir` under their base
/// names. Copying a file onto itself is a no-op. Returns the collected path.
pub fn collect_file_and_signature(path: &Path, dest_dir: &Path) -> io::Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let dest = dest_dir.join(name);
    copy_unless_same(path, &dest)?;

    let sig = signature_path(path);
    if sig.exists() {
        if let Some(sig_name) = sig.file_name() {
            copy_unless_same(&sig, &dest_dir.join(sig_name))?;
        }
    }
    Ok(dest)
}

fn copy_unless_same(from: &Path, to: &Path) -> io::Result<()> {
    if to.exists() && fs::canonicalize(from)? == fs::canonicalize(to)? {
        debug!("{} is already in place", to.display());
        return Ok(());
    }
    fs::copy(from, to)?;
    debug!("collected {} -> {}", from.display(), to.display());
    Ok(())
}

/// File names a build target produces: `<anything>_<os>_<arch>`, optionally
/// with `.exe`.
pub fn target_pattern(os: &str, arch: &str) -> Regex {
    let pattern = format!(
        r"^.+_{}_{}(\.exe)?$",
        regex::escape(os),
        regex::escape(arch)
    );
    Regex::new(&pattern).expect("escaped target pattern is valid")
}

/// Runs sign → publish → collect over built artifacts.
///
/// Every step failure aborts the whole walk. Artifacts already processed keep
/// their side effects.
pub struct ArtifactHandler<'a> {
    actions: &'a dyn ArtifactActions,
}

impl<'a> ArtifactHandler<'a> {
    pub fn new(actions: &'a dyn ArtifactActions) -> Self {
        Self { actions }
    }

    /// Process the outputs of every build target not in `skip_targets`, in
    /// metadata order. Within a target, matching files go in file name order.
    pub fn handle_artifacts(
        &self,
        meta: &BuildMetadata,
        output_dir: &Path,
        dest_dir: &Path,
        options: ArtifactOptions,
        skip_targets: &str,
    ) -> Result<Vec<ProcessedArtifact>, CoreError> {
        let skip = parse_skip_list(skip_targets);
        let mut names = Vec::new();
        for entry in fs::read_dir(output_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_owned());
                }
            }
        }
        names.sort();

        let mut processed = Vec::new();
        for target in &meta.build_info.targets {
            if skip.contains(&target.name) {
                debug!("skipping artifacts for {}", target.name);
                continue;
            }
            let (os, arch) = target
                .os_arch()
                .ok_or_else(|| CoreError::InvalidTarget(target.name.clone()))?;
            let pattern = target_pattern(os, arch);

            let matched: Vec<&String> = names.iter().filter(|n| pattern.is_match(n)).collect();
            if matched.is_empty() {
                warn!("no artifacts found for target {}", target.name);
            }
            for name in matched {
                processed.push(self.process(meta, &output_dir.join(name), dest_dir, options)?);
            }
        }
        Ok(processed)
    }

    /// Process every declared extra artifact by its exact output file name. A
    /// missing extra is an error.
    pub fn handle_extras(
        &self,
        meta: &BuildMetadata,
        output_dir: &Path,
        dest_dir: &Path,
        options: ArtifactOptions,
    ) -> Result<Vec<ProcessedArtifact>, CoreError> {
        let mut processed = Vec::new();
        for extra in &meta.build_info.extras {
            let path = output_dir.join(&extra.file_name);
            if !path.is_file() {
                return Err(CoreError::MissingExtra(path));
            }
            processed.push(self.process(meta, &path, dest_dir, options)?);
        }
        Ok(processed)
    }

    fn process(
        &self,
        meta: &BuildMetadata,
        path: &Path,
        dest_dir: &Path,
        options: ArtifactOptions,
    ) -> Result<ProcessedArtifact, CoreError> {
        info!("processing {}", path.display());
        let mut result = ProcessedArtifact {
            path: path.to_path_buf(),
            ..ProcessedArtifact::default()
        };
        if options.sign {
            result.signature = Some(self.actions.sign(meta, path)?);
        }
        if options.publish {
            result.published = self.actions.publish(meta, path)?;
        }
        if options.collect {
            result.collected = Some(self.actions.collect(path, dest_dir)?);
        }
        Ok(result)
    }
}
