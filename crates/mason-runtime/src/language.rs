use crate::null::NullLanguage;
use crate::RuntimeError;
use mason_schema::{read_metadata, BuildMetadata, MetadataError, METADATA_FILENAME};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A per-toolchain build strategy.
///
/// Every operation receives the workspace root returned by
/// [`Language::create_work_dir`] and runs its subprocesses with an explicit
/// working directory and environment; the process cwd is never changed.
pub trait Language: Send + Sync {
    fn name(&self) -> &str;

    /// Materialize an empty, strategy-specific layout under `root` and return
    /// the workspace root to pass to the other operations.
    fn create_work_dir(&self, root: &Path) -> Result<PathBuf, RuntimeError>;

    /// Fetch the package source into the workspace and, when `branch` is
    /// non-empty, switch to it.
    fn checkout(
        &self,
        workspace: &Path,
        meta: &BuildMetadata,
        branch: &str,
    ) -> Result<(), RuntimeError>;

    /// Run the prep commands in order, stopping at the first failure.
    fn prep(&self, workspace: &Path, meta: &BuildMetadata) -> Result<(), RuntimeError>;

    /// Run the test suite for `module`. An empty `timeout` means none.
    fn test(&self, workspace: &Path, module: &str, timeout: &str) -> Result<(), RuntimeError>;

    /// Cross-compile every target not named in `skip_targets` (comma-separated),
    /// then render the extra artifacts.
    fn build(
        &self,
        workspace: &Path,
        meta: &BuildMetadata,
        skip_targets: &str,
    ) -> Result<(), RuntimeError>;

    /// Directory where `build` leaves its outputs.
    fn output_dir(&self, workspace: &Path, meta: &BuildMetadata) -> PathBuf;
}

/// The metadata checked into the checkout, which may differ from the caller's
/// copy. Falls back to `meta` when the checkout carries none.
pub fn checkout_metadata(
    lang: &dyn Language,
    workspace: &Path,
    meta: &BuildMetadata,
) -> Result<BuildMetadata, RuntimeError> {
    let path = lang.output_dir(workspace, meta).join(METADATA_FILENAME);
    match read_metadata(&path) {
        Ok(md) => Ok(md),
        Err(MetadataError::NotFound(_)) => {
            tracing::debug!(
                "no {METADATA_FILENAME} in checkout, using caller's metadata for {}",
                meta.package
            );
            Ok(meta.clone())
        }
        Err(e) => Err(e.into()),
    }
}

/// Name-keyed strategy lookup, populated explicitly at process start.
#[derive(Default)]
pub struct LanguageRegistry {
    languages: BTreeMap<String, Arc<dyn Language>>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in `golang` and `mock` strategies.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("golang", Arc::new(crate::golang::GolangLanguage::new()));
        registry.register("mock", Arc::new(crate::mock::MockLanguage::new()));
        registry
    }

    /// Register `lang` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: &str, lang: Arc<dyn Language>) {
        tracing::trace!("registering language strategy '{name}'");
        self.languages.insert(name.to_owned(), lang);
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Language>, RuntimeError> {
        self.languages
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::UnsupportedLanguage(name.to_owned()))
    }

    /// Like [`resolve`](Self::resolve), but always hands back a usable strategy:
    /// on a miss, the no-op [`NullLanguage`] paired with the lookup error.
    pub fn resolve_or_null(&self, name: &str) -> (Arc<dyn Language>, Option<RuntimeError>) {
        match self.resolve(name) {
            Ok(lang) => (lang, None),
            Err(e) => (Arc::new(NullLanguage), Some(e)),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.languages.keys().map(String::as_str).collect()
    }
}
