use crate::language::Language;
use crate::RuntimeError;
use mason_schema::BuildMetadata;
use std::path::{Path, PathBuf};

/// A strategy that does nothing and always succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLanguage;

impl Language for NullLanguage {
    fn name(&self) -> &'static str {
        "null"
    }

    fn create_work_dir(&self, root: &Path) -> Result<PathBuf, RuntimeError> {
        Ok(root.to_path_buf())
    }

    fn checkout(&self, _: &Path, _: &BuildMetadata, _: &str) -> Result<(), RuntimeError> {
        Ok(())
    }

    fn prep(&self, _: &Path, _: &BuildMetadata) -> Result<(), RuntimeError> {
        Ok(())
    }

    fn test(&self, _: &Path, _: &str, _: &str) -> Result<(), RuntimeError> {
        Ok(())
    }

    fn build(&self, _: &Path, _: &BuildMetadata, _: &str) -> Result<(), RuntimeError> {
        Ok(())
    }

    fn output_dir(&self, workspace: &Path, _: &BuildMetadata) -> PathBuf {
        workspace.to_path_buf()
    }
}
