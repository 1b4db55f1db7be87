//! Pipeline core for mason.
//!
//! Ties the metadata model, language strategies, signing engine and publisher
//! together: [`ArtifactHandler`] walks built targets and extras through
//! sign → publish → collect, and [`Engine`] drives whole runs (checkout, prep,
//! test, build, artifact handling) inside a scoped [`Workspace`].

pub mod artifacts;
pub mod engine;
pub mod workspace;

pub use artifacts::{
    collect_file_and_signature, target_pattern, ArtifactActions, ArtifactHandler,
    ArtifactOptions, LiveActions, ProcessedArtifact,
};
pub use engine::{Engine, RunOptions, RunReport};
pub use workspace::Workspace;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("metadata error: {0}")]
    Metadata(#[from] mason_schema::MetadataError),
    #[error("user config error: {0}")]
    UserConfig(#[from] mason_schema::UserConfigError),
    #[error("language error: {0}")]
    Language(#[source] mason_runtime::RuntimeError),
    #[error("workspace error: {0}")]
    Workspace(#[source] mason_runtime::RuntimeError),
    #[error("checkout failed: {0}")]
    Checkout(#[source] mason_runtime::RuntimeError),
    #[error("prep failed: {0}")]
    Prep(#[source] mason_runtime::RuntimeError),
    #[error("test failed: {0}")]
    Test(#[source] mason_runtime::RuntimeError),
    #[error("build failed: {0}")]
    Build(#[source] mason_runtime::RuntimeError),
    #[error("failed to sign {}: {source}", path.display())]
    Sign {
        path: PathBuf,
        #[source]
        source: mason_signing::SigningError,
    },
    #[error("failed to publish {}: {source}", path.display())]
    Publish {
        path: PathBuf,
        #[source]
        source: mason_remote::RemoteError,
    },
    #[error("failed to collect {}: {source}", path.display())]
    Collect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("build target '{0}' is not of the form <os>/<arch>")]
    InvalidTarget(String),
    #[error("extra artifact {} was not built", .0.display())]
    MissingExtra(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
