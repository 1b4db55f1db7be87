//! Language strategies for mason.
//!
//! This crate implements the toolchain layer: the pluggable `Language` trait and
//! its name-keyed `LanguageRegistry`, the `golang` strategy (GOPATH workspace,
//! `go get` checkout, prep commands, `go test`, `gox` cross-compilation), a
//! toolchain-free `mock` strategy, the no-op `NullLanguage`, extra-artifact
//! rendering, and prerequisite checks for the external binaries involved.

mod command;
pub mod extras;
pub mod golang;
pub mod language;
pub mod mock;
pub mod null;
pub mod prereq;

pub use extras::build_extras;
pub use golang::GolangLanguage;
pub use language::{checkout_metadata, Language, LanguageRegistry};
pub use mock::{MockFailure, MockLanguage};
pub use null::NullLanguage;
pub use prereq::{check_golang_prereqs, check_signing_prereqs, format_missing, MissingPrereq};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to create workspace directory {}: {source}", path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("toolchain unavailable: {0}")]
    ToolchainMissing(String),
    #[error("failed to fetch {package}: {detail}")]
    FetchFailed { package: String, detail: String },
    #[error("failed to check out branch '{branch}': {detail}")]
    BranchNotFound { branch: String, detail: String },
    #[error("command failed: {command}: {detail}")]
    CommandFailed { command: String, detail: String },
    #[error("tests failed: {0}")]
    TestFailed(String),
    #[error("tests timed out (timeout {0})")]
    Timeout(String),
    #[error("build failed for target {target}: {detail}")]
    CompileFailed { target: String, detail: String },
    #[error("failed to generate extra artifact {}: {detail}", path.display())]
    ExtraArtifact { path: PathBuf, detail: String },
    #[error("unsupported language '{0}'")]
    UnsupportedLanguage(String),
    #[error("metadata error: {0}")]
    Metadata(#[from] mason_schema::MetadataError),
}
