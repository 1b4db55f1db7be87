//! Checksums and detached signatures for mason artifacts.
//!
//! Digests (md5, sha1, sha256) are computed in-process; signing and verification
//! shell out to an external program (gpg by default) and never touch key
//! material directly.

pub mod checksum;
pub mod gpg;
pub mod identity;

pub use checksum::{
    all_checksums_bytes, all_checksums_file, checksum_bytes, checksum_file, checksum_line,
    Algorithm, Checksums,
};
pub use gpg::{signature_path, sign_file, verify_file};
pub use identity::{resolve_signing_identity, SigningIdentity};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no signing identity: set signing.email in metadata.json or email in ~/.mason")]
    NoIdentity,
    #[error("signing program '{0}' not found in PATH")]
    ProgramMissing(String),
    #[error("failed to sign {}: {detail}", path.display())]
    SignFailed { path: PathBuf, detail: String },
    #[error("failed to verify {}: {detail}", path.display())]
    VerifyFailed { path: PathBuf, detail: String },
    #[error("signature file {} not found", .0.display())]
    SignatureMissing(PathBuf),
    #[error("option '{0}' must be a string")]
    InvalidOption(String),
}
