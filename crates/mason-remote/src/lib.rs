//! Publishing of built artifacts to remote stores.
//!
//! This crate resolves upload credentials from the user config and metadata
//! (`get_credentials`), renders each declared publish destination, and uploads
//! the artifact plus its optional detached signature and checksum documents
//! (`Publisher`). Uploads go through a `Transport`: plain HTTP PUT with
//! checksum headers and basic auth, or SigV4-signed S3 object writes with
//! directory marker objects.

pub mod aws;
pub mod credentials;
pub mod http;
pub mod publish;
pub mod s3;
pub mod sigv4;

pub use aws::AwsCredentials;
pub use credentials::{get_credentials, Credentials};
pub use http::HttpTransport;
pub use publish::{PublishReport, Publisher};
pub use s3::{dirs_for_key, S3Location, S3Transport};

use mason_signing::Checksums;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("HTTP {code} for {method} {url}")]
    Status {
        method: &'static str,
        url: String,
        code: u16,
    },
    #[error("{field} command failed: {detail}")]
    CredentialCommand { field: &'static str, detail: String },
    #[error("AWS credentials: {0}")]
    AwsCredentials(String),
    #[error("failed to render publish destination: {0}")]
    Template(#[from] mason_schema::TemplateError),
    #[error("checksum error: {0}")]
    Checksum(#[from] mason_signing::SigningError),
    #[error("signature requested but {0} does not exist")]
    MissingSignature(String),
    #[error("invalid artifact path: {0}")]
    InvalidPath(String),
}

/// Upload transport for one fully rendered destination URL.
pub trait Transport: Send + Sync {
    fn upload(
        &self,
        url: &str,
        data: &[u8],
        sums: &Checksums,
        creds: &Credentials,
    ) -> Result<(), RemoteError>;
}

/// Routes S3 URLs (`https://<bucket>.s3.<region>.amazonaws.com/<key>`) to
/// [`S3Transport`] and everything else to [`HttpTransport`].
pub struct DefaultTransport {
    http: HttpTransport,
}

impl Default for DefaultTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultTransport {
    pub fn new() -> Self {
        Self {
            http: HttpTransport::new(),
        }
    }
}

impl Transport for DefaultTransport {
    fn upload(
        &self,
        url: &str,
        data: &[u8],
        sums: &Checksums,
        creds: &Credentials,
    ) -> Result<(), RemoteError> {
        if S3Location::parse(url).is_some() {
            let s3 = S3Transport::new(AwsCredentials::load()?);
            s3.upload(url, data, sums, creds)
        } else {
            self.http.upload(url, data, sums, creds)
        }
    }
}
