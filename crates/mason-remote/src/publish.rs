use crate::{get_credentials, Credentials, DefaultTransport, RemoteError, Transport};
use mason_schema::{render_template, BuildMetadata, UserConfig};
use mason_signing::{all_checksums_bytes, checksum_line, signature_path, Algorithm, Checksums};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// URLs written by a single [`Publisher::publish_file`] call, in upload order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub urls: Vec<String>,
}

pub struct Publisher {
    transport: Box<dyn Transport>,
    user: UserConfig,
}

impl Publisher {
    pub fn new(user: UserConfig) -> Self {
        Self::with_transport(Box::new(DefaultTransport::new()), user)
    }

    pub fn with_transport(transport: Box<dyn Transport>, user: UserConfig) -> Self {
        Self { transport, user }
    }

    /// Publish one built file according to the publish target declared for its
    /// base name.
    ///
    /// Files without a declared target are skipped and `Ok(None)` is returned.
    /// Otherwise the file goes to the rendered `dst`, followed by `<dst>.asc`
    /// when `sig` is set and `<dst>.md5`, `<dst>.sha1`, `<dst>.sha256` when
    /// `checksums` is set.
    ///
    /// Credentials are resolved only after a target matches, once per call. A
    /// failing `usernamefunc` or `passwordfunc` therefore goes unnoticed for
    /// files with no target and is reported by the first file that has one,
    /// before anything is uploaded.
    pub fn publish_file(
        &self,
        meta: &BuildMetadata,
        path: &Path,
    ) -> Result<Option<PublishReport>, RemoteError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| RemoteError::InvalidPath(path.display().to_string()))?;

        let Some(target) = meta.publish_info.target_for(file_name) else {
            debug!("{file_name} has no publish target, skipping");
            return Ok(None);
        };

        let creds = get_credentials(meta, &self.user)?;
        let dst = render_template(&target.dst, meta)?;
        let mut report = PublishReport::default();

        let data = fs::read(path)?;
        let sums = all_checksums_bytes(&data);
        self.put(&dst, &data, &sums, &creds, &mut report)?;

        if target.sig {
            let sig_path = signature_path(path);
            if !sig_path.exists() {
                return Err(RemoteError::MissingSignature(sig_path.display().to_string()));
            }
            let sig = fs::read(&sig_path)?;
            self.put(
                &format!("{dst}.asc"),
                &sig,
                &all_checksums_bytes(&sig),
                &creds,
                &mut report,
            )?;
        }

        if target.checksums {
            for alg in Algorithm::ALL {
                let doc = checksum_line(sums.get(alg), file_name);
                self.put(
                    &format!("{dst}.{alg}"),
                    doc.as_bytes(),
                    &all_checksums_bytes(doc.as_bytes()),
                    &creds,
                    &mut report,
                )?;
            }
        }

        info!("published {file_name} to {dst}");
        Ok(Some(report))
    }

    fn put(
        &self,
        url: &str,
        data: &[u8],
        sums: &Checksums,
        creds: &Credentials,
        report: &mut PublishReport,
    ) -> Result<(), RemoteError> {
        self.transport.upload(url, data, sums, creds)?;
        report.urls.push(url.to_owned());
        Ok(())
    }
}
