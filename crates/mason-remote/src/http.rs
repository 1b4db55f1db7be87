use crate::{Credentials, RemoteError, Transport};
use mason_signing::Checksums;

/// Plain HTTP PUT, Artifactory style.
///
/// Each upload carries `X-Checksum-Md5`, `X-Checksum-Sha1` and
/// `X-Checksum-Sha256` headers so the server can verify the body, plus basic
/// auth when credentials are set. Redirects are not followed and any status of
/// 300 or above is a failure.
pub struct HttpTransport {
    agent: ureq::Agent,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .max_redirects(0)
            .build();
        Self {
            agent: config.into(),
        }
    }
}

impl Transport for HttpTransport {
    fn upload(
        &self,
        url: &str,
        data: &[u8],
        sums: &Checksums,
        creds: &Credentials,
    ) -> Result<(), RemoteError> {
        tracing::debug!("PUT {url} ({} bytes)", data.len());
        let mut req = self
            .agent
            .put(url)
            .header("X-Checksum-Md5", &sums.md5)
            .header("X-Checksum-Sha1", &sums.sha1)
            .header("X-Checksum-Sha256", &sums.sha256);
        if !creds.is_empty() {
            req = req.header("Authorization", &creds.basic_auth());
        }

        let resp = req
            .send(data as &[u8])
            .map_err(|e| RemoteError::Http(format!("PUT {url}: {e}")))?;
        let code = resp.status().as_u16();
        if code >= 300 {
            return Err(RemoteError::Status {
                method: "PUT",
                url: url.to_owned(),
                code,
            });
        }
        Ok(())
    }
}
