use crate::aws::AwsCredentials;
use crate::sigv4::{amz_date, authorization, encode_path, SignableRequest, EMPTY_PAYLOAD_SHA256};
use crate::{Credentials, RemoteError, Transport};
use mason_signing::Checksums;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, info};

fn s3_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^https?://([^/]+)\.s3\.([^/.]+)\.amazonaws\.com/(.+)$")
            .expect("valid S3 URL pattern")
    })
}

/// Bucket, region and object key parsed from a virtual-hosted S3 URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Location {
    pub bucket: String,
    pub region: String,
    pub key: String,
}

impl S3Location {
    /// Parse `https://<bucket>.s3.<region>.amazonaws.com/<key>`. Returns `None`
    /// for any other URL.
    pub fn parse(url: &str) -> Option<Self> {
        let caps = s3_url_pattern().captures(url)?;
        Some(Self {
            bucket: caps[1].to_owned(),
            region: caps[2].to_owned(),
            key: caps[3].to_owned(),
        })
    }
}

/// Every parent "directory" of `key`, shallowest first, each with a trailing
/// slash: `a/b/c.txt` yields `["a/", "a/b/"]`.
pub fn dirs_for_key(key: &str) -> Vec<String> {
    let parts: Vec<&str> = key.split('/').filter(|p| !p.is_empty()).collect();
    let mut dirs = Vec::new();
    let mut prefix = String::new();
    for part in parts.iter().take(parts.len().saturating_sub(1)) {
        prefix.push_str(part);
        prefix.push('/');
        dirs.push(prefix.clone());
    }
    dirs
}

/// S3 object writes signed with SigV4.
///
/// After the object itself is written, each parent prefix is checked with HEAD
/// and a zero-length `<prefix>/` marker is written only where HEAD answers 404.
/// Any other non-success HEAD status is an error.
pub struct S3Transport {
    agent: ureq::Agent,
    creds: AwsCredentials,
    endpoint: Option<String>,
}

impl S3Transport {
    pub fn new(creds: AwsCredentials) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .max_redirects(0)
            .build();
        Self {
            agent: config.into(),
            creds,
            endpoint: None,
        }
    }

    /// Send requests path-style to `endpoint` (`http://host:port`) instead of the
    /// bucket's virtual host. Used against S3-compatible stores and test servers.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = Some(endpoint.trim_end_matches('/').to_owned());
        self
    }

    /// (request URL, Host header, raw path to sign) for `key` in `loc.bucket`.
    /// The URL carries the percent-encoded path.
    fn target(&self, loc: &S3Location, key: &str) -> (String, String, String) {
        let (base, host, path) = match &self.endpoint {
            Some(endpoint) => {
                let host = endpoint
                    .split_once("://")
                    .map_or(endpoint.as_str(), |(_, rest)| rest)
                    .to_owned();
                (endpoint.clone(), host, format!("/{}/{key}", loc.bucket))
            }
            None => {
                let host = format!("{}.s3.{}.amazonaws.com", loc.bucket, loc.region);
                (format!("https://{host}"), host, format!("/{key}"))
            }
        };
        (format!("{base}{}", encode_path(&path)), host, path)
    }

    fn signed_headers(
        &self,
        method: &str,
        host: &str,
        path: &str,
        payload_sha256: &str,
        region: &str,
    ) -> Vec<(String, String)> {
        let date = amz_date(chrono::Utc::now());
        let mut headers = vec![
            ("host".to_owned(), host.to_owned()),
            ("x-amz-content-sha256".to_owned(), payload_sha256.to_owned()),
            ("x-amz-date".to_owned(), date.clone()),
        ];
        if let Some(token) = &self.creds.session_token {
            headers.push(("x-amz-security-token".to_owned(), token.clone()));
        }
        let auth = authorization(
            &self.creds,
            region,
            "s3",
            &date,
            &SignableRequest {
                method,
                path,
                query: "",
                headers: headers.clone(),
                payload_sha256,
            },
        );
        headers.retain(|(k, _)| k != "host");
        headers.push(("authorization".to_owned(), auth));
        headers
    }

    fn put_object(
        &self,
        loc: &S3Location,
        key: &str,
        data: &[u8],
        payload_sha256: &str,
    ) -> Result<(), RemoteError> {
        let (url, host, path) = self.target(loc, key);
        debug!("S3 PUT {url} ({} bytes)", data.len());
        let mut req = self.agent.put(&url);
        for (name, value) in self.signed_headers("PUT", &host, &path, payload_sha256, &loc.region)
        {
            req = req.header(name.as_str(), value.as_str());
        }
        let resp = req
            .send(data)
            .map_err(|e| RemoteError::Http(format!("PUT {url}: {e}")))?;
        let code = resp.status().as_u16();
        if code >= 300 {
            return Err(RemoteError::Status {
                method: "PUT",
                url,
                code,
            });
        }
        Ok(())
    }

    fn object_exists(&self, loc: &S3Location, key: &str) -> Result<bool, RemoteError> {
        let (url, host, path) = self.target(loc, key);
        debug!("S3 HEAD {url}");
        let mut req = self.agent.head(&url);
        for (name, value) in
            self.signed_headers("HEAD", &host, &path, EMPTY_PAYLOAD_SHA256, &loc.region)
        {
            req = req.header(name.as_str(), value.as_str());
        }
        let resp = req
            .call()
            .map_err(|e| RemoteError::Http(format!("HEAD {url}: {e}")))?;
        match resp.status().as_u16() {
            200..=299 => Ok(true),
            404 => Ok(false),
            code => Err(RemoteError::Status {
                method: "HEAD",
                url,
                code,
            }),
        }
    }
}

impl Transport for S3Transport {
    fn upload(
        &self,
        url: &str,
        data: &[u8],
        sums: &Checksums,
        _creds: &Credentials,
    ) -> Result<(), RemoteError> {
        let loc = S3Location::parse(url)
            .ok_or_else(|| RemoteError::Http(format!("not an S3 URL: {url}")))?;

        info!("uploading s3://{}/{}", loc.bucket, loc.key);
        self.put_object(&loc, &loc.key, data, &sums.sha256)?;

        for dir in dirs_for_key(&loc.key) {
            if self.object_exists(&loc, &dir)? {
                continue;
            }
            debug!("creating directory marker s3://{}/{dir}", loc.bucket);
            self.put_object(&loc, &dir, &[], EMPTY_PAYLOAD_SHA256)?;
        }
        Ok(())
    }
}
