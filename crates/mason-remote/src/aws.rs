use crate::RemoteError;
use ini::Ini;
use std::fmt;
use std::path::{Path, PathBuf};

/// Static AWS credentials for SigV4 request signing.
#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .field("session_token", &self.session_token.as_ref().map(|_| "***"))
            .finish()
    }
}

impl AwsCredentials {
    pub fn new(access_key_id: &str, secret_access_key: &str) -> Self {
        Self {
            access_key_id: access_key_id.to_owned(),
            secret_access_key: secret_access_key.to_owned(),
            session_token: None,
        }
    }

    /// `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` (plus optional
    /// `AWS_SESSION_TOKEN`) when both are set, else the `AWS_PROFILE` profile
    /// (default `default`) of `~/.aws/credentials`.
    pub fn load() -> Result<Self, RemoteError> {
        if let Some(creds) = Self::from_env() {
            tracing::debug!("using AWS credentials from environment");
            return Ok(creds);
        }
        let profile = std::env::var("AWS_PROFILE").unwrap_or_else(|_| "default".to_owned());
        let path = match std::env::var("AWS_SHARED_CREDENTIALS_FILE") {
            Ok(p) => PathBuf::from(p),
            Err(_) => {
                let home = std::env::var("HOME")
                    .map_err(|_| RemoteError::AwsCredentials("HOME not set".to_owned()))?;
                PathBuf::from(home).join(".aws/credentials")
            }
        };
        Self::from_profile_file(&path, &profile)
    }

    pub fn from_env() -> Option<Self> {
        let id = std::env::var("AWS_ACCESS_KEY_ID").ok().filter(|v| !v.is_empty())?;
        let secret = std::env::var("AWS_SECRET_ACCESS_KEY")
            .ok()
            .filter(|v| !v.is_empty())?;
        Some(Self {
            access_key_id: id,
            secret_access_key: secret,
            session_token: std::env::var("AWS_SESSION_TOKEN")
                .ok()
                .filter(|v| !v.is_empty()),
        })
    }

    pub fn from_profile_file(path: &Path, profile: &str) -> Result<Self, RemoteError> {
        let ini = Ini::load_from_file(path).map_err(|e| {
            RemoteError::AwsCredentials(format!("failed to read {}: {e}", path.display()))
        })?;
        let section = ini.section(Some(profile)).ok_or_else(|| {
            RemoteError::AwsCredentials(format!(
                "profile '{profile}' not found in {}",
                path.display()
            ))
        })?;
        let field = |key: &str| {
            section
                .get(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };
        let missing = |key: &str| {
            RemoteError::AwsCredentials(format!("profile '{profile}' has no {key}"))
        };
        Ok(Self {
            access_key_id: field("aws_access_key_id").ok_or_else(|| missing("aws_access_key_id"))?,
            secret_access_key: field("aws_secret_access_key")
                .ok_or_else(|| missing("aws_secret_access_key"))?,
            session_token: field("aws_session_token"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_named_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials");
        std::fs::write(
            &path,
            "[default]\n\
             aws_access_key_id = AKIDDEFAULT\n\
             aws_secret_access_key = secret-default\n\
             \n\
             [release]\n\
             aws_access_key_id = AKIDRELEASE\n\
             aws_secret_access_key = secret-release\n\
             aws_session_token = token\n",
        )
        .unwrap();

        let default = AwsCredentials::from_profile_file(&path, "default").unwrap();
        assert_eq!(default.access_key_id, "AKIDDEFAULT");
        assert_eq!(default.session_token, None);

        let release = AwsCredentials::from_profile_file(&path, "release").unwrap();
        assert_eq!(release.secret_access_key, "secret-release");
        assert_eq!(release.session_token.as_deref(), Some("token"));
    }

    #[test]
    fn missing_profile_or_key_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials");
        std::fs::write(&path, "[default]\naws_access_key_id = AKID\n").unwrap();
        assert!(AwsCredentials::from_profile_file(&path, "other").is_err());
        let err = AwsCredentials::from_profile_file(&path, "default").unwrap_err();
        assert!(err.to_string().contains("aws_secret_access_key"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AwsCredentials::from_profile_file(&dir.path().join("nope"), "default").is_err());
    }

    #[test]
    fn debug_redacts_secret() {
        let rendered = format!("{:?}", AwsCredentials::new("AKID", "very-secret"));
        assert!(rendered.contains("AKID"));
        assert!(!rendered.contains("very-secret"));
    }
}
