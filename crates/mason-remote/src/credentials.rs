use crate::RemoteError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use mason_schema::{BuildMetadata, UserConfig};
use std::fmt;
use std::process::Command;
use tracing::debug;

/// Upload credentials. Both fields may be empty.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .finish()
    }
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_owned(),
            password: password.to_owned(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_empty() && self.password.is_empty()
    }

    /// `Authorization` header value for HTTP basic auth.
    pub fn basic_auth(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {token}")
    }
}

enum Source<'a> {
    Command(&'a str),
    Plain(&'a str),
}

/// Run a getter through `sh -c` and take its trimmed stdout.
fn run_getter(field: &'static str, command: &str) -> Result<String, RemoteError> {
    debug!("resolving {field} via command");
    let output = Command::new("sh")
        .args(["-c", command])
        .output()
        .map_err(|e| RemoteError::CredentialCommand {
            field,
            detail: e.to_string(),
        })?;
    if !output.status.success() {
        return Err(RemoteError::CredentialCommand {
            field,
            detail: format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
}

/// First non-empty source wins; commands run only when reached.
fn resolve(field: &'static str, sources: [Source<'_>; 4]) -> Result<String, RemoteError> {
    for source in sources {
        match source {
            Source::Command(cmd) if !cmd.is_empty() => return run_getter(field, cmd),
            Source::Plain(value) if !value.is_empty() => return Ok(value.to_owned()),
            _ => {}
        }
    }
    Ok(String::new())
}

/// Resolve upload credentials. Precedence, highest first: user config getter
/// command, user config plain value, metadata getter command, metadata plain
/// value, empty. A failing getter aborts resolution.
pub fn get_credentials(meta: &BuildMetadata, user: &UserConfig) -> Result<Credentials, RemoteError> {
    let publish = &meta.publish_info;
    let username = resolve(
        "usernamefunc",
        [
            Source::Command(&user.user.username_func),
            Source::Plain(&user.user.username),
            Source::Command(&publish.username_func),
            Source::Plain(&publish.username),
        ],
    )?;
    let password = resolve(
        "passwordfunc",
        [
            Source::Command(&user.user.password_func),
            Source::Plain(&user.user.password),
            Source::Command(&publish.password_func),
            Source::Plain(&publish.password),
        ],
    )?;
    Ok(Credentials { username, password })
}
