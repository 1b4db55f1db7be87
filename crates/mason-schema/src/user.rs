use ini::Ini;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of the per-user override file, resolved under `$HOME`.
pub const USER_CONFIG_FILENAME: &str = ".mason";

#[derive(Debug, Error)]
pub enum UserConfigError {
    #[error("failed to read user config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse user config: {0}")]
    Parse(#[from] ini::ParseError),
    #[error("HOME not set")]
    NoHome,
}

/// Per-user overrides kept outside source control.
///
/// ```ini
/// [user]
/// email = releases@example.com
/// usernamefunc = pass show artifactory/user
/// passwordfunc = pass show artifactory/password
///
/// [signing]
/// program = gpg2
/// ```
///
/// Any non-empty value here takes precedence over the matching metadata value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserConfig {
    pub user: UserInfo,
    pub signing: UserSignInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInfo {
    pub email: String,
    pub username: String,
    pub password: String,
    pub username_func: String,
    pub password_func: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserSignInfo {
    pub program: String,
}

impl UserConfig {
    /// Load `~/.mason`. A missing file yields an empty config.
    pub fn load_default() -> Result<Self, UserConfigError> {
        Self::load(&default_config_path()?)
    }

    pub fn load(path: &Path) -> Result<Self, UserConfigError> {
        match fs::read_to_string(path) {
            Ok(content) => {
                tracing::debug!("loading user config from {}", path.display());
                Self::parse_str(&content)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(UserConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn parse_str(input: &str) -> Result<Self, UserConfigError> {
        let ini = Ini::load_from_str(input)?;
        let get = |section: &str, key: &str| -> String {
            ini.section(Some(section))
                .and_then(|props| props.get(key))
                .map(|v| v.trim().to_owned())
                .unwrap_or_default()
        };

        Ok(Self {
            user: UserInfo {
                email: get("user", "email"),
                username: get("user", "username"),
                password: get("user", "password"),
                username_func: get("user", "usernamefunc"),
                password_func: get("user", "passwordfunc"),
            },
            signing: UserSignInfo {
                program: get("signing", "program"),
            },
        })
    }
}

fn default_config_path() -> Result<PathBuf, UserConfigError> {
    let home = std::env::var("HOME").map_err(|_| UserConfigError::NoHome)?;
    Ok(PathBuf::from(home).join(USER_CONFIG_FILENAME))
}
