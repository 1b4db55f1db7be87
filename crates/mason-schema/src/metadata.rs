use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the metadata document at the root of every package.
pub const METADATA_FILENAME: &str = "metadata.json";

/// Language used when `metadata.language` is empty or absent.
pub const DEFAULT_LANGUAGE: &str = "golang";

/// Signing program used when neither metadata nor user config names one.
pub const DEFAULT_SIGNING_PROGRAM: &str = "gpg";

/// `options` key holding an alternate keyring path for the signing program.
pub const OPTION_KEYRING: &str = "keyring";

/// `options` key holding an alternate trust database path for the signing program.
pub const OPTION_TRUSTDB: &str = "trustdb";

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read metadata file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse metadata: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The declarative description of one package: what to build, how to sign it,
/// and where to publish it.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct BuildMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub package: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub repository: String,
    #[serde(default, rename = "tool-repository")]
    pub tool_repository: String,
    #[serde(default)]
    pub insecure_get: bool,
    #[serde(default)]
    pub language: String,
    #[serde(default, rename = "building")]
    pub build_info: BuildInfo,
    #[serde(default, rename = "signing")]
    pub sign_info: SignInfo,
    #[serde(default, rename = "publishing")]
    pub publish_info: PublishInfo,
    /// Signing backend extension point. Recognized keys: `keyring`, `trustdb`.
    #[serde(default)]
    pub options: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct BuildInfo {
    #[serde(default, rename = "prepcommands")]
    pub prep_commands: Vec<String>,
    #[serde(default)]
    pub targets: Vec<BuildTarget>,
    #[serde(default)]
    pub extras: Vec<ExtraArtifact>,
}

/// One operating system / architecture pair to compile for.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct BuildTarget {
    pub name: String,
    #[serde(default)]
    pub cgo: bool,
    #[serde(default)]
    pub flags: BTreeMap<String, String>,
    #[serde(default)]
    pub ldflags: String,
    #[serde(default)]
    pub legacy: bool,
}

impl BuildTarget {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Self::default()
        }
    }

    /// Split `name` into its `(os, arch)` halves. Returns `None` unless the
    /// name has exactly one `/` with non-empty parts on either side.
    pub fn os_arch(&self) -> Option<(&str, &str)> {
        let (os, arch) = self.name.split_once('/')?;
        if os.is_empty() || arch.is_empty() || arch.contains('/') {
            return None;
        }
        Some((os, arch))
    }
}

/// A non-compiled file rendered from a template at build time.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ExtraArtifact {
    pub template: String,
    #[serde(rename = "filename")]
    pub file_name: String,
    #[serde(default)]
    pub executable: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct SignInfo {
    #[serde(default)]
    pub program: String,
    #[serde(default)]
    pub email: String,
}

/// Publishing configuration.
///
/// The target list is private so that the filename index can never drift from
/// it: every mutation goes through [`PublishInfo::set_targets`], and every
/// deserialization rebuilds the index.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(from = "PublishInfoRepr", into = "PublishInfoRepr")]
pub struct PublishInfo {
    targets: Vec<PublishTarget>,
    index: HashMap<String, usize>,
    pub username: String,
    pub password: String,
    pub username_func: String,
    pub password_func: String,
    pub skip_signing: bool,
}

#[derive(Deserialize, Serialize)]
struct PublishInfoRepr {
    #[serde(default)]
    targets: Vec<PublishTarget>,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default, rename = "usernamefunc")]
    username_func: String,
    #[serde(default, rename = "passwordfunc")]
    password_func: String,
    #[serde(default, rename = "skip-signing")]
    skip_signing: bool,
}

impl From<PublishInfoRepr> for PublishInfo {
    fn from(repr: PublishInfoRepr) -> Self {
        let mut info = Self {
            targets: Vec::new(),
            index: HashMap::new(),
            username: repr.username,
            password: repr.password,
            username_func: repr.username_func,
            password_func: repr.password_func,
            skip_signing: repr.skip_signing,
        };
        info.set_targets(repr.targets);
        info
    }
}

impl From<PublishInfo> for PublishInfoRepr {
    fn from(info: PublishInfo) -> Self {
        Self {
            targets: info.targets,
            username: info.username,
            password: info.password,
            username_func: info.username_func,
            password_func: info.password_func,
            skip_signing: info.skip_signing,
        }
    }
}

impl PublishInfo {
    /// Declared publish targets, in metadata order.
    pub fn targets(&self) -> &[PublishTarget] {
        &self.targets
    }

    /// Replace the target list and rebuild the filename index from scratch.
    /// When two targets share a `src`, the later one wins.
    pub fn set_targets(&mut self, targets: Vec<PublishTarget>) {
        self.targets = targets;
        self.index = self
            .targets
            .iter()
            .enumerate()
            .map(|(i, t)| (t.src.clone(), i))
            .collect();
    }

    /// Look up the publish target declared for a built file's base name.
    pub fn target_for(&self, file_name: &str) -> Option<&PublishTarget> {
        self.index.get(file_name).map(|&i| &self.targets[i])
    }
}

/// A declared mapping from a built file to its remote destination.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PublishTarget {
    pub src: String,
    /// Destination URL template, rendered against the metadata.
    pub dst: String,
    #[serde(default)]
    pub sig: bool,
    #[serde(default)]
    pub checksums: bool,
}

impl BuildMetadata {
    /// The language-strategy dispatch key.
    pub fn language(&self) -> &str {
        resolve_language(self)
    }

    /// String value of an entry in `options`, if present and a string.
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }
}

pub fn resolve_language(meta: &BuildMetadata) -> &str {
    if meta.language.is_empty() {
        DEFAULT_LANGUAGE
    } else {
        &meta.language
    }
}

pub fn parse_metadata_str(input: &str) -> Result<BuildMetadata, MetadataError> {
    Ok(serde_json::from_str(input)?)
}

/// Load and decode a metadata document. A missing file is reported as
/// [`MetadataError::NotFound`], never defaulted.
pub fn read_metadata(path: impl AsRef<Path>) -> Result<BuildMetadata, MetadataError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            MetadataError::NotFound(path.to_path_buf())
        } else {
            MetadataError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    let meta = parse_metadata_str(&content)?;
    tracing::debug!(
        "read metadata for {} {} from {}",
        meta.package,
        meta.version,
        path.display()
    );
    Ok(meta)
}

/// Parse a comma-separated skip list such as `"linux/amd64, darwin/arm64"`.
pub fn parse_skip_list(csv: &str) -> BTreeSet<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_METADATA: &str = r#"{
  "version": "0.1.0",
  "package": "github.com/nikogura/testproject",
  "description": "A test project",
  "repository": "http://localhost:8081/artifactory/repo-local",
  "building": {
    "prepcommands": ["echo \"GOPATH is: ${GOPATH}\""],
    "targets": [
      { "name": "linux/amd64", "flags": { "FOO": "bar" } },
      { "name": "darwin/arm64", "cgo": true, "ldflags": "-X main.version=0.1.0", "legacy": true }
    ],
    "extras": [
      { "template": "templates/description.tmpl", "filename": "description.txt", "executable": false }
    ]
  },
  "signing": { "program": "gpg", "email": "mason-tester@example.com" },
  "publishing": {
    "targets": [
      {
        "src": "testproject_linux_amd64",
        "dst": "{{.Repository}}/testproject/{{.Version}}/linux/amd64/testproject",
        "sig": true,
        "checksums": true
      }
    ],
    "usernamefunc": "echo -n $PUBLISH_USERNAME",
    "skip-signing": true
  },
  "options": { "keyring": "/tmp/keyring.gpg", "trustdb": "/tmp/trustdb.gpg", "retries": 3 },
  "unknown_field": { "ignored": true }
}"#;

    #[test]
    fn parses_full_metadata() {
        let meta = parse_metadata_str(TEST_METADATA).unwrap();
        assert_eq!(meta.version, "0.1.0");
        assert_eq!(meta.package, "github.com/nikogura/testproject");
        assert_eq!(meta.build_info.prep_commands.len(), 1);
        assert_eq!(meta.build_info.targets.len(), 2);
        assert_eq!(meta.build_info.targets[0].flags["FOO"], "bar");
        assert!(meta.build_info.targets[1].cgo);
        assert!(meta.build_info.targets[1].legacy);
        assert_eq!(meta.build_info.extras[0].file_name, "description.txt");
        assert_eq!(meta.sign_info.email, "mason-tester@example.com");
        assert_eq!(meta.publish_info.username_func, "echo -n $PUBLISH_USERNAME");
        assert!(meta.publish_info.skip_signing);
        assert_eq!(meta.option_str(OPTION_KEYRING), Some("/tmp/keyring.gpg"));
        assert_eq!(meta.option_str(OPTION_TRUSTDB), Some("/tmp/trustdb.gpg"));
        assert_eq!(meta.option_str("retries"), None);
    }

    #[test]
    fn publish_index_built_on_load() {
        let meta = parse_metadata_str(TEST_METADATA).unwrap();
        let target = meta
            .publish_info
            .target_for("testproject_linux_amd64")
            .unwrap();
        assert!(target.sig);
        assert!(target.checksums);
        assert!(meta.publish_info.target_for("nope").is_none());
    }

    #[test]
    fn publish_index_last_duplicate_wins() {
        let mut info = PublishInfo::default();
        info.set_targets(vec![
            PublishTarget {
                src: "a".into(),
                dst: "first".into(),
                ..PublishTarget::default()
            },
            PublishTarget {
                src: "a".into(),
                dst: "second".into(),
                ..PublishTarget::default()
            },
        ]);
        assert_eq!(info.target_for("a").unwrap().dst, "second");
        assert_eq!(info.targets().len(), 2);
    }

    #[test]
    fn set_targets_rebuilds_index_whole() {
        let mut meta = parse_metadata_str(TEST_METADATA).unwrap();
        meta.publish_info.set_targets(vec![PublishTarget {
            src: "other".into(),
            dst: "x".into(),
            ..PublishTarget::default()
        }]);
        assert!(meta
            .publish_info
            .target_for("testproject_linux_amd64")
            .is_none());
        assert!(meta.publish_info.target_for("other").is_some());
    }

    #[test]
    fn serialization_preserves_json_keys() {
        let meta = parse_metadata_str(TEST_METADATA).unwrap();
        let json = serde_json::to_value(&meta).unwrap();
        assert!(json["building"]["prepcommands"].is_array());
        assert_eq!(json["publishing"]["skip-signing"], true);
        assert_eq!(
            json["publishing"]["usernamefunc"],
            "echo -n $PUBLISH_USERNAME"
        );
        let back: BuildMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn empty_document_is_all_defaults() {
        let meta = parse_metadata_str("{}").unwrap();
        assert_eq!(meta, BuildMetadata::default());
        assert!(meta.build_info.targets.is_empty());
        assert!(meta.publish_info.targets().is_empty());
    }

    #[test]
    fn language_defaults_to_golang() {
        let absent = parse_metadata_str("{}").unwrap();
        assert_eq!(absent.language(), "golang");
        let empty = parse_metadata_str(r#"{"language": ""}"#).unwrap();
        assert_eq!(resolve_language(&empty), "golang");
        let python = parse_metadata_str(r#"{"language": "python"}"#).unwrap();
        assert_eq!(python.language(), "python");
    }

    #[test]
    fn read_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_metadata(dir.path().join(METADATA_FILENAME)).unwrap_err();
        assert!(matches!(err, MetadataError::NotFound(_)));
    }

    #[test]
    fn read_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(METADATA_FILENAME);
        fs::write(&path, "{ not json").unwrap();
        let err = read_metadata(&path).unwrap_err();
        assert!(matches!(err, MetadataError::Parse(_)));
    }

    #[test]
    fn read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(METADATA_FILENAME);
        fs::write(&path, TEST_METADATA).unwrap();
        let meta = read_metadata(&path).unwrap();
        assert_eq!(meta.version, "0.1.0");
        assert!(meta
            .publish_info
            .target_for("testproject_linux_amd64")
            .is_some());
    }

    #[test]
    fn os_arch_splits_target_name() {
        assert_eq!(
            BuildTarget::new("linux/amd64").os_arch(),
            Some(("linux", "amd64"))
        );
        assert_eq!(BuildTarget::new("linux").os_arch(), None);
        assert_eq!(BuildTarget::new("/amd64").os_arch(), None);
        assert_eq!(BuildTarget::new("linux/amd64/v2").os_arch(), None);
    }

    #[test]
    fn skip_list_trims_and_drops_empties() {
        let skip = parse_skip_list(" linux/amd64 ,,darwin/arm64,");
        assert_eq!(skip.len(), 2);
        assert!(skip.contains("linux/amd64"));
        assert!(skip.contains("darwin/arm64"));
        assert!(parse_skip_list("").is_empty());
    }
}
