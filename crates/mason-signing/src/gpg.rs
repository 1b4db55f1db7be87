use crate::identity::SigningIdentity;
use crate::SigningError;
use mason_schema::{BuildMetadata, DEFAULT_SIGNING_PROGRAM, OPTION_KEYRING, OPTION_TRUSTDB};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::{debug, info};

/// Path of the detached signature for `path`: `<path>.asc`.
pub fn signature_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".asc");
    PathBuf::from(s)
}

fn string_option<'a>(meta: &'a BuildMetadata, key: &str) -> Result<Option<&'a str>, SigningError> {
    match meta.options.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or_else(|| SigningError::InvalidOption(key.to_owned())),
    }
}

/// Keyring and trust database overrides taken from `metadata.options`.
fn keyring_args(meta: &BuildMetadata) -> Result<Vec<OsString>, SigningError> {
    let mut args = Vec::new();
    if let Some(trustdb) = string_option(meta, OPTION_TRUSTDB)? {
        args.push("--trustdb".into());
        args.push(trustdb.into());
    }
    if let Some(keyring) = string_option(meta, OPTION_KEYRING)? {
        args.push("--no-default-keyring".into());
        args.push("--keyring".into());
        args.push(keyring.into());
    }
    Ok(args)
}

fn locate(program: &str) -> Result<PathBuf, SigningError> {
    which::which(program).map_err(|_| SigningError::ProgramMissing(program.to_owned()))
}

fn stderr_tail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        output.status.to_string()
    } else {
        format!("{}: {trimmed}", output.status)
    }
}

/// Produce a detached, ASCII-armored signature at `<path>.asc`.
pub fn sign_file(
    path: &Path,
    identity: &SigningIdentity,
    meta: &BuildMetadata,
) -> Result<PathBuf, SigningError> {
    let program = locate(&identity.program)?;
    let mut cmd = Command::new(program);
    cmd.args(keyring_args(meta)?)
        .arg("-bau")
        .arg(&identity.email)
        .arg("--yes")
        .arg(path);

    info!("signing {} as {}", path.display(), identity.email);
    let output = cmd.output().map_err(|e| SigningError::SignFailed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    if !output.status.success() {
        return Err(SigningError::SignFailed {
            path: path.to_path_buf(),
            detail: stderr_tail(&output),
        });
    }

    let sig = signature_path(path);
    if !sig.exists() {
        return Err(SigningError::SignatureMissing(sig));
    }
    debug!("wrote {}", sig.display());
    Ok(sig)
}

/// Verify `<path>.asc` against `path`.
///
/// `Ok(false)` only when the program explicitly reports a bad signature; any
/// other failure (missing key, unreadable file, unknown exit code) is an error.
pub fn verify_file(path: &Path, meta: &BuildMetadata) -> Result<bool, SigningError> {
    let program = if meta.sign_info.program.is_empty() {
        DEFAULT_SIGNING_PROGRAM
    } else {
        &meta.sign_info.program
    };
    let sig = signature_path(path);
    if !sig.exists() {
        return Err(SigningError::SignatureMissing(sig));
    }

    let mut cmd = Command::new(locate(program)?);
    cmd.args(keyring_args(meta)?)
        .arg("--verify")
        .arg(&sig)
        .arg(path);

    debug!("verifying {}", path.display());
    let output = cmd.output().map_err(|e| SigningError::VerifyFailed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    match output.status.code() {
        Some(0) => Ok(true),
        Some(1) if String::from_utf8_lossy(&output.stderr).contains("BAD signature") => Ok(false),
        _ => Err(SigningError::VerifyFailed {
            path: path.to_path_buf(),
            detail: stderr_tail(&output),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    /// A stand-in signing program: signs by writing GOOD into `<file>.asc`, and
    /// verifies according to the signature's contents.
    const FAKE_SIGNER: &str = r#"#!/bin/sh
echo "$@" > "$(dirname "$0")/args.txt"
for last; do :; done
case " $* " in
  *" --verify "*)
    sig="$last.asc"
    if grep -q GOOD "$sig"; then exit 0; fi
    if grep -q BAD "$sig"; then echo 'gpg: BAD signature from "tester"' >&2; exit 1; fi
    echo "gpg: Can't check signature: No public key" >&2
    exit 2
    ;;
  *)
    echo GOOD > "$last.asc"
    ;;
esac
"#;

    fn fake_signer(dir: &Path) -> String {
        let path = dir.join("fake-gpg");
        fs::write(&path, FAKE_SIGNER).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn meta_with(program: &str) -> BuildMetadata {
        let mut meta = BuildMetadata::default();
        meta.sign_info.program = program.to_owned();
        meta.sign_info.email = "mason-tester@example.com".to_owned();
        meta
    }

    fn identity(program: &str) -> SigningIdentity {
        SigningIdentity {
            program: program.to_owned(),
            email: "mason-tester@example.com".to_owned(),
        }
    }

    #[test]
    fn signature_path_appends_asc() {
        assert_eq!(
            signature_path(Path::new("/tmp/foo_linux_amd64")),
            PathBuf::from("/tmp/foo_linux_amd64.asc")
        );
    }

    #[test]
    fn sign_then_verify() {
        let dir = tempfile::tempdir().unwrap();
        let signer = fake_signer(dir.path());
        let file = dir.path().join("foo_linux_amd64");
        fs::write(&file, "binary").unwrap();

        let sig = sign_file(&file, &identity(&signer), &meta_with(&signer)).unwrap();
        assert_eq!(sig, signature_path(&file));
        let args = fs::read_to_string(dir.path().join("args.txt")).unwrap();
        assert!(args.contains("-bau mason-tester@example.com --yes"));
        assert!(!args.contains("--keyring"));

        assert!(verify_file(&file, &meta_with(&signer)).unwrap());
    }

    #[test]
    fn keyring_options_are_passed_through() {
        let dir = tempfile::tempdir().unwrap();
        let signer = fake_signer(dir.path());
        let file = dir.path().join("foo");
        fs::write(&file, "binary").unwrap();

        let mut meta = meta_with(&signer);
        meta.options
            .insert(OPTION_KEYRING.into(), "/tmp/keyring.gpg".into());
        meta.options
            .insert(OPTION_TRUSTDB.into(), "/tmp/trustdb.gpg".into());
        sign_file(&file, &identity(&signer), &meta).unwrap();

        let args = fs::read_to_string(dir.path().join("args.txt")).unwrap();
        assert!(args.starts_with(
            "--trustdb /tmp/trustdb.gpg --no-default-keyring --keyring /tmp/keyring.gpg -bau"
        ));
    }

    #[test]
    fn non_string_option_is_rejected() {
        let mut meta = meta_with("sh");
        meta.options.insert(OPTION_KEYRING.into(), 42.into());
        let err = keyring_args(&meta).unwrap_err();
        assert!(matches!(err, SigningError::InvalidOption(ref k) if k == "keyring"));
    }

    #[test]
    fn bad_signature_is_false_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let signer = fake_signer(dir.path());
        let file = dir.path().join("foo");
        fs::write(&file, "binary").unwrap();
        fs::write(signature_path(&file), "BAD").unwrap();
        assert!(!verify_file(&file, &meta_with(&signer)).unwrap());
    }

    #[test]
    fn ambiguous_verify_result_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let signer = fake_signer(dir.path());
        let file = dir.path().join("foo");
        fs::write(&file, "binary").unwrap();
        fs::write(signature_path(&file), "???").unwrap();
        let err = verify_file(&file, &meta_with(&signer)).unwrap_err();
        assert!(matches!(err, SigningError::VerifyFailed { .. }));
    }

    #[test]
    fn verify_without_signature_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("foo");
        fs::write(&file, "binary").unwrap();
        let err = verify_file(&file, &meta_with("sh")).unwrap_err();
        assert!(matches!(err, SigningError::SignatureMissing(_)));
    }

    #[test]
    fn missing_program_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("foo");
        fs::write(&file, "binary").unwrap();
        let err = sign_file(
            &file,
            &identity("mason-no-such-signer"),
            &meta_with("mason-no-such-signer"),
        )
        .unwrap_err();
        assert!(matches!(err, SigningError::ProgramMissing(_)));
    }

    #[test]
    fn failing_program_is_sign_failure() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("foo");
        fs::write(&file, "binary").unwrap();
        let err = sign_file(&file, &identity("false"), &meta_with("false")).unwrap_err();
        assert!(matches!(err, SigningError::SignFailed { .. }));
    }

    // Uses the operator's real gpg keyring.
    #[test]
    #[ignore = "requires gpg with a secret key for mason-tester@example.com"]
    fn real_gpg_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("foo");
        fs::write(&file, "the quick fox jumped over the lazy brown dog").unwrap();
        sign_file(&file, &identity("gpg"), &meta_with("gpg")).unwrap();
        assert!(verify_file(&file, &meta_with("gpg")).unwrap());
    }
}
