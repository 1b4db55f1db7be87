use crate::command::{describe, failure_detail, find_program, run_captured};
use crate::extras::build_extras;
use crate::language::{checkout_metadata, Language};
use crate::RuntimeError;
use mason_schema::{parse_skip_list, BuildMetadata};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

const GOX_MODULE: &str = "github.com/mitchellh/gox@latest";

/// The Go strategy. The workspace root is a GOPATH (`<root>/go`) and the
/// checkout lives at `$GOPATH/src/<package>`.
#[derive(Debug, Clone, Default)]
pub struct GolangLanguage {
    go: Option<PathBuf>,
}

impl GolangLanguage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this `go` binary instead of the one found on `PATH`.
    pub fn with_go(go: impl Into<PathBuf>) -> Self {
        Self {
            go: Some(go.into()),
        }
    }

    fn checkout_dir(gopath: &Path, package: &str) -> PathBuf {
        gopath.join("src").join(package)
    }

    fn go_command(&self, gopath: &Path, dir: &Path) -> Result<Command, RuntimeError> {
        let go = match &self.go {
            Some(go) => go.clone(),
            None => find_program("go")?,
        };
        let mut cmd = Command::new(go);
        cmd.current_dir(dir).env("GOPATH", gopath);
        Ok(cmd)
    }

    fn ensure_gox(&self, gopath: &Path) -> Result<PathBuf, RuntimeError> {
        let bin = gopath.join("bin");
        let gox = bin.join("gox");
        if gox.exists() {
            return Ok(gox);
        }

        info!("installing gox into {}", bin.display());
        let mut cmd = self.go_command(gopath, gopath)?;
        cmd.args(["install", "-v", GOX_MODULE])
            .env("GOBIN", &bin)
            .env("GO111MODULE", "on");
        let output = run_captured(&mut cmd)?;
        if !output.status.success() {
            return Err(RuntimeError::ToolchainMissing(format!(
                "failed to install gox: {}",
                failure_detail(&output)
            )));
        }
        Ok(gox)
    }
}

impl Language for GolangLanguage {
    fn name(&self) -> &'static str {
        "golang"
    }

    fn create_work_dir(&self, root: &Path) -> Result<PathBuf, RuntimeError> {
        let gopath = root.join("go");
        for sub in ["src", "bin", "pkg"] {
            let dir = gopath.join(sub);
            fs::create_dir_all(&dir)
                .and_then(|()| fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)))
                .map_err(|source| RuntimeError::Workspace {
                    path: dir.clone(),
                    source,
                })?;
        }
        debug!("created GOPATH at {}", gopath.display());
        Ok(gopath)
    }

    fn checkout(
        &self,
        workspace: &Path,
        meta: &BuildMetadata,
        branch: &str,
    ) -> Result<(), RuntimeError> {
        let mut cmd = self.go_command(workspace, workspace)?;
        if meta.insecure_get {
            cmd.args(["get", "-v", "-insecure", &meta.package]);
        } else {
            cmd.args(["get", "-v", "-d", &format!("{}/...", meta.package)]);
        }
        cmd.env("GO111MODULE", "off");

        info!("fetching {}", meta.package);
        let output = run_captured(&mut cmd)?;
        if !output.status.success() {
            return Err(RuntimeError::FetchFailed {
                package: meta.package.clone(),
                detail: failure_detail(&output),
            });
        }

        if branch.is_empty() {
            return Ok(());
        }

        let git = find_program("git")?;
        let mut cmd = Command::new(git);
        cmd.args(["checkout", branch])
            .current_dir(Self::checkout_dir(workspace, &meta.package));
        info!("checking out branch {branch}");
        let output = run_captured(&mut cmd)?;
        if !output.status.success() {
            return Err(RuntimeError::BranchNotFound {
                branch: branch.to_owned(),
                detail: failure_detail(&output),
            });
        }
        Ok(())
    }

    fn prep(&self, workspace: &Path, meta: &BuildMetadata) -> Result<(), RuntimeError> {
        let md = checkout_metadata(self, workspace, meta)?;
        let dir = Self::checkout_dir(workspace, &md.package);
        let gopath = workspace.to_string_lossy();

        for raw in &md.build_info.prep_commands {
            let expanded = shellexpand::env_with_context_no_errors(raw, |var| {
                if var == "GOPATH" {
                    Some(gopath.to_string())
                } else {
                    Some(std::env::var(var).unwrap_or_default())
                }
            });

            info!("prep: {expanded}");
            let mut cmd = Command::new("bash");
            cmd.args(["-c", &expanded])
                .current_dir(&dir)
                .env("GOPATH", workspace);
            let output = run_captured(&mut cmd)?;
            if !output.status.success() {
                return Err(RuntimeError::CommandFailed {
                    command: expanded.into_owned(),
                    detail: failure_detail(&output),
                });
            }
        }
        Ok(())
    }

    fn test(&self, workspace: &Path, module: &str, timeout: &str) -> Result<(), RuntimeError> {
        let dir = Self::checkout_dir(workspace, module);
        let mut cmd = self.go_command(workspace, &dir)?;
        cmd.args(["test", "-v"]);
        if !timeout.is_empty() {
            cmd.args(["-timeout", timeout]);
        }
        cmd.arg("./...").env("GO111MODULE", "on");

        info!("running `{}`", describe(&cmd));
        let output = run_captured(&mut cmd)?;
        if output.status.success() {
            return Ok(());
        }

        let combined = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        if combined.contains("test timed out") {
            Err(RuntimeError::Timeout(timeout.to_owned()))
        } else {
            Err(RuntimeError::TestFailed(failure_detail(&output)))
        }
    }

    fn build(
        &self,
        workspace: &Path,
        meta: &BuildMetadata,
        skip_targets: &str,
    ) -> Result<(), RuntimeError> {
        let gox = self.ensure_gox(workspace)?;
        let md = checkout_metadata(self, workspace, meta)?;
        let dir = Self::checkout_dir(workspace, &md.package);
        let skip = parse_skip_list(skip_targets);

        for target in &md.build_info.targets {
            if skip.contains(&target.name) {
                info!("skipping target {}", target.name);
                continue;
            }

            let mut cmd = Command::new(&gox);
            if target.cgo {
                cmd.arg("-cgo");
            }
            if !target.ldflags.is_empty() {
                cmd.args(["-ldflags", &target.ldflags]);
            }
            cmd.arg(format!("-osarch={}", target.name))
                .arg("./...")
                .current_dir(&dir)
                .env("GOPATH", workspace);
            if target.legacy {
                cmd.env_remove("GO111MODULE");
            } else {
                cmd.env("GO111MODULE", "on");
            }
            for (key, value) in &target.flags {
                debug!("build flag {key}={value}");
                cmd.env(key, value);
            }

            info!("building target {}", target.name);
            let output = run_captured(&mut cmd)?;
            if !output.status.success() {
                return Err(RuntimeError::CompileFailed {
                    target: target.name.clone(),
                    detail: failure_detail(&output),
                });
            }
        }

        build_extras(&md, &dir)
    }

    fn output_dir(&self, workspace: &Path, meta: &BuildMetadata) -> PathBuf {
        Self::checkout_dir(workspace, &meta.package)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_meta() -> BuildMetadata {
        mason_schema::parse_metadata_str(
            r#"{
  "version": "0.1.0",
  "package": "github.com/nikogura/testproject",
  "building": { "targets": [ { "name": "linux/amd64", "flags": { "FOO": "bar" } } ] }
}"#,
        )
        .unwrap()
    }

    #[test]
    fn creates_gopath_triad() {
        let dir = tempfile::tempdir().unwrap();
        let gopath = GolangLanguage::new().create_work_dir(dir.path()).unwrap();
        assert_eq!(gopath, dir.path().join("go"));
        for sub in ["src", "bin", "pkg"] {
            let path = gopath.join(sub);
            assert!(path.is_dir(), "{sub} missing");
            let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o755);
        }
    }

    #[test]
    fn create_work_dir_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        GolangLanguage::new().create_work_dir(dir.path()).unwrap();
        GolangLanguage::new().create_work_dir(dir.path()).unwrap();
    }

    #[test]
    fn create_work_dir_fails_on_unwritable_root() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        fs::write(&file, "x").unwrap();
        let err = GolangLanguage::new().create_work_dir(&file).unwrap_err();
        assert!(matches!(err, RuntimeError::Workspace { .. }));
    }

    #[test]
    fn output_dir_is_package_checkout() {
        let meta = test_meta();
        let out = GolangLanguage::new().output_dir(Path::new("/tmp/ws/go"), &meta);
        assert_eq!(
            out,
            PathBuf::from("/tmp/ws/go/src/github.com/nikogura/testproject")
        );
    }

    #[test]
    fn prep_substitutes_gopath_and_runs_in_checkout() {
        let dir = tempfile::tempdir().unwrap();
        let gopath = GolangLanguage::new().create_work_dir(dir.path()).unwrap();
        let mut meta = test_meta();
        meta.build_info.prep_commands = vec![
            "echo ${GOPATH} > gopath.txt".to_owned(),
            "pwd > pwd.txt".to_owned(),
        ];
        let checkout = GolangLanguage::new().output_dir(&gopath, &meta);
        fs::create_dir_all(&checkout).unwrap();

        GolangLanguage::new().prep(&gopath, &meta).unwrap();

        let recorded = fs::read_to_string(checkout.join("gopath.txt")).unwrap();
        assert_eq!(recorded.trim(), gopath.to_string_lossy());
        let pwd = fs::read_to_string(checkout.join("pwd.txt")).unwrap();
        assert!(pwd.trim().ends_with("github.com/nikogura/testproject"));
    }

    #[test]
    fn prep_stops_at_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let gopath = GolangLanguage::new().create_work_dir(dir.path()).unwrap();
        let mut meta = test_meta();
        meta.build_info.prep_commands = vec![
            "touch first".to_owned(),
            "exit 7".to_owned(),
            "touch third".to_owned(),
        ];
        let checkout = GolangLanguage::new().output_dir(&gopath, &meta);
        fs::create_dir_all(&checkout).unwrap();

        let err = GolangLanguage::new().prep(&gopath, &meta).unwrap_err();
        assert!(matches!(err, RuntimeError::CommandFailed { ref command, .. } if command == "exit 7"));
        assert!(checkout.join("first").exists());
        assert!(!checkout.join("third").exists());
    }

    /// Stand-in for gox and go: appends its argv and relevant environment to
    /// `log`, then fails when any argument equals `fail_arg`.
    fn fake_tool(path: &Path, log: &Path, fail_arg: &str, fail_output: &str) {
        let script = r#"#!/bin/sh
echo "$* | GO111MODULE=${GO111MODULE-unset} FOO=${FOO-unset} GOPATH=${GOPATH-unset}" >> "@LOG@"
for arg; do
  if [ "$arg" = "@FAIL@" ]; then
    echo "@OUTPUT@" >&2
    exit 1
  fi
done
"#
        .replace("@LOG@", &log.to_string_lossy())
        .replace("@FAIL@", fail_arg)
        .replace("@OUTPUT@", fail_output);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, script).unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    struct FakeGopath {
        _dir: tempfile::TempDir,
        gopath: PathBuf,
        log: PathBuf,
    }

    impl FakeGopath {
        fn new(meta: &BuildMetadata) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let gopath = GolangLanguage::new().create_work_dir(dir.path()).unwrap();
            fs::create_dir_all(GolangLanguage::new().output_dir(&gopath, meta)).unwrap();
            let log = dir.path().join("invocations.log");
            Self {
                _dir: dir,
                gopath,
                log,
            }
        }

        fn with_gox(meta: &BuildMetadata, fail_arg: &str) -> Self {
            let fake = Self::new(meta);
            fake_tool(&fake.gopath.join("bin/gox"), &fake.log, fail_arg, "gox: build failed");
            fake
        }

        fn calls(&self) -> Vec<String> {
            fs::read_to_string(&self.log)
                .unwrap_or_default()
                .lines()
                .map(str::to_owned)
                .collect()
        }
    }

    fn two_targets() -> BuildMetadata {
        mason_schema::parse_metadata_str(
            r#"{
  "version": "0.1.0",
  "package": "github.com/nikogura/testproject",
  "building": { "targets": [
    { "name": "linux/amd64", "flags": { "FOO": "bar" } },
    { "name": "darwin/arm64", "cgo": true, "ldflags": "-X main.version=0.1.0", "legacy": true }
  ] }
}"#,
        )
        .unwrap()
    }

    #[test]
    fn build_invokes_gox_per_target_with_target_settings() {
        let meta = two_targets();
        let fake = FakeGopath::with_gox(&meta, "-osarch=none");
        GolangLanguage::new().build(&fake.gopath, &meta, "").unwrap();

        let gopath = fake.gopath.to_string_lossy();
        assert_eq!(
            fake.calls(),
            vec![
                format!("-osarch=linux/amd64 ./... | GO111MODULE=on FOO=bar GOPATH={gopath}"),
                format!(
                    "-cgo -ldflags -X main.version=0.1.0 -osarch=darwin/arm64 ./... \
                     | GO111MODULE=unset FOO=unset GOPATH={gopath}"
                ),
            ]
        );
    }

    #[test]
    fn build_stops_at_first_failing_target() {
        let meta = two_targets();
        let fake = FakeGopath::with_gox(&meta, "-osarch=linux/amd64");
        let err = GolangLanguage::new()
            .build(&fake.gopath, &meta, "")
            .unwrap_err();

        assert!(
            matches!(err, RuntimeError::CompileFailed { ref target, ref detail }
                if target == "linux/amd64" && detail.contains("gox: build failed")),
            "unexpected error: {err}"
        );
        let calls = fake.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("-osarch=linux/amd64 "));
    }

    #[test]
    fn build_leaves_out_skipped_targets() {
        let meta = two_targets();
        let fake = FakeGopath::with_gox(&meta, "-osarch=none");
        GolangLanguage::new()
            .build(&fake.gopath, &meta, "linux/amd64")
            .unwrap();

        let calls = fake.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].contains("-osarch=darwin/arm64"));
    }

    #[test]
    fn build_with_every_target_skipped_never_runs_gox() {
        let meta = two_targets();
        let fake = FakeGopath::with_gox(&meta, "-osarch=none");
        GolangLanguage::new()
            .build(&fake.gopath, &meta, "darwin/arm64, linux/amd64")
            .unwrap();
        assert!(fake.calls().is_empty());
    }

    #[test]
    fn test_passes_timeout_verbatim() {
        let meta = test_meta();
        let fake = FakeGopath::new(&meta);
        let go = fake.gopath.join("fake-go");
        fake_tool(&go, &fake.log, "never", "");

        GolangLanguage::with_go(&go)
            .test(&fake.gopath, &meta.package, "90s")
            .unwrap();
        GolangLanguage::with_go(&go)
            .test(&fake.gopath, &meta.package, "")
            .unwrap();

        let gopath = fake.gopath.to_string_lossy();
        assert_eq!(
            fake.calls(),
            vec![
                format!("test -v -timeout 90s ./... | GO111MODULE=on FOO=unset GOPATH={gopath}"),
                format!("test -v ./... | GO111MODULE=on FOO=unset GOPATH={gopath}"),
            ]
        );
    }

    #[test]
    fn test_reports_timeouts_separately_from_failures() {
        let meta = test_meta();
        let fake = FakeGopath::new(&meta);
        let slow = fake.gopath.join("slow-go");
        fake_tool(&slow, &fake.log, "./...", "panic: test timed out after 1s");
        let err = GolangLanguage::with_go(&slow)
            .test(&fake.gopath, &meta.package, "1s")
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Timeout(ref t) if t == "1s"));

        let broken = fake.gopath.join("broken-go");
        fake_tool(&broken, &fake.log, "./...", "--- FAIL: TestThing");
        let err = GolangLanguage::with_go(&broken)
            .test(&fake.gopath, &meta.package, "")
            .unwrap_err();
        assert!(matches!(err, RuntimeError::TestFailed(ref d) if d.contains("FAIL: TestThing")));
    }

    // Requires a Go toolchain and network access.
    #[test]
    #[ignore = "requires go, git and network access"]
    fn checkout_test_and_build_real_project() {
        let dir = tempfile::tempdir().unwrap();
        let meta = test_meta();
        let gopath = GolangLanguage::new().create_work_dir(dir.path()).unwrap();
        GolangLanguage::new().checkout(&gopath, &meta, "").unwrap();
        GolangLanguage::new().prep(&gopath, &meta).unwrap();
        GolangLanguage::new().test(&gopath, &meta.package, "").unwrap();
        GolangLanguage::new().build(&gopath, &meta, "").unwrap();
        let out = GolangLanguage::new().output_dir(&gopath, &meta);
        assert!(out.join("testproject_linux_amd64").exists());
    }
}
