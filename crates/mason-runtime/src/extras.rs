use crate::RuntimeError;
use mason_schema::{render_template, BuildMetadata};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::debug;

const MODE_EXECUTABLE: u32 = 0o755;
const MODE_REGULAR: u32 = 0o644;

/// Render every declared extra artifact from its template into `checkout_dir`.
///
/// Templates and outputs are resolved relative to `checkout_dir`. Output mode is
/// 0755 for executable extras, 0644 otherwise.
pub fn build_extras(meta: &BuildMetadata, checkout_dir: &Path) -> Result<(), RuntimeError> {
    for extra in &meta.build_info.extras {
        let template_path = checkout_dir.join(&extra.template);
        let output_path = checkout_dir.join(&extra.file_name);
        debug!(
            "rendering {} -> {}",
            template_path.display(),
            output_path.display()
        );

        let text = fs::read_to_string(&template_path).map_err(|e| RuntimeError::ExtraArtifact {
            path: template_path.clone(),
            detail: format!("failed to read template: {e}"),
        })?;
        let rendered = render_template(&text, meta).map_err(|e| RuntimeError::ExtraArtifact {
            path: template_path.clone(),
            detail: e.to_string(),
        })?;

        let write_err = |e: std::io::Error| RuntimeError::ExtraArtifact {
            path: output_path.clone(),
            detail: e.to_string(),
        };
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(&output_path, rendered).map_err(write_err)?;

        let mode = if extra.executable {
            MODE_EXECUTABLE
        } else {
            MODE_REGULAR
        };
        fs::set_permissions(&output_path, fs::Permissions::from_mode(mode)).map_err(write_err)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mason_schema::ExtraArtifact;

    fn meta_with(extras: Vec<ExtraArtifact>) -> BuildMetadata {
        let mut meta = BuildMetadata {
            package: "github.com/nikogura/testproject".into(),
            version: "0.1.0".into(),
            description: "A test project".into(),
            ..BuildMetadata::default()
        };
        meta.build_info.extras = extras;
        meta
    }

    #[test]
    fn renders_templates_with_modes() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("templates")).unwrap();
        fs::write(
            dir.path().join("templates/install.sh.tmpl"),
            "#!/bin/sh\necho installing {{.Version}}\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("templates/description.tmpl"),
            "{{.Description}}",
        )
        .unwrap();

        let meta = meta_with(vec![
            ExtraArtifact {
                template: "templates/install.sh.tmpl".into(),
                file_name: "install.sh".into(),
                executable: true,
            },
            ExtraArtifact {
                template: "templates/description.tmpl".into(),
                file_name: "out/description.txt".into(),
                executable: false,
            },
        ]);
        build_extras(&meta, dir.path()).unwrap();

        let script = dir.path().join("install.sh");
        assert_eq!(
            fs::read_to_string(&script).unwrap(),
            "#!/bin/sh\necho installing 0.1.0\n"
        );
        assert_eq!(
            fs::metadata(&script).unwrap().permissions().mode() & 0o777,
            0o755
        );

        let desc = dir.path().join("out/description.txt");
        assert_eq!(fs::read_to_string(&desc).unwrap(), "A test project");
        assert_eq!(
            fs::metadata(&desc).unwrap().permissions().mode() & 0o777,
            0o644
        );
    }

    #[test]
    fn missing_template_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let meta = meta_with(vec![ExtraArtifact {
            template: "nope.tmpl".into(),
            file_name: "nope".into(),
            executable: false,
        }]);
        let err = build_extras(&meta, dir.path()).unwrap_err();
        assert!(matches!(err, RuntimeError::ExtraArtifact { .. }));
    }

    #[test]
    fn template_syntax_error_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.tmpl"), "{{.Version").unwrap();
        let meta = meta_with(vec![ExtraArtifact {
            template: "bad.tmpl".into(),
            file_name: "bad".into(),
            executable: false,
        }]);
        let err = build_extras(&meta, dir.path()).unwrap_err();
        assert!(err.to_string().contains("syntax"));
    }
}
