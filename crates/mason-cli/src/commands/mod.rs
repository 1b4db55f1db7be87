pub mod build;
pub mod completions;
pub mod man_pages;
pub mod publish;
pub mod sign;
pub mod verify;

use indicatif::{ProgressBar, ProgressStyle};
use mason_core::{ArtifactOptions, Engine, ProcessedArtifact, RunOptions, RunReport};
use mason_runtime::{check_golang_prereqs, check_signing_prereqs, format_missing};
use mason_schema::{read_metadata, BuildMetadata, UserConfig, DEFAULT_SIGNING_PROGRAM};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_METADATA_ERROR: u8 = 2;

/// Global flags every command sees.
pub struct Context {
    pub metadata_path: PathBuf,
    pub json: bool,
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn load_metadata(ctx: &Context) -> Result<BuildMetadata, String> {
    read_metadata(&ctx.metadata_path).map_err(|e| format!("metadata error: {e}"))
}

pub fn load_user_config() -> Result<UserConfig, String> {
    UserConfig::load_default().map_err(|e| format!("user config error: {e}"))
}

/// The signing program a run will invoke: user config, then metadata, then `gpg`.
fn signing_program<'a>(meta: &'a BuildMetadata, user: &'a UserConfig) -> &'a str {
    [&user.signing.program, &meta.sign_info.program]
        .into_iter()
        .find(|p| !p.is_empty())
        .map_or(DEFAULT_SIGNING_PROGRAM, String::as_str)
}

/// Fail early when a binary the run will shell out to is missing.
/// `MASON_SKIP_PREREQS=1` bypasses the check.
pub fn ensure_prereqs(
    meta: &BuildMetadata,
    user: &UserConfig,
    building: bool,
    signing: bool,
) -> Result<(), String> {
    if std::env::var("MASON_SKIP_PREREQS").as_deref() == Ok("1") {
        return Ok(());
    }
    let mut missing = Vec::new();
    if building && meta.language() == "golang" {
        missing.extend(check_golang_prereqs());
    }
    if signing {
        missing.extend(check_signing_prereqs(signing_program(meta, user)));
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(format_missing(&missing))
    }
}

fn describe(item: &ProcessedArtifact) -> String {
    use console::Style;
    let name = item
        .path
        .file_name()
        .map_or_else(|| item.path.display().to_string(), |n| n.to_string_lossy().into_owned());
    let mut line = Style::new().bold().apply_to(name).to_string();
    if item.signature.is_some() {
        line.push_str(&format!(" {}", Style::new().green().apply_to("signed")));
    }
    if let Some(dest) = &item.collected {
        line.push_str(&format!(" -> {}", dest.display()));
    }
    for url in &item.published {
        line.push_str(&format!("\n    {}", Style::new().cyan().apply_to(url)));
    }
    line
}

pub fn print_processed(items: &[ProcessedArtifact]) {
    for item in items {
        println!("  {}", describe(item));
    }
}

/// Shared body of `build`, `sign` and `publish`: run the pipeline and report
/// every processed artifact and extra.
pub fn run_pipeline(
    ctx: &Context,
    opts: &RunOptions,
    options: ArtifactOptions,
    verb: &str,
) -> Result<u8, String> {
    let meta = load_metadata(ctx)?;
    let user = load_user_config()?;
    ensure_prereqs(&meta, &user, true, options.sign)?;
    let dest = std::env::current_dir().map_err(|e| format!("failed to resolve cwd: {e}"))?;
    let engine = Engine::new(user);

    let pb = (!ctx.json).then(|| spinner(&format!("{verb} {}...", meta.package)));
    let report = match engine.run(&meta, opts, options, &dest) {
        Ok(r) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, &format!("{verb} {} {}", meta.package, meta.version));
            }
            r
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, &format!("{verb} failed"));
            }
            return Err(e.to_string());
        }
    };
    print_report(ctx, &meta, &report, &dest)?;
    Ok(EXIT_SUCCESS)
}

fn print_report(
    ctx: &Context,
    meta: &BuildMetadata,
    report: &RunReport,
    dest: &Path,
) -> Result<(), String> {
    if ctx.json {
        let payload = serde_json::json!({
            "package": meta.package,
            "version": meta.version,
            "dest": dest,
            "artifacts": report.artifacts,
            "extras": report.extras,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        if !report.artifacts.is_empty() {
            println!("artifacts:");
            print_processed(&report.artifacts);
        }
        if !report.extras.is_empty() {
            println!("extras:");
            print_processed(&report.extras);
        }
    }
    Ok(())
}
