use crate::RuntimeError;
use std::path::PathBuf;
use std::process::{Command, Output};
use tracing::debug;

const DETAIL_LINES: usize = 20;

pub(crate) fn find_program(name: &str) -> Result<PathBuf, RuntimeError> {
    which::which(name)
        .map_err(|e| RuntimeError::ToolchainMissing(format!("'{name}' not found in PATH: {e}")))
}

/// Render a command line for logs and error messages.
pub(crate) fn describe(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().into_owned()];
    parts.extend(cmd.get_args().map(|a| a.to_string_lossy().into_owned()));
    parts.join(" ")
}

/// Run to completion with captured output. Spawn failures surface as I/O errors;
/// a non-zero exit is left for the caller to classify.
pub(crate) fn run_captured(cmd: &mut Command) -> Result<Output, RuntimeError> {
    let line = describe(cmd);
    match cmd.get_current_dir() {
        Some(dir) => debug!("running `{line}` in {}", dir.display()),
        None => debug!("running `{line}`"),
    }
    let output = cmd.output()?;
    log_stream("stdout", &output.stdout);
    log_stream("stderr", &output.stderr);
    Ok(output)
}

fn log_stream(name: &str, bytes: &[u8]) {
    for line in String::from_utf8_lossy(bytes).lines() {
        debug!("{name}: {line}");
    }
}

/// The last few lines of stderr (or stdout, when stderr is empty) plus the exit status.
pub(crate) fn failure_detail(output: &Output) -> String {
    let stream = if output.stderr.iter().all(u8::is_ascii_whitespace) {
        &output.stdout
    } else {
        &output.stderr
    };
    let text = String::from_utf8_lossy(stream);
    let lines: Vec<&str> = text.lines().collect();
    let tail = lines[lines.len().saturating_sub(DETAIL_LINES)..].join("\n");
    if tail.trim().is_empty() {
        output.status.to_string()
    } else {
        format!("{}\n{}", output.status, tail.trim_end())
    }
}
