//! Drives the Go toolchain to build the target package (spec §4.3, C3).

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::AppError;

/// Outcome of one build attempt (spec §3 `BuildOutcome`).
#[derive(Debug)]
pub enum BuildOutcome {
    Success {
        executable_path: PathBuf,
        new_deps: Vec<String>,
    },
    Failure {
        diagnostics: Vec<u8>,
    },
    ToolingError {
        message: String,
    },
}

/// Lines with these prefixes (or blank/whitespace-only lines) are
/// diagnostic noise from the toolchain, not dependency identifiers. They
/// are echoed to stderr unchanged but never treated as deps — a strict
/// reading of spec §4.3 / §9's open question.
fn is_diagnostic_noise(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty()
        || line.starts_with("# ")
        || line.starts_with("ld:")
        || line.starts_with("go:")
}

/// Builds `target` with `go build`, writing the executable to
/// `output_path` (owned by the controller) and capturing combined
/// stdout+stderr for diagnostics.
pub async fn build(target: &str, extra_args: &[String], output_path: &Path) -> BuildOutcome {
    let mut cmd = Command::new("go");
    cmd.arg("build")
        .arg("-v")
        .arg("-o")
        .arg(output_path)
        .args(extra_args)
        .arg(target)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let output = match cmd.output().await {
        Ok(output) => output,
        Err(err) => {
            return BuildOutcome::ToolingError {
                message: format!("failed to run `go build`: {err}"),
            };
        }
    };

    let mut combined = output.stdout;
    combined.extend_from_slice(&output.stderr);

    if !output.status.success() {
        return BuildOutcome::Failure {
            diagnostics: combined,
        };
    }

    let text = String::from_utf8_lossy(&combined);
    let mut new_deps = Vec::new();
    let mut noise = Vec::new();
    for line in text.lines() {
        if is_diagnostic_noise(line) {
            noise.push(line);
        } else {
            new_deps.push(line.trim().to_string());
        }
    }

    if !noise.is_empty() {
        let mut stderr = tokio::io::stderr();
        for line in &noise {
            let _ = stderr.write_all(line.as_bytes()).await;
            let _ = stderr.write_all(b"\n").await;
        }
    }

    BuildOutcome::Success {
        executable_path: output_path.to_path_buf(),
        new_deps,
    }
}

/// Validates that `target` denotes a real, buildable `main` package before
/// the proxy starts listening (spec §6). Without this, an invalid target
/// only ever surfaces on the first rebuild, as an ordinary 502 — but the
/// spec requires startup itself to fail with exit code 1 and a
/// descriptive message ("cannot find package" / "does not contain package
/// main").
pub async fn preflight(target: &str) -> Result<(), AppError> {
    let output = Command::new("go")
        .arg("list")
        .arg("-f")
        .arg("{{.Name}}")
        .arg(target)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|source| AppError::Tooling {
            tool: "go list".to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(AppError::Config {
            message: format!("cannot find package {target:?}"),
            hint: Some(
                "hint: package paths must be relative to the module root and start with ./",
            ),
        });
    }

    let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if name != "main" {
        return Err(AppError::Config {
            message: format!("{target} does not contain package main"),
            hint: None,
        });
    }

    Ok(())
}

/// Queries the toolchain for the full transitive dependency set of
/// `target`. Needed on first build and after a failed build, since
/// incremental builds (`go build -v`) only report recompiled packages.
pub async fn list_all_deps(target: &str) -> Result<Vec<String>, String> {
    let output = Command::new("go")
        .arg("list")
        .arg("-deps")
        .arg(target)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|err| format!("failed to run `go list -deps`: {err}"))?;

    if !output.status.success() {
        return Err(String::from_utf8_lossy(&output.stderr).into_owned());
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_noise_prefixes_are_recognized() {
        assert!(is_diagnostic_noise("# internal/poll"));
        assert!(is_diagnostic_noise("ld: warning: something"));
        assert!(is_diagnostic_noise("go: downloading module v1.2.3"));
        assert!(is_diagnostic_noise("   "));
        assert!(is_diagnostic_noise(""));
    }

    #[test]
    fn identifier_shaped_lines_are_not_noise() {
        assert!(!is_diagnostic_noise("example.com/project/internal/server"));
        assert!(!is_diagnostic_noise("golang.org/x/sync/errgroup"));
    }
}
