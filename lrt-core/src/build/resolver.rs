//! Maps a dependency identifier to an on-disk directory (spec §4.4, C4).
//!
//! The classic and module-aware paths are mutually exclusive on a given
//! run: the mode is chosen once at startup by inspecting whether the
//! working tree declares a `go.mod` (spec §9's design note).

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

/// Result of resolving a single dependency identifier.
#[derive(Debug, PartialEq, Eq)]
pub enum Resolution {
    Directory(PathBuf),
    Skip,
}

/// A parsed `go.mod`'s module name and `replace` table, used in
/// module-aware mode.
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub module_name: String,
    pub root_dir: PathBuf,
    /// `replace <prefix> => <relative path>` entries, most specific first.
    pub replacements: Vec<(String, PathBuf)>,
}

impl ModuleInfo {
    /// Parse `go.mod` at `root_dir`, if present.
    pub fn discover(root_dir: &Path) -> Option<Self> {
        let go_mod_path = root_dir.join("go.mod");
        let contents = std::fs::read_to_string(&go_mod_path).ok()?;
        Self::parse(&contents, root_dir)
    }

    fn parse(contents: &str, root_dir: &Path) -> Option<Self> {
        let mut module_name = None;
        let mut replacements = Vec::new();

        for line in contents.lines() {
            let line = line.trim();
            if let Some(rest) = line.strip_prefix("module ") {
                module_name = Some(rest.trim().to_string());
            } else if let Some(rest) = line.strip_prefix("replace ") {
                if let Some((prefix, path)) = parse_replace_directive(rest) {
                    replacements.push((prefix, path));
                }
            }
        }

        // Longest prefix first so `resolve` finds the most specific match.
        replacements.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Some(Self {
            module_name: module_name?,
            root_dir: root_dir.to_path_buf(),
            replacements,
        })
    }
}

/// Parses `<mod> [version] => <path>` (the two shapes Go's `go.mod`
/// `replace` directive allows) into `(mod, path)`. Only local-path
/// replacements are relevant here; module-to-module replacements are
/// ignored since they don't name an on-disk directory directly.
fn parse_replace_directive(rest: &str) -> Option<(String, PathBuf)> {
    let (lhs, rhs) = rest.split_once("=>")?;
    let rhs = rhs.trim();
    if !(rhs.starts_with("./") || rhs.starts_with("../") || rhs == "." || rhs.starts_with('/')) {
        // Replacement target is another module, not a local path; skip.
        return None;
    }
    let mut lhs_parts = lhs.split_whitespace();
    let prefix = lhs_parts.next()?.to_string();
    Some((prefix, PathBuf::from(rhs)))
}

/// Resolves `ident` to a directory, or `Skip` for standard-library /
/// toolchain-internal identifiers. `module_info` is `None` in classic mode.
pub async fn resolve(
    ident: &str,
    module_info: Option<&ModuleInfo>,
    goroot: &Path,
) -> Result<Resolution, String> {
    if let Some(info) = module_info {
        return resolve_module_aware(ident, info);
    }
    resolve_classic(ident, goroot).await
}

fn resolve_module_aware(ident: &str, info: &ModuleInfo) -> Result<Resolution, String> {
    for (prefix, path) in &info.replacements {
        if let Some(suffix) = strip_ident_prefix(ident, prefix) {
            let dir = info.root_dir.join(path).join(suffix.trim_start_matches('/'));
            return Ok(Resolution::Directory(dir));
        }
    }

    if let Some(suffix) = strip_ident_prefix(ident, &info.module_name) {
        let dir = info.root_dir.join(suffix.trim_start_matches('/'));
        return Ok(Resolution::Directory(dir));
    }

    // Not under our module and not locally replaced: treat as an external
    // dependency outside the watchable workspace, but not a toolchain
    // internal either. Conservatively skip rather than fatally error,
    // since we have no directory to hand the Watcher.
    Ok(Resolution::Skip)
}

fn strip_ident_prefix<'a>(ident: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = ident.strip_prefix(prefix)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

async fn resolve_classic(ident: &str, goroot: &Path) -> Result<Resolution, String> {
    let output = Command::new("go")
        .arg("list")
        .arg("-find")
        .arg("-f")
        .arg("{{.Dir}}")
        .arg(ident)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|err| format!("failed to run `go list`: {err}"))?;

    if !output.status.success() {
        return Err(String::from_utf8_lossy(&output.stderr).into_owned());
    }

    let dir = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if dir.is_empty() {
        return Err(format!("go list returned no directory for {ident}"));
    }
    let dir = PathBuf::from(dir);

    if dir.starts_with(goroot) {
        return Ok(Resolution::Skip);
    }

    Ok(Resolution::Directory(dir))
}

/// Resolve `GOROOT`, the toolchain install root used to filter
/// standard-library packages out of classic-mode resolution.
pub async fn goroot() -> Result<PathBuf, String> {
    let output = Command::new("go")
        .arg("env")
        .arg("GOROOT")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|err| format!("failed to run `go env GOROOT`: {err}"))?;

    if !output.status.success() {
        return Err(String::from_utf8_lossy(&output.stderr).into_owned());
    }

    Ok(PathBuf::from(
        String::from_utf8_lossy(&output.stdout).trim().to_string(),
    ))
}
