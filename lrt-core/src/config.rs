//! Resolved, immutable run configuration (spec §3 `Config`).
//!
//! `Config` is built once at startup and never mutated afterward; every
//! component that needs configuration borrows it rather than owning a copy.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

/// Where the child service should listen, as resolved at startup.
#[derive(Debug, Clone, Copy)]
pub enum ServiceAddress {
    /// The user pinned an explicit host:port with `--service`.
    Explicit(std::net::SocketAddr),
    /// No `--service` was given; a fresh ephemeral port is drawn per rebuild.
    Ephemeral,
}

/// Resolved, immutable configuration for a run of the controller.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the reverse proxy accepts inbound connections on.
    pub listen_addr: std::net::SocketAddr,
    /// Where the child service listens, or `Ephemeral` to auto-assign.
    pub service_addr: ServiceAddress,
    /// Extra arguments appended to the build command.
    pub build_args: Vec<String>,
    /// Extra arguments appended to the child service invocation.
    pub cmd_args: Vec<String>,
    /// Health-check path, resolved against the service address at runtime.
    pub health_check_path: String,
    /// Maximum time to wait for the first 2xx from the health check.
    pub health_check_timeout: Duration,
    /// The target package/module identifier to build.
    pub target_package: String,
    /// Path the built executable is written to (owned by the controller,
    /// removed on shutdown).
    pub temp_executable_path: PathBuf,
}

impl Config {
    /// Resolve a [`Config`] from parsed CLI flags.
    ///
    /// `listen` and `service` are `host:port` strings (the latter
    /// optional); `health_check` is a path resolved relative to whichever
    /// service address ends up chosen for a given generation.
    #[allow(clippy::too_many_arguments)]
    pub fn resolve(
        listen: &str,
        service: Option<&str>,
        build_args: String,
        cmd_args: String,
        health_check: String,
        health_check_timeout: Duration,
        target_package: String,
    ) -> Result<Self, AppError> {
        let listen_addr = parse_host_port(listen).map_err(|message| AppError::Config {
            message: format!("invalid -listen address {listen:?}: {message}"),
            hint: Some("hint: use the form host:port, e.g. localhost:3000."),
        })?;

        let service_addr = match service {
            Some(s) => ServiceAddress::Explicit(parse_host_port(s).map_err(|message| {
                AppError::Config {
                    message: format!("invalid -service address {s:?}: {message}"),
                    hint: Some("hint: use the form host:port, e.g. localhost:3001."),
                }
            })?),
            None => ServiceAddress::Ephemeral,
        };

        let target_package = if target_package.is_empty() {
            ".".to_string()
        } else {
            target_package
        };

        if target_package.starts_with('/') {
            return Err(AppError::Config {
                message: format!("cannot find package {target_package:?}"),
                hint: Some(
                    "hint: package paths must be relative to the module root and start with ./",
                ),
            });
        }

        let temp_executable_path = std::env::temp_dir().join(format!(
            "lrt-build-{}-{}",
            std::process::id(),
            unique_suffix()
        ));

        Ok(Self {
            listen_addr,
            service_addr,
            build_args: shell_words(&build_args),
            cmd_args: shell_words(&cmd_args),
            health_check_path: if health_check.is_empty() {
                "/".to_string()
            } else {
                health_check
            },
            health_check_timeout,
            target_package,
            temp_executable_path,
        })
    }

    /// Build the full health-check URL against a concrete service address.
    pub fn health_check_url(&self, service_addr: std::net::SocketAddr) -> String {
        let path = if self.health_check_path.starts_with('/') {
            self.health_check_path.clone()
        } else {
            format!("/{}", self.health_check_path)
        };
        format!("http://{service_addr}{path}")
    }
}

fn unique_suffix() -> u128 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

fn parse_host_port(s: &str) -> Result<std::net::SocketAddr, String> {
    use std::net::ToSocketAddrs;
    s.to_socket_addrs()
        .map_err(|e| e.to_string())?
        .next()
        .ok_or_else(|| "no address resolved".to_string())
}

/// Minimal shell-word splitting for `-build-args`/`-cmd-args`: splits on
/// whitespace while honoring single and double quoting. Not a full shell
/// grammar — the original tool's own quoting is similarly minimal.
fn shell_words(input: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut has_token = false;

    for c in input.chars() {
        match c {
            '\'' if !in_double => {
                in_single = !in_single;
                has_token = true;
            }
            '"' if !in_single => {
                in_double = !in_double;
                has_token = true;
            }
            c if c.is_whitespace() && !in_single && !in_double => {
                if has_token {
                    words.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        words.push(current);
    }
    words
}
