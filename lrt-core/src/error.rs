//! Error taxonomy for the reload controller.
//!
//! Fatal errors ([`AppError`]) terminate the process with a hint on stderr
//! and a specific exit code. Recoverable errors — build diagnostics, boot
//! exit, boot timeout — are never propagated as `Err`; they are recorded
//! into [`crate::controller::ErrorResponse`] and served as 502 bodies
//! instead. See spec §7 for the full taxonomy.

use std::fmt;

/// Fatal error kinds that abort the controller.
///
/// Each variant carries the exact hint text printed to stderr alongside the
/// error, matching the original tool's practice of always pairing an error
/// with actionable next steps rather than a bare message.
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("{message}")]
    Config {
        message: String,
        hint: Option<&'static str>,
    },

    #[error("failed to listen on {addr}: {source}")]
    ListenBind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("file watcher error: {message}")]
    WatchBackend {
        message: String,
        hint: Option<&'static str>,
    },

    #[error("failed to resolve dependency {ident}: {message}")]
    DependencyResolution { ident: String, message: String },

    #[error("failed to invoke external tool `{tool}`: {source}")]
    Tooling {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

impl AppError {
    /// The exit code `main` should use for this error, per spec §6.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config { .. } => 1,
            _ => 1,
        }
    }

    /// Hint text to print after the error message, if any.
    pub fn hint(&self) -> Option<&str> {
        match self {
            AppError::Config { hint, .. } => *hint,
            AppError::WatchBackend { hint, .. } => *hint,
            AppError::ListenBind { .. } => {
                Some("hint: another process may already be listening on that address.")
            }
            AppError::DependencyResolution { .. } => None,
            AppError::Tooling { .. } => None,
        }
    }
}

/// Render the documented boot-exit 502 body for `health_url`.
pub fn boot_exit_body(health_url: &str) -> Vec<u8> {
    format!(
        "lrt: error: service unexpectedly exited before responding to {health_url}\n     hint: check the terminal output to see if any errors were logged.\n"
    )
    .into_bytes()
}

/// Render the documented boot-timeout 502 body for `health_url`/`timeout`.
pub fn boot_timeout_body(health_url: &str, timeout: std::time::Duration) -> Vec<u8> {
    let dur = DisplayDuration(timeout);
    format!(
        "lrt: error: service is still not responding on {health_url} after {dur}\n     hint: ensure your service listens on $PORT. ...\n           also, check the terminal output to see if any errors were logged.\n"
    )
    .into_bytes()
}

struct DisplayDuration(std::time::Duration);

impl fmt::Display for DisplayDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", humantime::format_duration(self.0))
    }
}
