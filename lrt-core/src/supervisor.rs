//! Child service process lifecycle: start, health-probe, stop (spec §4.5, C5).

use std::net::{SocketAddr, TcpListener};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::Instant;

use crate::error::AppError;

/// Outcome of waiting for the child to become healthy.
#[derive(Debug)]
pub enum HealthOutcome {
    Ready,
    Exited,
    TimedOut,
}

/// Owns the current child process handle, if any.
///
/// Exactly one `Supervisor` exists per controller. It never keeps two
/// children alive at once: `stop()` must be awaited to completion (the
/// child reaped) before the next `start()` is issued, enforced by the
/// controller's rebuild sequence rather than by this type itself.
pub struct Supervisor {
    child: Option<Child>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self { child: None }
    }

    /// Launch `executable` with `args`, setting `PORT` in its environment.
    /// stdin is not inherited; stdout/stderr are inherited so the developer
    /// sees service logs directly in the parent's terminal.
    pub fn start(
        &mut self,
        executable: &std::path::Path,
        args: &[String],
        port: u16,
    ) -> Result<(), AppError> {
        let mut cmd = Command::new(executable);
        cmd.args(args)
            .env("PORT", port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(false);

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Start a new process group so `stop` can signal the whole
            // tree, including any grandchildren the service forks.
            cmd.process_group(0);
        }

        let child = cmd.spawn().map_err(|source| AppError::Tooling {
            tool: executable.display().to_string(),
            source,
        })?;

        self.child = Some(child);
        Ok(())
    }

    /// Poll `url` until it answers with any 2xx status or `timeout`
    /// elapses, concurrently watching for the child exiting first.
    pub async fn wait_healthy(&mut self, url: &str, timeout: Duration) -> HealthOutcome {
        let Some(child) = self.child.as_mut() else {
            return HealthOutcome::Exited;
        };

        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;

        loop {
            if Instant::now() >= deadline {
                return HealthOutcome::TimedOut;
            }

            let probe = client.get(url).send();
            let wait = child.wait();

            tokio::select! {
                biased;
                status = wait => {
                    let _ = status;
                    return HealthOutcome::Exited;
                }
                result = probe => {
                    if let Ok(response) = result {
                        if response.status().is_success() {
                            return HealthOutcome::Ready;
                        }
                    }
                }
            }
        }
    }

    /// Terminate the current child, escalating to a kill signal after
    /// `grace`. Always reaps. A no-op if no child is running.
    pub async fn stop(&mut self, grace: Duration) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        terminate(&mut child);

        match tokio::time::timeout(grace, child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        let _ = kill(Pid::from_raw(-(pid as i32)), Signal::SIGTERM);
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.start_kill();
}

/// Draw a fresh service port for the next generation.
///
/// Binds an OS-assigned port on `listen_host` and immediately closes the
/// listener (bind-and-close trick). Falls back to `1` prepended to the
/// listen port as a decimal string if the probe bind fails.
pub fn allocate_ephemeral_port(listen_addr: SocketAddr) -> u16 {
    let probe_addr = SocketAddr::new(listen_addr.ip(), 0);
    if let Ok(listener) = TcpListener::bind(probe_addr) {
        if let Ok(addr) = listener.local_addr() {
            return addr.port();
        }
    }

    format!("1{}", listen_addr.port())
        .parse()
        .unwrap_or(listen_addr.port())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_port_prepends_one() {
        let addr: SocketAddr = "127.0.0.1:3000".parse().unwrap();
        // Can't force the bind to fail deterministically here; this test
        // just pins the fallback formatting rule in isolation.
        let fallback: u16 = format!("1{}", addr.port()).parse().unwrap();
        assert_eq!(fallback, 13000);
    }
}
