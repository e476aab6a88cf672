//! Exercises `Supervisor` against real child processes and a real HTTP
//! health endpoint, without depending on a Go toolchain being present —
//! the child is a plain `/bin/sh` one-liner standing in for the service
//! under test, since `wait_healthy`/`stop` only care about process exit
//! and `PORT`-independent HTTP polling.

use std::time::Duration;

use axum::routing::get;
use axum::Router;
use lrt_core::supervisor::{HealthOutcome, Supervisor};
use tokio::net::TcpListener;

async fn spawn_health_endpoint() -> std::net::SocketAddr {
    let app = Router::new().route("/", get(|| async { "ok" }));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn wait_healthy_returns_ready_once_probe_succeeds() {
    let health_addr = spawn_health_endpoint().await;
    let url = format!("http://{health_addr}/");

    let mut supervisor = Supervisor::new();
    supervisor
        .start("/bin/sh".as_ref(), &["-c".to_string(), "sleep 5".to_string()], 0)
        .unwrap();

    let outcome = supervisor.wait_healthy(&url, Duration::from_secs(2)).await;
    assert!(matches!(outcome, HealthOutcome::Ready));

    supervisor.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn wait_healthy_returns_exited_when_child_dies_first() {
    let mut supervisor = Supervisor::new();
    supervisor
        .start("/bin/sh".as_ref(), &["-c".to_string(), "exit 1".to_string()], 0)
        .unwrap();

    // Nothing is listening on this port; the child exits almost
    // immediately, which must win the race against the (failing) probe.
    let outcome = supervisor
        .wait_healthy("http://127.0.0.1:1/", Duration::from_secs(5))
        .await;
    assert!(matches!(outcome, HealthOutcome::Exited));
}

#[tokio::test]
async fn wait_healthy_times_out_when_nothing_ever_answers() {
    let mut supervisor = Supervisor::new();
    supervisor
        .start("/bin/sh".as_ref(), &["-c".to_string(), "sleep 5".to_string()], 0)
        .unwrap();

    let outcome = supervisor
        .wait_healthy("http://127.0.0.1:1/", Duration::from_millis(150))
        .await;
    assert!(matches!(outcome, HealthOutcome::TimedOut));

    supervisor.stop(Duration::from_secs(1)).await;
}

#[cfg(unix)]
#[tokio::test]
async fn stop_escalates_to_kill_after_grace_period() {
    let mut supervisor = Supervisor::new();
    // Ignores SIGTERM so `stop` is forced to escalate to SIGKILL.
    supervisor
        .start(
            "/bin/sh".as_ref(),
            &["-c".to_string(), "trap '' TERM; sleep 5".to_string()],
            0,
        )
        .unwrap();

    let start = tokio::time::Instant::now();
    supervisor.stop(Duration::from_millis(200)).await;
    // The child ignored SIGTERM, so `stop` must have escalated to SIGKILL
    // rather than waiting the full `sleep 5`.
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn stop_is_a_no_op_without_a_running_child() {
    let mut supervisor = Supervisor::new();
    supervisor.stop(Duration::from_millis(50)).await;
}
