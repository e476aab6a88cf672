//! `lrt` entry point: parses arguments, resolves configuration, wires the
//! reload controller to the reverse proxy, and waits for a shutdown signal.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lrt_core::build;
use lrt_core::config::{Config, ServiceAddress};
use lrt_core::error::AppError;
use lrt_core::gate::Gate;
use lrt_core::proxy::{self, ProxyState};
use lrt_core::watch::Debouncer;
use lrt_core::Controller;

/// Live-reloading development proxy: builds, runs, and proxies to a Go
/// service, rebuilding on change.
#[derive(Parser, Debug)]
#[command(name = "lrt", version, about)]
struct Cli {
    /// Address the reverse proxy accepts inbound connections on.
    #[arg(long = "listen", env = "LRT_LISTEN", default_value = "localhost:3000")]
    listen: String,

    /// Address the child service listens on. Defaults to an auto-assigned
    /// ephemeral port re-drawn on every rebuild.
    #[arg(long = "service", env = "LRT_SERVICE")]
    service: Option<String>,

    /// Extra arguments appended to the build command, shell-quoted.
    #[arg(long = "build-args", env = "LRT_BUILD_ARGS", default_value = "")]
    build_args: String,

    /// Extra arguments appended to the child service invocation, shell-quoted.
    #[arg(long = "cmd-args", env = "LRT_CMD_ARGS", default_value = "")]
    cmd_args: String,

    /// Health-check path, resolved against the service address.
    #[arg(long = "health-check", env = "LRT_HEALTH_CHECK", default_value = "/")]
    health_check: String,

    /// Maximum time to wait for the first 2xx from the health check.
    #[arg(
        long = "health-check-timeout",
        env = "LRT_HEALTH_CHECK_TIMEOUT",
        default_value = "10s"
    )]
    health_check_timeout: String,

    /// The target package to build. Defaults to the current directory.
    #[arg(default_value = ".")]
    package: String,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    run().await
}

async fn run() -> ExitCode {
    let cli = Cli::parse();

    let health_check_timeout = match humantime::parse_duration(&cli.health_check_timeout) {
        Ok(d) => d,
        Err(err) => {
            eprintln!(
                "lrt: error: invalid -health-check-timeout {:?}: {err}",
                cli.health_check_timeout
            );
            return ExitCode::from(2);
        }
    };

    let config = match Config::resolve(
        &cli.listen,
        cli.service.as_deref(),
        cli.build_args,
        cli.cmd_args,
        cli.health_check,
        health_check_timeout,
        cli.package,
    ) {
        Ok(config) => config,
        Err(err) => return exit_for(&err),
    };

    if let Err(err) = build::preflight(&config.target_package).await {
        return exit_for(&err);
    }

    let listener = match tokio::net::TcpListener::bind(config.listen_addr).await {
        Ok(listener) => listener,
        Err(source) => {
            return exit_for(&AppError::ListenBind {
                addr: config.listen_addr.to_string(),
                source,
            })
        }
    };

    let initial_service_addr = match config.service_addr {
        ServiceAddress::Explicit(addr) => addr,
        ServiceAddress::Ephemeral => config.listen_addr,
    };
    let gate = Arc::new(Gate::new(initial_service_addr));

    let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel();
    let (controller, change_rx) = match Controller::new(config, Arc::clone(&gate), fatal_tx).await
    {
        Ok(pair) => pair,
        Err(err) => return exit_for(&err),
    };

    let debounced_controller = Arc::clone(&controller);
    let debouncer = Arc::new(Debouncer::new(Duration::from_millis(100), move || {
        let controller = Arc::clone(&debounced_controller);
        async move { controller.rebuild().await }
    }));

    tokio::spawn(Controller::pump_changes(change_rx, Arc::clone(&debouncer)));

    let initial_build_controller = Arc::clone(&controller);
    tokio::spawn(async move { initial_build_controller.rebuild().await });

    let proxy_state = Arc::new(ProxyState {
        gate,
        client: reqwest::Client::new(),
    });
    let app = proxy::router(proxy_state);

    let serve_handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!(error = %err, "reverse proxy server exited");
        }
    });

    tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
        Some(err) = fatal_rx.recv() => {
            serve_handle.abort();
            controller.shutdown().await;
            return exit_for(&err);
        }
    }

    serve_handle.abort();
    controller.shutdown().await;
    ExitCode::SUCCESS
}

/// Print `err` (with its hint, if any) to stderr and return the exit code
/// the error class maps to, per spec §6/§7.
fn exit_for(err: &AppError) -> ExitCode {
    eprintln!("lrt: error: {err}");
    if let Some(hint) = err.hint() {
        eprintln!("     {hint}");
    }
    ExitCode::from(err.exit_code() as u8)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
