//! Reload controller for `lrt`, a live-reloading development proxy.
//!
//! This crate is the hard part described in the design: a state machine
//! that coordinates filesystem watching, debounced rebuild scheduling,
//! child-process lifecycle, readiness probing, and a reverse proxy that
//! gates traffic across rebuilds with at-most-one concurrent rebuild.
//!
//! The CLI shell (argument parsing, process wiring, signal handling) lives
//! in the separate `lrt` binary crate; this crate exposes everything it
//! needs to drive a run.

pub mod build;
pub mod config;
pub mod controller;
pub mod error;
pub mod gate;
pub mod proxy;
pub mod supervisor;
pub mod watch;

pub use config::Config;
pub use controller::Controller;
pub use error::AppError;
pub use gate::Gate;
