//! Filesystem watching and debounce collapsing (C1, C2).

mod debounce;
mod watcher;

pub use debounce::Debouncer;
pub use watcher::{ChangeSignal, Watcher};
