//! Build driving and dependency resolution (C3, C4).

pub mod builder;
pub mod resolver;

pub use builder::{build, list_all_deps, preflight, BuildOutcome};
pub use resolver::{goroot, resolve, ModuleInfo, Resolution};
