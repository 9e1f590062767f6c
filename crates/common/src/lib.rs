//! Autotest Common Library
//!
//! Shared data model, the process-wide module cache registry and the
//! dependency purger used by the autotest harness.

pub mod error;
pub mod module_cache;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result};
pub use module_cache::{CacheEntry, InstallTree, Loaded, ModuleCache, ModuleResolver, Purger};
pub use types::*;

/// Autotest version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Directory that holds installed dependencies inside an install tree
pub const DEPS_DIR: &str = "deps";

/// Identifier of the web framework dependency
pub const FRAMEWORK_MODULE: &str = "framework";
