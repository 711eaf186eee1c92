//! Junction Configuration Module
//!
//! Provides the per-junction configuration loaded from a TOML file: phase
//! cycle, relay topology, density tuning and one entry per approach.
//!
//! ## Loading Order
//!
//! 1. `--config <path>` on the command line
//! 2. `JUNCTION_CONFIG` environment variable (path to TOML file)
//! 3. `junction.toml` in the current working directory
//!
//! There is no built-in junction; if none of these exists start-up fails.
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! // In main():
//! config::init(JunctionConfig::load()?);
//!
//! // Anywhere in the codebase:
//! if let Some(cfg) = config::get() {
//!     let tag = &cfg.junction.sub_location_id;
//! }
//! ```

mod junction_config;
pub mod defaults;
pub mod validation;

pub use junction_config::*;

use std::sync::OnceLock;

/// Global junction configuration, initialized once at startup.
static JUNCTION_CONFIG: OnceLock<JunctionConfig> = OnceLock::new();

/// Initialize the global junction configuration.
///
/// Only the first call takes effect.
pub fn init(config: JunctionConfig) {
    if JUNCTION_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// The global junction configuration, `None` before `init()`.
pub fn get() -> Option<&'static JunctionConfig> {
    JUNCTION_CONFIG.get()
}
