//! Resolver configuration.
//!
//! Values are merged from several sources, lowest to highest priority:
//!
//! 1. Built-in defaults
//! 2. A JSON config file (`rpmsolve.json` in the platform config dir unless
//!    a path is given)
//! 3. Environment variables (`RPMSOLVE_*`, e.g. `RPMSOLVE_ALLOW_ERASING=1`)
//!
//! # Example
//!
//! ```rust,no_run
//! use rpmsolve_core::config::ResolverConfig;
//! use rpmsolve_core::Demands;
//!
//! let config = ResolverConfig::build(None::<&str>, true).unwrap();
//! let demands = Demands::from(&config);
//! println!("best: {}", demands.best);
//! ```

mod config;
mod source;

pub use config::ResolverConfig;
pub use source::{ConfigLoader, ConfigSource, RawConfig};
