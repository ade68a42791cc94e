//! PIL Common Library
//!
//! Shared infrastructure for Patient Integration Loader components.
//!
//! Currently this is the logging stack: leveled, structured output to the
//! console and/or daily-rotated log files, configured from the environment
//! or programmatically.
//!
//! # Example
//!
//! ```no_run
//! use pil_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!     tracing::info!("application start");
//!     Ok(())
//! }
//! ```

pub mod logging;

// Re-export the pieces every binary needs
pub use logging::{init_logging, LogConfig, LogLevel};
