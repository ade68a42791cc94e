//! Patient Integration Loader
//!
//! Streams a delimited patient flat file into a persistent store in
//! bounded-size batches, upserting by member id, and schedules a fixed
//! series of follow-up emails for newly inserted patients who have granted
//! consent. The whole file is never held in memory: the source is polled
//! row by row and suspended while each batch's flush cascade (bulk upsert,
//! consent fetch, email creation, link-back) settles.
//!
//! # Example
//!
//! ```no_run
//! use pil_loader::config::LoaderConfig;
//! use pil_loader::loader::DataLoader;
//! use pil_loader::store::postgres::PgPatientStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = sqlx::PgPool::connect("postgresql://localhost/patients").await?;
//!     let store = PgPatientStore::new(pool);
//!     store.ensure_schema().await?;
//!
//!     let config = LoaderConfig::new("patients.csv", 1000)?;
//!     let summary = DataLoader::new(config, store)?.execute().await?;
//!     tracing::info!(rows = summary.rows_seen, "import finished");
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod loader;
pub mod mapper;
pub mod models;
pub mod scheduler;
pub mod source;
pub mod store;

// Re-export commonly used types
pub use error::LoaderError;
pub use loader::DataLoader;
pub use models::RunSummary;
