//! Partitioned parallel aggregation over fixed-width vehicle-collision records.
//!
//! The file is split into group-aligned byte ranges, each range is loaded by its own
//! persistent worker thread, and the coordinator reduces per-worker partials into
//! one answer per query.

pub mod boundary;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod dataset;
pub mod error;
pub mod partition;
pub mod query;
pub mod worker;

pub use config::{Config, Layout};
pub use coordinator::{BuildSummary, Coordinator};
pub use error::{CollisionError, Result};
pub use query::{Answer, Query};
