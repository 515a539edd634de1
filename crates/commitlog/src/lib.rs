//! Durable append-only commit log for HNSW vector indexes.
//!
//! Every mutation to the in-memory graph (node creation, link edits,
//! tombstones, entry-point changes, resets) is appended as a record to the
//! active segment of a per-index log directory. Replaying the directory in
//! timestamp order reconstructs the graph after a crash or restart.
//!
//! Background maintenance keeps the on-disk footprint bounded while a
//! concurrent writer keeps appending:
//!
//! - **Rotation**: an active segment over the size threshold is sealed and
//!   a fresh one swapped in.
//! - **Condensation**: a sealed segment is rewritten into a smaller,
//!   replay-equivalent `.condensed` sibling by coalescing per-node edits.
//! - **Combination**: small adjacent sealed segments are merged into one.
//!
//! Maintenance writes through `.tmp` sidecars that are fsynced and renamed
//! into place; sources are unlinked only afterwards. An interrupted run
//! therefore never loses data: stale sidecars are discarded on the next
//! directory scan while the sources remain intact.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use vektor_commitlog::{CommitLogConfig, CommitLogger};
//!
//! # fn main() -> vektor_commitlog::Result<()> {
//! let config = CommitLogConfig::new("/var/lib/vektor", "items", Duration::from_secs(60));
//! let log = CommitLogger::open(config)?;
//!
//! log.add_node(42, 2)?;
//! log.add_link_at_level(42, 0, 7)?;
//! log.set_entry_point_with_max_layer(42, 2)?;
//! log.flush()?;
//!
//! log.shutdown();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod format;
pub mod logger;
pub mod maintenance;
pub mod segment;
pub mod testing;

pub use config::{CommitLogConfig, ConfigError};
pub use error::{CommitLogError, Result};
pub use format::Record;
pub use logger::CommitLogger;
