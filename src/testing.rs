//! Helpers for testing code built on tsvbeam.
//!
//! - **Assertions**: compare datasets with readable failure messages
//! - **Fixtures**: small ready-made datasets and partition trees
//! - **Mock I/O**: an in-memory store that lists and serves partitioned files,
//!   with injectable latency and failures, so scans run without touching disk
//!
//! # Quick Start
//!
//! ```
//! use tsvbeam::merge;
//! use tsvbeam::testing::*;
//!
//! # fn main() -> tsvbeam::Result<()> {
//! let merged = merge(people_trio(), None)?;
//! assert_header(&merged, &["id", "name"]);
//! assert_column_values(&merged, "id", &["1", "2", "3"]);
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod fixtures;
pub mod mock_io;

pub use assertions::*;
pub use fixtures::*;
pub use mock_io::*;
