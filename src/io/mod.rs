//! Reading and writing partitioned tabular files.

pub mod compression;
pub mod partitions;
pub mod tsv;

pub use partitions::{DailyPartitionLister, PathLister, parse_date};
pub use tsv::{LineSource, LocalFs, TsvFormat};
