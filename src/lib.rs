//! `disk-quicksort` sorts files of fixed-size records in place without loading them into memory.
//!
//! Every byte the sorter touches goes through a [`BufferPool`]: a fixed number of cached file blocks with
//! least-recently-used replacement and write-back on eviction. On top of it [`Sorter`] runs a three-way
//! partition quicksort that falls back to insertion sort for short ranges, so inputs with many duplicate
//! keys are handled in few passes.
//!
//! # Record format
//!
//! A record is 4 bytes long. The first 2 bytes are a signed big-endian key, the remaining 2 bytes are an
//! opaque payload that travels with the key. A file is a plain sequence of records.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use disk_quicksort::{check, FileSorterBuilder};
//!
//! fn main() {
//!     let sorter = FileSorterBuilder::new().with_buffers(10).build().unwrap();
//!
//!     let report = sorter.sort_file(Path::new("input.bin")).unwrap();
//!     assert!(check::check_file(Path::new("input.bin")).unwrap());
//!
//!     print!("{}", report);
//! }
//! ```

pub mod check;
pub mod generator;
pub mod pool;
pub mod record;
pub mod report;
pub mod sort;

pub use generator::{FileGenerator, RecordFormat};
pub use pool::{BufferPool, PoolStats, BLOCK_SIZE};
pub use record::{Record, RECORD_SIZE};
pub use report::SortReport;
pub use sort::{FileSorter, FileSorterBuilder, SortError, Sorter};
