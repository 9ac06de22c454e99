//! Sort run report.

use std::fmt;
use std::fs;
use std::io::{self, prelude::*};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pool::PoolStats;

/// Outcome of a single file sort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortReport {
    /// Sorted file.
    pub file: PathBuf,
    /// Number of records in the file.
    pub records: u64,
    /// Buffer pool counters after the final flush.
    pub stats: PoolStats,
    /// Time spent sorting and flushing.
    pub elapsed: Duration,
}

impl SortReport {
    /// Appends the report followed by an empty line to the file at `path`, creating it if necessary.
    pub fn append_to(&self, path: &Path) -> io::Result<()> {
        let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", self)?;
        file.flush()
    }
}

impl fmt::Display for SortReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Sort on {}", self.file.display())?;
        writeln!(f, "Cache Hits: {}", self.stats.cache_hits)?;
        writeln!(f, "Disk Reads: {}", self.stats.disk_reads)?;
        writeln!(f, "Disk Writes: {}", self.stats.disk_writes)?;
        writeln!(f, "Time is {}", self.elapsed.as_millis())
    }
}
