//! Sortedness verification.

use std::fs;
use std::io::{self, prelude::*};
use std::path::Path;

use crate::pool::read_full;
use crate::record::{Record, RECORD_SIZE};

/// Scans records from the reader and returns the index of the first record whose key is smaller than the key
/// of its predecessor, or [`None`] if the records are in ascending key order.
///
/// A trailing partial record results in an [`io::ErrorKind::InvalidData`] error.
pub fn first_unsorted<R: Read>(reader: R) -> io::Result<Option<u64>> {
    let mut reader = io::BufReader::new(reader);
    let mut record = [0u8; RECORD_SIZE];
    let mut prev: Option<i16> = None;
    let mut index = 0;

    loop {
        match read_full(&mut reader, &mut record)? {
            0 => return Ok(None),
            RECORD_SIZE => {}
            n => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("truncated record {} ({} of {} bytes)", index, n, RECORD_SIZE),
                ))
            }
        }

        let key = Record::key_of(&record);
        if prev.map_or(false, |prev| key < prev) {
            return Ok(Some(index));
        }
        prev = Some(key);
        index += 1;
    }
}

/// Checks whether the records of the file at `path` are sorted.
pub fn check_file(path: &Path) -> io::Result<bool> {
    let file = fs::File::open(path)?;
    Ok(first_unsorted(file)?.is_none())
}
