//! Disk-aware quicksort.

use log;
use std::cmp::Ordering;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::fs;
use std::io::{self, prelude::*};
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Instant;

use crate::pool::{BufferPool, PoolStats, BLOCK_SIZE};
use crate::record::{Record, RECORD_SIZE};
use crate::report::SortReport;

const RECORD: u64 = RECORD_SIZE as u64;

/// Ranges covering fewer bytes than this (30 records) are sorted by insertion.
const INSERTION_SORT_SPAN: u64 = 30 * RECORD;

/// Default number of buffer pool blocks.
pub const DEFAULT_BUFFERS: usize = 10;

/// Sorting error.
#[derive(Debug)]
pub enum SortError {
    /// Common I/O error.
    IO(io::Error),
    /// Buffer pool capacity is zero.
    InvalidBuffers(usize),
    /// Block size is zero or not a multiple of the record size.
    InvalidBlockSize(usize),
    /// Data length is not a multiple of the record size.
    UnalignedLength(u64),
}

impl Error for SortError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::IO(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for SortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::IO(err) => write!(f, "I/O operation failed: {}", err),
            SortError::InvalidBuffers(buffers) => write!(f, "invalid number of buffers: {}", buffers),
            SortError::InvalidBlockSize(size) => {
                write!(f, "block size {} is not a positive multiple of {}", size, RECORD_SIZE)
            }
            SortError::UnalignedLength(len) => {
                write!(f, "data length {} is not a multiple of the record size {}", len, RECORD_SIZE)
            }
        }
    }
}

/// Three-way partition quicksort over records addressed by byte offset.
///
/// Every key comparison and record move goes through the borrowed [`BufferPool`], the sorter never touches
/// the storage directly.
pub struct Sorter<'a, F> {
    pool: &'a mut BufferPool<F>,
}

impl<'a, F> Sorter<'a, F>
where
    F: Read + Write + Seek,
{
    pub fn new(pool: &'a mut BufferPool<F>) -> Self {
        Sorter { pool }
    }

    /// Sorts the first `count` records.
    pub fn sort_records(&mut self, count: u64) -> io::Result<()> {
        if count == 0 {
            return Ok(());
        }
        self.sort(0, (count - 1) * RECORD)
    }

    /// Sorts records starting at byte offsets within `[left, right]` in ascending key order.
    ///
    /// Both bounds must be record aligned. `left > right` denotes an empty range.
    ///
    /// Of the two partitions left after a pass the smaller one is sorted recursively and the larger one
    /// iteratively, which keeps the call depth logarithmic. When the lower partition is the larger one the
    /// upper partition is sorted first, so the block access order, and with it the cache hit, disk read and
    /// disk write counters, can differ from a strict lower-then-upper recursion over the same input.
    pub fn sort(&mut self, mut left: u64, mut right: u64) -> io::Result<()> {
        while left <= right {
            if right + RECORD - left < INSERTION_SORT_SPAN {
                return self.insertion_sort(left, right);
            }

            // [left, low) < pivot, [low, high] == pivot, (high, right] > pivot
            let (low, high) = self.partition(left, right)?;

            if low - left <= right - high {
                if low > left {
                    self.sort(left, low - RECORD)?;
                }
                left = high + RECORD;
            } else {
                self.sort(high + RECORD, right)?;
                right = low - RECORD;
            }
        }

        Ok(())
    }

    /// Returns the key of the record at `pos`.
    pub fn key(&mut self, pos: u64) -> io::Result<i16> {
        let mut record = [0u8; RECORD_SIZE];
        self.pool.get(&mut record, pos)?;
        Ok(Record::key_of(&record))
    }

    /// Single Dutch national flag pass around the leftmost key.
    /// Returns the bounds of the region equal to the pivot.
    fn partition(&mut self, left: u64, right: u64) -> io::Result<(u64, u64)> {
        let pivot = self.key(left)?;
        let (mut low, mut high, mut i) = (left, right, left);

        while i <= high {
            match self.key(i)?.cmp(&pivot) {
                Ordering::Less => {
                    self.swap(low, i)?;
                    low += RECORD;
                    i += RECORD;
                }
                Ordering::Greater => {
                    // the swapped in record is examined on the next iteration
                    self.swap(high, i)?;
                    high -= RECORD;
                }
                Ordering::Equal => i += RECORD,
            }
        }

        log::trace!(
            "partitioned [{}, {}] around {}: {} less, {} equal, {} greater",
            left,
            right,
            pivot,
            (low - left) / RECORD,
            (high + RECORD - low) / RECORD,
            (right - high) / RECORD
        );

        Ok((low, high))
    }

    fn insertion_sort(&mut self, left: u64, right: u64) -> io::Result<()> {
        let mut i = left + RECORD;
        while i <= right {
            let mut j = i;
            while j > left && self.key(j)? < self.key(j - RECORD)? {
                self.swap(j, j - RECORD)?;
                j -= RECORD;
            }
            i += RECORD;
        }

        Ok(())
    }

    fn swap(&mut self, first: u64, second: u64) -> io::Result<()> {
        let mut a = [0u8; RECORD_SIZE];
        let mut b = [0u8; RECORD_SIZE];
        self.pool.get(&mut a, first)?;
        self.pool.get(&mut b, second)?;
        self.pool.put(&a, second)?;
        self.pool.put(&b, first)?;

        Ok(())
    }
}

/// File sorter builder. Provides methods for [`FileSorter`] initialization.
#[derive(Clone)]
pub struct FileSorterBuilder {
    /// Number of blocks kept in the buffer pool.
    buffers: usize,
    /// Buffer pool block size in bytes.
    block_size: usize,
}

impl FileSorterBuilder {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        FileSorterBuilder::default()
    }

    /// Builds a [`FileSorter`] instance using provided configuration.
    pub fn build(self) -> Result<FileSorter, SortError> {
        FileSorter::new(self.buffers, self.block_size)
    }

    /// Sets number of blocks kept in the buffer pool.
    pub fn with_buffers(mut self, buffers: usize) -> FileSorterBuilder {
        self.buffers = buffers;
        return self;
    }

    /// Sets buffer pool block size.
    pub fn with_block_size(mut self, block_size: usize) -> FileSorterBuilder {
        self.block_size = block_size;
        return self;
    }
}

impl Default for FileSorterBuilder {
    fn default() -> Self {
        FileSorterBuilder {
            buffers: DEFAULT_BUFFERS,
            block_size: BLOCK_SIZE,
        }
    }
}

/// Sorts record files in place.
#[derive(Debug, Clone)]
pub struct FileSorter {
    buffers: NonZeroUsize,
    block_size: NonZeroUsize,
}

impl FileSorter {
    /// Creates a new file sorter instance.
    ///
    /// # Arguments
    /// * `buffers` - Number of blocks kept in the buffer pool.
    /// * `block_size` - Block size in bytes. Must be a multiple of the record size so that no record
    ///   straddles two blocks.
    pub fn new(buffers: usize, block_size: usize) -> Result<Self, SortError> {
        let buffers = NonZeroUsize::new(buffers).ok_or(SortError::InvalidBuffers(buffers))?;
        let block_size = NonZeroUsize::new(block_size)
            .filter(|size| size.get() % RECORD_SIZE == 0)
            .ok_or(SortError::InvalidBlockSize(block_size))?;

        return Ok(FileSorter { buffers, block_size });
    }

    /// Sorts the file at `path` in place and flushes the result to disk.
    pub fn sort_file(&self, path: &Path) -> Result<SortReport, SortError> {
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(SortError::IO)?;
        let len = file.metadata().map_err(SortError::IO)?.len();

        log::info!(
            "sorting {} ({} records, {} buffers of {} bytes)",
            path.display(),
            len / RECORD,
            self.buffers,
            self.block_size
        );

        let started = Instant::now();
        let (file, stats) = self.sort_storage(file, len)?;
        let elapsed = started.elapsed();
        file.sync_all().map_err(SortError::IO)?;

        log::info!("{} sorted in {:?} ({})", path.display(), elapsed, stats);

        return Ok(SortReport {
            file: path.to_path_buf(),
            records: len / RECORD,
            stats,
            elapsed,
        });
    }

    /// Sorts the first `len` bytes of the storage and flushes the buffer pool.
    /// Returns the storage along with the buffer pool counters.
    pub fn sort_storage<F>(&self, storage: F, len: u64) -> Result<(F, PoolStats), SortError>
    where
        F: Read + Write + Seek,
    {
        if len % RECORD != 0 {
            return Err(SortError::UnalignedLength(len));
        }

        let mut pool = BufferPool::with_block_size(storage, self.buffers, self.block_size);
        Sorter::new(&mut pool).sort_records(len / RECORD).map_err(SortError::IO)?;
        pool.flush().map_err(SortError::IO)?;

        let stats = pool.stats();
        return Ok((pool.into_inner(), stats));
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, Cursor};
    use std::num::NonZeroUsize;
    use std::path::Path;

    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    use rstest::*;

    use super::{FileSorter, FileSorterBuilder, SortError, Sorter};
    use crate::check;
    use crate::generator::{FileGenerator, RecordFormat};
    use crate::pool::{BufferPool, PoolStats};
    use crate::record::Record;

    fn encode(records: &[Record]) -> Vec<u8> {
        records.iter().flat_map(|r| r.to_bytes()).collect()
    }

    fn decode(bytes: &[u8]) -> Vec<Record> {
        bytes
            .chunks_exact(4)
            .map(|chunk| Record::from_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn sort_bytes(bytes: Vec<u8>, buffers: usize, block_size: usize) -> (Vec<u8>, PoolStats) {
        let len = bytes.len() as u64;
        let sorter = FileSorterBuilder::new()
            .with_buffers(buffers)
            .with_block_size(block_size)
            .build()
            .unwrap();

        let (storage, stats) = sorter.sort_storage(Cursor::new(bytes), len).unwrap();
        (storage.into_inner(), stats)
    }

    fn assert_sorted_permutation(input: &[Record], output: &[Record]) {
        assert!(
            output.windows(2).all(|pair| pair[0].key <= pair[1].key),
            "output is not sorted"
        );

        let mut expected = input.to_vec();
        let mut actual = output.to_vec();
        expected.sort_by_key(|r| (r.key, r.payload));
        actual.sort_by_key(|r| (r.key, r.payload));
        assert_eq!(actual, expected);
    }

    fn random_records(count: usize, key_range: std::ops::Range<i32>, seed: u64) -> Vec<Record> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|i| Record::new(rng.gen_range(key_range.clone()) as i16, (i as u16).to_be_bytes()))
            .collect()
    }

    #[test]
    fn test_small_file_with_three_buffers() {
        let keys = [5, 3, 5, 1, 5, 9, 0, 2, 5, 4];
        let input = Vec::from_iter(keys.iter().enumerate().map(|(i, &key)| Record::new(key, [i as u8, 0xa0])));

        let (output, stats) = sort_bytes(encode(&input), 3, 4096);
        let output = decode(&output);

        let sorted_keys = Vec::from_iter(output.iter().map(|r| r.key));
        assert_eq!(sorted_keys, vec![0, 1, 2, 3, 4, 5, 5, 5, 5, 9]);
        assert_sorted_permutation(&input, &output);
        for record in &output {
            assert_eq!(keys[record.payload[0] as usize], record.key);
        }

        assert_eq!(stats.disk_reads, 1);
        assert_eq!(stats.disk_writes, 1);
    }

    #[rstest]
    #[case(1, 4, 300)]
    #[case(1, 4096, 2_000)]
    #[case(3, 64, 5_000)]
    #[case(10, 4096, 20_000)]
    #[case(4, 1024, 50_000)]
    fn test_sorts_random_records(#[case] buffers: usize, #[case] block_size: usize, #[case] count: usize) {
        let input = random_records(count, i16::MIN as i32..i16::MAX as i32 + 1, count as u64);

        let (output, _) = sort_bytes(encode(&input), buffers, block_size);

        assert_sorted_permutation(&input, &decode(&output));
    }

    #[rstest]
    #[case(0..1)]
    #[case(0..3)]
    #[case(-2..2)]
    fn test_sorts_many_duplicates(#[case] key_range: std::ops::Range<i32>) {
        let input = random_records(10_000, key_range, 7);

        let (output, _) = sort_bytes(encode(&input), 4, 256);

        assert_sorted_permutation(&input, &decode(&output));
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn test_presorted_input(#[case] reversed: bool) {
        let mut input = Vec::from_iter((0..2_000).map(|i: i16| Record::new(i - 1_000, i.to_be_bytes())));
        if reversed {
            input.reverse();
        }

        let (output, _) = sort_bytes(encode(&input), 2, 512);

        assert_sorted_permutation(&input, &decode(&output));
    }

    #[test]
    fn test_equal_keys_take_a_single_pass() {
        let input = Vec::from_iter((0..1_000).map(|i: u16| Record::new(7, i.to_be_bytes())));
        let bytes = encode(&input);

        let (output, stats) = sort_bytes(bytes.clone(), 1, 4096);

        // pivot read plus one read per record, nothing moved
        assert_eq!(
            stats,
            PoolStats {
                disk_reads: 1,
                disk_writes: 0,
                cache_hits: 1_000,
            }
        );
        assert_eq!(output, bytes);
    }

    #[test]
    fn test_each_block_read_once_when_pool_covers_file() {
        let mut input = Vec::from_iter((0..4_000).map(|i: i16| Record::new(i, [0, 0])));
        input.shuffle(&mut StdRng::seed_from_u64(1));

        // 16000 bytes in 256-byte blocks
        let (output, stats) = sort_bytes(encode(&input), 63, 256);

        assert_eq!(stats.disk_reads, 63);
        assert!(stats.disk_writes <= 63);
        assert_sorted_permutation(&input, &decode(&output));
    }

    #[rstest]
    // 28 adjacent pairs compared once each, nothing moved
    #[case(29, PoolStats { disk_reads: 1, disk_writes: 0, cache_hits: 55 })]
    // partition: pivot read, one key per record and 29 swaps to the upper side leaving
    // [k1, k2, .., k29] rotated to [k2, .., k29, k1]; insertion tail: 27 in-order comparisons
    // plus 28 comparisons and swaps moving k1 to the front
    #[case(30, PoolStats { disk_reads: 1, disk_writes: 1, cache_hits: 254 })]
    fn test_insertion_sort_cutoff(#[case] count: u16, #[case] expected: PoolStats) {
        let input = Vec::from_iter((0..count).map(|i| Record::new(i as i16, i.to_be_bytes())));
        let mut pool = BufferPool::new(Cursor::new(encode(&input)), NonZeroUsize::new(1).unwrap());

        Sorter::new(&mut pool).sort_records(count as u64).unwrap();
        pool.flush().unwrap();

        assert_eq!(pool.stats(), expected);
        assert_eq!(decode(pool.get_ref().get_ref()), input);
    }

    #[rstest]
    #[case(0, 0)]
    #[case(8, 8)]
    #[case(8, 4)]
    fn test_trivial_range_touches_nothing(#[case] left: u64, #[case] right: u64) {
        let bytes = encode(&random_records(4, 0..100, 3));
        let mut pool = BufferPool::new(Cursor::new(bytes), NonZeroUsize::new(1).unwrap());

        Sorter::new(&mut pool).sort(left, right).unwrap();
        Sorter::new(&mut pool).sort_records(0).unwrap();

        assert_eq!(pool.stats(), PoolStats::default());
    }

    #[test]
    fn test_sorts_subrange_only() {
        let input = Vec::from_iter([9, 8, 7, 6, 5, 4].iter().map(|&key| Record::new(key, [0, 0])));
        let mut pool = BufferPool::new(Cursor::new(encode(&input)), NonZeroUsize::new(1).unwrap());

        Sorter::new(&mut pool).sort(4, 16).unwrap();
        pool.flush().unwrap();

        let keys = Vec::from_iter(decode(pool.get_ref().get_ref()).iter().map(|r| r.key));
        assert_eq!(keys, vec![9, 5, 6, 7, 8, 4]);
    }

    #[rstest]
    #[case(0, 4096)]
    #[case(1, 0)]
    #[case(1, 6)]
    fn test_invalid_configuration(#[case] buffers: usize, #[case] block_size: usize) {
        let result = FileSorterBuilder::new()
            .with_buffers(buffers)
            .with_block_size(block_size)
            .build();

        match result {
            Err(SortError::InvalidBuffers(actual)) => assert_eq!(actual, buffers),
            Err(SortError::InvalidBlockSize(actual)) => assert_eq!(actual, block_size),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_unaligned_length_is_rejected() {
        let sorter = FileSorter::new(1, 4096).unwrap();

        let result = sorter.sort_storage(Cursor::new(vec![0u8; 6]), 6);

        assert!(matches!(result, Err(SortError::UnalignedLength(6))));
    }

    #[test]
    fn test_missing_file() {
        let sorter = FileSorter::new(1, 4096).unwrap();

        match sorter.sort_file(Path::new("./does-not-exist.bin")) {
            Err(SortError::IO(err)) => assert_eq!(err.kind(), io::ErrorKind::NotFound),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[rstest]
    #[case(RecordFormat::Binary)]
    #[case(RecordFormat::Ascii)]
    fn test_sort_file(#[case] format: RecordFormat) {
        let tmp_dir = tempfile::tempdir().unwrap();
        let path = tmp_dir.path().join("input.bin");
        FileGenerator::new(format).with_seed(11).generate_file(&path, 20 * 1024).unwrap();
        assert_eq!(check::check_file(&path).unwrap(), false);

        let report = FileSorterBuilder::new().with_buffers(4).build().unwrap().sort_file(&path).unwrap();

        assert!(check::check_file(&path).unwrap());
        assert_eq!(report.records, 20 * 1024);
        assert_eq!(report.file, path);
        assert!(report.stats.disk_reads >= 20);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 80 * 1024);
    }
}
