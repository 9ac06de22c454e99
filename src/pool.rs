//! LRU block buffer pool.
//!
//! The pool caches a fixed number of fixed-size blocks of a backing storage and serves position-addressed
//! byte reads and writes from them. Writes are deferred: a modified block is written back only when it is
//! evicted or when the pool is flushed.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, prelude::*, SeekFrom};
use std::num::NonZeroUsize;

use log;

/// Default block size in bytes.
pub const BLOCK_SIZE: usize = 4096;

const DEFAULT_BLOCK_SIZE: NonZeroUsize = match NonZeroUsize::new(BLOCK_SIZE) {
    Some(size) => size,
    None => panic!("block size must be non-zero"),
};

/// Marks the absence of a neighbour in the recency list.
const NIL: usize = usize::MAX;

/// Buffer pool I/O counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of blocks read from the backing storage.
    pub disk_reads: u64,
    /// Number of blocks written to the backing storage.
    pub disk_writes: u64,
    /// Number of reads served by a resident block.
    pub cache_hits: u64,
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cache hits: {}, disk reads: {}, disk writes: {}",
            self.cache_hits, self.disk_reads, self.disk_writes
        )
    }
}

/// In-memory holder of one block.
struct Slot {
    data: Box<[u8]>,
    /// Block currently held by the slot.
    block: Option<u64>,
    /// Number of leading bytes of `data` backed by the storage.
    len: usize,
    dirty: bool,
    prev: usize,
    next: usize,
}

impl Slot {
    fn new(block_size: usize) -> Self {
        Slot {
            data: vec![0; block_size].into_boxed_slice(),
            block: None,
            len: 0,
            dirty: false,
            prev: NIL,
            next: NIL,
        }
    }
}

/// Fixed-capacity block cache with least-recently-used replacement and write-back on eviction.
///
/// The slots form an intrusive doubly linked list ordered from the most to the least recently used one,
/// so both promotion and eviction are constant time.
pub struct BufferPool<F> {
    storage: F,
    block_size: usize,
    slots: Vec<Slot>,
    /// Maps a resident block to the slot holding it.
    resident: HashMap<u64, usize>,
    /// Most recently used slot.
    head: usize,
    /// Least recently used slot.
    tail: usize,
    /// Number of slots bound at least once since construction or the last flush.
    loaded: usize,
    stats: PoolStats,
}

impl<F> BufferPool<F>
where
    F: Read + Write + Seek,
{
    /// Creates a pool of `capacity` blocks of [`BLOCK_SIZE`] bytes over the storage.
    pub fn new(storage: F, capacity: NonZeroUsize) -> Self {
        Self::with_block_size(storage, capacity, DEFAULT_BLOCK_SIZE)
    }

    /// Creates a pool of `capacity` blocks of `block_size` bytes over the storage.
    ///
    /// # Arguments
    /// * `storage` - Backing storage. Block `i` occupies bytes `[i * block_size, (i + 1) * block_size)`.
    /// * `capacity` - Number of blocks kept in memory.
    /// * `block_size` - Block size in bytes.
    pub fn with_block_size(storage: F, capacity: NonZeroUsize, block_size: NonZeroUsize) -> Self {
        let block_size = block_size.get();
        let slots = (0..capacity.get()).map(|_| Slot::new(block_size)).collect();

        BufferPool {
            storage,
            block_size,
            slots,
            resident: HashMap::with_capacity(capacity.get()),
            head: NIL,
            tail: NIL,
            loaded: 0,
            stats: PoolStats::default(),
        }
    }

    /// Copies `dst.len()` bytes starting at `pos` into `dst`.
    ///
    /// An access crossing a block boundary is served block by block.
    pub fn get(&mut self, dst: &mut [u8], pos: u64) -> io::Result<()> {
        let mut done = 0;
        while done < dst.len() {
            let (block, offset) = self.locate(pos + done as u64);
            let n = (self.block_size - offset).min(dst.len() - done);

            let idx = match self.resident.get(&block).copied() {
                Some(idx) => {
                    self.stats.cache_hits += 1;
                    self.promote(idx);
                    idx
                }
                None => self.load(block)?,
            };

            dst[done..done + n].copy_from_slice(&self.slots[idx].data[offset..offset + n]);
            done += n;
        }

        Ok(())
    }

    /// Copies `src` into the pool at `pos` and marks the touched blocks dirty.
    ///
    /// Nothing is written to the storage until the block is evicted or the pool is flushed.
    pub fn put(&mut self, src: &[u8], pos: u64) -> io::Result<()> {
        let mut done = 0;
        while done < src.len() {
            let (block, offset) = self.locate(pos + done as u64);
            let n = (self.block_size - offset).min(src.len() - done);

            let idx = match self.resident.get(&block).copied() {
                Some(idx) => {
                    self.promote(idx);
                    idx
                }
                None => self.load(block)?,
            };

            let slot = &mut self.slots[idx];
            slot.data[offset..offset + n].copy_from_slice(&src[done..done + n]);
            slot.len = slot.len.max(offset + n);
            slot.dirty = true;
            done += n;
        }

        Ok(())
    }

    /// Writes every dirty block back to the storage and releases all blocks.
    ///
    /// The pool can still be used afterwards; it starts cold.
    pub fn flush(&mut self) -> io::Result<()> {
        let mut idx = self.head;
        let mut written = 0;
        while idx != NIL {
            if self.write_back(idx)? {
                written += 1;
            }
            idx = self.slots[idx].next;
        }
        self.storage.flush()?;

        for slot in self.slots.iter_mut() {
            slot.block = None;
            slot.len = 0;
            slot.prev = NIL;
            slot.next = NIL;
        }
        self.resident.clear();
        self.head = NIL;
        self.tail = NIL;
        self.loaded = 0;

        log::debug!("buffer pool flushed ({} blocks written, {})", written, self.stats);

        Ok(())
    }

    /// Returns the I/O counters accumulated so far.
    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Returns the number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Returns the number of currently resident blocks.
    pub fn resident(&self) -> usize {
        self.resident.len()
    }

    pub fn get_ref(&self) -> &F {
        &self.storage
    }

    /// Consumes the pool returning the backing storage. Unflushed writes are lost.
    pub fn into_inner(self) -> F {
        self.storage
    }

    fn locate(&self, pos: u64) -> (u64, usize) {
        let block_size = self.block_size as u64;
        (pos / block_size, (pos % block_size) as usize)
    }

    /// Brings `block` into a slot and returns the slot index.
    fn load(&mut self, block: u64) -> io::Result<usize> {
        if self.loaded < self.slots.len() {
            let idx = self.loaded;
            self.read_block(idx, block)?;
            self.loaded += 1;
            self.bind(idx, block);
            return Ok(idx);
        }

        let idx = self.tail;
        self.write_back(idx)?;
        self.unlink(idx);
        if let Some(evicted) = self.slots[idx].block.take() {
            self.resident.remove(&evicted);
            log::trace!("block {} evicted in favour of block {}", evicted, block);
        }

        if let Err(err) = self.read_block(idx, block) {
            // keep the unbound slot first in line for the next load
            self.push_back(idx);
            return Err(err);
        }
        self.bind(idx, block);

        Ok(idx)
    }

    fn bind(&mut self, idx: usize, block: u64) {
        self.slots[idx].block = Some(block);
        self.resident.insert(block, idx);
        self.push_front(idx);
    }

    fn read_block(&mut self, idx: usize, block: u64) -> io::Result<()> {
        self.storage.seek(SeekFrom::Start(block * self.block_size as u64))?;

        let slot = &mut self.slots[idx];
        let len = read_full(&mut self.storage, &mut slot.data)?;
        slot.data[len..].fill(0);
        slot.len = len;
        slot.dirty = false;
        self.stats.disk_reads += 1;

        Ok(())
    }

    /// Writes the slot back if it is dirty. Returns whether a write happened.
    fn write_back(&mut self, idx: usize) -> io::Result<bool> {
        let slot = &mut self.slots[idx];
        let block = match slot.block {
            Some(block) if slot.dirty => block,
            _ => return Ok(false),
        };

        self.storage.seek(SeekFrom::Start(block * self.block_size as u64))?;
        self.storage.write_all(&slot.data[..slot.len])?;
        slot.dirty = false;
        self.stats.disk_writes += 1;

        Ok(true)
    }

    fn promote(&mut self, idx: usize) {
        if self.head != idx {
            self.unlink(idx);
            self.push_front(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.slots[idx].prev, self.slots[idx].next);

        if prev == NIL {
            self.head = next;
        } else {
            self.slots[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.slots[next].prev = prev;
        }

        self.slots[idx].prev = NIL;
        self.slots[idx].next = NIL;
    }

    fn push_front(&mut self, idx: usize) {
        self.slots[idx].prev = NIL;
        self.slots[idx].next = self.head;
        if self.head == NIL {
            self.tail = idx;
        } else {
            self.slots[self.head].prev = idx;
        }
        self.head = idx;
    }

    fn push_back(&mut self, idx: usize) {
        self.slots[idx].next = NIL;
        self.slots[idx].prev = self.tail;
        if self.tail == NIL {
            self.head = idx;
        } else {
            self.slots[self.tail].next = idx;
        }
        self.tail = idx;
    }
}

/// Reads until `buf` is full or the reader is exhausted. Returns the number of bytes read.
pub(crate) fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }

    Ok(total)
}
