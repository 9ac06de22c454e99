//! Test data generator.

use std::fs;
use std::io::{self, prelude::*};
use std::path::Path;

use log;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::record::RECORD_SIZE;

/// Number of records filled by a single generation task.
const TASK_RECORDS: usize = 1024;

/// Number of tasks generated in memory before being written out.
const BATCH_TASKS: usize = 256;

/// Generated record format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    /// Random keys over the whole 16-bit range and random payload bytes.
    Binary,
    /// A space followed by an uppercase letter for both the key and the payload, so the file is printable.
    Ascii,
}

/// Writes files of random records.
///
/// Records are generated in parallel. Each task derives its random generator from the seed and its position
/// in the output, so the produced data only depends on the seed.
#[derive(Debug, Clone)]
pub struct FileGenerator {
    format: RecordFormat,
    seed: Option<u64>,
}

impl FileGenerator {
    pub fn new(format: RecordFormat) -> Self {
        FileGenerator { format, seed: None }
    }

    /// Sets the random seed. A random one is used by default.
    pub fn with_seed(mut self, seed: u64) -> FileGenerator {
        self.seed = Some(seed);
        return self;
    }

    /// Creates (or truncates) the file at `path` and fills it with `records` records.
    pub fn generate_file(&self, path: &Path, records: u64) -> io::Result<()> {
        let mut writer = io::BufWriter::new(fs::File::create(path)?);
        self.generate(&mut writer, records)?;
        writer.flush()
    }

    /// Writes `records` records to the writer.
    pub fn generate<W: Write>(&self, writer: &mut W, records: u64) -> io::Result<()> {
        let seed = self.seed.unwrap_or_else(rand::random);
        log::debug!("generating {} {:?} records (seed: {})", records, self.format, seed);

        let batch_records = (TASK_RECORDS * BATCH_TASKS) as u64;
        let mut batch = Vec::with_capacity(TASK_RECORDS * BATCH_TASKS * RECORD_SIZE);
        let mut written = 0;

        while written < records {
            let count = (records - written).min(batch_records) as usize;
            let first_task = written / TASK_RECORDS as u64;

            batch.resize(count * RECORD_SIZE, 0);
            batch
                .par_chunks_mut(TASK_RECORDS * RECORD_SIZE)
                .enumerate()
                .for_each(|(task, chunk)| {
                    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(first_task + task as u64));
                    self.fill(&mut rng, chunk);
                });

            writer.write_all(&batch)?;
            written += count as u64;
        }

        Ok(())
    }

    fn fill(&self, rng: &mut StdRng, chunk: &mut [u8]) {
        match self.format {
            RecordFormat::Binary => rng.fill(chunk),
            RecordFormat::Ascii => {
                for record in chunk.chunks_exact_mut(RECORD_SIZE) {
                    record[0] = b' ';
                    record[1] = rng.gen_range(b'A'..=b'Z');
                    record[2] = b' ';
                    record[3] = rng.gen_range(b'A'..=b'Z');
                }
            }
        }
    }
}
