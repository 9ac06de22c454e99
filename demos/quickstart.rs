use std::path;

use env_logger;
use log;

use disk_quicksort::{check, FileGenerator, FileSorterBuilder, RecordFormat};

fn main() {
    env_logger::Builder::new().filter_level(log::LevelFilter::Debug).init();

    let input = path::Path::new("./input.bin");
    FileGenerator::new(RecordFormat::Binary)
        .with_seed(7)
        .generate_file(input, 100 * 1024)
        .unwrap();

    let sorter = FileSorterBuilder::new().with_buffers(10).build().unwrap();
    let report = sorter.sort_file(input).unwrap();

    assert!(check::check_file(input).unwrap());
    print!("{}", report);
}
