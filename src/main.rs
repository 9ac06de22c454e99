use std::path;
use std::process;

use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;

use disk_quicksort::{check, FileGenerator, FileSorterBuilder, RecordFormat, RECORD_SIZE};

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    match arg_parser.subcommand() {
        Some(("sort", args)) => sort(args),
        Some(("generate", args)) => generate(args),
        Some(("check", args)) => check_sorted(args),
        _ => unreachable!("subcommand is required"),
    }
}

fn sort(args: &clap::ArgMatches) {
    let input = args.value_of("input").expect("value is required");
    let buffers: usize = args.value_of_t_or_exit("buffers");
    let block_size: usize = args.value_of_t_or_exit("block_size");

    let sorter = match FileSorterBuilder::new()
        .with_buffers(buffers)
        .with_block_size(block_size)
        .build()
    {
        Ok(sorter) => sorter,
        Err(err) => {
            log::error!("sorter initialization error: {}", err);
            process::exit(1);
        }
    };

    let report = match sorter.sort_file(path::Path::new(input)) {
        Ok(report) => report,
        Err(err) => {
            log::error!("data sorting error: {}", err);
            process::exit(1);
        }
    };

    match args.value_of("stats") {
        Some(stats) => {
            if let Err(err) = report.append_to(path::Path::new(stats)) {
                log::error!("statistics saving error: {}", err);
                process::exit(1);
            }
        }
        None => print!("{}", report),
    }
}

fn generate(args: &clap::ArgMatches) {
    let output = args.value_of("output").expect("value is required");
    let format: Format = args.value_of_t_or_exit("format");
    let size = args.value_of("size").expect("value is required");
    let size = size.parse::<ByteSize>().expect("value is pre-validated");

    let mut generator = FileGenerator::new(match format {
        Format::Binary => RecordFormat::Binary,
        Format::Ascii => RecordFormat::Ascii,
    });
    if args.is_present("seed") {
        generator = generator.with_seed(args.value_of_t_or_exit("seed"));
    }

    log::info!("generating {} into {}", size, output);
    if let Err(err) = generator.generate_file(path::Path::new(output), size.as_u64() / RECORD_SIZE as u64) {
        log::error!("data generation error: {}", err);
        process::exit(1);
    }
}

fn check_sorted(args: &clap::ArgMatches) {
    let input = args.value_of("input").expect("value is required");

    match check::check_file(path::Path::new(input)) {
        Ok(true) => log::info!("{} is sorted", input),
        Ok(false) => {
            log::error!("{} is not sorted", input);
            process::exit(1);
        }
        Err(err) => {
            log::error!("data checking error: {}", err);
            process::exit(1);
        }
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum Format {
    Binary,
    Ascii,
}

impl Format {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Format::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Format as clap::ArgEnum>::from_str(s, false)
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("disk-quicksort")
        .version(env!("CARGO_PKG_VERSION"))
        .about("in-place quicksort of 4-byte records through a block buffer pool")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .subcommand(
            clap::App::new("sort")
                .about("sorts a record file in place")
                .arg(
                    clap::Arg::new("input")
                        .help("file to be sorted")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    clap::Arg::new("buffers")
                        .short('b')
                        .long("buffers")
                        .help("number of blocks kept in the buffer pool")
                        .takes_value(true)
                        .default_value("10")
                        .validator(|v| match v.parse::<usize>() {
                            Ok(n) if n > 0 => Ok(()),
                            _ => Err(format!("positive number expected: {}", v)),
                        }),
                )
                .arg(
                    clap::Arg::new("block_size")
                        .long("block-size")
                        .help("buffer pool block size in bytes")
                        .takes_value(true)
                        .default_value("4096")
                        .validator(|v| match v.parse::<usize>() {
                            Ok(n) if n > 0 && n % RECORD_SIZE == 0 => Ok(()),
                            _ => Err(format!("positive multiple of {} expected: {}", RECORD_SIZE, v)),
                        }),
                )
                .arg(
                    clap::Arg::new("stats")
                        .short('s')
                        .long("stats")
                        .help("file the run statistics are appended to (printed if omitted)")
                        .takes_value(true),
                ),
        )
        .subcommand(
            clap::App::new("generate")
                .about("generates a file of random records")
                .arg(
                    clap::Arg::new("output")
                        .help("file to be generated")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    clap::Arg::new("size")
                        .short('s')
                        .long("size")
                        .help("file size")
                        .required(true)
                        .takes_value(true)
                        .validator(|v| match v.parse::<ByteSize>() {
                            Ok(size) if size.as_u64() % RECORD_SIZE as u64 == 0 => Ok(()),
                            Ok(size) => Err(format!("size {} is not a multiple of {}", size.as_u64(), RECORD_SIZE)),
                            Err(err) => Err(format!("Size format incorrect: {}", err)),
                        }),
                )
                .arg(
                    clap::Arg::new("format")
                        .short('f')
                        .long("format")
                        .help("record format")
                        .takes_value(true)
                        .default_value("binary")
                        .possible_values(Format::possible_values()),
                )
                .arg(
                    clap::Arg::new("seed")
                        .long("seed")
                        .help("random generator seed")
                        .takes_value(true),
                ),
        )
        .subcommand(
            clap::App::new("check")
                .about("checks that a record file is sorted")
                .arg(
                    clap::Arg::new("input")
                        .help("file to be checked")
                        .required(true)
                        .takes_value(true),
                ),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}
