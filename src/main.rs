use std::fs;
use std::io::{self, prelude::*};
use std::path;
use std::process;

use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;

use ext_mapreduce::{HashPartitioner, Job, MapJob, MapperBuilder, ReducerBuilder};

/// Counts whitespace separated words.
struct WordCount;

impl Job for WordCount {
    type Key = String;
    type Value = u64;
    type Error = io::Error;

    fn reduce(&self, _word: &String, first: &u64, second: &u64) -> Option<Result<u64, io::Error>> {
        Some(Ok(first + second))
    }
}

impl MapJob for WordCount {
    type Input = String;

    fn map(&self, line: String, emit: &mut dyn FnMut(String, u64)) -> Result<(), io::Error> {
        for word in line.split_whitespace() {
            emit(word.to_string(), 1);
        }
        Ok(())
    }
}

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let tmp_dir: Option<&str> = arg_parser.value_of("tmp_dir");
    let memory_limit = arg_parser.value_of("memory_limit").expect("value is required");
    let partitions: u32 = arg_parser.value_of_t_or_exit("partitions");
    let file_limit: usize = arg_parser.value_of_t_or_exit("file_limit");
    let threads: Option<usize> = arg_parser
        .is_present("threads")
        .then(|| arg_parser.value_of_t_or_exit("threads"));

    let input = arg_parser.value_of("input").expect("value is required");
    let input_stream = match fs::File::open(input) {
        Ok(file) => io::BufReader::new(file),
        Err(err) => {
            log::error!("input file opening error: {}", err);
            process::exit(1);
        }
    };

    let output = arg_parser.value_of("output").expect("value is required");
    let mut output_stream = match fs::File::create(output) {
        Ok(file) => io::BufWriter::new(file),
        Err(err) => {
            log::error!("output file creation error: {}", err);
            process::exit(1);
        }
    };

    let mut mapper_builder = MapperBuilder::new(WordCount)
        .with_partitioner(HashPartitioner::new(partitions))
        .with_memory_limit(memory_limit.parse::<ByteSize>().expect("value is pre-validated").as_u64());
    let mut reducer_builder = ReducerBuilder::new(WordCount);

    if let Some(threads) = threads {
        mapper_builder = mapper_builder.with_threads_number(threads);
    }

    if let Some(tmp_dir) = tmp_dir {
        mapper_builder = mapper_builder.with_tmp_dir(path::Path::new(tmp_dir));
        reducer_builder = reducer_builder.with_tmp_dir(path::Path::new(tmp_dir));
    }

    let mut mapper = match mapper_builder.build() {
        Ok(mapper) => mapper,
        Err(err) => {
            log::error!("mapper initialization error: {}", err);
            process::exit(1);
        }
    };

    let mut reducer = match reducer_builder.build() {
        Ok(reducer) => reducer,
        Err(err) => {
            log::error!("reducer initialization error: {}", err);
            process::exit(1);
        }
    };

    for line in input_stream.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                log::error!("input reading error: {}", err);
                process::exit(1);
            }
        };
        if let Err(err) = mapper.map(line) {
            log::error!("data mapping error: {}", err);
            process::exit(1);
        }
    }

    let shuffled = mapper.shuffle(file_limit, |partitions| {
        log::info!("shuffled into {} partitions", partitions.len());
        for (_, path) in partitions.iter() {
            let chunk = reducer
                .add_chunk()
                .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()))?;
            fs::copy(path, chunk)?;
        }
        Ok(())
    });
    if let Err(err) = shuffled {
        log::error!("data shuffling error: {}", err);
        process::exit(1);
    }

    let reduced = reducer.reduce(file_limit, |word, count| {
        output_stream.write_all(format!("{}\t{}\n", word, count).as_bytes())
    });
    if let Err(err) = reduced {
        log::error!("data reducing error: {}", err);
        process::exit(1);
    }

    if let Err(err) = output_stream.flush() {
        log::error!("data flushing error: {}", err);
        process::exit(1);
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

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("ext-mapreduce")
        .about("memory bounded word count")
        .arg(
            clap::Arg::new("input")
                .short('i')
                .long("input")
                .help("file to count words in")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("output")
                .short('o')
                .long("output")
                .help("result file")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .arg(
            clap::Arg::new("threads")
                .short('t')
                .long("threads")
                .help("number of threads to use for parallel spill sorting")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("tmp_dir")
                .short('d')
                .long("tmp-dir")
                .help("directory to be used to store temporary data")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("partitions")
                .short('p')
                .long("partitions")
                .help("number of partitions")
                .takes_value(true)
                .default_value("32")
                .validator(|v| match v.parse::<u32>() {
                    Ok(partitions) if partitions > 0 => Ok(()),
                    _ => Err("Partitions number must be a positive integer".to_string()),
                }),
        )
        .arg(
            clap::Arg::new("file_limit")
                .short('f')
                .long("file-limit")
                .help("maximum number of files merged at once")
                .takes_value(true)
                .default_value("64")
                .validator(|v| match v.parse::<usize>() {
                    Ok(limit) if limit >= 2 => Ok(()),
                    _ => Err("File limit must be an integer >= 2".to_string()),
                }),
        )
        .arg(
            clap::Arg::new("memory_limit")
                .short('m')
                .long("memory-limit")
                .help("map buffer size")
                .required(true)
                .takes_value(true)
                .validator(|v| match v.parse::<ByteSize>() {
                    Ok(_) => Ok(()),
                    Err(err) => Err(format!("Memory limit format incorrect: {}", err)),
                }),
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
