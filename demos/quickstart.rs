use std::fs;
use std::io;
use std::path;

use env_logger;
use log;
use serde_json::{json, Value};

use ext_mapreduce::{HashPartitioner, Job, MapJob, MapperBuilder, ReducerBuilder};

/// Keeps the highest temperature reported per city and day.
struct MaxTemperature;

impl Job for MaxTemperature {
    type Key = Value;
    type Value = f64;
    type Error = io::Error;

    fn reduce(&self, _key: &Value, first: &f64, second: &f64) -> Option<Result<f64, io::Error>> {
        Some(Ok(first.max(*second)))
    }
}

impl MapJob for MaxTemperature {
    type Input = &'static str;

    fn map(&self, line: &'static str, emit: &mut dyn FnMut(Value, f64)) -> Result<(), io::Error> {
        let fields = Vec::from_iter(line.split(','));
        if let [city, day, temperature] = fields[..] {
            let temperature = temperature
                .parse()
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
            emit(json!({"city": city, "day": day}), temperature);
        }
        Ok(())
    }
}

fn main() {
    env_logger::Builder::new().filter_level(log::LevelFilter::Debug).init();

    let input = [
        "berlin,2021-06-01,21.5",
        "paris,2021-06-01,24.0",
        "berlin,2021-06-01,23.1",
        "rome,2021-06-02,29.4",
        "paris,2021-06-02,22.8",
        "berlin,2021-06-02,19.9",
        "rome,2021-06-02,30.2",
    ];

    let mut mapper = MapperBuilder::new(MaxTemperature)
        .with_partitioner(HashPartitioner::new(2))
        .with_memory_limit(128)
        .with_tmp_dir(path::Path::new("./"))
        .build()
        .unwrap();

    for line in input {
        mapper.map(line).unwrap();
    }

    let mut reducer = ReducerBuilder::new(MaxTemperature)
        .with_tmp_dir(path::Path::new("./"))
        .build()
        .unwrap();

    mapper
        .shuffle(2, |partitions| {
            for (partition, path) in partitions.iter() {
                log::info!("partition {}: {}", partition, path.display());
                fs::copy(path, reducer.add_chunk().unwrap())?;
            }
            Ok(())
        })
        .unwrap();

    reducer
        .reduce(2, |key, temperature| {
            println!("{} {} {:.1}", key["city"], key["day"], temperature);
            Ok(())
        })
        .unwrap();
}
