use ndarray::{Array1, Array2, Array3};
use serde::{Deserialize, Serialize};

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub nstates: usize,
    pub nmix: usize,
    pub max_iterations: usize,
    pub convergence_threshold: f64,
    pub kmeans_threshold: f64,
    pub split_perturbation: f64,
    pub variance_floor: f64,
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nstates: 5,
            nmix: 4,
            max_iterations: 100,
            convergence_threshold: 1.0e-3,
            kmeans_threshold: 1.0e-3,
            split_perturbation: 1.0e-5,
            variance_floor: 1.0e-30,
            seed: 0,
        }
    }
}

impl Config {

    pub fn new(nstates: usize, nmix: usize) -> Self {
        Self { nstates, nmix, ..Self::default() }
    }

    /// Reads a `key=value` configuration file. Blank lines and lines starting
    /// with `#` are skipped; unset keys keep their default.
    pub fn from_config_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::Io {
            context: format!("opening config file {}", path.display()),
            source,
        })?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut instance = Config::default();
        for line in reader.lines() {
            let line = line.map_err(|source| Error::Io {
                context: String::from("reading config"),
                source,
            })?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let splits: Vec<&str> = line.split('=').collect();
            if splits.len() != 2 {
                return Err(Error::Configuration(format!("wrong line in config file: {:?}", line)));
            }
            let option = splits[0].trim();
            let value = splits[1].trim();
            match option {
                "nstates" => instance.nstates = parse_value(option, value)?,
                "nmix" => instance.nmix = parse_value(option, value)?,
                "max_iterations" => instance.max_iterations = parse_value(option, value)?,
                "convergence_threshold" => instance.convergence_threshold = parse_value(option, value)?,
                "kmeans_threshold" => instance.kmeans_threshold = parse_value(option, value)?,
                "split_perturbation" => instance.split_perturbation = parse_value(option, value)?,
                "variance_floor" => instance.variance_floor = parse_value(option, value)?,
                "seed" => instance.seed = parse_value(option, value)?,
                _ => return Err(Error::Configuration(format!("unknown option in config file: {:?}", option))),
            };
        }
        Ok(instance)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.nstates == 0 {
            return Err(Error::Configuration(String::from("nstates must be at least 1")));
        }
        if !self.nmix.is_power_of_two() {
            return Err(Error::Configuration(format!("nmix must be a power of two, got {}", self.nmix)));
        }
        if self.max_iterations == 0 {
            return Err(Error::Configuration(String::from("max_iterations must be at least 1")));
        }
        let positive = [
            ("convergence_threshold", self.convergence_threshold),
            ("kmeans_threshold", self.kmeans_threshold),
            ("split_perturbation", self.split_perturbation),
            ("variance_floor", self.variance_floor),
        ];
        for (name, value) in positive.iter() {
            if !(*value > 0.0 && value.is_finite()) {
                return Err(Error::Configuration(format!("{} must be positive and finite, got {}", name, value)));
            }
        }
        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(option: &str, value: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| Error::Configuration(format!("can not parse {:?} for option {}", value, option)))
}

fn try_buffer<T: Clone + Default>(len: usize, what: &'static str) -> Result<Vec<T>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|source| Error::Allocation { what, source })?;
    buffer.resize(len, T::default());
    Ok(buffer)
}

fn checked_len(dims: &[usize], what: &'static str) -> Result<usize> {
    dims.iter()
        .try_fold(1usize, |acc, d| acc.checked_mul(*d))
        .ok_or_else(|| Error::Configuration(format!("{} size overflows: {:?}", what, dims)))
}

pub fn zeros1(len: usize, what: &'static str) -> Result<Array1<f64>> {
    Ok(Array1::from(try_buffer::<f64>(len, what)?))
}

pub fn zeros2(shape: (usize, usize), what: &'static str) -> Result<Array2<f64>> {
    let len = checked_len(&[shape.0, shape.1], what)?;
    Ok(Array2::from_shape_vec(shape, try_buffer::<f64>(len, what)?)?)
}

/// Zeroed `usize` matrix, used for backpointers.
pub fn index_zeros2(shape: (usize, usize), what: &'static str) -> Result<Array2<usize>> {
    let len = checked_len(&[shape.0, shape.1], what)?;
    Ok(Array2::from_shape_vec(shape, try_buffer::<usize>(len, what)?)?)
}

pub fn zeros3(shape: (usize, usize, usize), what: &'static str) -> Result<Array3<f64>> {
    let len = checked_len(&[shape.0, shape.1, shape.2], what)?;
    Ok(Array3::from_shape_vec(shape, try_buffer::<f64>(len, what)?)?)
}
