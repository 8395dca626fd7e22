use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use yaml_rust::Yaml;

use super::error::{Error, Result};


pub fn str_to_absolute_path(path_str: &str, default_base_dir: &Path) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        return path;
    } else {
        return [default_base_dir, Path::new(&path)].iter().collect();
    }
}

pub fn open_input(path: &Path) -> Result<File> {
    if !path.is_file() {
        return Err(Error::MissingInput(path.to_path_buf()));
    }
    Ok(File::open(path)?)
}

/// Reads every row of a headed csv file.  Headers and fields are trimmed of whitespace.
pub fn read_csv_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = open_input(path)?;
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);
    let mut rows = vec![];
    for result in reader.deserialize() {
        rows.push(result?);
    }
    Ok(rows)
}

// A convenience type for csv files whose columns are only known at run time
pub type CsvRow = HashMap<String, String>;

/// Parses a required column of a row.
pub fn parse_field<T: FromStr>(row: &CsvRow, key: &str, path: &Path) -> Result<T> {
    match parse_opt_field(row, key, path)? {
        Some(val) => Ok(val),
        None => Err(Error::InvalidData(format!("{:?} has no column '{}'", path, key))),
    }
}

/// Parses a column that may be absent from the file.  An empty field counts as absent.
pub fn parse_opt_field<T: FromStr>(row: &CsvRow, key: &str, path: &Path) -> Result<Option<T>> {
    match row.get(key) {
        None => Ok(None),
        Some(field) if field.is_empty() => Ok(None),
        Some(field) => match field.parse() {
            Ok(val) => Ok(Some(val)),
            Err(_) => Err(Error::InvalidData(format!(
                "bad value '{}' in column '{}' of {:?}", field, key, path))),
        },
    }
}

/// Fetches a required number.  Integers are accepted where reals are expected.
pub fn get_f64(yaml: &Yaml, key: &str) -> Result<f64> {
    match yaml_as_f64(&yaml[key]) {
        Some(val) => Ok(val),
        None => Err(Error::Config(format!("missing or non-numeric key '{}'", key))),
    }
}

pub fn get_f64_or(yaml: &Yaml, key: &str, default: f64) -> Result<f64> {
    if yaml[key].is_badvalue() || yaml[key].is_null() {
        return Ok(default);
    }
    get_f64(yaml, key)
}

pub fn get_opt_f64(yaml: &Yaml, key: &str) -> Result<Option<f64>> {
    if yaml[key].is_badvalue() || yaml[key].is_null() {
        return Ok(None);
    }
    get_f64(yaml, key).map(Some)
}

pub fn get_str<'a>(yaml: &'a Yaml, key: &str) -> Result<&'a str> {
    yaml[key].as_str().ok_or(Error::Config(format!("missing or non-string key '{}'", key)))
}

pub fn get_str_or<'a>(yaml: &'a Yaml, key: &str, default: &'a str) -> Result<&'a str> {
    if yaml[key].is_badvalue() || yaml[key].is_null() {
        return Ok(default);
    }
    get_str(yaml, key)
}

pub fn get_bool_or(yaml: &Yaml, key: &str, default: bool) -> Result<bool> {
    if yaml[key].is_badvalue() || yaml[key].is_null() {
        return Ok(default);
    }
    yaml[key].as_bool().ok_or(Error::Config(format!("non-boolean key '{}'", key)))
}

/// Fetches a required sub-section.
pub fn get_section<'a>(yaml: &'a Yaml, key: &str) -> Result<&'a Yaml> {
    match &yaml[key] {
        Yaml::Hash(_) => Ok(&yaml[key]),
        _ => Err(Error::Config(format!("missing section '{}'", key))),
    }
}

pub fn yaml_as_f64(yaml: &Yaml) -> Option<f64> {
    match yaml {
        Yaml::Real(_) => yaml.as_f64(),
        Yaml::Integer(ii) => Some(*ii as f64),
        _ => None,
    }
}
