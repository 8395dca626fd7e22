use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors.  Any of these aborts the run.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Required input file {0} is missing")]
    MissingInput(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Could not parse config as yaml: {0}")]
    Yaml(#[from] yaml_rust::ScanError),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Zone {zone_id} has no network node within {tolerance_ft} ft")]
    UnsnappableZone { zone_id: u32, tolerance_ft: f64 },
    #[error("Stop {stop_id} has no network node within {tolerance_ft} ft")]
    UnsnappableStop { stop_id: u32, tolerance_ft: f64 },
    #[error("Skim {name} covers {found} zones but {expected} were expected")]
    DimensionMismatch { name: String, expected: usize, found: usize },
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, Error>;

static MAX_SAMPLES: usize = 10;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct IssueTally {
    pub count: usize,
    pub sample: Vec<String>,
}

/// Non-fatal data-quality issues, accumulated over a run and logged once at the end.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DataQualityReport {
    issues: BTreeMap<String, IssueTally>,
}

impl DataQualityReport {
    pub fn new() -> DataQualityReport {
        DataQualityReport { issues: BTreeMap::new() }
    }

    pub fn record<T: Display>(&mut self, category: &str, id: T) {
        let tally = self.issues.entry(String::from(category)).or_insert_with(IssueTally::default);
        tally.count += 1;
        if tally.sample.len() < MAX_SAMPLES {
            tally.sample.push(id.to_string());
        }
    }

    pub fn merge(&mut self, other: DataQualityReport) {
        for (category, other_tally) in other.issues {
            let tally = self.issues.entry(category).or_insert_with(IssueTally::default);
            tally.count += other_tally.count;
            for id in other_tally.sample {
                if tally.sample.len() >= MAX_SAMPLES {
                    break;
                }
                tally.sample.push(id);
            }
        }
    }

    pub fn get_count(&self, category: &str) -> usize {
        match self.issues.get(category) {
            Some(tally) => tally.count,
            None => 0,
        }
    }

    pub fn get_tally(&self, category: &str) -> Option<&IssueTally> {
        self.issues.get(category)
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn log_summary(&self) {
        if self.issues.is_empty() {
            log::info!("No data quality issues recorded");
            return;
        }
        for (category, tally) in &self.issues {
            log::warn!("{}: {} occurrences (e.g. {})", category, tally.count,
                       tally.sample.join(", "));
        }
    }
}
