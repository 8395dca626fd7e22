// Zone-to-zone skim matrices produced by the external assignment engine.
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use ndarray::prelude::*;
use yaml_rust::Yaml;

use super::config_utils::{self, CsvRow};
use super::error::{Error, Result};
use super::geometry_index::ZoneId;
use super::skim_expander::{ExpandedSkim, ZoneMembership};


/// One named metric of a skim set, e.g. in-vehicle time on local routes.
#[derive(PartialEq, Debug, Clone)]
pub struct SkimCore {
    pub name: String,
    // the engine writes 0 for pairs it didn't compute
    pub zero_is_missing: bool,
}

impl SkimCore {
    pub fn new(name: &str, zero_is_missing: bool) -> SkimCore {
        SkimCore{name: String::from(name), zero_is_missing}
    }

    /// A core is either a bare name or a map with `name` and `zero_is_missing`.
    pub fn from_yaml(yaml: &Yaml) -> Result<SkimCore> {
        if let Some(name) = yaml.as_str() {
            return Ok(SkimCore::new(name, false));
        }
        let name = config_utils::get_str(yaml, "name")?;
        let zero_is_missing = config_utils::get_bool_or(yaml, "zero_is_missing", false)?;
        Ok(SkimCore::new(name, zero_is_missing))
    }
}

/// Where to find one skim set and which cores to read from it.
#[derive(PartialEq, Debug, Clone)]
pub struct SkimFileSpec {
    pub name: String,
    pub path: PathBuf,
    pub cores: Vec<SkimCore>,
}

impl SkimFileSpec {
    /// `{period}` in the file name is replaced by the run's time period.
    pub fn from_yaml(yaml: &Yaml, base_dir: &Path, time_period: &str) -> Result<SkimFileSpec> {
        let name = config_utils::get_str(yaml, "name")?;
        let file = config_utils::get_str(yaml, "file")?.replace("{period}", time_period);
        let cores = match yaml["cores"].as_vec() {
            Some(cores) => cores.iter().map(SkimCore::from_yaml).collect::<Result<Vec<_>>>()?,
            None => return Err(Error::Config(format!("skim set '{}' lists no cores", name))),
        };
        Ok(SkimFileSpec {
            name: String::from(name),
            path: config_utils::str_to_absolute_path(&file, base_dir),
            cores,
        })
    }
}


/// A set of skim cores over one list of coarse zones.  Values are `f64::INFINITY` for pairs
/// the engine didn't provide.
#[derive(Debug, Clone)]
pub struct SkimSet {
    name: String,
    zone_ids: Vec<ZoneId>,
    zone_idxs: HashMap<ZoneId, usize>,
    cores: BTreeMap<String, Array2<f64>>,
    // only for cores where zero means not computed
    not_computed: BTreeMap<String, Array2<bool>>,
}

impl SkimSet {
    pub fn new(name: &str, zone_ids: Vec<ZoneId>) -> SkimSet {
        let zone_idxs = zone_ids.iter().enumerate().map(|(ii, zz)| (*zz, ii)).collect();
        SkimSet {
            name: String::from(name),
            zone_ids,
            zone_idxs,
            cores: BTreeMap::new(),
            not_computed: BTreeMap::new(),
        }
    }

    pub fn insert_core(&mut self, core: &str, values: Array2<f64>) -> Result<()> {
        let num_zones = self.zone_ids.len();
        if values.dim() != (num_zones, num_zones) {
            return Err(Error::DimensionMismatch {
                name: format!("{}.{}", self.name, core),
                expected: num_zones,
                found: values.nrows().max(values.ncols()),
            });
        }
        self.cores.insert(String::from(core), values);
        Ok(())
    }

    /// Reads a skim set from a csv file with `origin` and `destination` columns and one column
    /// per core.  If `expected_zones` is given, the matrices are indexed by exactly those
    /// zones, and a file that refers to any other zone is rejected.
    pub fn from_csv(name: &str, path: &Path, cores: &[SkimCore],
                    expected_zones: Option<&[ZoneId]>) -> Result<SkimSet> {
        let file = config_utils::open_input(path)?;
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);
        let headers = reader.headers()?.clone();
        for required in ["origin", "destination"].iter() {
            if !headers.iter().any(|hh| hh == *required) {
                return Err(Error::InvalidData(format!("{:?} has no '{}' column", path,
                                                      required)));
            }
        }
        for core in cores {
            if !headers.iter().any(|hh| hh == core.name) {
                return Err(Error::Config(format!("skim core '{}' is not in {:?}", core.name,
                                                 path)));
            }
        }

        let mut entries = vec![];
        for result in reader.deserialize() {
            let row: CsvRow = result?;
            let origin: ZoneId = config_utils::parse_field(&row, "origin", path)?;
            let destination: ZoneId = config_utils::parse_field(&row, "destination", path)?;
            let mut values = vec![];
            for core in cores {
                let value: f64 = config_utils::parse_field(&row, &core.name, path)?;
                if value < 0. || value.is_nan() {
                    return Err(Error::InvalidData(format!(
                        "skim {} has value {} for ({}, {}) in core {}", name, value, origin,
                        destination, core.name)));
                }
                values.push(value);
            }
            entries.push((origin, destination, values));
        }

        let found_zones: BTreeSet<ZoneId> = entries.iter()
            .flat_map(|(oo, dd, _)| vec![*oo, *dd])
            .collect();
        let zone_ids: Vec<ZoneId> = match expected_zones {
            Some(expected) => {
                let expected_set: BTreeSet<ZoneId> = expected.iter().cloned().collect();
                if !found_zones.is_subset(&expected_set) {
                    return Err(Error::DimensionMismatch {
                        name: String::from(name),
                        expected: expected_set.len(),
                        found: found_zones.union(&expected_set).count(),
                    });
                }
                expected.to_vec()
            }
            None => found_zones.into_iter().collect(),
        };

        let mut skim = SkimSet::new(name, zone_ids);
        let num_zones = skim.zone_ids.len();
        let mut matrices = vec![Array2::from_elem((num_zones, num_zones), f64::INFINITY);
                                cores.len()];
        let mut masks = vec![Array2::from_elem((num_zones, num_zones), false); cores.len()];
        for (origin, destination, values) in entries {
            let ii = skim.zone_idxs[&origin];
            let jj = skim.zone_idxs[&destination];
            for (cc, value) in values.into_iter().enumerate() {
                if value == 0. && cores[cc].zero_is_missing {
                    masks[cc][[ii, jj]] = true;
                } else {
                    matrices[cc][[ii, jj]] = value;
                }
            }
        }
        for ((core, matrix), mask) in cores.iter().zip(matrices).zip(masks) {
            let num_missing = mask.iter().filter(|mm| **mm).count();
            if num_missing > 0 {
                log::debug!("skim {} core {}: {} pairs not computed", name, core.name,
                            num_missing);
            }
            skim.insert_core(&core.name, matrix)?;
            if core.zero_is_missing {
                skim.not_computed.insert(core.name.clone(), mask);
            }
        }
        log::info!("loaded skim {} with {} cores over {} zones", name, cores.len(), num_zones);
        Ok(skim)
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_zone_ids(&self) -> &Vec<ZoneId> {
        &self.zone_ids
    }

    pub fn get_zone_idx(&self, zone: ZoneId) -> Option<usize> {
        self.zone_idxs.get(&zone).copied()
    }

    pub fn core(&self, core: &str) -> Result<&Array2<f64>> {
        self.cores.get(core).ok_or(Error::Config(format!("skim {} has no core '{}'", self.name,
                                                         core)))
    }

    /// The value for a pair of zone ids, or infinity if either zone or the core is unknown.
    pub fn value(&self, core: &str, origin: ZoneId, destination: ZoneId) -> f64 {
        let matrix = match self.cores.get(core) {
            Some(matrix) => matrix,
            None => return f64::INFINITY,
        };
        match (self.get_zone_idx(origin), self.get_zone_idx(destination)) {
            (Some(ii), Some(jj)) => matrix[[ii, jj]],
            _ => f64::INFINITY,
        }
    }

    pub fn is_not_computed(&self, core: &str, origin: ZoneId, destination: ZoneId) -> bool {
        let mask = match self.not_computed.get(core) {
            Some(mask) => mask,
            None => return false,
        };
        match (self.get_zone_idx(origin), self.get_zone_idx(destination)) {
            (Some(ii), Some(jj)) => mask[[ii, jj]],
            _ => false,
        }
    }

    /// A micro-zone view of one core.  The skim must be indexed by the membership's coarse
    /// zones.
    pub fn expanded<'a>(&'a self, core: &str, membership: &'a ZoneMembership)
                        -> Result<ExpandedSkim<'a>> {
        if membership.get_coarse_ids() != &self.zone_ids {
            return Err(Error::DimensionMismatch {
                name: self.name.clone(),
                expected: membership.get_coarse_ids().len(),
                found: self.zone_ids.len(),
            });
        }
        let view = membership.expanded_view(self.core(core)?.view())?;
        match self.not_computed.get(core) {
            Some(mask) => Ok(view.with_not_computed(mask.view())),
            None => Ok(view),
        }
    }
}
