// The batch job: builds the connectors, then composes accessibility for one time period.
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;

use yaml_rust::Yaml;
use yaml_rust::YamlLoader;

use super::accessibility::{self, AccessibilityComposer, ComposerConfig};
use super::config_utils;
use super::connectors::{ConnectorBuilder, ConnectorConfig};
use super::error::{DataQualityReport, Error, Result};
use super::geometry_index::{GeometryIndex, NetworkFiles};
use super::path_network::PathNetwork;
use super::service::ServiceAvailability;
use super::skims::{SkimFileSpec, SkimSet};

pub static WALK_FILE: &str = "maz_maz_walk.csv";
pub static BIKE_FILE: &str = "maz_maz_bike.csv";
pub static STOP_WALK_FILE: &str = "maz_stop_walk.csv";
pub static ACCESSIBILITY_FILE: &str = "accessibility.csv";


#[derive(Debug, Clone)]
pub struct RunConfig {
    pub output_dir: PathBuf,
    pub time_period: String,
    pub network: NetworkFiles,
    pub connectors: ConnectorConfig,
    pub land_use_path: PathBuf,
    pub skims: Vec<SkimFileSpec>,
    pub composer: ComposerConfig,
}

impl RunConfig {
    /// Input files are relative to `input_dir` (by default the config file's directory), and
    /// `output_dir` to the config file's directory.
    pub fn from_yaml(yaml_cfg: &Yaml, config_dir: &Path) -> Result<RunConfig> {
        let input_dir = match config_utils::get_str_or(yaml_cfg, "input_dir", "")? {
            "" => config_dir.to_path_buf(),
            dir => config_utils::str_to_absolute_path(dir, config_dir),
        };
        let output_dir = config_utils::str_to_absolute_path(
            config_utils::get_str(yaml_cfg, "output_dir")?, config_dir);
        let time_period = String::from(config_utils::get_str(yaml_cfg, "time_period")?);

        let network_yaml = config_utils::get_section(yaml_cfg, "network")?;
        let input_path = |yaml: &Yaml, key: &str| -> Result<PathBuf> {
            Ok(config_utils::str_to_absolute_path(config_utils::get_str(yaml, key)?,
                                                  &input_dir))
        };
        let network = NetworkFiles {
            nodes_path: input_path(network_yaml, "nodes")?,
            links_path: input_path(network_yaml, "links")?,
            zones_path: input_path(network_yaml, "zones")?,
            stops_path: input_path(network_yaml, "stops")?,
            routes_path: input_path(network_yaml, "routes")?,
        };

        let connectors = ConnectorConfig::from_yaml(
            config_utils::get_section(yaml_cfg, "connectors")?)?;

        let access_yaml = config_utils::get_section(yaml_cfg, "accessibility")?;
        let land_use_path = input_path(access_yaml, "land_use")?;
        let skims = match access_yaml["skims"].as_vec() {
            Some(specs) => specs.iter()
                .map(|spec| SkimFileSpec::from_yaml(spec, &input_dir, &time_period))
                .collect::<Result<Vec<_>>>()?,
            None => return Err(Error::Config(String::from("no skims are listed"))),
        };
        let composer = ComposerConfig::from_yaml(access_yaml, connectors.walk_speed_mph,
                                                 connectors.bike_speed_mph,
                                                 connectors.no_stop_sentinel)?;

        Ok(RunConfig {
            output_dir,
            time_period,
            network,
            connectors,
            land_use_path,
            skims,
            composer,
        })
    }
}


pub struct ModelRun {
    cfg: RunConfig,
}

impl ModelRun {
    pub fn new(cfg: RunConfig) -> ModelRun {
        ModelRun{cfg}
    }

    pub fn from_cfg(path: &str) -> Result<ModelRun> {
        let path = Path::new(path);
        let mut file = config_utils::open_input(path)?;
        let mut file_contents = String::new();
        file.read_to_string(&mut file_contents)?;
        let yaml_cfgs = YamlLoader::load_from_str(&file_contents)?;
        let yaml_cfg = match yaml_cfgs.first() {
            Some(yaml_cfg) => yaml_cfg,
            None => return Err(Error::Config(format!("{:?} is empty", path))),
        };
        let config_dir = match path.parent() {
            Some(dir) => dir,
            None => Path::new("."),
        };
        Ok(ModelRun::new(RunConfig::from_yaml(yaml_cfg, config_dir)?))
    }

    pub fn get_config(&self) -> &RunConfig {
        &self.cfg
    }

    /// Runs every stage and writes the output tables.  Returns the data-quality issues met
    /// along the way, which are also logged.
    pub fn run(&self) -> Result<DataQualityReport> {
        let cfg = &self.cfg;
        log::info!("starting run for period {}", cfg.time_period);
        let mut report = DataQualityReport::new();

        let index = GeometryIndex::load(&cfg.network, cfg.connectors.snap_tolerance_ft,
                                        cfg.connectors.separate_brt(), &mut report)?;
        let network = PathNetwork::build(index.get_nodes(), index.get_links())?;
        let builder = ConnectorBuilder::new(&index, &network, &cfg.connectors);
        let connectors = builder.build_all(&mut report)?;

        fs::create_dir_all(&cfg.output_dir)?;
        connectors.walk.write_csv(&cfg.output_dir.join(WALK_FILE),
                                  cfg.connectors.walk_speed_mph)?;
        connectors.bike.write_csv(&cfg.output_dir.join(BIKE_FILE),
                                  cfg.connectors.bike_speed_mph)?;
        connectors.stop_access.write_csv(&cfg.output_dir.join(STOP_WALK_FILE))?;

        let mut service = ServiceAvailability::from_csv(&cfg.land_use_path)?;
        service.fill_walk_distances(&connectors.stop_access);
        let membership = service.membership()?;
        let mut skims = BTreeMap::new();
        for spec in &cfg.skims {
            let skim = SkimSet::from_csv(&spec.name, &spec.path, &spec.cores,
                                         Some(membership.get_coarse_ids()))?;
            skims.insert(spec.name.clone(), skim);
        }

        let composer = AccessibilityComposer::new(&cfg.composer, &membership, &service, &skims,
                                                  &connectors.walk, &connectors.bike);
        let rows = composer.compose(&mut report)?;
        accessibility::write_csv(&rows, &cfg.output_dir.join(ACCESSIBILITY_FILE),
                                 cfg.composer.infinity_sentinel)?;

        report.log_summary();
        Ok(report)
    }
}
