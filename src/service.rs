// Per-zone availability of the on-demand services, read from the land-use table.
use std::collections::BTreeMap;
use std::path::Path;

use itertools::Itertools;

use super::config_utils::{self, CsvRow};
use super::connectors::StopAccessTable;
use super::error::{Error, Result};
use super::geometry_index::{StopClass, ZoneId};
use super::skim_expander::ZoneMembership;

/// Minutes to reach a shared micromobility vehicle, by whether the zone is a parking area.
static PARKAREA_ACCESS_TIME: f64 = 2.;
static DEFAULT_ACCESS_TIME: f64 = 15.;


/// Distances are in miles, times in minutes.  Operator ids of 0 mean the zone isn't served.
#[derive(PartialEq, Debug, Clone)]
pub struct ZoneService {
    pub zone: ZoneId,
    pub coarse_zone: ZoneId,
    pub microtransit: u32,
    pub nev: u32,
    pub micro_dist_local: Option<f64>,
    pub micro_dist_premium: Option<f64>,
    pub walk_dist_local: Option<f64>,
    pub walk_dist_premium: Option<f64>,
    pub micro_access_time: f64,
}

impl ZoneService {
    pub fn new(zone: ZoneId, coarse_zone: ZoneId) -> ZoneService {
        ZoneService {
            zone,
            coarse_zone,
            microtransit: 0,
            nev: 0,
            micro_dist_local: None,
            micro_dist_premium: None,
            walk_dist_local: None,
            walk_dist_premium: None,
            micro_access_time: DEFAULT_ACCESS_TIME,
        }
    }

    /// Walking distance to the nearer of the nearest local and premium stops.
    pub fn walk_dist_to_transit(&self) -> Option<f64> {
        min_present(self.walk_dist_local, self.walk_dist_premium)
    }

    /// Distance an on-demand vehicle covers to reach transit.  Without separate vehicle
    /// distances, this is the walking distance.
    pub fn flex_dist_to_transit(&self) -> Option<f64> {
        match min_present(self.micro_dist_local, self.micro_dist_premium) {
            Some(dist) => Some(dist),
            None => self.walk_dist_to_transit(),
        }
    }
}

fn min_present(aa: Option<f64>, bb: Option<f64>) -> Option<f64> {
    match (aa, bb) {
        (Some(aa), Some(bb)) => Some(aa.min(bb)),
        (Some(aa), None) => Some(aa),
        (None, bb) => bb,
    }
}


pub struct ServiceAvailability {
    zones: BTreeMap<ZoneId, ZoneService>,
}

impl ServiceAvailability {
    pub fn new(zones: Vec<ZoneService>) -> Result<ServiceAvailability> {
        let mut by_id = BTreeMap::new();
        for zone in zones {
            let id = zone.zone;
            if by_id.insert(id, zone).is_some() {
                return Err(Error::InvalidData(format!("zone {} appears twice in land use", id)));
            }
        }
        Ok(ServiceAvailability{zones: by_id})
    }

    /// Reads the land-use table.  Only `mgra` and `taz` are required.
    pub fn from_csv(path: &Path) -> Result<ServiceAvailability> {
        let file = config_utils::open_input(path)?;
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);
        let mut zones = vec![];
        for result in reader.deserialize() {
            let row: CsvRow = result?;
            let mut zone = ZoneService::new(config_utils::parse_field(&row, "mgra", path)?,
                                            config_utils::parse_field(&row, "taz", path)?);
            zone.microtransit = config_utils::parse_opt_field(&row, "microtransit", path)?
                .unwrap_or(0);
            zone.nev = config_utils::parse_opt_field(&row, "nev", path)?.unwrap_or(0);
            zone.micro_dist_local = config_utils::parse_opt_field(&row, "micro_dist_local_bus",
                                                                  path)?;
            zone.micro_dist_premium = config_utils::parse_opt_field(
                &row, "micro_dist_premium_transit", path)?;
            zone.walk_dist_local = config_utils::parse_opt_field(&row, "walk_dist_local_bus",
                                                                 path)?;
            zone.walk_dist_premium = config_utils::parse_opt_field(
                &row, "walk_dist_premium_transit", path)?;

            let parkarea: f64 = config_utils::parse_opt_field(&row, "parkarea", path)?
                .unwrap_or(0.);
            zone.micro_access_time =
                match config_utils::parse_opt_field(&row, "MicroAccessTime", path)? {
                    Some(time) => time,
                    None if parkarea == 1. => PARKAREA_ACCESS_TIME,
                    None => DEFAULT_ACCESS_TIME,
                };
            zones.push(zone);
        }
        let service = ServiceAvailability::new(zones)?;
        log::info!("loaded land use for {} zones, {} with microtransit and {} with nev",
                   service.zones.len(),
                   service.zones.values().filter(|zz| zz.microtransit > 0).count(),
                   service.zones.values().filter(|zz| zz.nev > 0).count());
        Ok(service)
    }

    /// Fills in walking distances to transit that the land use doesn't give, from the
    /// nearest-stop distances of the connector builder.
    pub fn fill_walk_distances(&mut self, stop_access: &StopAccessTable) {
        let mut num_filled = 0;
        for zone in self.zones.values_mut() {
            if zone.walk_dist_local.is_none() {
                zone.walk_dist_local = stop_access.get_distance(zone.zone, StopClass::Local);
                num_filled += zone.walk_dist_local.is_some() as usize;
            }
            if zone.walk_dist_premium.is_none() {
                zone.walk_dist_premium = stop_access.get_distance(zone.zone, StopClass::Premium);
                num_filled += zone.walk_dist_premium.is_some() as usize;
            }
        }
        log::debug!("filled {} walk distances from the stop connectors", num_filled);
    }

    pub fn get(&self, zone: ZoneId) -> Option<&ZoneService> {
        self.zones.get(&zone)
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// The coarse zone ids, sorted.
    pub fn get_coarse_ids(&self) -> Vec<ZoneId> {
        self.zones.values().map(|zz| zz.coarse_zone).sorted().dedup().collect()
    }

    pub fn membership(&self) -> Result<ZoneMembership> {
        let micro_to_coarse: BTreeMap<ZoneId, ZoneId> = self.zones.values()
            .map(|zz| (zz.zone, zz.coarse_zone))
            .collect();
        ZoneMembership::new(&micro_to_coarse, &self.get_coarse_ids())
    }
}
