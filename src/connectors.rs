// Builds the zone-to-zone and zone-to-stop connector tables used for first/last-mile access.
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::Path;

use kdtree::distance::squared_euclidean;
use kdtree::KdTree;
use rayon::prelude::*;
use serde::Serialize;
use yaml_rust::Yaml;

use super::config_utils;
use super::error::{DataQualityReport, Error, Result};
use super::geometry_index::{Endpoint, GeometryIndex, NodeId, StopClass, ZoneId};
use super::path_network::PathNetwork;
use super::ActiveModeConfig;
use super::FEET_PER_MILE;

pub static NO_CANDIDATE: &str = "zone with no candidate destination at all";

/// Number of nearest destinations averaged for the intrazonal walk distance.
static INTRAZONAL_NEIGHBOURS: usize = 3;

type DestTree = KdTree<f64, usize, [f64; 2]>;


#[derive(PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Clone, Copy)]
pub enum ConnectorMode {
    Walk,
    Bike,
    StopWalk(StopClass),
}

impl ConnectorMode {
    pub fn get_name(&self) -> String {
        match self {
            ConnectorMode::Walk => String::from("maz-maz walk"),
            ConnectorMode::Bike => String::from("maz-maz bike"),
            ConnectorMode::StopWalk(class) => format!("maz-stop walk ({})", class.get_name()),
        }
    }

    pub fn fallback_category(&self) -> String {
        format!("{} connector past the ceiling (straight-line fallback)", self.get_name())
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ConnectorSource {
    /// shortest path over the street network, within the ceiling
    Network,
    /// straight-line distance to the nearest destination, for an origin with no other connection
    Fallback,
    /// half the mean distance to the nearest few zones
    Intrazonal,
}

/// Distances are in miles.
#[derive(PartialEq, Debug, Clone)]
pub struct ConnectorRecord {
    pub origin: ZoneId,
    pub destination: u32,
    pub distance: f64,
    pub source: ConnectorSource,
}

impl ConnectorRecord {
    pub fn new(origin: ZoneId, destination: u32, distance: f64, source: ConnectorSource)
               -> ConnectorRecord {
        ConnectorRecord{origin, destination, distance, source}
    }

    pub fn is_fallback(&self) -> bool {
        self.source == ConnectorSource::Fallback
    }
}

#[derive(Serialize)]
struct ConnectorRow {
    origin: ZoneId,
    destination: u32,
    distance: f64,
    time: f64,
    fallback: u8,
}

/// A distance ceiling in feet.  Candidates are first filtered by straight-line distance, then
/// by network distance.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct DistanceCeiling {
    pub straight_line_ft: f64,
    pub network_ft: f64,
}

impl DistanceCeiling {
    pub fn new(ceiling_ft: f64) -> DistanceCeiling {
        DistanceCeiling{straight_line_ft: ceiling_ft, network_ft: ceiling_ft}
    }

    pub fn with_detour(ceiling_ft: f64, detour_factor: f64) -> DistanceCeiling {
        DistanceCeiling{straight_line_ft: ceiling_ft, network_ft: ceiling_ft * detour_factor}
    }

    pub fn get_miles(&self) -> f64 {
        self.straight_line_ft / FEET_PER_MILE
    }
}

#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    pub walk_speed_mph: f64,
    pub bike_speed_mph: f64,
    pub zone_walk: DistanceCeiling,
    pub zone_bike: DistanceCeiling,
    // the stop classes that get a connector table, each with its own ceiling
    pub stop_walk: BTreeMap<StopClass, DistanceCeiling>,
    // zones and stops farther than this from every network node abort the run
    pub snap_tolerance_ft: f64,
    // reported as the nearest-stop distance for zones with no stop of a class within its ceiling
    pub no_stop_sentinel: f64,
    pub intrazonal_walk: bool,
}

impl Default for ConnectorConfig {
    fn default() -> ConnectorConfig {
        let mut stop_walk = BTreeMap::new();
        stop_walk.insert(StopClass::Local, DistanceCeiling::new(7920.));
        stop_walk.insert(StopClass::Premium, DistanceCeiling::new(15840.));
        ConnectorConfig {
            walk_speed_mph: 3.,
            bike_speed_mph: 7.8,
            zone_walk: DistanceCeiling::new(15840.),
            zone_bike: DistanceCeiling::new(26400.),
            stop_walk,
            snap_tolerance_ft: 10560.,
            no_stop_sentinel: 9999.,
            intrazonal_walk: false,
        }
    }
}

impl ConnectorConfig {
    pub fn from_yaml(yaml_cfg: &Yaml) -> Result<ConnectorConfig> {
        let detour = config_utils::get_f64_or(yaml_cfg, "network_detour_factor", 1.)?;
        if detour < 1. {
            return Err(Error::Config(String::from("network_detour_factor must be at least 1")));
        }
        let ceiling = |key: &str| -> Result<DistanceCeiling> {
            Ok(DistanceCeiling::with_detour(config_utils::get_f64(yaml_cfg, key)?, detour))
        };

        let mut stop_walk = BTreeMap::new();
        stop_walk.insert(StopClass::Local, ceiling("max_maz_local_bus_stop_walk_dist_feet")?);
        stop_walk.insert(StopClass::Premium,
                         ceiling("max_maz_premium_transit_stop_walk_dist_feet")?);
        let brt_key = "max_maz_future_brt_stop_walk_dist_feet";
        if let Some(brt_ft) = config_utils::get_opt_f64(yaml_cfg, brt_key)? {
            stop_walk.insert(StopClass::FutureBrt, DistanceCeiling::with_detour(brt_ft, detour));
        }

        let defaults = ConnectorConfig::default();
        Ok(ConnectorConfig {
            walk_speed_mph: config_utils::get_f64(yaml_cfg, "walk_speed_mph")?,
            bike_speed_mph: config_utils::get_f64(yaml_cfg, "bike_speed_mph")?,
            zone_walk: ceiling("max_maz_maz_walk_dist_feet")?,
            zone_bike: ceiling("max_maz_maz_bike_dist_feet")?,
            stop_walk,
            snap_tolerance_ft: config_utils::get_f64_or(yaml_cfg, "snap_tolerance_feet",
                                                        defaults.snap_tolerance_ft)?,
            no_stop_sentinel: config_utils::get_f64_or(yaml_cfg, "no_stop_sentinel",
                                                       defaults.no_stop_sentinel)?,
            intrazonal_walk: config_utils::get_bool_or(yaml_cfg, "intrazonal_walk", false)?,
        })
    }

    /// Whether future BRT stops form their own class rather than counting as premium.
    pub fn separate_brt(&self) -> bool {
        self.stop_walk.contains_key(&StopClass::FutureBrt)
    }
}

impl ActiveModeConfig for ConnectorConfig {
    fn get_walk_speed_mph(&self) -> f64 {
        self.walk_speed_mph
    }

    fn get_bike_speed_mph(&self) -> f64 {
        self.bike_speed_mph
    }
}


/// The connectors for one mode, sorted by origin and then destination.
#[derive(Debug, Clone)]
pub struct ConnectorTable {
    mode: ConnectorMode,
    ceiling_mi: f64,
    records: Vec<ConnectorRecord>,
}

impl ConnectorTable {
    pub fn new(mode: ConnectorMode, ceiling_mi: f64, mut records: Vec<ConnectorRecord>)
               -> ConnectorTable {
        records.sort_by(|aa, bb| (aa.origin, aa.destination).cmp(&(bb.origin, bb.destination)));
        ConnectorTable{mode, ceiling_mi, records}
    }

    pub fn get_mode(&self) -> ConnectorMode {
        self.mode
    }

    /// The nominal (straight-line) ceiling, in miles.
    pub fn get_ceiling_mi(&self) -> f64 {
        self.ceiling_mi
    }

    pub fn get_records(&self) -> &Vec<ConnectorRecord> {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, origin: ZoneId, destination: u32) -> Option<&ConnectorRecord> {
        match self.records.binary_search_by(
            |rec| (rec.origin, rec.destination).cmp(&(origin, destination))) {
            Ok(idx) => Some(&self.records[idx]),
            Err(_) => None,
        }
    }

    /// Records that exceed the nominal ceiling; these can only come from the fallback.
    pub fn get_over_ceiling(&self) -> Vec<&ConnectorRecord> {
        self.records.iter().filter(|rec| rec.distance > self.ceiling_mi).collect()
    }

    /// Distance in miles to the nearest destination, per origin.
    pub fn nearest_by_origin(&self) -> BTreeMap<ZoneId, f64> {
        let mut nearest = BTreeMap::new();
        for rec in &self.records {
            let entry = nearest.entry(rec.origin).or_insert(f64::INFINITY);
            if rec.distance < *entry {
                *entry = rec.distance;
            }
        }
        nearest
    }

    pub fn to_lookup(&self) -> HashMap<(ZoneId, ZoneId), f64> {
        self.records.iter().map(|rec| ((rec.origin, rec.destination), rec.distance)).collect()
    }

    /// Appends a self pair for each origin, at half the mean distance to its nearest few
    /// destinations.
    pub fn add_intrazonal(&mut self) {
        let mut by_origin: BTreeMap<ZoneId, Vec<f64>> = BTreeMap::new();
        for rec in &self.records {
            if rec.origin != rec.destination {
                by_origin.entry(rec.origin).or_insert_with(Vec::new).push(rec.distance);
            }
        }
        let mut intrazonal = vec![];
        for (origin, mut dists) in by_origin {
            dists.sort_by(|aa, bb| aa.partial_cmp(bb).unwrap_or(std::cmp::Ordering::Equal));
            dists.truncate(INTRAZONAL_NEIGHBOURS);
            let mean = dists.iter().sum::<f64>() / dists.len() as f64;
            intrazonal.push(ConnectorRecord::new(origin, origin, mean / 2.,
                                                 ConnectorSource::Intrazonal));
        }
        self.records.retain(|rec| rec.source != ConnectorSource::Intrazonal);
        self.records.extend(intrazonal);
        self.records.sort_by(
            |aa, bb| (aa.origin, aa.destination).cmp(&(bb.origin, bb.destination)));
    }

    /// Writes one row per record, with the travel time in minutes at `speed_mph`.
    pub fn write_csv(&self, path: &Path, speed_mph: f64) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for rec in &self.records {
            writer.serialize(ConnectorRow {
                origin: rec.origin,
                destination: rec.destination,
                distance: rec.distance,
                time: rec.distance / speed_mph * 60.,
                fallback: rec.is_fallback() as u8,
            })?;
        }
        writer.flush()?;
        log::info!("wrote {} {} connectors to {:?}", self.len(), self.mode.get_name(), path);
        Ok(())
    }
}


/// For every zone, the distance in miles to the nearest stop of each class, or the sentinel
/// when no stop of the class is within its ceiling.
#[derive(Debug, Clone, PartialEq)]
pub struct StopAccessTable {
    classes: Vec<StopClass>,
    distances: BTreeMap<ZoneId, Vec<f64>>,
    sentinel: f64,
}

impl StopAccessTable {
    pub fn from_tables(zone_ids: &[ZoneId], tables: &[ConnectorTable], sentinel: f64)
                       -> StopAccessTable {
        let mut classes = vec![];
        let mut distances: BTreeMap<ZoneId, Vec<f64>> = zone_ids.iter()
            .map(|zz| (*zz, vec![sentinel; tables.len()]))
            .collect();
        for (cc, table) in tables.iter().enumerate() {
            if let ConnectorMode::StopWalk(class) = table.get_mode() {
                classes.push(class);
            }
            for (zone, dist) in table.nearest_by_origin() {
                if dist > table.get_ceiling_mi() {
                    // over the ceiling, so a straight-line fallback; it doesn't count as served
                    continue;
                }
                if let Some(row) = distances.get_mut(&zone) {
                    row[cc] = dist;
                }
            }
        }
        StopAccessTable{classes, distances, sentinel}
    }

    pub fn get_classes(&self) -> &Vec<StopClass> {
        &self.classes
    }

    pub fn get_sentinel(&self) -> f64 {
        self.sentinel
    }

    /// The nearest-stop distance, which is the sentinel if the zone isn't served.  `None` if
    /// the zone or class isn't in the table.
    pub fn get_distance(&self, zone: ZoneId, class: StopClass) -> Option<f64> {
        let cc = self.classes.iter().position(|cl| *cl == class)?;
        self.distances.get(&zone).map(|row| row[cc])
    }

    pub fn is_served(&self, zone: ZoneId, class: StopClass) -> bool {
        match self.get_distance(zone, class) {
            Some(dist) => dist < self.sentinel,
            None => false,
        }
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        let mut header = vec![String::from("zone")];
        header.extend(self.classes.iter().map(|cl| format!("walk_dist_{}", cl.get_name())));
        writer.write_record(&header)?;
        for (zone, row) in &self.distances {
            let mut record = vec![zone.to_string()];
            record.extend(row.iter().map(|dd| dd.to_string()));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        log::info!("wrote nearest-stop distances for {} zones to {:?}", self.distances.len(),
                   path);
        Ok(())
    }
}


/// Everything the connector builder produces in one run.
pub struct ConnectorOutputs {
    pub walk: ConnectorTable,
    pub bike: ConnectorTable,
    pub stops: Vec<ConnectorTable>,
    pub stop_access: StopAccessTable,
}

struct TableSpec {
    mode: ConnectorMode,
    ceiling: DistanceCeiling,
    // zone pairs sharing a connector node are meaningless, but a zone may sit on a stop's node
    exclude_same_node: bool,
    clip_to_ceiling: bool,
}

pub struct ConnectorBuilder<'a> {
    index: &'a GeometryIndex,
    network: &'a PathNetwork,
    cfg: &'a ConnectorConfig,
}

impl<'a> ConnectorBuilder<'a> {
    pub fn new(index: &'a GeometryIndex, network: &'a PathNetwork, cfg: &'a ConnectorConfig)
               -> ConnectorBuilder<'a> {
        ConnectorBuilder{index, network, cfg}
    }

    pub fn build_zone_walk(&self, report: &mut DataQualityReport) -> Result<ConnectorTable> {
        let spec = TableSpec {
            mode: ConnectorMode::Walk,
            ceiling: self.cfg.zone_walk,
            exclude_same_node: true,
            clip_to_ceiling: false,
        };
        let zones = self.index.get_zone_endpoints();
        let mut table = self.build_table(&spec, zones, zones, report)?;
        if self.cfg.intrazonal_walk {
            table.add_intrazonal();
        }
        Ok(table)
    }

    pub fn build_zone_bike(&self, report: &mut DataQualityReport) -> Result<ConnectorTable> {
        let spec = TableSpec {
            mode: ConnectorMode::Bike,
            ceiling: self.cfg.zone_bike,
            exclude_same_node: true,
            clip_to_ceiling: false,
        };
        let zones = self.index.get_zone_endpoints();
        self.build_table(&spec, zones, zones, report)
    }

    pub fn build_zone_stop(&self, class: StopClass, report: &mut DataQualityReport)
                           -> Result<ConnectorTable> {
        let ceiling = match self.cfg.stop_walk.get(&class) {
            Some(ceiling) => *ceiling,
            None => return Err(Error::Config(format!(
                "no walk ceiling configured for {} stops", class.get_name()))),
        };
        let spec = TableSpec {
            mode: ConnectorMode::StopWalk(class),
            ceiling,
            exclude_same_node: false,
            clip_to_ceiling: true,
        };
        let stops = self.index.get_stop_endpoints(class);
        self.build_table(&spec, self.index.get_zone_endpoints(), &stops, report)
    }

    pub fn build_all(&self, report: &mut DataQualityReport) -> Result<ConnectorOutputs> {
        let walk = self.build_zone_walk(report)?;
        let bike = self.build_zone_bike(report)?;
        let mut stops = vec![];
        for class in self.cfg.stop_walk.keys() {
            stops.push(self.build_zone_stop(*class, report)?);
        }
        let zone_ids: Vec<ZoneId> = self.index.get_zone_endpoints().iter().map(|ep| ep.id)
            .collect();
        let stop_access = StopAccessTable::from_tables(&zone_ids, &stops,
                                                       self.cfg.no_stop_sentinel);
        Ok(ConnectorOutputs{walk, bike, stops, stop_access})
    }

    fn build_table(&self, spec: &TableSpec, origins: &[Endpoint], destinations: &[Endpoint],
                   report: &mut DataQualityReport) -> Result<ConnectorTable> {
        let mut dest_tree: DestTree = KdTree::new(2);
        for (jj, dest) in destinations.iter().enumerate() {
            dest_tree.add(dest.node_pos.as_array(), jj).map_err(kd_error)?;
        }
        let straight_ft = spec.ceiling.straight_line_ft;
        let ceiling_mi = spec.ceiling.get_miles();
        let network_ceiling_mi = spec.ceiling.network_ft / FEET_PER_MILE;

        // coarse filter on straight-line distance between connector nodes
        let candidates: Vec<Vec<(usize, f64)>> = origins.par_iter()
            .map(|origin| -> Result<Vec<(usize, f64)>> {
                let point = origin.node_pos.as_array();
                let within = dest_tree.within(&point, straight_ft.powi(2), &squared_euclidean)
                    .map_err(kd_error)?;
                Ok(within.into_iter()
                    .filter(|(_, jj)| !(spec.exclude_same_node &&
                                        destinations[**jj].node_id == origin.node_id))
                    .map(|(dist_sq, jj)| (*jj, dist_sq.sqrt() / FEET_PER_MILE))
                    .collect::<Vec<(usize, f64)>>())
            })
            .collect::<Result<Vec<_>>>()?;

        let mut flat_candidates = vec![];
        for (ii, origin_cands) in candidates.iter().enumerate() {
            for (jj, _) in origin_cands {
                flat_candidates.push((ii, *jj));
            }
        }
        log::info!("{}: {} candidate pairs within {} ft", spec.mode.get_name(),
                   flat_candidates.len(), straight_ft);

        // one batched shortest-path call for every surviving pair
        let pairs: Vec<(NodeId, NodeId)> = flat_candidates.iter()
            .map(|(ii, jj)| (origins[*ii].node_id, destinations[*jj].node_id))
            .collect();
        let lengths = self.network.shortest_path_lengths(&pairs, Some(network_ceiling_mi));

        let mut records = vec![];
        let mut connected = vec![false; origins.len()];
        for ((ii, jj), length) in flat_candidates.iter().zip(lengths) {
            if length > network_ceiling_mi {
                continue;
            }
            let distance = if spec.clip_to_ceiling {
                // street detours can exceed the straight-line estimate
                length.min(ceiling_mi)
            } else {
                length
            };
            records.push(ConnectorRecord::new(origins[*ii].id, destinations[*jj].id, distance,
                                              ConnectorSource::Network));
            connected[*ii] = true;
        }

        // every origin keeps at least one connection, even past the ceiling
        let fallback_category = spec.mode.fallback_category();
        for (ii, origin) in origins.iter().enumerate() {
            if connected[ii] {
                continue;
            }
            match nearest_destination(&dest_tree, origin, destinations, spec.exclude_same_node)? {
                Some((jj, dist_ft)) => {
                    records.push(ConnectorRecord::new(origin.id, destinations[jj].id,
                                                      dist_ft / FEET_PER_MILE,
                                                      ConnectorSource::Fallback));
                    report.record(&fallback_category, origin.id);
                }
                None => {
                    log::warn!("{}: zone {} has no candidate destinations", spec.mode.get_name(),
                               origin.id);
                    report.record(NO_CANDIDATE, origin.id);
                }
            }
        }

        let table = ConnectorTable::new(spec.mode, ceiling_mi, records);
        log::info!("{}: {} connectors, {} by straight-line fallback", spec.mode.get_name(),
                   table.len(), table.get_records().iter().filter(|rr| rr.is_fallback()).count());
        Ok(table)
    }
}


/// The destination nearest to `origin` in a straight line, with its distance in feet.  Ties go
/// to the lowest destination id.
fn nearest_destination(dest_tree: &DestTree, origin: &Endpoint, destinations: &[Endpoint],
                       exclude_same_node: bool) -> Result<Option<(usize, f64)>> {
    let point = origin.node_pos.as_array();
    let mut best: Option<(usize, f64)> = None;
    for (dist_sq, jj) in dest_tree.iter_nearest(&point, &squared_euclidean).map_err(kd_error)? {
        if exclude_same_node && destinations[*jj].node_id == origin.node_id {
            continue;
        }
        match best {
            None => best = Some((*jj, dist_sq)),
            Some((best_jj, best_sq)) => {
                if dist_sq > best_sq {
                    break;
                }
                if destinations[*jj].id < destinations[best_jj].id {
                    best = Some((*jj, dist_sq));
                }
            }
        }
    }
    Ok(best.map(|(jj, dist_sq)| (jj, dist_sq.sqrt())))
}

fn kd_error(err: kdtree::ErrorKind) -> Error {
    Error::InvalidData(format!("spatial index error: {:?}", err))
}
