// Combines connectors, expanded skims and service availability into the best travel time by
// each mode for every pair of micro-zones.
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::Path;

use rayon::prelude::*;
use serde::Serialize;
use yaml_rust::Yaml;

use super::config_utils;
use super::connectors::ConnectorTable;
use super::error::{DataQualityReport, Error, Result};
use super::geometry_index::ZoneId;
use super::service::{ServiceAvailability, ZoneService};
use super::skim_expander::{ExpandedSkim, ZoneMembership};
use super::skims::SkimSet;
use super::ActiveModeConfig;

pub static SKIM_NOT_COMPUTED: &str = "zone pair with a transit skim value not computed";


/// The fare of a ride and the constant added to its generalized time.  Costs are in dollars,
/// the variable part per minute of riding.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct RideCost {
    pub variable_cost: f64,
    pub fixed_cost: f64,
    // minutes
    pub constant: f64,
}

impl RideCost {
    /// Every key is optional and defaults to 0.
    pub fn from_yaml(yaml: &Yaml) -> Result<RideCost> {
        Ok(RideCost {
            variable_cost: config_utils::get_f64_or(yaml, "variable_cost", 0.)?,
            fixed_cost: config_utils::get_f64_or(yaml, "fixed_cost", 0.)?,
            constant: config_utils::get_f64_or(yaml, "constant", 0.)?,
        })
    }

    pub fn is_free(&self) -> bool {
        self.variable_cost == 0. && self.fixed_cost == 0.
    }

    pub fn cost(&self, ride_time: f64) -> f64 {
        if !ride_time.is_finite() {
            return f64::INFINITY;
        }
        self.variable_cost * ride_time + self.fixed_cost
    }

    /// `time` plus the fare converted to minutes at `value_of_time` dollars per hour, plus the
    /// constant.
    pub fn generalized_time(&self, time: f64, cost: f64, value_of_time: Option<f64>) -> f64 {
        if !time.is_finite() {
            return f64::INFINITY;
        }
        let cost_time = match value_of_time {
            Some(vot) if cost != 0. => cost * 60. / vot,
            _ => 0.,
        };
        time + cost_time + self.constant
    }
}


/// An on-demand shared vehicle service.  Distances are in miles, times in minutes.
#[derive(PartialEq, Debug, Clone)]
pub struct FlexFleetParams {
    pub speed_mph: f64,
    pub wait_time: f64,
    pub diversion_constant: f64,
    pub diversion_factor: f64,
    pub max_service_dist: f64,
    // below this, walking to transit is assumed better even where the service runs
    pub min_dist: f64,
    pub cost: RideCost,
}

impl FlexFleetParams {
    pub fn from_yaml(yaml: &Yaml) -> Result<FlexFleetParams> {
        let params = FlexFleetParams {
            speed_mph: config_utils::get_f64(yaml, "speed_mph")?,
            wait_time: config_utils::get_f64(yaml, "wait_time")?,
            diversion_constant: config_utils::get_f64(yaml, "diversion_constant")?,
            diversion_factor: config_utils::get_f64(yaml, "diversion_factor")?,
            max_service_dist: config_utils::get_f64(yaml, "max_service_dist")?,
            min_dist: config_utils::get_f64_or(yaml, "min_dist", 0.)?,
            cost: RideCost::from_yaml(yaml)?,
        };
        if params.speed_mph <= 0. {
            return Err(Error::Config(String::from("speed_mph must be positive")));
        }
        Ok(params)
    }

    pub fn direct_time(&self, dist: f64) -> f64 {
        60. * dist / self.speed_mph
    }

    /// Time including the wait and the detours made to serve other riders.
    pub fn total_time(&self, direct_time: f64) -> f64 {
        let diverted = (self.diversion_constant + direct_time)
            .max(self.diversion_factor * direct_time);
        return self.wait_time + diverted;
    }

    /// Time to ride to transit from a zone served by `operator`, if the ride is within the
    /// service's range.
    pub fn access_time(&self, operator: u32, dist: Option<f64>) -> Option<f64> {
        let dist = dist?;
        if operator == 0 || dist > self.max_service_dist || dist <= self.min_dist {
            return None;
        }
        Some(self.total_time(self.direct_time(dist)))
    }

    /// Time for a whole trip by the service, given the car skim's time and distance.  Both ends
    /// must be served by the same operator, and the service limit is applied to the car time.
    pub fn trip_time(&self, orig_operator: u32, dest_operator: u32, vehicle_time: f64,
                     vehicle_dist: f64) -> f64 {
        if orig_operator == 0 || orig_operator != dest_operator ||
           !(vehicle_time < self.max_service_dist) {
            return f64::INFINITY;
        }
        let direct = self.direct_time(vehicle_dist).max(vehicle_time);
        self.total_time(direct)
    }
}

/// A rented e-bike or e-scooter, derived from bike times.
#[derive(PartialEq, Debug, Clone)]
pub struct MicromobilityParams {
    pub speed_mph: f64,
    pub rent_time: f64,
    pub max_dist: f64,
    pub cost: RideCost,
}

impl MicromobilityParams {
    pub fn from_yaml(yaml: &Yaml) -> Result<MicromobilityParams> {
        Ok(MicromobilityParams {
            speed_mph: config_utils::get_f64(yaml, "speed_mph")?,
            rent_time: config_utils::get_f64(yaml, "rent_time")?,
            max_dist: config_utils::get_f64(yaml, "max_dist")?,
            cost: RideCost::from_yaml(yaml)?,
        })
    }

    /// Minutes on the vehicle for a trip that takes `bike_time` by bike.
    pub fn ride_time(&self, bike_time: f64, bike_speed_mph: f64) -> f64 {
        bike_time * bike_speed_mph / self.speed_mph
    }

    pub fn time_from_bike(&self, bike_time: f64, bike_speed_mph: f64, access_time: f64) -> f64 {
        let time = self.ride_time(bike_time, bike_speed_mph) + access_time + self.rent_time;
        if time > self.max_dist / self.speed_mph * 60. {
            return f64::INFINITY;
        }
        time
    }
}

/// One way of riding the transit network, e.g. local buses only.  Its time is the sum of its
/// cores.
#[derive(PartialEq, Debug, Clone)]
pub struct TransitAlternative {
    pub name: String,
    pub cores: Vec<String>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct TrafficSkim {
    pub skim: String,
    pub time_core: String,
    pub dist_core: String,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ComposerConfig {
    pub walk_speed_mph: f64,
    pub bike_speed_mph: f64,
    pub transit_skim: String,
    pub transit_alternatives: Vec<TransitAlternative>,
    pub traffic: TrafficSkim,
    pub microtransit: FlexFleetParams,
    pub nev: FlexFleetParams,
    pub ebike: MicromobilityParams,
    pub escooter: MicromobilityParams,
    // minutes; pairs with no mode at or under this are left out
    pub reporting_threshold: f64,
    // written in place of infinite times
    pub infinity_sentinel: f64,
    // walk distances at or above this mean there's no stop in reach
    pub no_stop_sentinel: f64,
    // dollars per hour; only needed when some mode has a fare
    pub value_of_time: Option<f64>,
}

impl ComposerConfig {
    pub fn from_yaml(yaml: &Yaml, walk_speed_mph: f64, bike_speed_mph: f64,
                     no_stop_sentinel: f64) -> Result<ComposerConfig> {
        let mut transit_alternatives = vec![];
        if let Some(alts) = yaml["transit_alternatives"].as_vec() {
            for alt in alts {
                let cores = match alt["cores"].as_vec() {
                    Some(cores) => cores.iter()
                        .map(|cc| cc.as_str().map(String::from).ok_or(Error::Config(
                            String::from("transit alternative cores must be names"))))
                        .collect::<Result<Vec<_>>>()?,
                    None => vec![],
                };
                if cores.is_empty() {
                    return Err(Error::Config(String::from("transit alternative has no cores")));
                }
                transit_alternatives.push(TransitAlternative {
                    name: String::from(config_utils::get_str(alt, "name")?),
                    cores,
                });
            }
        }

        let traffic_yaml = config_utils::get_section(yaml, "traffic")?;
        let cfg = ComposerConfig {
            walk_speed_mph,
            bike_speed_mph,
            transit_skim: String::from(config_utils::get_str_or(yaml, "transit_skim",
                                                                "transit")?),
            transit_alternatives,
            traffic: TrafficSkim {
                skim: String::from(config_utils::get_str_or(traffic_yaml, "skim", "traffic")?),
                time_core: String::from(config_utils::get_str(traffic_yaml, "time_core")?),
                dist_core: String::from(config_utils::get_str(traffic_yaml, "dist_core")?),
            },
            microtransit: FlexFleetParams::from_yaml(
                config_utils::get_section(yaml, "microtransit")?)?,
            nev: FlexFleetParams::from_yaml(config_utils::get_section(yaml, "nev")?)?,
            ebike: MicromobilityParams::from_yaml(config_utils::get_section(yaml, "ebike")?)?,
            escooter: MicromobilityParams::from_yaml(
                config_utils::get_section(yaml, "escooter")?)?,
            reporting_threshold: config_utils::get_f64(yaml, "reporting_threshold_minutes")?,
            infinity_sentinel: config_utils::get_f64_or(yaml, "infinity_sentinel", 999999.)?,
            no_stop_sentinel,
            value_of_time: config_utils::get_opt_f64(yaml, "value_of_time")?,
        };

        let has_fares = [&cfg.microtransit.cost, &cfg.nev.cost, &cfg.ebike.cost,
                         &cfg.escooter.cost].iter().any(|cost| !cost.is_free());
        match cfg.value_of_time {
            Some(vot) if vot <= 0. => {
                return Err(Error::Config(String::from("value_of_time must be positive")));
            }
            None if has_fares => {
                return Err(Error::Config(String::from(
                    "value_of_time is needed to convert fares to time")));
            }
            _ => (),
        }
        Ok(cfg)
    }
}

impl ActiveModeConfig for ComposerConfig {
    fn get_walk_speed_mph(&self) -> f64 {
        self.walk_speed_mph
    }

    fn get_bike_speed_mph(&self) -> f64 {
        self.bike_speed_mph
    }
}


/// Travel times in minutes for one pair of micro-zones.  Infeasible modes are infinite.
#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct AccessibilityRow {
    pub origin: ZoneId,
    pub destination: ZoneId,
    pub transit: f64,
    pub walk: f64,
    pub bike: f64,
    pub microtransit: f64,
    pub nev: f64,
    pub ebike: f64,
    pub escooter: f64,
    pub best: f64,
    pub microtransit_cost: f64,
    pub microtransit_gen_time: f64,
    pub nev_cost: f64,
    pub nev_gen_time: f64,
    pub ebike_cost: f64,
    pub ebike_gen_time: f64,
    pub escooter_cost: f64,
    pub escooter_gen_time: f64,
    // the least of walking and the generalized times of the on-demand modes
    pub min_gen_time: f64,
}

impl AccessibilityRow {
    fn with_sentinel(&self, sentinel: f64) -> AccessibilityRow {
        let fix = |time: f64| if time.is_finite() { time } else { sentinel };
        AccessibilityRow {
            origin: self.origin,
            destination: self.destination,
            transit: fix(self.transit),
            walk: fix(self.walk),
            bike: fix(self.bike),
            microtransit: fix(self.microtransit),
            nev: fix(self.nev),
            ebike: fix(self.ebike),
            escooter: fix(self.escooter),
            best: fix(self.best),
            microtransit_cost: fix(self.microtransit_cost),
            microtransit_gen_time: fix(self.microtransit_gen_time),
            nev_cost: fix(self.nev_cost),
            nev_gen_time: fix(self.nev_gen_time),
            ebike_cost: fix(self.ebike_cost),
            ebike_gen_time: fix(self.ebike_gen_time),
            escooter_cost: fix(self.escooter_cost),
            escooter_gen_time: fix(self.escooter_gen_time),
            min_gen_time: fix(self.min_gen_time),
        }
    }
}

pub fn write_csv(rows: &[AccessibilityRow], path: &Path, infinity_sentinel: f64) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row.with_sentinel(infinity_sentinel))?;
    }
    writer.flush()?;
    log::info!("wrote {} accessibility rows to {:?}", rows.len(), path);
    Ok(())
}


pub struct AccessibilityComposer<'a> {
    cfg: &'a ComposerConfig,
    membership: &'a ZoneMembership,
    service: &'a ServiceAvailability,
    skims: &'a BTreeMap<String, SkimSet>,
    walk: &'a ConnectorTable,
    bike: &'a ConnectorTable,
}

// Everything the per-pair computation reads, prepared once.
struct PairInputs<'b> {
    micro_ids: &'b Vec<ZoneId>,
    zone_services: Vec<&'b ZoneService>,
    // the same time serves as access at an origin and egress at a destination
    transit_access: Vec<f64>,
    alternatives: Vec<Vec<ExpandedSkim<'b>>>,
    traffic_time: ExpandedSkim<'b>,
    traffic_dist: ExpandedSkim<'b>,
    walk_dists: HashMap<(ZoneId, ZoneId), f64>,
    bike_dists: HashMap<(ZoneId, ZoneId), f64>,
}

impl<'a> AccessibilityComposer<'a> {
    pub fn new(cfg: &'a ComposerConfig, membership: &'a ZoneMembership,
               service: &'a ServiceAvailability, skims: &'a BTreeMap<String, SkimSet>,
               walk: &'a ConnectorTable, bike: &'a ConnectorTable)
               -> AccessibilityComposer<'a> {
        AccessibilityComposer{cfg, membership, service, skims, walk, bike}
    }

    /// Computes the rows for every pair of micro-zones with at least one mode within the
    /// reporting threshold, ordered by origin and then destination.
    pub fn compose(&self, report: &mut DataQualityReport) -> Result<Vec<AccessibilityRow>> {
        let inputs = self.prepare()?;
        let num_micro = self.membership.num_micro();
        let per_origin: Vec<(Vec<AccessibilityRow>, DataQualityReport)> = (0..num_micro)
            .into_par_iter()
            .map(|oi| {
                let mut rows = vec![];
                let mut origin_report = DataQualityReport::new();
                for di in 0..num_micro {
                    let (row, not_computed) = self.compose_pair(&inputs, oi, di);
                    if let Some(row) = row {
                        rows.push(row);
                    }
                    if not_computed {
                        origin_report.record(SKIM_NOT_COMPUTED, format!(
                            "{}->{}", inputs.micro_ids[oi], inputs.micro_ids[di]));
                    }
                }
                (rows, origin_report)
            })
            .collect();

        let mut rows = vec![];
        for (origin_rows, origin_report) in per_origin {
            rows.extend(origin_rows);
            report.merge(origin_report);
        }
        log::info!("{} of {} zone pairs have a mode within {} minutes", rows.len(),
                   num_micro * num_micro, self.cfg.reporting_threshold);
        Ok(rows)
    }

    fn get_skim(&self, name: &str) -> Result<&'a SkimSet> {
        self.skims.get(name).ok_or(Error::Config(format!("no skim set named '{}'", name)))
    }

    fn prepare(&self) -> Result<PairInputs<'a>> {
        let micro_ids = self.membership.get_micro_ids();
        let mut zone_services = vec![];
        for micro in micro_ids {
            match self.service.get(*micro) {
                Some(zs) => zone_services.push(zs),
                None => return Err(Error::InvalidData(format!(
                    "zone {} has no land-use record", micro))),
            }
        }
        let transit_access: Vec<f64> = zone_services.iter()
            .map(|zs| self.transit_access_time(zs))
            .collect();

        let transit = self.get_skim(&self.cfg.transit_skim)?;
        let mut alternatives = vec![];
        for alt in &self.cfg.transit_alternatives {
            let views = alt.cores.iter()
                .map(|core| transit.expanded(core, self.membership))
                .collect::<Result<Vec<_>>>()?;
            alternatives.push(views);
        }
        let traffic = self.get_skim(&self.cfg.traffic.skim)?;

        Ok(PairInputs {
            micro_ids,
            zone_services,
            transit_access,
            alternatives,
            traffic_time: traffic.expanded(&self.cfg.traffic.time_core, self.membership)?,
            traffic_dist: traffic.expanded(&self.cfg.traffic.dist_core, self.membership)?,
            walk_dists: self.walk.to_lookup(),
            bike_dists: self.bike.to_lookup(),
        })
    }

    /// Access to (or egress from) transit at one zone: the neighbourhood shuttle if it's in
    /// range, then microtransit, then walking.
    fn transit_access_time(&self, zs: &ZoneService) -> f64 {
        let flex_dist = zs.flex_dist_to_transit();
        for (operator, params) in [(zs.nev, &self.cfg.nev),
                                   (zs.microtransit, &self.cfg.microtransit)].iter() {
            if let Some(time) = params.access_time(*operator, flex_dist) {
                return time;
            }
        }
        match zs.walk_dist_to_transit() {
            Some(dist) if dist < self.cfg.no_stop_sentinel => self.cfg.walk_minutes(dist),
            _ => f64::INFINITY,
        }
    }

    /// Returns the row, if any mode is within the threshold, and whether a skim value the pair
    /// needed was not computed.
    fn compose_pair(&self, inputs: &PairInputs, oi: usize, di: usize)
                    -> (Option<AccessibilityRow>, bool) {
        let cfg = self.cfg;
        let origin = inputs.micro_ids[oi];
        let destination = inputs.micro_ids[di];

        let walk = match inputs.walk_dists.get(&(origin, destination)) {
            Some(dist) => cfg.walk_minutes(*dist),
            None => f64::INFINITY,
        };
        let bike = match inputs.bike_dists.get(&(origin, destination)) {
            Some(dist) => cfg.bike_minutes(*dist),
            None => f64::INFINITY,
        };

        let mut not_computed = false;
        let mut line_haul = f64::INFINITY;
        for alt in &inputs.alternatives {
            let mut total = 0.;
            for core in alt {
                not_computed |= core.is_not_computed(oi, di);
                total += core.get(oi, di);
            }
            line_haul = line_haul.min(total);
        }
        let transit = inputs.transit_access[oi] + line_haul + inputs.transit_access[di];

        let orig_service = inputs.zone_services[oi];
        let dest_service = inputs.zone_services[di];
        let vehicle_time = inputs.traffic_time.get(oi, di);
        let vehicle_dist = inputs.traffic_dist.get(oi, di);
        let microtransit = cfg.microtransit.trip_time(
            orig_service.microtransit, dest_service.microtransit, vehicle_time, vehicle_dist);
        let nev = cfg.nev.trip_time(orig_service.nev, dest_service.nev, vehicle_time,
                                    vehicle_dist);

        let mut times = [transit, walk, bike, microtransit, nev];
        for time in times.iter_mut() {
            if *time > cfg.reporting_threshold {
                *time = f64::INFINITY;
            }
        }
        if times.iter().all(|time| time.is_infinite()) {
            return (None, not_computed);
        }
        let [transit, walk, bike, microtransit, nev] = times;

        let (ebike, escooter) = if bike.is_finite() {
            let access = orig_service.micro_access_time;
            (cfg.ebike.time_from_bike(bike, cfg.bike_speed_mph, access),
             cfg.escooter.time_from_bike(bike, cfg.bike_speed_mph, access))
        } else {
            (f64::INFINITY, f64::INFINITY)
        };

        let best = [transit, walk, bike, microtransit, nev, ebike, escooter].iter()
            .cloned()
            .fold(f64::INFINITY, f64::min);

        // fares: the flexible fleets charge for the whole trip, the rentals for the ride
        let vot = cfg.value_of_time;
        let microtransit_cost = cfg.microtransit.cost.cost(microtransit);
        let microtransit_gen_time = cfg.microtransit.cost.generalized_time(
            microtransit, microtransit_cost, vot);
        let nev_cost = cfg.nev.cost.cost(nev);
        let nev_gen_time = cfg.nev.cost.generalized_time(nev, nev_cost, vot);
        let rental_cost = |params: &MicromobilityParams, time: f64| {
            if time.is_finite() {
                params.cost.cost(params.ride_time(bike, cfg.bike_speed_mph))
            } else {
                f64::INFINITY
            }
        };
        let ebike_cost = rental_cost(&cfg.ebike, ebike);
        let ebike_gen_time = cfg.ebike.cost.generalized_time(ebike, ebike_cost, vot);
        let escooter_cost = rental_cost(&cfg.escooter, escooter);
        let escooter_gen_time = cfg.escooter.cost.generalized_time(escooter, escooter_cost, vot);
        let min_gen_time = [walk, microtransit_gen_time, nev_gen_time, ebike_gen_time,
                            escooter_gen_time].iter()
            .cloned()
            .fold(f64::INFINITY, f64::min);

        let row = AccessibilityRow {
            origin,
            destination,
            transit,
            walk,
            bike,
            microtransit,
            nev,
            ebike,
            escooter,
            best,
            microtransit_cost,
            microtransit_gen_time,
            nev_cost,
            nev_gen_time,
            ebike_cost,
            ebike_gen_time,
            escooter_cost,
            escooter_gen_time,
            min_gen_time,
        };
        (Some(row), not_computed)
    }
}


#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use ndarray::array;
    use tempfile::tempdir;

    use super::*;
    use super::super::connectors::{ConnectorMode, ConnectorRecord, ConnectorSource};

    fn flex(wait_time: f64, constant: f64, factor: f64) -> FlexFleetParams {
        FlexFleetParams {
            speed_mph: 30.,
            wait_time,
            diversion_constant: constant,
            diversion_factor: factor,
            max_service_dist: 30.,
            min_dist: 0.5,
            cost: RideCost::default(),
        }
    }

    fn rental(speed_mph: f64, max_dist: f64) -> MicromobilityParams {
        MicromobilityParams{speed_mph, rent_time: 1., max_dist, cost: RideCost::default()}
    }

    fn test_config() -> ComposerConfig {
        ComposerConfig {
            walk_speed_mph: 3.,
            bike_speed_mph: 10.,
            transit_skim: String::from("transit"),
            transit_alternatives: vec![
                TransitAlternative {
                    name: String::from("local"),
                    cores: vec![String::from("LOC_WAIT"), String::from("LOC_IVT")],
                },
                TransitAlternative {
                    name: String::from("premium"),
                    cores: vec![String::from("PRM_WAIT"), String::from("PRM_IVT")],
                },
            ],
            traffic: TrafficSkim {
                skim: String::from("traffic"),
                time_core: String::from("TIME"),
                dist_core: String::from("DIST"),
            },
            microtransit: flex(5., 3., 1.5),
            nev: flex(4., 2., 1.2),
            ebike: rental(15., 10.),
            escooter: rental(6., 1.),
            reporting_threshold: 60.,
            infinity_sentinel: 999999.,
            no_stop_sentinel: 9999.,
            value_of_time: None,
        }
    }

    // micro-zones 1 and 2 are in coarse zone 10, 3 in coarse zone 20, 4 in coarse zone 30
    struct Fixture {
        cfg: ComposerConfig,
        membership: ZoneMembership,
        service: ServiceAvailability,
        skims: BTreeMap<String, SkimSet>,
        walk: ConnectorTable,
        bike: ConnectorTable,
    }

    fn fixture() -> Fixture {
        let inf = f64::INFINITY;
        let coarse = vec![10, 20, 30];
        let mut transit = SkimSet::new("transit", coarse.clone());
        transit.insert_core("LOC_WAIT", array![[inf, 5., inf], [5., inf, inf],
                                               [inf, inf, inf]]).unwrap();
        transit.insert_core("LOC_IVT", array![[inf, 20., inf], [20., inf, inf],
                                              [inf, inf, inf]]).unwrap();
        transit.insert_core("PRM_WAIT", array![[inf, 4., inf], [4., inf, inf],
                                               [inf, inf, inf]]).unwrap();
        transit.insert_core("PRM_IVT", array![[inf, 12., inf], [30., inf, inf],
                                              [inf, inf, inf]]).unwrap();
        let mut traffic = SkimSet::new("traffic", coarse.clone());
        traffic.insert_core("TIME", array![[2., 10., 50.], [10., 2., 50.],
                                           [50., 50., 2.]]).unwrap();
        traffic.insert_core("DIST", array![[0.5, 4., 25.], [4., 0.5, 25.],
                                           [25., 25., 0.5]]).unwrap();
        let mut skims = BTreeMap::new();
        skims.insert(String::from("transit"), transit);
        skims.insert(String::from("traffic"), traffic);

        let mut zones = vec![];
        for (micro, coarse) in &[(1, 10), (2, 10), (3, 20), (4, 30)] {
            let mut zs = ZoneService::new(*micro, *coarse);
            zs.walk_dist_local = Some(0.25);
            zs.walk_dist_premium = Some(9999.);
            zones.push(zs);
        }
        zones[0].microtransit = 1;
        zones[2].microtransit = 1;
        zones[3].walk_dist_local = Some(9999.);
        let service = ServiceAvailability::new(zones).unwrap();
        let membership = service.membership().unwrap();

        let walk = ConnectorTable::new(ConnectorMode::Walk, 1., vec![
            ConnectorRecord::new(1, 2, 0.5, ConnectorSource::Network),
            ConnectorRecord::new(2, 1, 0.5, ConnectorSource::Network),
            ConnectorRecord::new(3, 4, 4., ConnectorSource::Fallback),
        ]);
        let bike = ConnectorTable::new(ConnectorMode::Bike, 3., vec![
            ConnectorRecord::new(1, 2, 1., ConnectorSource::Network),
        ]);
        Fixture{cfg: test_config(), membership, service, skims, walk, bike}
    }

    fn compose(fx: &Fixture) -> (Vec<AccessibilityRow>, DataQualityReport) {
        let composer = AccessibilityComposer::new(&fx.cfg, &fx.membership, &fx.service,
                                                  &fx.skims, &fx.walk, &fx.bike);
        let mut report = DataQualityReport::new();
        let rows = composer.compose(&mut report).unwrap();
        (rows, report)
    }

    fn find(rows: &[AccessibilityRow], origin: ZoneId, destination: ZoneId)
            -> Option<&AccessibilityRow> {
        rows.iter().find(|rr| rr.origin == origin && rr.destination == destination)
    }

    #[test]
    fn test_diversion_formula() {
        let params = flex(5., 3., 1.5);
        assert_relative_eq!(params.total_time(10.), 20.);
        // the constant dominates for short trips
        assert_relative_eq!(params.total_time(2.), 10.);
        let mut prev = params.total_time(0.);
        for step in 1..200 {
            let time = params.total_time(step as f64 * 0.25);
            assert!(time >= prev);
            prev = time;
        }
    }

    #[test]
    fn test_flex_access() {
        let params = flex(5., 3., 1.5);
        // 1.5 miles at 30 mph is 3 minutes, so 5 + max(6, 4.5)
        assert_relative_eq!(params.access_time(1, Some(1.5)).unwrap(), 11.);
        assert_eq!(params.access_time(0, Some(1.5)), None);
        assert_eq!(params.access_time(1, None), None);
        // too close to bother, or out of range
        assert_eq!(params.access_time(1, Some(0.5)), None);
        assert_eq!(params.access_time(1, Some(31.)), None);
    }

    #[test]
    fn test_microtransit_trip() {
        let fx = fixture();
        let (rows, _) = compose(&fx);
        // both ends served by operator 1, 10 minutes by car (4 miles at 30 mph is only 8)
        let row = find(&rows, 1, 3).unwrap();
        assert_relative_eq!(row.microtransit, 20.);
        assert_eq!(row.nev, f64::INFINITY);
        // zone 2 isn't served
        assert_eq!(find(&rows, 2, 3).unwrap().microtransit, f64::INFINITY);

        let params = flex(5., 3., 1.5);
        assert_eq!(params.trip_time(1, 2, 10., 4.), f64::INFINITY);
        assert_eq!(params.trip_time(0, 0, 10., 4.), f64::INFINITY);
        assert_eq!(params.trip_time(1, 1, 31., 4.), f64::INFINITY);
        // the car distance can set the direct time too
        assert_relative_eq!(params.trip_time(1, 1, 10., 10.), 5. + 30.);
    }

    #[test]
    fn test_transit_alternatives() {
        let fx = fixture();
        let (rows, _) = compose(&fx);
        // walk access 0.25 mi at 3 mph is 5 minutes at each end; premium is the faster of the
        // two alternatives from 10 to 20 and local from 20 to 10
        let row = find(&rows, 2, 3).unwrap();
        assert_relative_eq!(row.transit, 5. + 16. + 5.);
        let row = find(&rows, 3, 2).unwrap();
        assert_relative_eq!(row.transit, 5. + 25. + 5.);
        // zone 4 has no stop in walking distance
        assert!(find(&rows, 4, 1).is_none());
    }

    #[test]
    fn test_access_egress_order() {
        let mut fx = fixture();
        let mut zones = vec![];
        for (micro, coarse) in &[(1, 10), (2, 10), (3, 20), (4, 30)] {
            let mut zs = ZoneService::new(*micro, *coarse);
            zs.walk_dist_local = Some(0.25);
            zs.walk_dist_premium = Some(9999.);
            zones.push(zs);
        }
        // zone 1 has both services, with transit 1.5 miles away, and the shuttle comes first
        zones[0].nev = 2;
        zones[0].microtransit = 1;
        zones[0].micro_dist_local = Some(1.5);
        // zone 2 has both as well, but transit is out of their range
        zones[1].nev = 2;
        zones[1].microtransit = 1;
        zones[1].micro_dist_local = Some(31.);
        // zone 3 only has microtransit
        zones[2].microtransit = 1;
        zones[2].micro_dist_premium = Some(1.5);
        zones[3].walk_dist_local = Some(9999.);
        fx.service = ServiceAvailability::new(zones).unwrap();
        let (rows, _) = compose(&fx);

        // 1.5 miles at 30 mph is 3 minutes: the shuttle takes 4 + max(2 + 3, 3.6) and
        // microtransit 5 + max(3 + 3, 4.5)
        let shuttle = 9.;
        let micro = 11.;
        let row = find(&rows, 1, 3).unwrap();
        assert_relative_eq!(row.transit, shuttle + 16. + micro);
        let row = find(&rows, 3, 1).unwrap();
        assert_relative_eq!(row.transit, micro + 25. + shuttle);
        // zone 2 walks its 0.25 miles
        let row = find(&rows, 2, 3).unwrap();
        assert_relative_eq!(row.transit, 5. + 16. + micro);
    }

    #[test]
    fn test_shuttle_trip() {
        let mut fx = fixture();
        let mut zones = vec![];
        for (micro, coarse) in &[(1, 10), (2, 10), (3, 20), (4, 30)] {
            let mut zs = ZoneService::new(*micro, *coarse);
            zs.walk_dist_local = Some(0.25);
            zs.walk_dist_premium = Some(9999.);
            zones.push(zs);
        }
        zones[0].nev = 2;
        zones[0].microtransit = 1;
        zones[1].nev = 2;
        zones[1].microtransit = 1;
        zones[2].nev = 3;
        fx.service = ServiceAvailability::new(zones).unwrap();
        let (rows, _) = compose(&fx);

        // 2 minutes by car beats 0.5 miles at 30 mph
        let row = find(&rows, 1, 2).unwrap();
        assert_relative_eq!(row.nev, 4. + (2. + 2.));
        assert_relative_eq!(row.microtransit, 5. + (3. + 2.));
        // another operator serves zone 3
        assert_eq!(find(&rows, 1, 3).unwrap().nev, f64::INFINITY);
    }

    #[test]
    fn test_generalized_time() {
        let fx = fixture();
        let (rows, _) = compose(&fx);
        // no fares, so only the time counts
        let row = find(&rows, 1, 3).unwrap();
        assert_relative_eq!(row.microtransit_cost, 0., epsilon = 1e-9);
        assert_relative_eq!(row.microtransit_gen_time, row.microtransit, epsilon = 1e-9);

        let mut fx = fixture();
        fx.cfg.value_of_time = Some(30.);
        fx.cfg.microtransit.cost = RideCost{variable_cost: 0.1, fixed_cost: 2., constant: 3.};
        fx.cfg.ebike.cost = RideCost{variable_cost: 0.25, fixed_cost: 1., constant: 0.};
        let (rows, _) = compose(&fx);

        // $4 for 20 minutes is 8 minutes at $30 an hour
        let row = find(&rows, 1, 3).unwrap();
        assert_relative_eq!(row.microtransit_cost, 0.1 * 20. + 2., epsilon = 1e-9);
        assert_relative_eq!(row.microtransit_gen_time, 20. + 8. + 3., epsilon = 1e-9);
        assert_relative_eq!(row.min_gen_time, 31., epsilon = 1e-9);

        // 4 minutes riding the e-bike
        let row = find(&rows, 1, 2).unwrap();
        assert_relative_eq!(row.ebike_cost, 0.25 * 4. + 1., epsilon = 1e-9);
        assert_relative_eq!(row.ebike_gen_time, 20. + 4., epsilon = 1e-9);
        assert_eq!(row.escooter_cost, f64::INFINITY);
        assert_eq!(row.escooter_gen_time, f64::INFINITY);
        assert_eq!(row.microtransit_gen_time, f64::INFINITY);
        // walking is still quicker
        assert_relative_eq!(row.min_gen_time, 10., epsilon = 1e-9);
    }

    #[test]
    fn test_walk_bike_and_micromobility() {
        let fx = fixture();
        let (rows, _) = compose(&fx);
        let row = find(&rows, 1, 2).unwrap();
        assert_relative_eq!(row.walk, 10.);
        assert_relative_eq!(row.bike, 6.);
        // 6 minutes by bike is 4 by e-bike, plus access and rental
        assert_relative_eq!(row.ebike, 4. + 15. + 1.);
        // the scooter can't go that far
        assert_eq!(row.escooter, f64::INFINITY);
        assert_relative_eq!(row.best, 6.);
        // no transit within the coarse zone
        assert_eq!(row.transit, f64::INFINITY);

        let row = find(&rows, 2, 1).unwrap();
        assert_eq!(row.bike, f64::INFINITY);
        assert_eq!(row.ebike, f64::INFINITY);
    }

    #[test]
    fn test_threshold_masking() {
        let fx = fixture();
        let (rows, _) = compose(&fx);
        // the only connection from 3 to 4 is an 80 minute walk
        assert!(find(&rows, 3, 4).is_none());

        let mut fx = fixture();
        fx.cfg.reporting_threshold = 100.;
        let (rows, _) = compose(&fx);
        assert_relative_eq!(find(&rows, 3, 4).unwrap().walk, 80.);

        // every reported row has something within the threshold
        for row in &rows {
            let times = [row.transit, row.walk, row.bike, row.microtransit, row.nev];
            assert!(times.iter().any(|tt| *tt <= 100.));
            assert!(times.iter().all(|tt| *tt <= 100. || tt.is_infinite()));
        }
    }

    #[test]
    fn test_all_infinite_pair_dropped() {
        let fx = fixture();
        let (rows, _) = compose(&fx);
        // no skim entries in any alternative and no connectors
        assert!(find(&rows, 4, 4).is_none());
        assert!(find(&rows, 1, 4).is_none());
    }

    #[test]
    fn test_idempotent() {
        let fx = fixture();
        let (rows1, report1) = compose(&fx);
        let (rows2, report2) = compose(&fx);
        assert_eq!(rows1, rows2);
        assert_eq!(report1, report2);
        // ordered by origin, then destination
        let keys: Vec<_> = rows1.iter().map(|rr| (rr.origin, rr.destination)).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_not_computed_counted() {
        let mut fx = fixture();
        let dir = tempdir().unwrap();
        let path = dir.path().join("transit.csv");
        std::fs::write(&path, "origin,destination,LOC_WAIT,LOC_IVT\n10,20,0,20\n").unwrap();
        let cores = vec![super::super::skims::SkimCore::new("LOC_WAIT", true),
                         super::super::skims::SkimCore::new("LOC_IVT", false)];
        let loaded = SkimSet::from_csv("transit", &path, &cores, Some(&[10, 20, 30])).unwrap();
        fx.skims.insert(String::from("transit"), loaded);
        fx.cfg.transit_alternatives.truncate(1);

        let (rows, report) = compose(&fx);
        // micro-zones 1 and 2 both map to coarse zone 10, so two pairs asked for (10, 20)
        assert_eq!(report.get_count(SKIM_NOT_COMPUTED), 2);
        assert_eq!(report.get_tally(SKIM_NOT_COMPUTED).unwrap().sample, vec!["1->3", "2->3"]);
        // still reported for microtransit, but not by transit
        assert_eq!(find(&rows, 1, 3).unwrap().transit, f64::INFINITY);
    }

    #[test]
    fn test_missing_skim_set() {
        let mut fx = fixture();
        fx.skims.remove("traffic");
        let composer = AccessibilityComposer::new(&fx.cfg, &fx.membership, &fx.service,
                                                  &fx.skims, &fx.walk, &fx.bike);
        let mut report = DataQualityReport::new();
        assert!(matches!(composer.compose(&mut report), Err(Error::Config(_))));
    }

    #[test]
    fn test_write_csv() {
        let fx = fixture();
        let (rows, _) = compose(&fx);
        let dir = tempdir().unwrap();
        let path = dir.path().join("accessibility.csv");
        write_csv(&rows, &path, fx.cfg.infinity_sentinel).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, vec!["origin", "destination", "transit", "walk", "bike",
                                 "microtransit", "nev", "ebike", "escooter", "best",
                                 "microtransit_cost", "microtransit_gen_time", "nev_cost",
                                 "nev_gen_time", "ebike_cost", "ebike_gen_time",
                                 "escooter_cost", "escooter_gen_time", "min_gen_time"]);
        let mut num_rows = 0;
        for result in reader.records() {
            let record = result.unwrap();
            for field in record.iter().skip(2) {
                let value: f64 = field.parse().unwrap();
                assert!(value.is_finite());
            }
            num_rows += 1;
        }
        assert_eq!(num_rows, rows.len());
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = yaml_rust::YamlLoader::load_from_str(r#"
reporting_threshold_minutes: 45
transit_alternatives:
  - name: local
    cores: [LOC_XFERWALK, LOC_XFERWAIT, LOC_TOTALIVTT]
traffic:
  time_core: SOV_TIME
  dist_core: SOV_DIST
microtransit: {speed_mph: 17, wait_time: 12, diversion_constant: 6, diversion_factor: 1.25, max_service_dist: 3, min_dist: 0.5}
nev: {speed_mph: 17, wait_time: 12, diversion_constant: 6, diversion_factor: 1.25, max_service_dist: 3}
ebike: {speed_mph: 10, rent_time: 1, max_dist: 3}
escooter: {speed_mph: 6.7, rent_time: 1, max_dist: 1.5}
"#).unwrap();
        let cfg = ComposerConfig::from_yaml(&yaml[0], 3., 7.8, 9999.).unwrap();
        assert_eq!(cfg.transit_skim, "transit");
        assert_eq!(cfg.traffic.skim, "traffic");
        assert_eq!(cfg.transit_alternatives[0].cores.len(), 3);
        assert_eq!(cfg.nev.min_dist, 0.);
        assert_eq!(cfg.microtransit.diversion_factor, 1.25);
        assert_eq!(cfg.infinity_sentinel, 999999.);
        assert_eq!(cfg.reporting_threshold, 45.);
    }

    #[test]
    fn test_fares_need_value_of_time() {
        let yaml_str = r#"
reporting_threshold_minutes: 45
traffic: {time_core: SOV_TIME, dist_core: SOV_DIST}
microtransit: {speed_mph: 17, wait_time: 12, diversion_constant: 6, diversion_factor: 1.25, max_service_dist: 3, fixed_cost: 2.5}
nev: {speed_mph: 17, wait_time: 12, diversion_constant: 6, diversion_factor: 1.25, max_service_dist: 3}
ebike: {speed_mph: 10, rent_time: 1, max_dist: 3, variable_cost: 0.39, fixed_cost: 1, constant: 2}
escooter: {speed_mph: 6.7, rent_time: 1, max_dist: 1.5}
"#;
        let yaml = yaml_rust::YamlLoader::load_from_str(yaml_str).unwrap();
        assert!(matches!(ComposerConfig::from_yaml(&yaml[0], 3., 7.8, 9999.),
                         Err(Error::Config(_))));

        let with_vot = format!("{}value_of_time: 15\n", yaml_str);
        let yaml = yaml_rust::YamlLoader::load_from_str(&with_vot).unwrap();
        let cfg = ComposerConfig::from_yaml(&yaml[0], 3., 7.8, 9999.).unwrap();
        assert_eq!(cfg.value_of_time, Some(15.));
        assert_eq!(cfg.microtransit.cost.fixed_cost, 2.5);
        assert_eq!(cfg.ebike.cost, RideCost{variable_cost: 0.39, fixed_cost: 1., constant: 2.});
        assert!(cfg.escooter.cost.is_free());
    }
}
