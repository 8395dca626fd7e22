use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::path::PathBuf;

use kdtree::distance::squared_euclidean;
use kdtree::KdTree;
use serde::Deserialize;

use super::config_utils;
use super::error::{DataQualityReport, Error, Result};
use super::geometry::{polygon_centroid, Point2d};

pub type NodeId = i64;
pub type ZoneId = u32;
pub type StopId = u32;

pub static UNCLASSIFIED_STOP: &str = "stop on a route with an unclassified mode (skipped)";


#[derive(PartialEq, Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub pos: Point2d,
}

impl Node {
    pub fn new(id: NodeId, x_coord: f64, y_coord: f64) -> Node {
        Node{id, pos: Point2d::new(x_coord, y_coord)}
    }
}

/// One undirected street segment.  Length is in feet.
#[derive(PartialEq, Debug, Clone, Deserialize)]
pub struct Link {
    pub from_node: NodeId,
    pub to_node: NodeId,
    pub length: f64,
}

impl Link {
    pub fn new(from_node: NodeId, to_node: NodeId, length: f64) -> Link {
        Link{from_node, to_node, length}
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Zone {
    pub id: ZoneId,
    pub centroid: Point2d,
}

impl Zone {
    pub fn new(id: ZoneId, x_coord: f64, y_coord: f64) -> Zone {
        Zone{id, centroid: Point2d::new(x_coord, y_coord)}
    }
}

#[derive(PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Clone, Copy)]
pub enum StopClass {
    Local,
    Premium,
    FutureBrt,
}

impl StopClass {
    /// Maps a route's mode code to its service class.  If future BRT isn't tracked as its own
    /// class, its routes count as premium.
    pub fn from_mode_code(code: i64, separate_brt: bool) -> Option<StopClass> {
        match code {
            10 => Some(StopClass::Local),
            4 | 5 | 8 | 9 => Some(StopClass::Premium),
            6 | 7 if separate_brt => Some(StopClass::FutureBrt),
            6 | 7 => Some(StopClass::Premium),
            _ => None,
        }
    }

    pub fn get_name(&self) -> &'static str {
        match self {
            StopClass::Local => "local_bus",
            StopClass::Premium => "premium_transit",
            StopClass::FutureBrt => "future_brt",
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Stop {
    pub id: StopId,
    pub pos: Point2d,
    pub class: StopClass,
}

impl Stop {
    pub fn new(id: StopId, x_coord: f64, y_coord: f64, class: StopClass) -> Stop {
        Stop{id, pos: Point2d::new(x_coord, y_coord), class}
    }
}

/// A zone or stop together with the network node that represents it.
#[derive(PartialEq, Debug, Clone)]
pub struct Endpoint {
    pub id: u32,
    pub node_id: NodeId,
    pub node_pos: Point2d,
}

/// Locations of the network input tables.
#[derive(Debug, Clone)]
pub struct NetworkFiles {
    pub nodes_path: PathBuf,
    pub links_path: PathBuf,
    pub zones_path: PathBuf,
    pub stops_path: PathBuf,
    pub routes_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct NodeRow {
    node_id: NodeId,
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
struct ZoneRow {
    zone_id: ZoneId,
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
struct StopRow {
    stop_id: StopId,
    route_id: String,
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
struct RouteRow {
    route_id: String,
    mode: i64,
}


/// Holds the loaded geometry and a spatial index over the network nodes, and ties every zone
/// and stop to its nearest network node.
pub struct GeometryIndex {
    nodes: Vec<Node>,
    links: Vec<Link>,
    zones: Vec<Zone>,
    stops: Vec<Stop>,
    // indexes into `nodes`, only for nodes at the end of some link
    node_tree: KdTree<f64, usize, [f64; 2]>,
    zone_endpoints: Vec<Endpoint>,
    stop_endpoints: Vec<(StopClass, Endpoint)>,
}

impl GeometryIndex {
    /// Builds the spatial index and snaps every zone centroid and stop to its nearest linked
    /// node.  Anything with no node within `snap_tolerance_ft` is a fatal error.
    pub fn new(nodes: Vec<Node>, links: Vec<Link>, mut zones: Vec<Zone>, stops: Vec<Stop>,
               snap_tolerance_ft: f64) -> Result<GeometryIndex> {
        let linked: HashSet<NodeId> = links.iter()
            .filter(|ll| ll.from_node != ll.to_node)
            .flat_map(|ll| vec![ll.from_node, ll.to_node])
            .collect();
        let mut node_tree = KdTree::new(2);
        for (ii, node) in nodes.iter().enumerate() {
            if linked.contains(&node.id) {
                node_tree.add(node.pos.as_array(), ii).map_err(|err| Error::InvalidData(
                    format!("node {} can't be indexed: {:?}", node.id, err)))?;
            }
        }
        log::info!("indexed {} of {} nodes", node_tree.size(), nodes.len());

        zones.sort_by_key(|zz| zz.id);
        let mut index = GeometryIndex {
            nodes,
            links,
            zones,
            stops,
            node_tree,
            zone_endpoints: vec![],
            stop_endpoints: vec![],
        };

        let mut zone_endpoints = vec![];
        for zone in &index.zones {
            let node = index.snap(&zone.centroid, snap_tolerance_ft).ok_or(
                Error::UnsnappableZone{zone_id: zone.id, tolerance_ft: snap_tolerance_ft})?;
            zone_endpoints.push(Endpoint{id: zone.id, node_id: node.id, node_pos: node.pos});
        }
        let mut stop_endpoints = vec![];
        for stop in &index.stops {
            let node = index.snap(&stop.pos, snap_tolerance_ft).ok_or(
                Error::UnsnappableStop{stop_id: stop.id, tolerance_ft: snap_tolerance_ft})?;
            stop_endpoints.push(
                (stop.class, Endpoint{id: stop.id, node_id: node.id, node_pos: node.pos}));
        }
        index.zone_endpoints = zone_endpoints;
        index.stop_endpoints = stop_endpoints;
        Ok(index)
    }

    /// Reads the node, link, zone, stop and route tables and builds the index.
    pub fn load(files: &NetworkFiles, snap_tolerance_ft: f64, separate_brt: bool,
                report: &mut DataQualityReport) -> Result<GeometryIndex> {
        let nodes: Vec<Node> = config_utils::read_csv_rows::<NodeRow>(&files.nodes_path)?
            .into_iter()
            .map(|row| Node::new(row.node_id, row.x, row.y))
            .collect();
        let links: Vec<Link> = config_utils::read_csv_rows(&files.links_path)?;
        let zones = zones_from_rows(config_utils::read_csv_rows(&files.zones_path)?);

        let route_modes: HashMap<String, i64> =
            config_utils::read_csv_rows::<RouteRow>(&files.routes_path)?
            .into_iter()
            .map(|row| (row.route_id, row.mode))
            .collect();
        let mut stops = vec![];
        let mut seen = HashSet::new();
        for row in config_utils::read_csv_rows::<StopRow>(&files.stops_path)? {
            let code = match route_modes.get(&row.route_id) {
                Some(code) => *code,
                None => return Err(Error::InvalidData(format!(
                    "stop {} refers to unknown route {}", row.stop_id, row.route_id))),
            };
            match StopClass::from_mode_code(code, separate_brt) {
                // a stop served by several routes of one class only needs to be tied in once
                Some(class) => if seen.insert((row.stop_id, class)) {
                    stops.push(Stop::new(row.stop_id, row.x, row.y, class));
                },
                None => report.record(UNCLASSIFIED_STOP, row.stop_id),
            }
        }
        log::info!("loaded {} nodes, {} links, {} zones and {} classified stops", nodes.len(),
                   links.len(), zones.len(), stops.len());

        GeometryIndex::new(nodes, links, zones, stops, snap_tolerance_ft)
    }

    /// Returns the linked node nearest to `point`, with its straight-line distance.
    pub fn nearest_node(&self, point: &Point2d) -> Option<(&Node, f64)> {
        let nearest = self.node_tree.nearest(&point.as_array(), 1, &squared_euclidean).ok()?;
        match nearest.first() {
            Some((dist_sq, node_idx)) => Some((&self.nodes[**node_idx], dist_sq.sqrt())),
            None => None,
        }
    }

    pub fn snap(&self, point: &Point2d, tolerance_ft: f64) -> Option<&Node> {
        match self.nearest_node(point) {
            Some((node, dist)) if dist <= tolerance_ft => Some(node),
            _ => None,
        }
    }

    pub fn get_nodes(&self) -> &Vec<Node> {
        &self.nodes
    }

    pub fn get_links(&self) -> &Vec<Link> {
        &self.links
    }

    pub fn get_zones(&self) -> &Vec<Zone> {
        &self.zones
    }

    pub fn get_stops(&self) -> &Vec<Stop> {
        &self.stops
    }

    /// Zones tied to their connector nodes, sorted by zone id.
    pub fn get_zone_endpoints(&self) -> &Vec<Endpoint> {
        &self.zone_endpoints
    }

    pub fn get_stop_endpoints(&self, class: StopClass) -> Vec<Endpoint> {
        self.stop_endpoints.iter()
            .filter(|(cc, _)| *cc == class)
            .map(|(_, ep)| ep.clone())
            .collect()
    }
}


/// Several rows for one zone are the vertices of its polygon, in ring order.  A single row is
/// the centroid itself.
fn zones_from_rows(rows: Vec<ZoneRow>) -> Vec<Zone> {
    let mut vertices: BTreeMap<ZoneId, Vec<Point2d>> = BTreeMap::new();
    for row in rows {
        vertices.entry(row.zone_id).or_insert_with(Vec::new).push(Point2d::new(row.x, row.y));
    }
    vertices.into_iter()
        .filter_map(|(id, ring)| polygon_centroid(&ring).map(|centroid| Zone{id, centroid}))
        .collect()
}
