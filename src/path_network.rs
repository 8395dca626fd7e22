// this file defines a struct to represent the street and path network used for walking and
// cycling.  It's a wrapper around a petgraph graph.
use std::collections::HashMap;
use std::collections::HashSet;

use petgraph::algo::connected_components;
use petgraph::graphmap::DiGraphMap;
use rayon::prelude::*;

use super::error::{Error, Result};
use super::geometry::Point2d;
use super::geometry_index::{Link, Node, NodeId};
use super::my_dijkstra::dijkstra_to_targets;
use super::FEET_PER_MILE;


pub struct PathNetwork {
    node_positions: Vec<Point2d>,
    node_idxs_by_id: HashMap<NodeId, usize>,
    node_ids_by_idx: Vec<NodeId>,
    // every street segment is stored as two directed links, with lengths in miles.
    network: DiGraphMap<usize, f64>,
}

impl PathNetwork {
    /// Builds the network from the node table and the street-segment table.  Only nodes that
    /// are the end of at least one segment become part of the network.  Segment lengths are in
    /// feet; the graph stores miles.
    pub fn build(nodes: &[Node], links: &[Link]) -> Result<PathNetwork> {
        let pos_by_id: HashMap<NodeId, Point2d> = nodes.iter().map(|nn| (nn.id, nn.pos))
            .collect();

        let mut node_idxs_by_id = HashMap::new();
        let mut node_ids_by_idx = vec![];
        let mut node_positions = vec![];
        let mut graph = DiGraphMap::new();
        let mut num_self_links = 0;
        for link in links {
            if !link.length.is_finite() || link.length < 0. {
                return Err(Error::InvalidData(format!(
                    "link ({}, {}) has invalid length {}", link.from_node, link.to_node,
                    link.length)));
            }
            if link.from_node == link.to_node {
                // ignore self-connections
                num_self_links += 1;
                continue;
            }

            let mut end_idxs = [0, 0];
            for (end_idx, node_id) in end_idxs.iter_mut().zip(&[link.from_node, link.to_node]) {
                *end_idx = match node_idxs_by_id.get(node_id).copied() {
                    Some(idx) => idx,
                    None => {
                        let pos = match pos_by_id.get(node_id) {
                            Some(pos) => *pos,
                            None => return Err(Error::InvalidData(format!(
                                "link ({}, {}) refers to unknown node {}", link.from_node,
                                link.to_node, node_id))),
                        };
                        let new_idx = node_ids_by_idx.len();
                        node_idxs_by_id.insert(*node_id, new_idx);
                        node_ids_by_idx.push(*node_id);
                        node_positions.push(pos);
                        graph.add_node(new_idx);
                        new_idx
                    }
                };
            }

            let length = link.length / FEET_PER_MILE;
            let [from_idx, to_idx] = end_idxs;
            // parallel segments between the same two nodes: keep the shortest
            let keep = match graph.edge_weight(from_idx, to_idx) {
                Some(existing) => length < *existing,
                None => true,
            };
            if keep {
                graph.add_edge(from_idx, to_idx, length);
                graph.add_edge(to_idx, from_idx, length);
            }
        }
        if num_self_links > 0 {
            log::debug!("ignored {} self-connected links", num_self_links);
        }

        log::info!("street network has {} nodes and {} directed links", graph.node_count(),
                   graph.edge_count());
        let num_components = connected_components(&graph);
        if num_components > 1 {
            log::warn!("there are {} connected components in the street network",
                       num_components);
        }

        Ok(PathNetwork {
            node_positions,
            node_idxs_by_id,
            node_ids_by_idx,
            network: graph,
        })
    }

    pub fn get_node_idx_by_id(&self, id: NodeId) -> Option<usize> {
        self.node_idxs_by_id.get(&id).copied()
    }

    pub fn get_node_id_by_idx(&self, idx: usize) -> Option<NodeId> {
        self.node_ids_by_idx.get(idx).copied()
    }

    pub fn get_node_positions(&self) -> &Vec<Point2d> {
        &self.node_positions
    }

    pub fn get_num_nodes(&self) -> usize {
        return self.network.node_count();
    }

    /// Number of directed links, i.e. twice the number of distinct segments.
    pub fn get_num_links(&self) -> usize {
        return self.network.edge_count();
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.node_idxs_by_id.contains_key(&id)
    }

    /// Shortest-path length in miles between two nodes, or infinity if there is no path.
    pub fn shortest_path_length(&self, from_id: NodeId, to_id: NodeId) -> f64 {
        return self.shortest_path_lengths(&[(from_id, to_id)], None)[0];
    }

    /// Computes the shortest-path length in miles for each (origin, destination) node pair.
    /// Pairs are grouped by origin and each group is solved by one bounded Dijkstra search, run
    /// in parallel across groups.
    ///
    /// Pairs with no path, pairs with a node that isn't in the network, and (if `max_cost` is
    /// given) pairs farther apart than `max_cost` get `f64::INFINITY`.
    pub fn shortest_path_lengths(&self, pairs: &[(NodeId, NodeId)], max_cost: Option<f64>)
                                 -> Vec<f64> {
        let mut lengths = vec![f64::INFINITY; pairs.len()];
        let mut by_origin: HashMap<usize, Vec<(usize, usize)>> = HashMap::new();
        for (ii, (from_id, to_id)) in pairs.iter().enumerate() {
            let from_idx = self.node_idxs_by_id.get(from_id);
            let to_idx = self.node_idxs_by_id.get(to_id);
            if let (Some(from_idx), Some(to_idx)) = (from_idx, to_idx) {
                by_origin.entry(*from_idx).or_insert_with(Vec::new).push((ii, *to_idx));
            } else {
                log::debug!("no path from {} to {}: node not in network", from_id, to_id);
            }
        }

        let groups: Vec<(usize, Vec<(usize, usize)>)> = by_origin.into_iter().collect();
        let num_nodes = self.get_num_nodes();
        let group_results: Vec<Vec<(usize, f64)>> = groups.par_iter()
            .map(|(origin, targets)| {
                let target_set: HashSet<usize> = targets.iter().map(|(_, tt)| *tt).collect();
                let costs = dijkstra_to_targets(&self.network, num_nodes, *origin,
                                                Some(&target_set), max_cost);
                targets.iter().map(|(ii, tt)| (*ii, costs[*tt])).collect()
            })
            .collect();

        for group in group_results {
            for (ii, length) in group {
                lengths[ii] = length;
            }
        }
        lengths
    }
}
