use std::collections::HashMap;
use std::fmt::Debug;

use super::geometry_index::{Link, Node};
use super::path_network::PathNetwork;


/// Checks that the contents of two hashmaps are the same.
pub fn compare_hashmaps<KK, VV>(query_map: &HashMap<KK, VV>, true_map: &HashMap<KK, VV>)
    where KK: Debug + Eq + std::hash::Hash,
    VV: Debug + PartialEq,
{
    assert_eq!(query_map.len(), true_map.len());

    for (true_key, true_val) in true_map {
        match query_map.get(true_key) {
            Some(val) => assert_eq!(val, true_val, "values differ for key {:?}", true_key),
            None => assert!(false, "Key {:?} missing!", true_key),
        }
    }
}

/// A rectangular street grid.  Node ids run row by row from 0 at the origin, and every block is
/// `spacing_ft` long.
pub fn grid_nodes_links(num_x: usize, num_y: usize, spacing_ft: f64) -> (Vec<Node>, Vec<Link>) {
    let mut nodes = vec![];
    let mut links = vec![];
    for yy in 0..num_y {
        for xx in 0..num_x {
            let id = (yy * num_x + xx) as i64;
            nodes.push(Node::new(id, xx as f64 * spacing_ft, yy as f64 * spacing_ft));
            if xx > 0 {
                links.push(Link::new(id - 1, id, spacing_ft));
            }
            if yy > 0 {
                links.push(Link::new(id - num_x as i64, id, spacing_ft));
            }
        }
    }
    (nodes, links)
}

pub fn grid_network(num_x: usize, num_y: usize, spacing_ft: f64) -> PathNetwork {
    let (nodes, links) = grid_nodes_links(num_x, num_y, spacing_ft);
    PathNetwork::build(&nodes, &links).unwrap()
}
