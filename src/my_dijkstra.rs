use std::collections::BinaryHeap;
use std::collections::HashSet;
use std::cmp::Ordering;

use petgraph::graphmap::DiGraphMap;


/// Label-setting shortest paths from `origin` over a graph whose nodes are the dense indices
/// `0..num_nodes`.  Based on the implementation in the petgraph library, with two ways to stop
/// early:
///
/// If `targets` is not `None`, the search ends once every target node has been settled.
///
/// If `max_cost` is not `None`, nodes farther than `max_cost` are never settled.
///
/// Returns a vector of path costs indexed by node; nodes that were not reached (or not settled
/// before the search stopped) have a cost of `f64::INFINITY`.  Edge costs must be non-negative.
pub fn dijkstra_to_targets(
    graph: &DiGraphMap<usize, f64>,
    num_nodes: usize,
    origin: usize,
    targets: Option<&HashSet<usize>>,
    max_cost: Option<f64>,
) -> Vec<f64>
{
    let mut scores = vec![f64::INFINITY; num_nodes];
    let mut visited = vec![false; num_nodes];
    let mut remaining = match targets {
        Some(targets) => Some(targets.clone()),
        None => None,
    };
    let max_cost = max_cost.unwrap_or(f64::INFINITY);

    scores[origin] = 0.;
    let mut visit_next = BinaryHeap::new();
    visit_next.push(MinScored(0., origin));
    while let Some(MinScored(node_score, node)) = visit_next.pop() {
        if visited[node] {
            continue;
        }
        if node_score > max_cost {
            // everything left in the heap is at least this far away
            break;
        }
        visited[node] = true;
        if let Some(remaining) = &mut remaining {
            remaining.remove(&node);
            if remaining.is_empty() {
                break;
            }
        }

        for (_, next, length) in graph.edges(node) {
            if visited[next] {
                continue;
            }
            let next_score = node_score + *length;
            if next_score < scores[next] {
                scores[next] = next_score;
                visit_next.push(MinScored(next_score, next));
            }
        }
    }

    // tentative labels beyond the cutoff were never settled, so don't report them
    for (node, score) in scores.iter_mut().enumerate() {
        if !visited[node] {
            *score = f64::INFINITY;
        }
    }
    scores
}


#[derive(Copy, Clone, Debug)]
pub struct MinScored<K, T>(pub K, pub T);

impl<K: PartialOrd, T> PartialEq for MinScored<K, T> {
    #[inline]
    fn eq(&self, other: &MinScored<K, T>) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<K: PartialOrd, T> Eq for MinScored<K, T> {}

impl<K: PartialOrd, T> PartialOrd for MinScored<K, T> {
    #[inline]
    fn partial_cmp(&self, other: &MinScored<K, T>) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: PartialOrd, T> Ord for MinScored<K, T> {
    #[inline]
    fn cmp(&self, other: &MinScored<K, T>) -> Ordering {
        let a = &self.0;
        let b = &other.0;
        if a == b {
            Ordering::Equal
        } else if a < b {
            Ordering::Greater
        } else if a > b {
            Ordering::Less
        } else if a.ne(a) && b.ne(b) {
            // these are the NaN cases
            Ordering::Equal
        } else if a.ne(a) {
            // Order NaN less, so that it is last in the MinScore order
            Ordering::Less
        } else {
            Ordering::Greater
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn two_way(edges: &[(usize, usize, f64)]) -> DiGraphMap<usize, f64> {
        let mut graph = DiGraphMap::new();
        for (aa, bb, ll) in edges {
            graph.add_edge(*aa, *bb, *ll);
            graph.add_edge(*bb, *aa, *ll);
        }
        graph
    }

    // a --1-- b --1-- c
    // |               |
    // ------- 5 -------
    #[test]
    fn test_prefers_short_path() {
        let graph = two_way(&[(0, 1, 1.), (1, 2, 1.), (0, 2, 5.)]);
        let costs = dijkstra_to_targets(&graph, 3, 0, None, None);
        assert_eq!(costs, vec![0., 1., 2.]);
    }

    #[test]
    fn test_unreachable_is_infinite() {
        let mut graph = two_way(&[(0, 1, 1.)]);
        graph.add_node(2);
        let costs = dijkstra_to_targets(&graph, 3, 0, None, None);
        assert_eq!(costs[1], 1.);
        assert_eq!(costs[2], f64::INFINITY);
    }

    #[test]
    fn test_max_cost() {
        let graph = two_way(&[(0, 1, 1.), (1, 2, 1.), (2, 3, 1.)]);
        let costs = dijkstra_to_targets(&graph, 4, 0, None, Some(2.));
        assert_eq!(costs, vec![0., 1., 2., f64::INFINITY]);
    }

    #[test]
    fn test_targets() {
        // a chain: stopping once node 1 is settled must still report node 1 correctly
        let graph = two_way(&[(0, 1, 1.), (1, 2, 1.), (2, 3, 1.)]);
        let targets: HashSet<usize> = [1].iter().cloned().collect();
        let costs = dijkstra_to_targets(&graph, 4, 0, Some(&targets), None);
        assert_eq!(costs[0], 0.);
        assert_eq!(costs[1], 1.);
        assert_eq!(costs[3], f64::INFINITY);

        // the origin itself can be a target
        let targets: HashSet<usize> = [0, 3].iter().cloned().collect();
        let costs = dijkstra_to_targets(&graph, 4, 0, Some(&targets), None);
        assert_eq!(costs[0], 0.);
        assert_eq!(costs[3], 3.);
    }

    #[test]
    fn test_min_scored_order() {
        let mut heap = BinaryHeap::new();
        heap.push(MinScored(3., "c"));
        heap.push(MinScored(1., "a"));
        heap.push(MinScored(f64::NAN, "nan"));
        heap.push(MinScored(2., "b"));
        let order: Vec<&str> = std::iter::from_fn(|| heap.pop().map(|MinScored(_, tt)| tt))
            .collect();
        assert_eq!(order, vec!["a", "b", "c", "nan"]);
    }
}
