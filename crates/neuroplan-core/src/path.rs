//! Shortest paths over the admissible subgraph, and the union-find
//! component tracking used by path refinement.
//!
//! Dijkstra runs on Euclidean edge weights with a priority queue keyed
//! by negated ordered floats (highest priority = smallest distance) and
//! walks predecessors back from the goal. Admissibility is a caller
//! closure — the planning engine admits FREE vertices and shallow
//! unclassified ones.

use crate::graph::{Graph, Vertex, VertexId};
use noisy_float::prelude::*;
use priority_queue::PriorityQueue;
use std::collections::HashMap;

/// Shortest path from `start` to `goal`, expanding only vertices that
/// `admit` accepts. Returns the vertex sequence including both ends, or
/// `None` when the goal is unreachable.
pub fn dijkstra<A>(
    graph: &Graph,
    start: VertexId,
    goal: VertexId,
    admit: A,
) -> Option<Vec<VertexId>>
where
    A: Fn(VertexId, &Vertex) -> bool,
{
    let mut best: HashMap<VertexId, (f64, Option<VertexId>)> = HashMap::new();
    let mut queue: PriorityQueue<VertexId, N64> = PriorityQueue::new();
    best.insert(start, (0.0, None));
    queue.push(start, n64(0.0));

    while let Some((u, _)) = queue.pop() {
        let du = best[&u].0;
        if u == goal {
            let mut path = vec![goal];
            let mut cursor = goal;
            while let Some((_, Some(prev))) = best.get(&cursor) {
                cursor = *prev;
                path.push(cursor);
            }
            path.reverse();
            return Some(path);
        }
        for &e in &graph.vertex(u).incident {
            let v = graph.edge(e).other(u);
            if v != goal && !admit(v, graph.vertex(v)) {
                continue;
            }
            let dv = du + graph.vertex(u).w.dist(&graph.vertex(v).w);
            if best.get(&v).map_or(true, |&(d, _)| dv < d) {
                best.insert(v, (dv, Some(u)));
                queue.push(v, -n64(dv));
            }
        }
    }
    None
}

// ── Union-find over FREE components ──────────────────────────────────

/// Root of `v`'s component, with path compression. `None` when `v` has
/// not been assigned to a component yet.
pub fn comp_find(graph: &mut Graph, v: VertexId) -> Option<VertexId> {
    let mut root = v;
    loop {
        match graph.vertex(root).comp {
            Some(parent) if parent != root => root = parent,
            Some(_) => break,
            None => return None,
        }
    }
    // Second pass: point the whole chain at the root.
    let mut cursor = v;
    while cursor != root {
        let parent = graph.vertex(cursor).comp.expect("chain interrupted");
        graph.vertex_mut(cursor).comp = Some(root);
        cursor = parent;
    }
    Some(root)
}

/// Whether two vertices are known to share a FREE component.
pub fn same_component(graph: &mut Graph, a: VertexId, b: VertexId) -> bool {
    match (comp_find(graph, a), comp_find(graph, b)) {
        (Some(ra), Some(rb)) => ra == rb,
        _ => false,
    }
}

/// Compresses component references along a certified chain: every run
/// of consecutive FREE vertices ends up sharing one root, and runs
/// joined through the chain are merged.
pub fn compress_chain(graph: &mut Graph, chain: &[VertexId]) {
    let mut prev: Option<VertexId> = None;
    for &n in chain {
        if graph.vertex(n).class == crate::graph::VertexClass::Free {
            let prev_free = prev
                .map(|p| graph.vertex(p).class == crate::graph::VertexClass::Free)
                .unwrap_or(false);
            if !prev_free {
                match comp_find(graph, n) {
                    None => graph.vertex_mut(n).comp = Some(n),
                    Some(root) => graph.vertex_mut(n).comp = Some(root),
                }
            } else {
                let p = prev.expect("prev_free implies prev");
                let p_comp = graph.vertex(p).comp;
                if graph.vertex(n).comp.is_some() {
                    let root = comp_find(graph, n).expect("comp is some");
                    graph.vertex_mut(root).comp = p_comp;
                }
                graph.vertex_mut(n).comp = p_comp;
            }
        }
        prev = Some(n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::VertexClass;
    use crate::point::Point;

    fn line_graph(n: usize) -> (Graph, Vec<VertexId>) {
        let mut g = Graph::new();
        let vs: Vec<VertexId> =
            (0..n).map(|i| g.add_vertex(Point::xy(i as f64, 0.0))).collect();
        for w in vs.windows(2) {
            g.add_edge(w[0], w[1]);
        }
        (g, vs)
    }

    #[test]
    fn straight_line_path() {
        let (g, vs) = line_graph(4);
        let path = dijkstra(&g, vs[0], vs[3], |_, _| true).unwrap();
        assert_eq!(path, vs);
    }

    #[test]
    fn shorter_route_wins() {
        let mut g = Graph::new();
        let a = g.add_vertex(Point::xy(0.0, 0.0));
        let b = g.add_vertex(Point::xy(1.0, 0.0));
        let c = g.add_vertex(Point::xy(0.5, 5.0));
        g.add_edge(a, b);
        g.add_edge(a, c);
        g.add_edge(c, b);
        let path = dijkstra(&g, a, b, |_, _| true).unwrap();
        assert_eq!(path, vec![a, b]);
    }

    #[test]
    fn inadmissible_vertices_block_the_route() {
        let (mut g, vs) = line_graph(3);
        g.vertex_mut(vs[1]).class = VertexClass::Obst;
        let blocked =
            dijkstra(&g, vs[0], vs[2], |_, v| v.class != VertexClass::Obst);
        assert!(blocked.is_none());
    }

    #[test]
    fn unreachable_goal_is_none() {
        let mut g = Graph::new();
        let a = g.add_vertex(Point::xy(0.0, 0.0));
        let b = g.add_vertex(Point::xy(1.0, 0.0));
        assert!(dijkstra(&g, a, b, |_, _| true).is_none());
    }

    #[test]
    fn chain_compression_unifies_components() {
        let (mut g, vs) = line_graph(3);
        for &v in &vs {
            g.vertex_mut(v).class = VertexClass::Free;
        }
        compress_chain(&mut g, &vs);
        assert!(same_component(&mut g, vs[0], vs[2]));
    }

    #[test]
    fn obstacle_breaks_the_chain() {
        let (mut g, vs) = line_graph(3);
        g.vertex_mut(vs[0]).class = VertexClass::Free;
        g.vertex_mut(vs[1]).class = VertexClass::Obst;
        g.vertex_mut(vs[2]).class = VertexClass::Free;
        compress_chain(&mut g, &vs);
        assert!(!same_component(&mut g, vs[0], vs[2]));
    }

    #[test]
    fn merging_two_runs_through_a_later_chain() {
        let (mut g, vs) = line_graph(5);
        for &v in &vs {
            g.vertex_mut(v).class = VertexClass::Free;
        }
        compress_chain(&mut g, &vs[..2]);
        compress_chain(&mut g, &vs[3..]);
        assert!(!same_component(&mut g, vs[0], vs[4]));
        compress_chain(&mut g, &vs);
        assert!(same_component(&mut g, vs[0], vs[4]));
    }
}
