//! Per-class vertex bookkeeping.
//!
//! Tracks three things the learner and the samplers need in O(1):
//!
//! - class membership counts ({NONE, FREE, OBST}),
//! - two sampling arrays (FREE-side, and the deep OBST-side frontier)
//!   supporting tournament-style random draws,
//! - the per-depth histogram of OBST-side vertices with its maximum,
//!
//! plus the auxiliary nearest-neighbour index over classified OBST
//! vertices that drives obstacle repulsion.
//!
//! Classification fixes a vertex (`fixed = true`, `depth = 0`);
//! unclassified vertices carry a learned *side* — the class of the
//! region they lean toward — and a hop `depth ≥ 1` once a classified
//! vertex appears in their neighbourhood.

use crate::graph::{Graph, VertexClass, VertexId};
use crate::nn::NnIndex;
use crate::params::NnParams;
use crate::point::Point;
use rand::rngs::StdRng;
use rand::Rng;

const FREE_ARR: usize = 0;
const OBST_ARR: usize = 1;

#[derive(Debug)]
pub struct SetManager {
    /// Sampling arrays: `[FREE-side, deep OBST-side]`. Membership is
    /// mirrored in each vertex's `set_slot`.
    arrays: [Vec<VertexId>; 2],
    /// Depth histogram over OBST-side vertices.
    depths: Vec<usize>,
    max_depth: u32,
    /// Vertex counts per class (NONE, FREE, OBST).
    class_count: [usize; 3],
    /// Classified OBST positions, for obstacle repulsion.
    obst_nn: NnIndex,
    /// Which array the next tournament draws from.
    rand_side: usize,
}

fn class_idx(class: VertexClass) -> usize {
    match class {
        VertexClass::None => 0,
        VertexClass::Free => 1,
        VertexClass::Obst => 2,
    }
}

/// A vertex belongs to a sampling array according to its learned side:
/// the whole FREE side, but only the deep OBST frontier.
fn array_of(side: VertexClass, depth: u32) -> Option<usize> {
    match side {
        VertexClass::Free => Some(FREE_ARR),
        VertexClass::Obst if depth >= 2 => Some(OBST_ARR),
        _ => None,
    }
}

impl SetManager {
    pub fn new(nn: &NnParams, dim: usize) -> Self {
        Self {
            arrays: [Vec::new(), Vec::new()],
            depths: Vec::new(),
            max_depth: 0,
            class_count: [0; 3],
            obst_nn: NnIndex::new(nn, dim),
            rand_side: 0,
        }
    }

    pub fn count(&self, class: VertexClass) -> usize {
        self.class_count[class_idx(class)]
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Registers a freshly created vertex (class NONE, no side yet).
    pub fn on_add(&mut self, _graph: &Graph, _v: VertexId) {
        self.class_count[class_idx(VertexClass::None)] += 1;
    }

    /// Unhooks a vertex about to be removed from the graph.
    pub fn on_remove(&mut self, graph: &mut Graph, v: VertexId) {
        let (class, side, depth) = {
            let vert = graph.vertex(v);
            (vert.class, vert.side, vert.depth)
        };
        self.class_count[class_idx(class)] -= 1;
        if side == VertexClass::Obst {
            self.histogram_remove(depth);
        }
        self.array_remove(graph, v);
        if class == VertexClass::Obst {
            self.obst_nn.remove(v);
        }
    }

    /// Classifies `v`: fixes it, zeroes its depth and realigns every
    /// auxiliary structure. Idempotent when the class is unchanged.
    pub fn classify(&mut self, graph: &mut Graph, v: VertexId, class: VertexClass) {
        debug_assert!(class != VertexClass::None, "classify: NONE is not a classification");
        let old = graph.vertex(v).class;
        if old != class {
            self.class_count[class_idx(old)] -= 1;
            self.class_count[class_idx(class)] += 1;
            if old == VertexClass::Obst {
                self.obst_nn.remove(v);
            }
            if class == VertexClass::Obst {
                let w = graph.vertex(v).w.clone();
                self.obst_nn.insert(v, &w);
            }
        }
        {
            let vert = graph.vertex_mut(v);
            vert.class = class;
            vert.fixed = true;
        }
        self.assign(graph, v, class, 0);
    }

    /// Records the learned lean of an unclassified vertex.
    pub fn set_lean(&mut self, graph: &mut Graph, v: VertexId, side: VertexClass, depth: u32) {
        debug_assert!(!graph.vertex(v).fixed, "set_lean: vertex is classified");
        self.assign(graph, v, side, depth);
    }

    fn assign(&mut self, graph: &mut Graph, v: VertexId, side: VertexClass, depth: u32) {
        let (old_side, old_depth) = {
            let vert = graph.vertex(v);
            (vert.side, vert.depth)
        };
        if old_side == VertexClass::Obst {
            self.histogram_remove(old_depth);
        }
        let keep = array_of(old_side, old_depth) == array_of(side, depth)
            && graph.vertex(v).set_slot.is_some() == array_of(side, depth).is_some();
        if !keep {
            self.array_remove(graph, v);
        }
        {
            let vert = graph.vertex_mut(v);
            vert.side = side;
            vert.depth = depth;
        }
        if !keep {
            if let Some(arr) = array_of(side, depth) {
                self.arrays[arr].push(v);
                graph.vertex_mut(v).set_slot = Some(self.arrays[arr].len() - 1);
            }
        }
        if side == VertexClass::Obst {
            self.histogram_add(depth);
        }
    }

    fn array_remove(&mut self, graph: &mut Graph, v: VertexId) {
        let slot = match graph.vertex(v).set_slot {
            Some(s) => s,
            None => return,
        };
        let arr = array_of(graph.vertex(v).side, graph.vertex(v).depth)
            .expect("set_slot without array membership");
        self.arrays[arr].swap_remove(slot);
        if let Some(&moved) = self.arrays[arr].get(slot) {
            graph.vertex_mut(moved).set_slot = Some(slot);
        }
        graph.vertex_mut(v).set_slot = None;
    }

    fn histogram_add(&mut self, depth: u32) {
        let d = depth as usize;
        if self.depths.len() <= d {
            self.depths.resize(d + 1, 0);
        }
        self.depths[d] += 1;
        if depth > self.max_depth {
            self.max_depth = depth;
        }
    }

    fn histogram_remove(&mut self, depth: u32) {
        let d = depth as usize;
        self.depths[d] -= 1;
        if depth == self.max_depth && self.depths[d] == 0 {
            let mut m = d;
            while m > 0 && self.depths[m] == 0 {
                m -= 1;
            }
            self.max_depth = m as u32;
        }
    }

    /// Tournament-sampled vertex, alternating between the FREE side
    /// (preferring shallow vertices) and the OBST frontier (preferring
    /// deep ones).
    pub fn random_node(
        &mut self,
        graph: &Graph,
        rng: &mut StdRng,
        tournament: usize,
    ) -> Option<VertexId> {
        for _ in 0..2 {
            let side = self.rand_side;
            self.rand_side ^= 1;
            let arr = &self.arrays[side];
            if arr.is_empty() {
                continue;
            }
            let mut best: Option<(i64, VertexId)> = None;
            for _ in 0..tournament.max(1) {
                let v = arr[rng.gen_range(0..arr.len())];
                let depth = graph.vertex(v).depth as i64;
                let score = if side == FREE_ARR { -depth } else { depth };
                if best.map_or(true, |(s, _)| score > s) {
                    best = Some((score, v));
                }
            }
            return best.map(|(_, v)| v);
        }
        None
    }

    /// True when `q` lies within squared distance `h2` of a classified
    /// OBST vertex.
    pub fn near_obstacle(&self, graph: &Graph, q: &Point, h2: f64) -> bool {
        let mut out = Vec::with_capacity(1);
        if self.obst_nn.nearest(q, 1, &mut out) == 0 {
            return false;
        }
        graph.vertex(out[0]).w.dist2(q) < h2
    }
}
