//! Nearest-neighbour index over live vertex positions.
//!
//! # Design
//!
//! [`NnIndex`] is a tagged union of three strategies — exhaustive scan,
//! uniform grid, vantage-point tree — selected once by [`NnParams`] and
//! dispatched through a plain `match`, keeping the learner's inner loop
//! monomorphic. The index owns a copy of every registered position, so
//! callers update it explicitly after moving a vertex.
//!
//! The grid keys cells by integer coordinates in a `HashMap`, so points
//! wandering outside the configured box simply occupy new cells; the
//! vp-tree parks moved points in a linear overflow set and rebuilds when
//! the overflow outgrows a configured fraction of the index.

use crate::graph::VertexId;
use crate::params::NnParams;
use crate::point::Point;
use std::collections::HashMap;

/// Running best-k (k ≤ 2 in practice) ordered by squared distance.
#[derive(Debug)]
struct BestK {
    k: usize,
    items: Vec<(f64, VertexId)>,
}

impl BestK {
    fn new(k: usize) -> Self {
        Self { k, items: Vec::with_capacity(k + 1) }
    }

    fn push(&mut self, d2: f64, id: VertexId) {
        let pos = self.items.iter().position(|&(d, _)| d2 < d).unwrap_or(self.items.len());
        self.items.insert(pos, (d2, id));
        self.items.truncate(self.k);
    }

    /// Upper bound on an accepted squared distance, once full.
    fn bound(&self) -> f64 {
        if self.items.len() < self.k {
            f64::INFINITY
        } else {
            self.items[self.k - 1].0
        }
    }
}

/// Spatial lookup keyed on live vertex positions.
#[derive(Debug)]
pub enum NnIndex {
    Linear(LinearNn),
    Grid(GridNn),
    VpTree(VpTreeNn),
}

impl NnIndex {
    pub fn new(params: &NnParams, dim: usize) -> Self {
        match params {
            NnParams::Linear => NnIndex::Linear(LinearNn::new()),
            NnParams::Grid { aabb, cells_per_axis } => {
                NnIndex::Grid(GridNn::new(dim, aabb, *cells_per_axis))
            }
            NnParams::VpTree { rebuild_fraction } => {
                NnIndex::VpTree(VpTreeNn::new(*rebuild_fraction))
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            NnIndex::Linear(i) => i.points.len(),
            NnIndex::Grid(i) => i.points.len(),
            NnIndex::VpTree(i) => i.live.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn insert(&mut self, id: VertexId, w: &Point) {
        match self {
            NnIndex::Linear(i) => i.insert(id, w),
            NnIndex::Grid(i) => i.insert(id, w),
            NnIndex::VpTree(i) => i.insert(id, w),
        }
    }

    pub fn remove(&mut self, id: VertexId) {
        match self {
            NnIndex::Linear(i) => i.remove(id),
            NnIndex::Grid(i) => i.remove(id),
            NnIndex::VpTree(i) => i.remove(id),
        }
    }

    /// Re-indexes `id` after its position changed.
    pub fn update(&mut self, id: VertexId, w: &Point) {
        match self {
            NnIndex::Linear(i) => i.insert(id, w),
            NnIndex::Grid(i) => i.update(id, w),
            NnIndex::VpTree(i) => i.update(id, w),
        }
    }

    /// The `k` registered vertices closest to `q` under squared
    /// Euclidean distance, in increasing order. Returns how many were
    /// found (less than `k` on an underpopulated index).
    pub fn nearest(&self, q: &Point, k: usize, out: &mut Vec<VertexId>) -> usize {
        let mut best = BestK::new(k);
        match self {
            NnIndex::Linear(i) => i.nearest(q, &mut best),
            NnIndex::Grid(i) => i.nearest(q, &mut best),
            NnIndex::VpTree(i) => i.nearest(q, &mut best),
        }
        out.clear();
        out.extend(best.items.iter().map(|&(_, id)| id));
        out.len()
    }
}

// ── Linear scan ──────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct LinearNn {
    points: HashMap<VertexId, Point>,
}

impl LinearNn {
    fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, id: VertexId, w: &Point) {
        self.points.insert(id, w.clone());
    }

    fn remove(&mut self, id: VertexId) {
        self.points.remove(&id);
    }

    fn nearest(&self, q: &Point, best: &mut BestK) {
        for (&id, w) in &self.points {
            best.push(q.dist2(w), id);
        }
    }
}

// ── Uniform grid ─────────────────────────────────────────────────────

#[derive(Debug)]
pub struct GridNn {
    /// Cell edge length per axis.
    cell: Vec<f64>,
    /// Origin (minimum corner of the configured box).
    origin: Vec<f64>,
    cells: HashMap<Vec<i64>, Vec<VertexId>>,
    points: HashMap<VertexId, (Point, Vec<i64>)>,
    /// Bounding box of occupied cells; only grows, used to stop the
    /// ring search on sparse indexes.
    occ_min: Vec<i64>,
    occ_max: Vec<i64>,
    occupied: bool,
}

impl GridNn {
    fn new(dim: usize, aabb: &[f64], cells_per_axis: usize) -> Self {
        assert_eq!(aabb.len(), 2 * dim, "grid aabb must hold [min, max] per axis");
        let n = cells_per_axis.max(1) as f64;
        let mut cell = Vec::with_capacity(dim);
        let mut origin = Vec::with_capacity(dim);
        for axis in 0..dim {
            let (lo, hi) = (aabb[2 * axis], aabb[2 * axis + 1]);
            assert!(hi > lo, "grid aabb axis {} is empty", axis);
            cell.push((hi - lo) / n);
            origin.push(lo);
        }
        Self {
            cell,
            origin,
            cells: HashMap::new(),
            points: HashMap::new(),
            occ_min: vec![0; dim],
            occ_max: vec![0; dim],
            occupied: false,
        }
    }

    fn key(&self, w: &Point) -> Vec<i64> {
        w.coords()
            .iter()
            .zip(&self.origin)
            .zip(&self.cell)
            .map(|((x, o), c)| ((x - o) / c).floor() as i64)
            .collect()
    }

    fn note_occupied(&mut self, key: &[i64]) {
        if !self.occupied {
            self.occ_min = key.to_vec();
            self.occ_max = key.to_vec();
            self.occupied = true;
            return;
        }
        for axis in 0..key.len() {
            self.occ_min[axis] = self.occ_min[axis].min(key[axis]);
            self.occ_max[axis] = self.occ_max[axis].max(key[axis]);
        }
    }

    fn insert(&mut self, id: VertexId, w: &Point) {
        let key = self.key(w);
        self.note_occupied(&key);
        self.cells.entry(key.clone()).or_default().push(id);
        self.points.insert(id, (w.clone(), key));
    }

    fn remove(&mut self, id: VertexId) {
        if let Some((_, key)) = self.points.remove(&id) {
            if let Some(bucket) = self.cells.get_mut(&key) {
                bucket.retain(|&v| v != id);
                if bucket.is_empty() {
                    self.cells.remove(&key);
                }
            }
        }
    }

    fn update(&mut self, id: VertexId, w: &Point) {
        let new_key = self.key(w);
        match self.points.get_mut(&id) {
            Some((pos, key)) if *key == new_key => {
                // Same cell — amortized O(1) for sub-cell steps.
                *pos = w.clone();
            }
            Some(_) => {
                self.remove(id);
                self.insert(id, w);
            }
            None => self.insert(id, w),
        }
    }

    /// Widest ring that can still contain an occupied cell from `center`.
    fn max_ring(&self, center: &[i64]) -> i64 {
        let mut ring = 0;
        for axis in 0..center.len() {
            ring = ring
                .max((center[axis] - self.occ_min[axis]).abs())
                .max((center[axis] - self.occ_max[axis]).abs());
        }
        ring
    }

    fn scan_cell(&self, key: &[i64], q: &Point, best: &mut BestK) {
        if let Some(bucket) = self.cells.get(key) {
            for &id in bucket {
                best.push(q.dist2(&self.points[&id].0), id);
            }
        }
    }

    /// Visits every cell at Chebyshev distance exactly `ring` from
    /// `center` (all cells when `ring == 0` means just the center).
    fn scan_ring(&self, center: &[i64], ring: i64, q: &Point, best: &mut BestK) {
        let dim = center.len();
        let mut offset = vec![-ring; dim];
        'outer: loop {
            if offset.iter().any(|o| o.abs() == ring) {
                let key: Vec<i64> =
                    center.iter().zip(&offset).map(|(c, o)| c + o).collect();
                self.scan_cell(&key, q, best);
            }
            for axis in 0..dim {
                offset[axis] += 1;
                if offset[axis] <= ring {
                    continue 'outer;
                }
                offset[axis] = -ring;
            }
            break;
        }
    }

    fn nearest(&self, q: &Point, best: &mut BestK) {
        if !self.occupied || self.points.is_empty() {
            return;
        }
        let center = self.key(q);
        let max_ring = self.max_ring(&center);
        let min_side = self.cell.iter().cloned().fold(f64::INFINITY, f64::min);
        let mut ring: i64 = 0;
        loop {
            self.scan_ring(&center, ring, q, best);
            if ring >= max_ring {
                break;
            }
            // Any point in a farther ring is at least `ring` cells away.
            let lower = ring as f64 * min_side;
            if best.bound() <= lower * lower {
                break;
            }
            ring += 1;
        }
    }
}

// ── Vantage-point tree ───────────────────────────────────────────────

#[derive(Debug)]
struct VpNode {
    id: VertexId,
    w: Point,
    /// Median distance separating the inner and outer subtree.
    mu: f64,
    inner: Option<usize>,
    outer: Option<usize>,
}

#[derive(Debug)]
pub struct VpTreeNn {
    live: HashMap<VertexId, Point>,
    nodes: Vec<VpNode>,
    root: Option<usize>,
    /// Points that moved or arrived since the last rebuild.
    overflow: HashMap<VertexId, Point>,
    rebuild_fraction: f64,
}

impl VpTreeNn {
    fn new(rebuild_fraction: f64) -> Self {
        Self {
            live: HashMap::new(),
            nodes: Vec::new(),
            root: None,
            overflow: HashMap::new(),
            rebuild_fraction: rebuild_fraction.clamp(0.01, 1.0),
        }
    }

    fn insert(&mut self, id: VertexId, w: &Point) {
        self.live.insert(id, w.clone());
        self.overflow.insert(id, w.clone());
        self.maybe_rebuild();
    }

    fn remove(&mut self, id: VertexId) {
        self.live.remove(&id);
        self.overflow.remove(&id);
    }

    fn update(&mut self, id: VertexId, w: &Point) {
        self.live.insert(id, w.clone());
        self.overflow.insert(id, w.clone());
        self.maybe_rebuild();
    }

    fn maybe_rebuild(&mut self) {
        let threshold = (self.live.len() as f64 * self.rebuild_fraction).max(32.0);
        if (self.overflow.len() as f64) > threshold {
            self.rebuild();
        }
    }

    fn rebuild(&mut self) {
        self.nodes.clear();
        self.overflow.clear();
        let mut items: Vec<(VertexId, Point)> =
            self.live.iter().map(|(&id, w)| (id, w.clone())).collect();
        let n = items.len();
        self.root = self.build(&mut items[..], n);
    }

    fn build(&mut self, items: &mut [(VertexId, Point)], _len: usize) -> Option<usize> {
        if items.is_empty() {
            return None;
        }
        let (vid, vw) = items[0].clone();
        let rest = &mut items[1..];
        if rest.is_empty() {
            self.nodes.push(VpNode { id: vid, w: vw, mu: 0.0, inner: None, outer: None });
            return Some(self.nodes.len() - 1);
        }
        let mid = rest.len() / 2;
        rest.sort_by(|a, b| {
            vw.dist2(&a.1).partial_cmp(&vw.dist2(&b.1)).expect("NaN position in vp-tree")
        });
        let mu = vw.dist2(&rest[mid].1).sqrt();
        let slot = self.nodes.len();
        self.nodes.push(VpNode { id: vid, w: vw, mu, inner: None, outer: None });
        let (inner_items, outer_items) = rest.split_at_mut(mid);
        let inner = self.build(inner_items, inner_items.len());
        let outer = self.build(outer_items, outer_items.len());
        self.nodes[slot].inner = inner;
        self.nodes[slot].outer = outer;
        Some(slot)
    }

    /// A tree entry counts only while its indexed position is current.
    fn entry_is_current(&self, node: &VpNode) -> bool {
        !self.overflow.contains_key(&node.id)
            && self.live.get(&node.id).map_or(false, |w| *w == node.w)
    }

    fn search(&self, slot: usize, q: &Point, best: &mut BestK) {
        let node = &self.nodes[slot];
        let d = q.dist(&node.w);
        if self.entry_is_current(node) {
            best.push(d * d, node.id);
        }
        let (first, second) = if d < node.mu {
            (node.inner, node.outer)
        } else {
            (node.outer, node.inner)
        };
        if let Some(s) = first {
            self.search(s, q, best);
        }
        if let Some(s) = second {
            let gap = (d - node.mu).abs();
            if gap * gap <= best.bound() {
                self.search(s, q, best);
            }
        }
    }

    fn nearest(&self, q: &Point, best: &mut BestK) {
        if let Some(root) = self.root {
            self.search(root, q, best);
        }
        for (&id, w) in &self.overflow {
            if self.live.contains_key(&id) {
                best.push(q.dist2(w), id);
            }
        }
    }
}
