//! The planning engine.
//!
//! # Overview
//!
//! [`PlanEngine`] grows a graph over the configuration space from a
//! stream of oracle-drawn samples. Each adaptation step runs extended
//! competitive Hebbian learning: the two vertices nearest the signal are
//! connected (respecting the degree cap), the connection is refined by
//! the obtuse-angle test and the common-neighbour cleanup, the winner
//! and its neighbourhood move toward the signal, the winner's error
//! grows, and its incident edges age out. Every λ steps a vertex is
//! inserted halfway along the highest-error edge; once the graph is past
//! its warm start the insert is classified by the oracle and
//! `cut_subnet` restores the invariant that no edge crosses a
//! classified-region boundary.
//!
//! Path queries materialize fixed FREE endpoints, run Dijkstra over the
//! admissible subgraph and refine the result down to the spatial
//! resolution `h`, classifying every midpoint on the way. A refined
//! chain with no obstacle hit is a certified path.
//!
//! # Ownership
//!
//! The engine owns its graph, indexes, heap and RNG; the oracle is the
//! only borrowed collaborator, taken for the duration of a public call.
//! Everything runs on the calling thread; `terminate` is polled at the
//! top of every step.

use crate::error::{EngineError, ErrorCode};
use crate::graph::{EdgeId, Graph, VertexClass, VertexId};
use crate::heap::{BetaTables, ErrHeap};
use crate::nn::NnIndex;
use crate::oracle::{Classification, Oracle};
use crate::params::{MovePolicy, PlanParams};
use crate::path;
use crate::point::{Point, GEOM_EPS};
use crate::sets::SetManager;
use crate::svt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::VecDeque;
use std::io::{self, Write};

/// A certified path: vertex positions from start to goal, consecutive
/// segments no longer than the configured resolution.
pub type Path = Vec<Point>;

pub struct PlanEngine {
    params: PlanParams,
    /// `params.h` squared — every comparison is on squared distances.
    h2: f64,
    graph: Graph,
    nn: NnIndex,
    heap: ErrHeap,
    sets: SetManager,
    beta: BetaTables,
    rng: StdRng,
    oracle: Option<Box<dyn Oracle>>,
    /// Insertion cycles elapsed; the epoch of error materialization.
    cycle: u64,
    /// Position within the current cycle (0 = at a cycle boundary).
    step_in_cycle: usize,
    nn_shortfall_logged: bool,
}

impl PlanEngine {
    pub fn new(params: PlanParams) -> Result<Self, EngineError> {
        params.validate()?;
        let h2 = params.h * params.h;
        let beta = BetaTables::new(params.beta, params.lambda);
        let nn = NnIndex::new(&params.nn, params.dim);
        let sets = SetManager::new(&params.nn, params.dim);
        Ok(Self {
            params,
            h2,
            graph: Graph::new(),
            nn,
            heap: ErrHeap::new(),
            sets,
            beta,
            rng: StdRng::from_entropy(),
            oracle: None,
            cycle: 1,
            step_in_cycle: 0,
            nn_shortfall_logged: false,
        })
    }

    /// Registers the oracle adapter. Replaces any previous one.
    pub fn add_ops(&mut self, oracle: Box<dyn Oracle>) {
        self.oracle = Some(oracle);
    }

    /// Reseeds the engine-owned RNG (tournament sampling). By default it
    /// is seeded from entropy.
    pub fn seed_rng(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn params(&self) -> &PlanParams {
        &self.params
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Sum of materialized errors over all vertices, decayed to the
    /// current cycle.
    pub fn total_error(&mut self) -> f64 {
        let ids: Vec<VertexId> = self.graph.iter_vertices().map(|(id, _)| id).collect();
        ids.into_iter().map(|v| self.fix_error(v)).sum()
    }

    /// Mean edge length over edges with no fixed endpoint.
    pub fn avg_edge_len(&self) -> f64 {
        let mut sum = 0.0;
        let mut num = 0usize;
        for (_, e) in self.graph.iter_edges() {
            let [u, v] = e.ends;
            if self.graph.vertex(u).fixed || self.graph.vertex(v).fixed {
                continue;
            }
            sum += self.graph.vertex(u).w.dist(&self.graph.vertex(v).w);
            num += 1;
        }
        if num == 0 {
            0.0
        } else {
            sum / num as f64
        }
    }

    /// Tournament-sampled frontier vertex for host-side samplers.
    pub fn random_node(&mut self) -> Option<VertexId> {
        self.sets.random_node(&self.graph, &mut self.rng, self.params.tournament)
    }

    /// Whole-net SVT dump (round-trippable).
    pub fn dump_svt<W: Write>(&self, out: &mut W, name: Option<&str>) -> io::Result<()> {
        svt::dump_net(&self.graph, out, name)
    }

    /// Per-class colored SVT dump for visualization.
    pub fn dump_svt_classes<W: Write>(&self, out: &mut W, name: Option<&str>) -> io::Result<()> {
        svt::dump_classes(&self.graph, out, name)
    }

    // ── Public loops ─────────────────────────────────────────────────

    /// Blocking learning loop: adapt for λ steps, insert, repeat, until
    /// the oracle's `terminate` returns true. Termination is polled at
    /// the top of every step and drains the step in flight.
    pub fn run(&mut self) -> Result<(), EngineError> {
        let mut oracle = self.take_oracle()?;
        self.init(oracle.as_mut());
        while !oracle.terminate() {
            self.step_with(oracle.as_mut());
        }
        self.oracle = Some(oracle);
        Ok(())
    }

    /// One cooperative step of the learning loop, for callers that
    /// drive the engine themselves instead of blocking in [`run`].
    /// Inserts a vertex and fires the progress callback on cycle
    /// boundaries; does not poll `terminate`.
    pub fn step(&mut self) -> Result<(), EngineError> {
        let mut oracle = self.take_oracle()?;
        self.init(oracle.as_mut());
        self.step_with(oracle.as_mut());
        self.oracle = Some(oracle);
        Ok(())
    }

    /// One-shot path query over the current graph: materialize fixed
    /// FREE endpoints, Dijkstra, refine. `None` when no certified path
    /// exists yet; the temporaries stay in the graph either way.
    pub fn find_path(&mut self, start: &Point, goal: &Point) -> Result<Option<Path>, EngineError> {
        let mut oracle = self.take_oracle()?;
        let result = self.find_path_with(start, goal, oracle.as_mut());
        self.oracle = Some(oracle);
        Ok(result)
    }

    /// Combined grow-and-query loop: learns continuously and attempts a
    /// path extraction on a schedule, backing off `prune_delay` cycles
    /// while the admissible subgraph is still disconnected. Returns the
    /// first certified path, or `None` once the oracle terminates.
    pub fn plan(&mut self, start: &Point, goal: &Point) -> Result<Option<Path>, EngineError> {
        let mut oracle = self.take_oracle()?;
        let result = self.plan_with(start, goal, oracle.as_mut());
        self.oracle = Some(oracle);
        Ok(result)
    }

    fn take_oracle(&mut self) -> Result<Box<dyn Oracle>, EngineError> {
        self.oracle.take().ok_or_else(|| {
            EngineError::new(ErrorCode::MissingOracle, "no oracle registered; call add_ops first")
        })
    }

    fn init(&mut self, oracle: &mut dyn Oracle) {
        while self.graph.vertex_count() < 2 {
            let w = oracle.input_signal();
            self.new_vertex(w);
        }
    }

    fn end_cycle(&mut self, oracle: &mut dyn Oracle) {
        self.cycle += 1;
        if self.params.callback_period > 0 && self.cycle % self.params.callback_period == 0 {
            oracle.callback();
        }
    }

    /// One adaptation step; closes the cycle (insert + callback) when
    /// the λ-th step of the cycle completes.
    fn step_with(&mut self, oracle: &mut dyn Oracle) {
        self.step_in_cycle += 1;
        let step = self.step_in_cycle;
        self.adapt(step, oracle);
        if self.step_in_cycle >= self.params.lambda {
            self.insert_vertex(oracle);
            self.end_cycle(oracle);
            self.step_in_cycle = 0;
        }
    }

    fn plan_with(
        &mut self,
        start: &Point,
        goal: &Point,
        oracle: &mut dyn Oracle,
    ) -> Option<Path> {
        let fresh = self.graph.vertex_count() < 2;
        let (mut s, mut g) = if fresh {
            let s = self.new_vertex(start.clone());
            self.sets.classify(&mut self.graph, s, VertexClass::Free);
            let g = self.new_vertex(goal.clone());
            self.sets.classify(&mut self.graph, g, VertexClass::Free);
            self.graph.add_edge(s, g);
            // The straight start-goal segment might already be free.
            let (chain, ok) = self.prune_path(vec![s, g], oracle);
            if ok {
                return Some(self.chain_points(&chain));
            }
            (s, g)
        } else {
            let s = self.materialize_endpoint(start)?;
            let g = self.materialize_endpoint(goal)?;
            (s, g)
        };

        let mut elapsed: u64 = 0;
        let mut next_attempt: u64 = 1;
        loop {
            if oracle.terminate() {
                return None;
            }
            self.step_with(oracle);
            if self.step_in_cycle != 0 {
                continue;
            }
            elapsed += 1;

            if elapsed >= next_attempt {
                // Endpoints can age out of the graph (and their arena
                // slot be recycled); re-materialize when gone.
                if !self.endpoint_alive(s, start) {
                    s = match self.materialize_endpoint(start) {
                        Some(v) => v,
                        None => continue,
                    };
                }
                if !self.endpoint_alive(g, goal) {
                    g = match self.materialize_endpoint(goal) {
                        Some(v) => v,
                        None => continue,
                    };
                }
                match self.extract(s, g, oracle) {
                    Extract::Certified(p) => return Some(p),
                    Extract::Invalidated => next_attempt = elapsed + 1,
                    Extract::Disconnected => {
                        next_attempt = elapsed + self.params.prune_delay.max(1)
                    }
                }
            }
        }
    }

    fn find_path_with(
        &mut self,
        start: &Point,
        goal: &Point,
        oracle: &mut dyn Oracle,
    ) -> Option<Path> {
        let s = self.materialize_endpoint(start)?;
        let g = self.materialize_endpoint(goal)?;
        match self.extract(s, g, oracle) {
            Extract::Certified(p) => Some(p),
            _ => None,
        }
    }

    // ── Adaptation (one ECHL step) ───────────────────────────────────

    fn adapt(&mut self, step: usize, oracle: &mut dyn Oracle) {
        let is = oracle.input_signal();

        // Obstacle repulsion: signals landing next to a known obstacle
        // teach nothing.
        if self.sets.near_obstacle(&self.graph, &is, self.h2) {
            return;
        }

        let mut winners = Vec::with_capacity(2);
        if self.nn.nearest(&is, 2, &mut winners) < 2 {
            if !self.nn_shortfall_logged {
                log::warn!("nearest-neighbour index returned < 2 candidates; step skipped");
                self.nn_shortfall_logged = true;
            }
            return;
        }
        let (n1, n2) = (winners[0], winners[1]);
        let c1 = self.graph.vertex(n1).class;
        let c2 = self.graph.vertex(n2).class;

        let compatible = c1 == c2 || c1 == VertexClass::None || c2 == VertexClass::None;
        if compatible {
            self.connect(n1, n2);
            self.learn(step, n1, n2, &is);
        } else {
            match self.params.policy {
                MovePolicy::MoveMatchingSet => {
                    let cls = oracle.eval(&is).to_class();
                    let winner = if cls == c1 { n1 } else { n2 };
                    let other = if winner == n1 { n2 } else { n1 };
                    self.learn(step, winner, other, &is);
                }
                MovePolicy::MoveNeither => {}
            }
        }
    }

    /// Steps 2–5: confirm or create the winner edge, refine it by the
    /// obtuse-angle test, clean up edges between common neighbours, and
    /// (surface variant) span faces.
    fn connect(&mut self, n1: VertexId, n2: VertexId) {
        let created = match self.graph.common_edge(n1, n2) {
            Some(e) => {
                self.graph.edge_mut(e).age = 0;
                false
            }
            None => {
                for v in [n1, n2] {
                    if self.graph.vertex(v).degree() >= self.params.r_max {
                        if let Some(longest) = self.graph.longest_edge_of(v) {
                            self.remove_edge_sweep(longest, &[n1, n2]);
                        }
                    }
                }
                self.graph.add_edge(n1, n2);
                true
            }
        };

        let mut common = Vec::new();
        self.graph.common_neighbors(n1, n2, &mut common);

        // Obtuse-angle refinement: a common neighbour inside (or on) the
        // Thales circle of n1–n2 means the edge cannot be Delaunay.
        // Zero-length legs (coincident seed triplets) count as outside.
        for &m in &common {
            let apex = &self.graph.vertex(m).w;
            if apex.dist2(&self.graph.vertex(n1).w) < GEOM_EPS
                || apex.dist2(&self.graph.vertex(n2).w) < GEOM_EPS
            {
                continue;
            }
            let dot = Point::legs_dot(
                apex,
                &self.graph.vertex(n1).w,
                &self.graph.vertex(n2).w,
            );
            if dot <= GEOM_EPS {
                if let Some(e) = self.graph.common_edge(n1, n2) {
                    self.remove_edge_sweep(e, &[n1, n2]);
                }
                break;
            }
        }

        // Triangulation cleanup: edges between common neighbours cross
        // the winner edge's corridor.
        for i in 0..common.len() {
            for j in i + 1..common.len() {
                if let Some(e) = self.graph.common_edge(common[i], common[j]) {
                    self.remove_edge_sweep(e, &[n1, n2]);
                }
            }
        }

        if self.params.surface && created {
            for &m in common.iter().take(2) {
                self.graph.add_face([n1, n2, m]);
            }
        }
    }

    /// Steps 6–8: move the winner and its neighbourhood, accumulate
    /// error, age and prune the winner's edges, drop orphans.
    fn learn(&mut self, step: usize, n: VertexId, other_winner: VertexId, is: &Point) {
        // 6. Move.
        if !self.graph.vertex(n).fixed {
            let mut w = self.graph.vertex(n).w.clone();
            w.move_towards(is, self.params.eb);
            self.nn.update(n, &w);
            self.graph.vertex_mut(n).w = w;
        }
        let neighbours: Vec<(EdgeId, VertexId)> = self
            .graph
            .vertex(n)
            .incident
            .iter()
            .map(|&e| (e, self.graph.edge(e).other(n)))
            .collect();
        for &(_, m) in &neighbours {
            if !self.graph.vertex(m).fixed {
                let mut w = self.graph.vertex(m).w.clone();
                w.move_towards(is, self.params.en);
                self.nn.update(m, &w);
                self.graph.vertex_mut(m).w = w;
            }
        }

        // 7. Error accumulation, pre-scaled so one whole-cycle decay per
        // epoch is exact.
        let dist2 = self.graph.vertex(n).w.dist2(is);
        let inc = dist2 * self.beta.step_decay(self.params.lambda - step);
        self.inc_error(n, inc);

        self.learn_depth(n);

        // 8. Aging.
        for (e, _) in neighbours {
            let age = {
                let edge = self.graph.edge_mut(e);
                edge.age += 1;
                edge.age
            };
            if age > self.params.age_max {
                self.remove_edge_sweep(e, &[n]);
            }
        }
        if self.graph.contains_vertex(n) && self.graph.vertex(n).degree() == 0 {
            self.delete_vertex(n);
        }
        if self.graph.contains_vertex(other_winner)
            && self.graph.vertex(other_winner).degree() == 0
        {
            self.delete_vertex(other_winner);
        }
    }

    /// Re-learns which region the winner leans toward and how far from
    /// a classified vertex it sits (majority side, min depth + 1).
    fn learn_depth(&mut self, n: VertexId) {
        if !self.graph.contains_vertex(n) || self.graph.vertex(n).fixed {
            return;
        }
        let mut num = [0usize; 2];
        let mut min_depth = [u32::MAX; 2];
        for &e in &self.graph.vertex(n).incident {
            let o = self.graph.edge(e).other(n);
            let vert = self.graph.vertex(o);
            let idx = match vert.side {
                VertexClass::Free => 0,
                VertexClass::Obst => 1,
                VertexClass::None => continue,
            };
            num[idx] += 1;
            min_depth[idx] = min_depth[idx].min(vert.depth);
        }
        let side = if num[0] > num[1] {
            VertexClass::Free
        } else if num[1] > num[0] {
            VertexClass::Obst
        } else {
            self.graph.vertex(n).side
        };
        let idx = match side {
            VertexClass::Free => 0,
            VertexClass::Obst => 1,
            VertexClass::None => return,
        };
        if min_depth[idx] == u32::MAX {
            return;
        }
        self.sets.set_lean(&mut self.graph, n, side, min_depth[idx] + 1);
    }

    // ── Insertion ────────────────────────────────────────────────────

    /// Splits the highest-error edge with a fresh vertex; past the warm
    /// start the insert is classified and its subnet cut.
    fn insert_vertex(&mut self, oracle: &mut dyn Oracle) {
        let q = match self.heap_max() {
            Some(q) => q,
            None => return,
        };
        let incident: Vec<EdgeId> = self.graph.vertex(q).incident.clone();
        let mut best: Option<(f64, VertexId, EdgeId)> = None;
        for e in incident {
            let o = self.graph.edge(e).other(q);
            let err = self.fix_error(o);
            if best.map_or(true, |(b, _, _)| err > b) {
                best = Some((err, o, e));
            }
        }
        let (f, eqf) = match best {
            Some((_, f, e)) => (f, e),
            None => {
                log::warn!("highest-error vertex has no neighbours; insertion skipped");
                return;
            }
        };

        let w = Point::midpoint(&self.graph.vertex(q).w, &self.graph.vertex(f).w);
        let r = self.new_vertex(w);
        self.graph.remove_edge(eqf);
        self.graph.add_edge(q, r);
        self.graph.add_edge(f, r);

        self.scale_error(q, self.params.alpha);
        self.scale_error(f, self.params.alpha);
        let err = 0.5 * (self.graph.vertex(q).err + self.graph.vertex(f).err);
        self.set_error(r, err);
        self.learn_depth(r);

        if self.graph.vertex_count() > self.params.warm_start {
            let cls = oracle.eval(&self.graph.vertex(r).w).to_class();
            self.sets.classify(&mut self.graph, r, cls);
            self.cut_subnet(r, oracle);
            if self.graph.contains_vertex(r) && self.graph.vertex(r).degree() == 0 {
                if self.params.island_seed {
                    self.seed_island(r, cls);
                } else {
                    self.delete_vertex(r);
                }
            }
        }
    }

    /// The insert was cut off from both regions: assume an undiscovered
    /// island and seed it with a coincident triangle of its class.
    fn seed_island(&mut self, r: VertexId, cls: VertexClass) {
        let w = self.graph.vertex(r).w.clone();
        let err = self.graph.vertex(r).err;
        let a = self.new_vertex(w.clone());
        let b = self.new_vertex(w);
        self.graph.add_edge(r, a);
        self.graph.add_edge(r, b);
        self.graph.add_edge(a, b);
        self.sets.classify(&mut self.graph, a, cls);
        self.sets.classify(&mut self.graph, b, cls);
        self.set_error(a, err);
        self.set_error(b, err);
    }

    /// Breadth-first flood from `m` removing every edge that crosses a
    /// classified-region boundary, deleting vertices it orphans. Each
    /// vertex is evaluated at most once per flood.
    fn cut_subnet(&mut self, m: VertexId, oracle: &mut dyn Oracle) {
        let stamp = self.cycle;
        let m_class = self.graph.vertex(m).class;
        let mut fifo: VecDeque<VertexId> = VecDeque::new();
        self.graph.vertex_mut(m).evaled = stamp;
        fifo.push_back(m);

        while let Some(n) = fifo.pop_front() {
            if !self.graph.contains_vertex(n) {
                continue;
            }
            let incident: Vec<(EdgeId, VertexId)> = self
                .graph
                .vertex(n)
                .incident
                .iter()
                .map(|&e| (e, self.graph.edge(e).other(n)))
                .collect();
            for (e, o) in incident {
                if !self.graph.contains_vertex(o) {
                    continue;
                }
                if self.graph.vertex(o).class == m_class {
                    continue;
                }
                if self.graph.vertex(o).evaled != stamp {
                    let cls = oracle.eval(&self.graph.vertex(o).w).to_class();
                    self.sets.classify(&mut self.graph, o, cls);
                    self.graph.vertex_mut(o).evaled = stamp;
                    if cls == m_class {
                        fifo.push_back(o);
                    }
                }
                let o_class = self.graph.vertex(o).class;
                if o_class != m_class && o_class != VertexClass::None {
                    self.remove_edge_sweep(e, &[n, m]);
                }
            }
            if n != m && self.graph.contains_vertex(n) && self.graph.vertex(n).degree() == 0 {
                self.delete_vertex(n);
            }
        }
    }

    // ── Path extraction ──────────────────────────────────────────────

    fn extract(&mut self, s: VertexId, g: VertexId, oracle: &mut dyn Oracle) -> Extract {
        let max_depth_free = self.params.max_depth_free;
        let route = path::dijkstra(&self.graph, s, g, |_, v| match v.class {
            VertexClass::Free => true,
            VertexClass::None => v.depth <= max_depth_free,
            VertexClass::Obst => false,
        });
        match route {
            None => Extract::Disconnected,
            Some(route) => {
                let (chain, ok) = self.prune_path(route, oracle);
                if ok {
                    Extract::Certified(self.chain_points(&chain))
                } else {
                    Extract::Invalidated
                }
            }
        }
    }

    /// Whether `v` still is the fixed FREE endpoint materialized at `w`.
    /// Fixed vertices never move, so an exact position match identifies
    /// the vertex even if the arena slot was recycled in between.
    fn endpoint_alive(&self, v: VertexId, w: &Point) -> bool {
        self.graph.contains_vertex(v)
            && self.graph.vertex(v).class == VertexClass::Free
            && self.graph.vertex(v).w == *w
    }

    /// Materializes a fixed FREE vertex at `w`, connected to its two
    /// nearest neighbours (queried before insertion).
    fn materialize_endpoint(&mut self, w: &Point) -> Option<VertexId> {
        let mut near = Vec::with_capacity(2);
        if self.nn.nearest(w, 2, &mut near) < 2 {
            if !self.nn_shortfall_logged {
                log::warn!("cannot connect path endpoint: < 2 nearest candidates");
                self.nn_shortfall_logged = true;
            }
            return None;
        }
        let v = self.new_vertex(w.clone());
        self.sets.classify(&mut self.graph, v, VertexClass::Free);
        for n in near {
            if self.graph.vertex(n).degree() >= self.params.r_max {
                if let Some(longest) = self.graph.longest_edge_of(n) {
                    self.remove_edge_sweep(longest, &[v, n]);
                }
            }
            if self.graph.common_edge(v, n).is_none() {
                self.graph.add_edge(v, n);
            }
        }
        Some(v)
    }

    /// Refines a route: every consecutive pair is split at midpoints
    /// until segments fit the resolution, every touched vertex is
    /// classified. Returns the refined chain and whether it is fully
    /// free (certified).
    fn prune_path(
        &mut self,
        route: Vec<VertexId>,
        oracle: &mut dyn Oracle,
    ) -> (Vec<VertexId>, bool) {
        let mut ok = true;
        let mut chain: Vec<VertexId> = Vec::new();
        let mut prev: Option<VertexId> = None;
        for n2 in route {
            ok &= !self.prune_eval(n2, oracle);
            if let Some(n1) = prev {
                ok &= !self.prune_between(n1, n2, &mut chain, oracle);
            }
            chain.push(n2);
            prev = Some(n2);
        }
        path::compress_chain(&mut self.graph, &chain);
        (chain, ok)
    }

    /// Classifies a chain vertex on demand. Returns true on an obstacle.
    fn prune_eval(&mut self, n: VertexId, oracle: &mut dyn Oracle) -> bool {
        match self.graph.vertex(n).class {
            VertexClass::Free => false,
            VertexClass::Obst => true,
            VertexClass::None => {
                let cls = oracle.eval(&self.graph.vertex(n).w);
                self.sets.classify(&mut self.graph, n, cls.to_class());
                cls == Classification::Obst
            }
        }
    }

    /// Splits the segment n1–n2 at its midpoint (rewiring the edge
    /// through the new vertex), recursing until segments are within the
    /// resolution. Appends intermediates to `chain` in path order.
    fn prune_between(
        &mut self,
        n1: VertexId,
        n2: VertexId,
        chain: &mut Vec<VertexId>,
        oracle: &mut dyn Oracle,
    ) -> bool {
        let dist2 = self.graph.vertex(n1).w.dist2(&self.graph.vertex(n2).w);
        if dist2 < self.h2 {
            return false;
        }
        let mid = Point::midpoint(&self.graph.vertex(n1).w, &self.graph.vertex(n2).w);
        let m = self.new_vertex(mid);
        if let Some(e) = self.graph.common_edge(n1, n2) {
            self.graph.remove_edge(e);
        }
        self.graph.add_edge(n1, m);
        self.graph.add_edge(m, n2);

        let mut bad = self.prune_eval(m, oracle);
        bad |= self.prune_between(n1, m, chain, oracle);
        chain.push(m);
        bad |= self.prune_between(m, n2, chain, oracle);
        bad
    }

    fn chain_points(&self, chain: &[VertexId]) -> Path {
        chain.iter().map(|&v| self.graph.vertex(v).w.clone()).collect()
    }

    // ── Vertex/edge lifecycle ────────────────────────────────────────

    fn new_vertex(&mut self, w: Point) -> VertexId {
        let v = self.graph.add_vertex(w.clone());
        self.sets.on_add(&self.graph, v);
        self.nn.insert(v, &w);
        self.graph.vertex_mut(v).err_epoch = self.cycle;
        self.heap.insert(v, 0.0);
        v
    }

    fn delete_vertex(&mut self, v: VertexId) {
        self.heap.remove(v);
        self.nn.remove(v);
        self.sets.on_remove(&mut self.graph, v);
        self.graph.remove_vertex(v);
    }

    /// Removes an edge and sweeps up endpoints it orphaned, except the
    /// protected ones (typically the step's winners, which are either
    /// about to receive an edge or checked at the end of the step).
    fn remove_edge_sweep(&mut self, e: EdgeId, protect: &[VertexId]) {
        let (u, v) = self.graph.remove_edge(e);
        for x in [u, v] {
            if !protect.contains(&x)
                && self.graph.contains_vertex(x)
                && self.graph.vertex(x).degree() == 0
            {
                self.delete_vertex(x);
            }
        }
    }

    // ── Error bookkeeping ────────────────────────────────────────────

    /// Applies the β-decay accumulated since the vertex was last
    /// touched and stamps it with the current cycle.
    fn fix_error(&mut self, v: VertexId) -> f64 {
        let cycle = self.cycle;
        let vert = self.graph.vertex_mut(v);
        let delta = cycle - vert.err_epoch;
        if delta > 0 {
            vert.err *= self.beta.cycle_decay(delta);
            vert.err_epoch = cycle;
        }
        vert.err
    }

    fn inc_error(&mut self, v: VertexId, inc: f64) {
        let err = self.fix_error(v) + inc;
        self.graph.vertex_mut(v).err = err;
        self.heap.update(v, err);
    }

    fn scale_error(&mut self, v: VertexId, scale: f64) {
        let err = self.fix_error(v) * scale;
        self.graph.vertex_mut(v).err = err;
        self.heap.update(v, err);
    }

    fn set_error(&mut self, v: VertexId, err: f64) {
        let cycle = self.cycle;
        let vert = self.graph.vertex_mut(v);
        vert.err = err;
        vert.err_epoch = cycle;
        self.heap.update(v, err);
    }

    fn heap_max(&mut self) -> Option<VertexId> {
        // Split borrows: the heap callback materializes through the
        // graph, so inline the fix here.
        let cycle = self.cycle;
        let graph = &mut self.graph;
        let beta = &self.beta;
        self.heap.max(|v| {
            let vert = graph.vertex_mut(v);
            let delta = cycle - vert.err_epoch;
            if delta > 0 {
                vert.err *= beta.cycle_decay(delta);
                vert.err_epoch = cycle;
            }
            vert.err
        })
    }
}

enum Extract {
    /// Refined and fully free.
    Certified(Path),
    /// A route existed but refinement hit an obstacle.
    Invalidated,
    /// No admissible route in the current graph.
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::FnOracle;
    use rand::Rng;
    use std::cell::Cell;
    use std::rc::Rc;

    fn free_oracle(steps: usize) -> Box<dyn Oracle> {
        let mut rng = StdRng::seed_from_u64(11);
        let left = Cell::new(steps);
        Box::new(FnOracle::new(
            move || Point::xy(rng.gen(), rng.gen()),
            |_| Classification::Free,
            move || {
                if left.get() == 0 {
                    true
                } else {
                    left.set(left.get() - 1);
                    false
                }
            },
        ))
    }

    fn small_params() -> PlanParams {
        PlanParams {
            lambda: 30,
            warm_start: 10,
            h: 0.2,
            callback_period: 0,
            ..Default::default()
        }
    }

    #[test]
    fn run_grows_a_graph() {
        let mut engine = PlanEngine::new(small_params()).unwrap();
        engine.add_ops(free_oracle(600));
        engine.run().unwrap();
        assert!(engine.graph().vertex_count() >= 2);
        // λ = 30 over 600 steps → around 20 insertions.
        assert!(engine.graph().vertex_count() > 10);
    }

    #[test]
    fn run_without_oracle_errors() {
        let mut engine = PlanEngine::new(small_params()).unwrap();
        assert!(engine.run().is_err());
    }

    #[test]
    fn structural_invariants_after_run() {
        let mut engine = PlanEngine::new(small_params()).unwrap();
        engine.add_ops(free_oracle(2000));
        engine.run().unwrap();
        let g = engine.graph();
        for (id, v) in g.iter_vertices() {
            assert!(v.degree() <= engine.params().r_max, "degree cap violated");
            assert!(v.err >= 0.0);
            assert!(v.degree() > 0, "isolated vertex survived");
            for &e in &v.incident {
                assert!(g.edge(e).touches(id));
            }
        }
        // No duplicate unordered pairs.
        let mut pairs: Vec<(VertexId, VertexId)> = g
            .iter_edges()
            .map(|(_, e)| {
                let [a, b] = e.ends;
                if a < b {
                    (a, b)
                } else {
                    (b, a)
                }
            })
            .collect();
        let before = pairs.len();
        pairs.sort();
        pairs.dedup();
        assert_eq!(before, pairs.len());
    }

    #[test]
    fn callback_fires_on_schedule() {
        let hits = Rc::new(Cell::new(0u32));
        let hits_probe = Rc::clone(&hits);

        struct CountingOracle {
            rng: StdRng,
            left: usize,
            hits: Rc<Cell<u32>>,
        }
        impl Oracle for CountingOracle {
            fn input_signal(&mut self) -> Point {
                Point::xy(self.rng.gen(), self.rng.gen())
            }
            fn eval(&mut self, _w: &Point) -> Classification {
                Classification::Free
            }
            fn terminate(&mut self) -> bool {
                if self.left == 0 {
                    return true;
                }
                self.left -= 1;
                false
            }
            fn callback(&mut self) {
                self.hits.set(self.hits.get() + 1);
            }
        }

        let params = PlanParams { lambda: 10, callback_period: 2, ..small_params() };
        let mut engine = PlanEngine::new(params).unwrap();
        engine.add_ops(Box::new(CountingOracle {
            rng: StdRng::seed_from_u64(3),
            left: 100,
            hits: hits_probe,
        }));
        engine.run().unwrap();
        // 100 steps / λ=10 → 10 cycles → callback every 2nd cycle.
        assert!(hits.get() >= 4);
    }

    #[test]
    fn thales_deletes_edge_seen_under_right_angle() {
        // K4 over (0,0), (1,0), (0,1), (0.5,0.5). A signal below the
        // base makes (0,0) and (1,0) the winners; the apex (0.5,0.5)
        // sees them under a right angle, which counts as inside the
        // Thales circle, so the base edge must go.
        let mut engine = PlanEngine::new(PlanParams {
            r_max: 4,
            h: 0.01,
            ..small_params()
        })
        .unwrap();
        let corners = [
            Point::xy(0.0, 0.0),
            Point::xy(1.0, 0.0),
            Point::xy(0.0, 1.0),
            Point::xy(0.5, 0.5),
        ];
        let vs: Vec<VertexId> =
            corners.iter().map(|w| engine.new_vertex(w.clone())).collect();
        for i in 0..4 {
            for j in i + 1..4 {
                engine.graph.add_edge(vs[i], vs[j]);
            }
        }
        let signals = Rc::new(Cell::new(0));
        let sig = Rc::clone(&signals);
        engine.add_ops(Box::new(FnOracle::new(
            move || {
                sig.set(sig.get() + 1);
                Point::xy(0.5, -0.1)
            },
            |_| Classification::Free,
            || false,
        )));
        let mut oracle = engine.take_oracle().unwrap();
        engine.adapt(1, oracle.as_mut());
        assert_eq!(signals.get(), 1);
        assert!(engine.graph.common_edge(vs[0], vs[1]).is_none());
        // The diagonals stay.
        assert!(engine.graph.common_edge(vs[0], vs[3]).is_some());
        assert!(engine.graph.common_edge(vs[1], vs[3]).is_some());
    }

    #[test]
    fn triangulation_cleanup_removes_crossing_edge() {
        // n1 and n2 unconnected with two common neighbours that are
        // connected to each other: confirming n1–n2 must drop the
        // common-neighbour edge.
        let mut engine = PlanEngine::new(small_params()).unwrap();
        let n1 = engine.new_vertex(Point::xy(0.0, 0.0));
        let n2 = engine.new_vertex(Point::xy(0.1, 0.0));
        let a = engine.new_vertex(Point::xy(0.05, 1.0));
        let b = engine.new_vertex(Point::xy(0.05, -1.0));
        for &m in &[a, b] {
            engine.graph.add_edge(n1, m);
            engine.graph.add_edge(n2, m);
        }
        engine.graph.add_edge(a, b);
        engine.connect(n1, n2);
        assert!(engine.graph.common_edge(n1, n2).is_some());
        assert!(engine.graph.common_edge(a, b).is_none());
    }

    #[test]
    fn surface_variant_emits_faces() {
        let mut engine =
            PlanEngine::new(PlanParams { surface: true, ..small_params() }).unwrap();
        let n1 = engine.new_vertex(Point::xy(0.0, 0.0));
        let n2 = engine.new_vertex(Point::xy(0.1, 0.0));
        // The apex sits well outside the Thales circle of n1–n2, so the
        // new edge survives refinement and spans a face.
        let m = engine.new_vertex(Point::xy(0.05, 0.2));
        engine.graph.add_edge(n1, m);
        engine.graph.add_edge(n2, m);
        engine.connect(n1, n2);
        assert_eq!(engine.graph.face_count(), 1);
    }

    #[test]
    fn degree_cap_evicts_longest_edge() {
        let mut engine =
            PlanEngine::new(PlanParams { r_max: 2, ..small_params() }).unwrap();
        let hub = engine.new_vertex(Point::xy(0.0, 0.0));
        let near = engine.new_vertex(Point::xy(0.1, 0.0));
        let far = engine.new_vertex(Point::xy(5.0, 0.0));
        let third = engine.new_vertex(Point::xy(0.0, 0.2));
        engine.graph.add_edge(hub, near);
        engine.graph.add_edge(hub, far);
        engine.graph.add_edge(far, third);
        engine.connect(hub, third);
        assert!(engine.graph.vertex(hub).degree() <= 2);
        assert!(engine.graph.common_edge(hub, far).is_none(), "longest edge evicted");
        assert!(engine.graph.common_edge(hub, third).is_some());
    }

    #[test]
    fn insertion_splits_highest_error_edge() {
        let mut engine = PlanEngine::new(small_params()).unwrap();
        let a = engine.new_vertex(Point::xy(0.0, 0.0));
        let b = engine.new_vertex(Point::xy(1.0, 0.0));
        engine.graph.add_edge(a, b);
        engine.inc_error(a, 5.0);
        engine.inc_error(b, 3.0);
        let mut oracle = free_oracle(0);
        engine.insert_vertex(oracle.as_mut());
        assert_eq!(engine.graph.vertex_count(), 3);
        assert!(engine.graph.common_edge(a, b).is_none());
        let (r, _) = engine
            .graph
            .iter_vertices()
            .find(|&(id, _)| id != a && id != b)
            .unwrap();
        assert_eq!(engine.graph.vertex(r).w, Point::xy(0.5, 0.0));
        assert_eq!(engine.graph.vertex(r).degree(), 2);
        // α-scaled errors: 5·0.95 and 3·0.95, child gets the mean.
        let expected = 0.5 * (5.0 + 3.0) * engine.params.alpha;
        assert!((engine.graph.vertex(r).err - expected).abs() < 1e-12);
    }

    #[test]
    fn cut_subnet_separates_regions() {
        // A NONE bridge between a FREE pair and an OBST pair; inserting
        // the classification flood must cut the crossing edge.
        let mut engine =
            PlanEngine::new(PlanParams { warm_start: 0, ..small_params() }).unwrap();
        let f1 = engine.new_vertex(Point::xy(0.0, 0.0));
        let f2 = engine.new_vertex(Point::xy(0.1, 0.0));
        let o1 = engine.new_vertex(Point::xy(1.0, 0.0));
        let o2 = engine.new_vertex(Point::xy(1.1, 0.0));
        engine.graph.add_edge(f1, f2);
        engine.graph.add_edge(f2, o1);
        engine.graph.add_edge(o1, o2);
        engine.sets.classify(&mut engine.graph, f1, VertexClass::Free);

        // Everything left of x = 0.5 is free.
        let mut oracle: Box<dyn Oracle> = Box::new(FnOracle::new(
            || Point::xy(0.0, 0.0),
            |w: &Point| {
                if w.get(0) < 0.5 {
                    Classification::Free
                } else {
                    Classification::Obst
                }
            },
            || false,
        ));
        engine.cycle = 7;
        engine.cut_subnet(f1, oracle.as_mut());

        assert_eq!(engine.graph.vertex(f2).class, VertexClass::Free);
        assert_eq!(engine.graph.vertex(o1).class, VertexClass::Obst);
        assert!(engine.graph.common_edge(f2, o1).is_none(), "boundary edge cut");
        assert!(engine.graph.common_edge(o1, o2).is_some(), "obstacle side intact");
    }

    #[test]
    fn prune_refines_to_resolution() {
        let mut engine = PlanEngine::new(PlanParams { h: 0.2, ..small_params() }).unwrap();
        let a = engine.new_vertex(Point::xy(0.0, 0.0));
        let b = engine.new_vertex(Point::xy(1.0, 0.0));
        engine.graph.add_edge(a, b);
        let mut oracle = free_oracle(0);
        let (chain, ok) = engine.prune_path(vec![a, b], oracle.as_mut());
        assert!(ok);
        for pair in chain.windows(2) {
            let d = engine.graph.vertex(pair[0]).w.dist(&engine.graph.vertex(pair[1]).w);
            assert!(d <= 0.2 + 1e-9);
        }
        // Every chain vertex got classified FREE and fixed.
        for &v in &chain {
            assert_eq!(engine.graph.vertex(v).class, VertexClass::Free);
            assert!(engine.graph.vertex(v).fixed);
        }
    }

    #[test]
    fn prune_marks_obstacle_midpoints() {
        let mut engine = PlanEngine::new(PlanParams { h: 0.2, ..small_params() }).unwrap();
        let a = engine.new_vertex(Point::xy(0.0, 0.0));
        let b = engine.new_vertex(Point::xy(1.0, 0.0));
        engine.graph.add_edge(a, b);
        // Everything in the middle band is an obstacle.
        let mut oracle: Box<dyn Oracle> = Box::new(FnOracle::new(
            || Point::xy(0.0, 0.0),
            |w: &Point| {
                if (0.4..=0.6).contains(&w.get(0)) {
                    Classification::Obst
                } else {
                    Classification::Free
                }
            },
            || false,
        ));
        let (chain, ok) = engine.prune_path(vec![a, b], oracle.as_mut());
        assert!(!ok);
        assert!(chain
            .iter()
            .any(|&v| engine.graph.vertex(v).class == VertexClass::Obst));
    }
}
