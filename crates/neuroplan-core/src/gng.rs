//! Classical Growing Neural Gas.
//!
//! The unclassified learner: no vertex classes, no oracle evaluation,
//! no degree cap — just competitive Hebbian adaptation with edge aging
//! and λ-periodic insertion at the highest-error site. Useful on its
//! own for topology learning, and as the reference the planning variant
//! deviates from.
//!
//! Because nothing here ever classifies a vertex, only the whole-net
//! [`GngEngine::dump_svt`] exists; the per-class colored dump is a
//! [`crate::plan::PlanEngine`] operation.

use crate::error::{EngineError, ErrorCode};
use crate::graph::{EdgeId, Graph, VertexId};
use crate::heap::{BetaTables, ErrHeap};
use crate::nn::NnIndex;
use crate::oracle::Oracle;
use crate::params::GngParams;
use crate::point::Point;
use crate::svt;
use std::io::{self, Write};

pub struct GngEngine {
    params: GngParams,
    graph: Graph,
    nn: NnIndex,
    heap: ErrHeap,
    beta: BetaTables,
    oracle: Option<Box<dyn Oracle>>,
    cycle: u64,
    nn_shortfall_logged: bool,
}

impl GngEngine {
    pub fn new(params: GngParams) -> Result<Self, EngineError> {
        params.validate()?;
        let beta = BetaTables::new(params.beta, params.lambda);
        let nn = NnIndex::new(&params.nn, params.dim);
        Ok(Self {
            params,
            graph: Graph::new(),
            nn,
            heap: ErrHeap::new(),
            beta,
            oracle: None,
            cycle: 1,
            nn_shortfall_logged: false,
        })
    }

    pub fn add_ops(&mut self, oracle: Box<dyn Oracle>) {
        self.oracle = Some(oracle);
    }

    pub fn params(&self) -> &GngParams {
        &self.params
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn dump_svt<W: Write>(&self, out: &mut W, name: Option<&str>) -> io::Result<()> {
        svt::dump_net(&self.graph, out, name)
    }

    /// Blocking learning loop until the oracle's `terminate` fires.
    pub fn run(&mut self) -> Result<(), EngineError> {
        let mut oracle = self.oracle.take().ok_or_else(|| {
            EngineError::new(ErrorCode::MissingOracle, "no oracle registered; call add_ops first")
        })?;

        // Two seed vertices drawn from the signal stream, connected.
        while self.graph.vertex_count() < 2 {
            let w = oracle.input_signal();
            self.new_vertex(w);
        }
        let seeds: Vec<VertexId> =
            self.graph.iter_vertices().take(2).map(|(id, _)| id).collect();
        if self.graph.common_edge(seeds[0], seeds[1]).is_none() {
            self.graph.add_edge(seeds[0], seeds[1]);
        }

        let mut done = false;
        let mut cb = 0u64;
        while !done {
            for step in 1..=self.params.lambda {
                if oracle.terminate() {
                    done = true;
                    break;
                }
                self.learn(step, oracle.as_mut());
            }
            if !done {
                self.insert_vertex();
                self.cycle += 1;
                cb += 1;
                if self.params.callback_period > 0 && cb == self.params.callback_period {
                    oracle.callback();
                    cb = 0;
                }
            }
        }
        self.oracle = Some(oracle);
        Ok(())
    }

    fn learn(&mut self, step: usize, oracle: &mut dyn Oracle) {
        let is = oracle.input_signal();

        let mut winners = Vec::with_capacity(2);
        if self.nn.nearest(&is, 2, &mut winners) < 2 {
            if !self.nn_shortfall_logged {
                log::warn!("nearest-neighbour index returned < 2 candidates; step skipped");
                self.nn_shortfall_logged = true;
            }
            return;
        }
        let (n1, n2) = (winners[0], winners[1]);

        // Confirm or create the winner edge.
        match self.graph.common_edge(n1, n2) {
            Some(e) => self.graph.edge_mut(e).age = 0,
            None => {
                self.graph.add_edge(n1, n2);
            }
        }

        // Error grows by the pre-move squared distance, pre-scaled so a
        // single whole-cycle decay per epoch stays exact.
        let dist2 = self.graph.vertex(n1).w.dist2(&is);
        let inc = dist2 * self.beta.step_decay(self.params.lambda - step);
        self.inc_error(n1, inc);

        // Move the winner, then age and adapt its neighbourhood.
        {
            let mut w = self.graph.vertex(n1).w.clone();
            w.move_towards(&is, self.params.eb);
            self.nn.update(n1, &w);
            self.graph.vertex_mut(n1).w = w;
        }
        let incident: Vec<(EdgeId, VertexId)> = self
            .graph
            .vertex(n1)
            .incident
            .iter()
            .map(|&e| (e, self.graph.edge(e).other(n1)))
            .collect();
        for (e, m) in incident {
            let age = {
                let edge = self.graph.edge_mut(e);
                edge.age += 1;
                edge.age
            };
            if age > self.params.age_max {
                self.graph.remove_edge(e);
                if self.graph.vertex(m).degree() == 0 {
                    self.delete_vertex(m);
                }
            } else {
                let mut w = self.graph.vertex(m).w.clone();
                w.move_towards(&is, self.params.en);
                self.nn.update(m, &w);
                self.graph.vertex_mut(m).w = w;
            }
        }
        if self.graph.vertex(n1).degree() == 0 {
            self.delete_vertex(n1);
        }
    }

    /// Splits the highest-error edge with a fresh vertex.
    fn insert_vertex(&mut self) {
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
        let cycle = self.cycle;
        {
            let vert = self.graph.vertex_mut(r);
            vert.err = err;
            vert.err_epoch = cycle;
        }
        self.heap.update(r, err);
    }

    fn new_vertex(&mut self, w: Point) -> VertexId {
        let v = self.graph.add_vertex(w.clone());
        self.nn.insert(v, &w);
        self.graph.vertex_mut(v).err_epoch = self.cycle;
        self.heap.insert(v, 0.0);
        v
    }

    fn delete_vertex(&mut self, v: VertexId) {
        self.heap.remove(v);
        self.nn.remove(v);
        self.graph.remove_vertex(v);
    }

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

    fn heap_max(&mut self) -> Option<VertexId> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{Classification, FnOracle};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::cell::Cell;

    fn ring_oracle(steps: usize, seed: u64) -> Box<dyn Oracle> {
        let mut rng = StdRng::seed_from_u64(seed);
        let left = Cell::new(steps);
        Box::new(FnOracle::new(
            move || {
                let a = rng.gen::<f64>() * std::f64::consts::TAU;
                Point::xy(0.5 + 0.4 * a.cos(), 0.5 + 0.4 * a.sin())
            },
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

    #[test]
    fn grows_on_schedule() {
        let params = GngParams { lambda: 50, ..Default::default() };
        let mut engine = GngEngine::new(params).unwrap();
        engine.add_ops(ring_oracle(1000, 5));
        engine.run().unwrap();
        // 1000 steps / λ=50 → 20 insertions on top of the two seeds.
        assert_eq!(engine.graph().vertex_count(), 22);
    }

    #[test]
    fn no_isolated_vertices_after_run() {
        let params = GngParams { lambda: 20, age_max: 30, ..Default::default() };
        let mut engine = GngEngine::new(params).unwrap();
        engine.add_ops(ring_oracle(3000, 9));
        engine.run().unwrap();
        assert!(engine.graph().vertex_count() >= 2);
        for (_, v) in engine.graph().iter_vertices() {
            assert!(v.degree() > 0);
            assert!(v.err >= 0.0);
        }
    }

    #[test]
    fn identical_streams_grow_identical_graphs() {
        let run = |seed| {
            let params = GngParams { lambda: 25, ..Default::default() };
            let mut engine = GngEngine::new(params).unwrap();
            engine.add_ops(ring_oracle(800, seed));
            engine.run().unwrap();
            let positions: Vec<Vec<f64>> = engine
                .graph()
                .iter_vertices()
                .map(|(_, v)| v.w.coords().to_vec())
                .collect();
            (engine.graph().vertex_count(), engine.graph().edge_count(), positions)
        };
        let (c1, e1, p1) = run(123);
        let (c2, e2, p2) = run(123);
        assert_eq!(c1, c2);
        assert_eq!(e1, e2);
        assert_eq!(p1, p2);
    }
}
