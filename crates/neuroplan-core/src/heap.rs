//! Error bookkeeping: lazy β-decay tables and the max-error heap.
//!
//! Vertex errors decay by β every step. Instead of touching every vertex
//! each step, a vertex records the cycle at which its error was last
//! materialized and the decay is applied in one shot on access
//! (`β^{λ·Δcycles}`, with `β^k` precomputed for the within-cycle
//! increment scaling). Because decay only shrinks values, the priorities
//! stored in the heap are upper bounds of the live errors; the pop loop
//! re-materializes the top until its fixed value dominates the next
//! stored priority, which makes the stale entries harmless.

use crate::graph::VertexId;
use noisy_float::prelude::*;
use priority_queue::PriorityQueue;

/// How many whole-cycle decay factors are precomputed before falling
/// back to `powi`.
const CYCLE_TABLE_LEN: usize = 1000;

/// Precomputed powers of the per-step error decay β.
#[derive(Debug, Clone)]
pub struct BetaTables {
    /// `beta_step[k] = β^k` for `k ∈ [0, λ]`.
    beta_step: Vec<f64>,
    /// `beta_cycle[k] = β^{λ(k+1)}` for `k ∈ [0, 1000)`.
    beta_cycle: Vec<f64>,
    beta_lambda: f64,
}

impl BetaTables {
    pub fn new(beta: f64, lambda: usize) -> Self {
        let mut beta_step = Vec::with_capacity(lambda + 1);
        beta_step.push(1.0);
        for k in 1..=lambda {
            beta_step.push(beta_step[k - 1] * beta);
        }
        let beta_lambda = beta_step[lambda];
        let mut beta_cycle = Vec::with_capacity(CYCLE_TABLE_LEN);
        beta_cycle.push(beta_lambda);
        for k in 1..CYCLE_TABLE_LEN {
            beta_cycle.push(beta_cycle[k - 1] * beta_lambda);
        }
        Self { beta_step, beta_cycle, beta_lambda }
    }

    /// `β^k` for a within-cycle step offset, `k ≤ λ`.
    pub fn step_decay(&self, k: usize) -> f64 {
        self.beta_step[k]
    }

    /// `β^{λ·delta}` — the decay accumulated over `delta` whole cycles.
    pub fn cycle_decay(&self, delta: u64) -> f64 {
        if delta == 0 {
            1.0
        } else if (delta as usize) <= self.beta_cycle.len() {
            self.beta_cycle[delta as usize - 1]
        } else {
            let rest = delta as usize - self.beta_cycle.len();
            self.beta_cycle[self.beta_cycle.len() - 1] * self.beta_lambda.powi(rest as i32)
        }
    }
}

/// Max-heap over materialized vertex error.
#[derive(Debug, Default)]
pub struct ErrHeap {
    queue: PriorityQueue<VertexId, N64>,
}

impl ErrHeap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn insert(&mut self, v: VertexId, err: f64) {
        self.queue.push(v, n64(err));
    }

    pub fn remove(&mut self, v: VertexId) {
        self.queue.remove(&v);
    }

    /// Records a freshly materialized error for `v`.
    pub fn update(&mut self, v: VertexId, err: f64) {
        if self.queue.change_priority(&v, n64(err)).is_none() {
            self.queue.push(v, n64(err));
        }
    }

    /// The vertex with the highest live error.
    ///
    /// `materialize` must fix the vertex's error to the current cycle
    /// and return the fixed value; it is called at most once per entry
    /// inspected. The heap entry of the returned vertex is left at its
    /// materialized value.
    pub fn max<F>(&mut self, mut materialize: F) -> Option<VertexId>
    where
        F: FnMut(VertexId) -> f64,
    {
        loop {
            let (&top, &stored) = self.queue.peek()?;
            let fixed = materialize(top);
            // Materializing can only shrink. An entry whose stored
            // priority survives materialization is current, and a
            // current entry at the top dominates every other upper
            // bound, so it is the true maximum.
            if fixed >= stored.raw() {
                return Some(top);
            }
            self.queue.change_priority(&top, n64(fixed));
            match self.queue.peek() {
                Some((&lead, _)) if lead == top => return Some(top),
                Some(_) => continue,
                None => return Some(top),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> VertexId {
        VertexId(n)
    }

    #[test]
    fn cycle_decay_matches_direct_powers() {
        let t = BetaTables::new(0.9995, 200);
        let direct = 0.9995f64.powi(200 * 3);
        assert!((t.cycle_decay(3) - direct).abs() < 1e-12);
        assert_eq!(t.cycle_decay(0), 1.0);
    }

    #[test]
    fn cycle_decay_beyond_the_table() {
        let t = BetaTables::new(0.999, 10);
        let direct = 0.999f64.powi(10 * 1500);
        assert!((t.cycle_decay(1500) - direct).abs() < 1e-15);
    }

    #[test]
    fn step_decay_table() {
        let t = BetaTables::new(0.5, 4);
        assert_eq!(t.step_decay(0), 1.0);
        assert_eq!(t.step_decay(3), 0.125);
    }

    #[test]
    fn max_returns_highest() {
        let mut h = ErrHeap::new();
        h.insert(id(0), 1.0);
        h.insert(id(1), 5.0);
        h.insert(id(2), 3.0);
        assert_eq!(h.max(|_| 5.0), Some(id(1)));
    }

    #[test]
    fn stale_upper_bound_is_demoted() {
        let mut h = ErrHeap::new();
        // id 0 holds a stale priority of 10 whose live value is 0.1;
        // id 1 is current at 2.0.
        h.insert(id(0), 10.0);
        h.insert(id(1), 2.0);
        let got = h.max(|v| if v == id(0) { 0.1 } else { 2.0 });
        assert_eq!(got, Some(id(1)));
    }

    #[test]
    fn update_inserts_when_absent() {
        let mut h = ErrHeap::new();
        h.update(id(7), 4.0);
        assert_eq!(h.len(), 1);
        h.remove(id(7));
        assert!(h.is_empty());
    }
}
