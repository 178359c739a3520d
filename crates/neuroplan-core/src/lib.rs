//! `neuroplan-core` — growing neural graph engine for path planning.
//!
//! Pure Rust, no I/O beyond the writer handed to the SVT dumps. The
//! engine incrementally builds a graph embedded in R^d from a stream of
//! sample configurations, classifies vertices as free or obstructed
//! through a host-supplied oracle, keeps the topology of the free region
//! consistent via competitive Hebbian learning, and answers shortest
//! path queries over the growing graph.
//!
//! # Modules
//!
//! - [`point`]  — positions in R^d and the little arithmetic the engine needs
//! - [`params`] — engine parameters (serde-derived, canonical defaults)
//! - [`error`]  — error types (`EngineError`, `ErrorCode`)
//! - [`graph`]  — arena vertex/edge/face store, insertion-order iteration
//! - [`nn`]     — nearest-neighbour index (linear / grid / vp-tree)
//! - [`heap`]   — max-error heap with lazy β-decay materialization
//! - [`sets`]   — class bookkeeping, depth histogram, tournament sampling
//! - [`oracle`] — the callback boundary (`Oracle` trait, `FnOracle`)
//! - [`gng`]    — classical Growing Neural Gas engine
//! - [`plan`]   — planning engine (ECHL, cut-subnet, grow-and-query loop)
//! - [`path`]   — Dijkstra and union-find component compression
//! - [`svt`]    — SVT text dump and loader
//!
//! # Entry points
//!
//! - [`PlanEngine::new`] + [`PlanEngine::add_ops`] — build a planner
//! - [`PlanEngine::run`] — blocking learning loop
//! - [`PlanEngine::find_path`] — one-shot query over the current graph
//! - [`PlanEngine::plan`] — combined grow-and-query loop
//! - [`GngEngine::run`] — classical topology learning
//!
//! # Example
//!
//! ```
//! use neuroplan_core::oracle::{Classification, FnOracle};
//! use neuroplan_core::params::PlanParams;
//! use neuroplan_core::plan::PlanEngine;
//! use neuroplan_core::point::Point;
//! use rand::rngs::StdRng;
//! use rand::{Rng, SeedableRng};
//! use std::cell::Cell;
//!
//! let params = PlanParams { lambda: 40, warm_start: 20, h: 0.05, ..Default::default() };
//! let mut engine = PlanEngine::new(params).unwrap();
//!
//! let mut rng = StdRng::seed_from_u64(1);
//! let budget = Cell::new(20_000usize);
//! engine.add_ops(Box::new(FnOracle::new(
//!     move || Point::xy(rng.gen(), rng.gen()),
//!     |_w| Classification::Free,
//!     move || {
//!         if budget.get() == 0 { return true; }
//!         budget.set(budget.get() - 1);
//!         false
//!     },
//! )));
//!
//! let path = engine
//!     .plan(&Point::xy(0.1, 0.1), &Point::xy(0.9, 0.9))
//!     .unwrap();
//! assert!(path.is_some());
//! ```

pub mod error;
pub mod gng;
pub mod graph;
pub mod heap;
pub mod nn;
pub mod oracle;
pub mod params;
pub mod path;
pub mod plan;
pub mod point;
pub mod sets;
pub mod svt;

pub use error::{EngineError, ErrorCode};
pub use gng::GngEngine;
pub use graph::{EdgeId, FaceId, Graph, VertexClass, VertexId};
pub use oracle::{Classification, FnOracle, Oracle};
pub use params::{GngParams, MovePolicy, NnParams, PlanParams};
pub use plan::{Path, PlanEngine};
pub use point::Point;
