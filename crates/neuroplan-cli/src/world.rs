//! Planar demo worlds: an AABB sampling domain with disc and box
//! obstacles, wired into the engine's oracle boundary.

use crate::config::Config;
use neuroplan_core::oracle::{Classification, Oracle};
use neuroplan_core::point::Point;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone)]
pub struct World {
    /// Sampling domain, `[xmin, xmax, ymin, ymax]`.
    pub aabb: [f64; 4],
    pub start: Point,
    pub goal: Point,
    /// Disc obstacles: centre + radius.
    pub discs: Vec<([f64; 2], f64)>,
    /// Box obstacles, `[xmin, xmax, ymin, ymax]`.
    pub boxes: Vec<[f64; 4]>,
}

impl World {
    /// Builds a world from a parsed config. Required keys: `aabb:f[4]`,
    /// `start:v2`, `goal:v2`. Obstacles come from the parallel arrays
    /// `discs:v2[n]` + `disc_r:f[n]`, and `boxes:f[4n]`.
    pub fn from_config(cfg: &Config) -> Result<World, String> {
        let aabb = cfg
            .flt_arr("aabb")
            .ok_or("missing 'aabb:f[4]'")?
            .try_into()
            .map_err(|_| "'aabb' must have 4 components".to_string())?;
        let start = cfg.v2("start").ok_or("missing 'start:v2'")?;
        let goal = cfg.v2("goal").ok_or("missing 'goal:v2'")?;

        let centres = cfg.v2_arr("discs").unwrap_or(&[]);
        let radii = cfg.flt_arr("disc_r").unwrap_or(&[]);
        if centres.len() != radii.len() {
            return Err("'discs' and 'disc_r' must have the same length".into());
        }
        let discs = centres.iter().copied().zip(radii.iter().copied()).collect();

        let boxes = match cfg.flt_arr("boxes") {
            Some(flat) if flat.len() % 4 == 0 => flat
                .chunks(4)
                .map(|c| [c[0], c[1], c[2], c[3]])
                .collect(),
            Some(_) => return Err("'boxes' length must be a multiple of 4".into()),
            None => Vec::new(),
        };

        Ok(World {
            aabb,
            start: Point::xy(start[0], start[1]),
            goal: Point::xy(goal[0], goal[1]),
            discs,
            boxes,
        })
    }

    pub fn collides(&self, w: &Point) -> bool {
        let (x, y) = (w.get(0), w.get(1));
        for (c, r) in &self.discs {
            let (dx, dy) = (x - c[0], y - c[1]);
            if dx * dx + dy * dy <= r * r {
                return true;
            }
        }
        for b in &self.boxes {
            if x >= b[0] && x <= b[1] && y >= b[2] && y <= b[3] {
                return true;
            }
        }
        false
    }
}

/// Oracle over a [`World`]: uniform samples from the AABB, collision
/// checks against the obstacles, termination on a step budget.
pub struct WorldOracle {
    world: World,
    rng: StdRng,
    steps_left: u64,
    evals: u64,
}

impl WorldOracle {
    pub fn new(world: World, max_steps: u64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self { world, rng, steps_left: max_steps, evals: 0 }
    }
}

impl Oracle for WorldOracle {
    fn input_signal(&mut self) -> Point {
        let [xmin, xmax, ymin, ymax] = self.world.aabb;
        Point::xy(self.rng.gen_range(xmin..xmax), self.rng.gen_range(ymin..ymax))
    }

    fn eval(&mut self, w: &Point) -> Classification {
        self.evals += 1;
        if self.world.collides(w) {
            Classification::Obst
        } else {
            Classification::Free
        }
    }

    fn terminate(&mut self) -> bool {
        if self.steps_left == 0 {
            return true;
        }
        self.steps_left -= 1;
        false
    }

    fn callback(&mut self) {
        log::info!("progress: {} collision checks so far", self.evals);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_cfg() -> Config {
        Config::parse(
            "aabb:f[4] = 0 1 0 1\n\
             start:v2 = 0.1 0.5\n\
             goal:v2 = 0.9 0.5\n\
             discs:v2[1] = 0.5 0.5\n\
             disc_r:f[1] = 0.2\n\
             boxes:f[4] = 0.0 0.1 0.8 1.0\n",
        )
        .unwrap()
    }

    #[test]
    fn world_from_config() {
        let world = World::from_config(&demo_cfg()).unwrap();
        assert_eq!(world.discs.len(), 1);
        assert_eq!(world.boxes.len(), 1);
        assert!(world.collides(&Point::xy(0.5, 0.5)));
        assert!(world.collides(&Point::xy(0.05, 0.9)));
        assert!(!world.collides(&Point::xy(0.9, 0.1)));
    }

    #[test]
    fn mismatched_disc_arrays_are_rejected() {
        let cfg = Config::parse(
            "aabb:f[4] = 0 1 0 1\n\
             start:v2 = 0.1 0.5\n\
             goal:v2 = 0.9 0.5\n\
             discs:v2[2] = 0.5 0.5 0.2 0.2\n\
             disc_r:f[1] = 0.2\n",
        )
        .unwrap();
        assert!(World::from_config(&cfg).is_err());
    }

    #[test]
    fn oracle_budget_terminates() {
        let world = World::from_config(&demo_cfg()).unwrap();
        let mut oracle = WorldOracle::new(world, 2, Some(1));
        assert!(!oracle.terminate());
        assert!(!oracle.terminate());
        assert!(oracle.terminate());
    }
}
