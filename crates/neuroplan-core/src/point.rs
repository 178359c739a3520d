//! Positions in R^d.
//!
//! [`Point`] carries exactly the arithmetic the engine needs: in-place
//! moves toward a target, squared/plain Euclidean distance, midpoints and
//! the dot product used by the obtuse-angle test. General vector/matrix
//! math is a collaborator concern and intentionally absent.

use serde::{Deserialize, Serialize};

/// Tolerance for degenerate geometry (zero-length legs, on-circle hits).
pub const GEOM_EPS: f64 = 1e-9;

/// A position in R^d. Dimension is fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point(Vec<f64>);

impl Point {
    pub fn new(coords: Vec<f64>) -> Self {
        Point(coords)
    }

    pub fn zeros(dim: usize) -> Self {
        Point(vec![0.0; dim])
    }

    /// 2-D convenience constructor (the demo worlds are planar).
    pub fn xy(x: f64, y: f64) -> Self {
        Point(vec![x, y])
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn coords(&self) -> &[f64] {
        &self.0
    }

    pub fn get(&self, axis: usize) -> f64 {
        self.0[axis]
    }

    /// Squared Euclidean distance to `other`.
    pub fn dist2(&self, other: &Point) -> f64 {
        self.0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| (a - b) * (a - b))
            .sum()
    }

    pub fn dist(&self, other: &Point) -> f64 {
        self.dist2(other).sqrt()
    }

    /// Moves `self` a fraction of the way toward `to`:
    /// `self ← self + frac · (to − self)`.
    pub fn move_towards(&mut self, to: &Point, frac: f64) {
        for (a, b) in self.0.iter_mut().zip(&to.0) {
            *a += frac * (b - *a);
        }
    }

    pub fn midpoint(a: &Point, b: &Point) -> Point {
        Point(a.0.iter().zip(&b.0).map(|(x, y)| 0.5 * (x + y)).collect())
    }

    /// Dot product of the legs `apex → a` and `apex → b`.
    ///
    /// Negative means the angle at `apex` is obtuse; within [`GEOM_EPS`]
    /// of zero means a right angle. Degenerate legs give 0 only when one
    /// endpoint coincides with the apex, which callers treat as "outside".
    pub fn legs_dot(apex: &Point, a: &Point, b: &Point) -> f64 {
        apex.0
            .iter()
            .zip(&a.0)
            .zip(&b.0)
            .map(|((m, x), y)| (x - m) * (y - m))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dist2_and_dist() {
        let a = Point::xy(0.0, 0.0);
        let b = Point::xy(3.0, 4.0);
        assert_eq!(a.dist2(&b), 25.0);
        assert_eq!(a.dist(&b), 5.0);
    }

    #[test]
    fn move_towards_fraction() {
        let mut a = Point::xy(0.0, 0.0);
        a.move_towards(&Point::xy(1.0, 2.0), 0.5);
        assert_eq!(a, Point::xy(0.5, 1.0));
    }

    #[test]
    fn midpoint_is_halfway() {
        let m = Point::midpoint(&Point::xy(0.0, 0.0), &Point::xy(2.0, 4.0));
        assert_eq!(m, Point::xy(1.0, 2.0));
    }

    #[test]
    fn legs_dot_signs() {
        let apex = Point::xy(0.5, 0.5);
        // Right angle at the apex of an isoceles construction.
        let d = Point::legs_dot(&apex, &Point::xy(0.0, 0.0), &Point::xy(1.0, 0.0));
        assert!(d.abs() < GEOM_EPS);
        // Acute.
        let d = Point::legs_dot(&apex, &Point::xy(0.0, 0.4), &Point::xy(0.0, 0.6));
        assert!(d > 0.0);
        // Obtuse.
        let d = Point::legs_dot(&apex, &Point::xy(0.0, 0.5), &Point::xy(1.0, 0.4));
        assert!(d < 0.0);
    }
}
