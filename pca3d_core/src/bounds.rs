//! View bounds - per-axis `[min, max]` ranges of the 3D camera box.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Axis-aligned view box, one `[min, max]` range per axis (x, y, z).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds(pub [[f64; 2]; 3]);

impl Default for Bounds {
    fn default() -> Self {
        Self([[0.0, 0.0]; 3])
    }
}

impl Bounds {
    pub fn min(&self, axis: usize) -> f64 {
        self.0[axis][0]
    }

    pub fn max(&self, axis: usize) -> f64 {
        self.0[axis][1]
    }

    pub fn range(&self, axis: usize) -> f64 {
        self.0[axis][1] - self.0[axis][0]
    }

    pub fn midpoint(&self, axis: usize) -> f64 {
        0.5 * (self.0[axis][0] + self.0[axis][1])
    }

    /// Whether `point` lies inside the box (edges included).
    pub fn contains(&self, point: [f64; 3]) -> bool {
        (0..3).all(|a| point[a] >= self.min(a) && point[a] <= self.max(a))
    }

    /// Element-wise linear interpolation towards `other`.
    pub fn lerp(&self, other: &Bounds, t: f64) -> Bounds {
        let mut out = *self;
        for a in 0..3 {
            for e in 0..2 {
                out.0[a][e] = self.0[a][e] + (other.0[a][e] - self.0[a][e]) * t;
            }
        }
        out
    }

    /// Element-wise closeness: `|a - b| <= atol + rtol * |b|` with
    /// rtol = 1e-5 and atol = 1e-8.
    pub fn approx_eq(&self, other: &Bounds) -> bool {
        const RTOL: f64 = 1e-5;
        const ATOL: f64 = 1e-8;
        self.0
            .iter()
            .flatten()
            .zip(other.0.iter().flatten())
            .all(|(a, b)| (a - b).abs() <= ATOL + RTOL * b.abs())
    }
}

/// Cube bounds of the rows of `points` [samples, 3].
///
/// The axis-aligned box is widened on every axis to the largest per-axis
/// range, centred on that axis's midpoint. Empty input yields a zero cube.
pub fn cube_bounds_for(points: &DMatrix<f64>) -> Bounds {
    cube_bounds_for_all(std::slice::from_ref(points))
}

/// Cube bounds covering the rows of every matrix in `sets`.
pub fn cube_bounds_for_all(sets: &[DMatrix<f64>]) -> Bounds {
    let mut lo = [f64::INFINITY; 3];
    let mut hi = [f64::NEG_INFINITY; 3];
    let mut any = false;

    for points in sets {
        for row in points.row_iter() {
            any = true;
            for a in 0..3.min(row.len()) {
                lo[a] = lo[a].min(row[a]);
                hi[a] = hi[a].max(row[a]);
            }
        }
    }
    if !any {
        return Bounds::default();
    }

    let side = (0..3).map(|a| hi[a] - lo[a]).fold(0.0, f64::max);
    let mut bounds = Bounds::default();
    for a in 0..3 {
        let mid = 0.5 * (lo[a] + hi[a]);
        bounds.0[a] = [mid - 0.5 * side, mid + 0.5 * side];
    }
    bounds
}
