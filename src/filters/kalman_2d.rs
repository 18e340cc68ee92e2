//! Constant-position 2D Kalman filter.
//!
//! The motion model is trivial: the caller applies per-step displacement in
//! the predict step, so the state is just `(x, y)` with a symmetric 2x2
//! covariance stored as `(p00, p01, p11)`. Measurements are 2D positions
//! with isotropic noise (Wi-Fi fixes).

use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};

use crate::geometry::Point2;

/// Snapshot of the filter state for logging and inspection.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Kalman2DState {
    pub x: f64,
    pub y: f64,
    pub p00: f64,
    pub p01: f64,
    pub p11: f64,
}

pub struct Kalman2D {
    x: f64,
    y: f64,
    p00: f64,
    p01: f64,
    p11: f64,
}

impl Kalman2D {
    /// Default initial position sigma in meters.
    pub const DEFAULT_POS_SIGMA: f64 = 1.5;

    /// Create a filter at `start` with `P = sigma^2 * I`.
    pub fn new(start: Point2, pos_sigma: f64) -> Self {
        let var = pos_sigma * pos_sigma;
        Kalman2D {
            x: start.x,
            y: start.y,
            p00: var,
            p01: 0.0,
            p11: var,
        }
    }

    pub fn center(&self) -> Point2 {
        Point2::new(self.x, self.y)
    }

    pub fn state(&self) -> Kalman2DState {
        Kalman2DState {
            x: self.x,
            y: self.y,
            p00: self.p00,
            p01: self.p01,
            p11: self.p11,
        }
    }

    pub fn covariance_trace(&self) -> f64 {
        self.p00 + self.p11
    }

    /// Re-seed the filter at `p` (relocalization), discarding history.
    pub fn reset(&mut self, p: Point2, pos_sigma: f64) {
        *self = Kalman2D::new(p, pos_sigma);
    }

    /// Apply a displacement and inflate the positional variance.
    ///
    /// The off-diagonal term is left alone: process noise is isotropic and
    /// uncorrelated across axes.
    pub fn predict(&mut self, delta: Point2, proc_sigma: f64) {
        if !delta.is_finite() || !proc_sigma.is_finite() {
            return;
        }
        let q = (proc_sigma * proc_sigma).max(1e-6);
        self.x += delta.x;
        self.y += delta.y;
        self.p00 += q;
        self.p11 += q;
    }

    /// Absorb a 2D position measurement with isotropic noise.
    ///
    /// Skipped entirely when the innovation covariance is numerically
    /// singular (`det(S) <= 1e-12`). The posterior covariance is
    /// re-symmetrized before storing, so `p01` stays exact under roundoff.
    pub fn update(&mut self, z: Point2, meas_sigma: f64) {
        if !z.is_finite() || !meas_sigma.is_finite() {
            return;
        }
        let r = (meas_sigma * meas_sigma).max(1e-6);

        let p = Matrix2::new(self.p00, self.p01, self.p01, self.p11);
        let s = p + Matrix2::identity() * r;
        let det = s.determinant();
        if det <= 1e-12 {
            return;
        }

        // 2x2 inverse in closed form; no allocation anywhere on this path.
        let s_inv = Matrix2::new(s[(1, 1)], -s[(0, 1)], -s[(1, 0)], s[(0, 0)]) / det;
        let k = p * s_inv;

        let innovation = Vector2::new(z.x - self.x, z.y - self.y);
        let correction = k * innovation;
        self.x += correction.x;
        self.y += correction.y;

        let posterior = (Matrix2::identity() - k) * p;
        self.p00 = posterior[(0, 0)];
        self.p11 = posterior[(1, 1)];
        self.p01 = 0.5 * (posterior[(0, 1)] + posterior[(1, 0)]);
    }
}
