// src/analysis/poly_fit.rs
//
// Weighted cubic fit of a discretized trajectory.
//
// The basis is a Vandermonde matrix over the fixed, quadratically spaced
// longitudinal sample grid (X_IDXS), built once when the fitter is created
// and never mutated afterwards. Each row i holds x_i^3, x_i^2, x_i^1; the
// constant term is not fitted but taken from the first point, so the fit
// passes through the near end of the trajectory.
//
// Per call:
//   1. subtract y0 from all points (recorded as the offset coefficient)
//   2. divide basis rows and targets by the per-point sigma
//   3. scale every basis column to unit norm (the raw columns span ~7 orders
//      of magnitude at 192 m, unscaled they are badly conditioned)
//   4. least squares via Householder QR, then undo the column scale
//
// The sample grid is a contract with the network's output convention and is
// not something to retune here.

use nalgebra::{DMatrix, DVector};
use tracing::warn;

/// Number of fitted coefficients (the offset term is appended separately)
const FIT_TERMS: usize = crate::layout::POLYFIT_DEGREE - 1;

/// `[x^3, x^2, x, offset]`
pub type PolyCoefficients = [f32; crate::layout::POLYFIT_DEGREE];

/// Longitudinal sample positions, concentrated near the vehicle.
pub fn distance_samples(n: usize, max_distance: f32) -> Vec<f32> {
    quadratic_grid(n, max_distance)
}

/// `span / 1024 * i^2`; with 33 points the last sample lands exactly on `span`.
fn quadratic_grid(n: usize, span: f32) -> Vec<f32> {
    (0..n)
        .map(|i| span / 1024.0 * (i * i) as f32)
        .collect()
}

#[derive(Debug, Clone)]
pub struct CurveFitter {
    x_idxs: Vec<f32>,
    vander: DMatrix<f64>,
}

impl CurveFitter {
    pub fn new(n: usize, max_distance: f32) -> Self {
        let x_idxs = distance_samples(n, max_distance);
        let vander = DMatrix::from_fn(n, FIT_TERMS, |i, j| {
            (x_idxs[i] as f64).powi((FIT_TERMS - j) as i32)
        });
        Self { x_idxs, vander }
    }

    pub fn len(&self) -> usize {
        self.x_idxs.len()
    }

    pub fn x_idxs(&self) -> &[f32] {
        &self.x_idxs
    }

    /// Fit `points` (one per sample position) weighted by `stds`.
    ///
    /// Both slices must have exactly `self.len()` entries. A degenerate
    /// system (e.g. non-finite sigmas) yields zero curve terms and keeps the
    /// offset.
    pub fn fit(&self, points: &[f32], stds: &[f32]) -> PolyCoefficients {
        debug_assert_eq!(points.len(), self.len());
        debug_assert_eq!(stds.len(), self.len());

        let n = self.len();
        let y0 = points[0];

        let mut lhs = self.vander.clone();
        let mut rhs = DVector::<f64>::zeros(n);
        for i in 0..n {
            let sigma = stds[i] as f64;
            rhs[i] = (points[i] - y0) as f64 / sigma;
            for j in 0..FIT_TERMS {
                lhs[(i, j)] /= sigma;
            }
        }

        let mut scale = [0.0f64; FIT_TERMS];
        for (j, s) in scale.iter_mut().enumerate() {
            let norm = lhs.column(j).norm();
            *s = if norm > 0.0 { 1.0 / norm } else { 1.0 };
            lhs.column_mut(j).scale_mut(*s);
        }

        let mut out = [0.0f32; crate::layout::POLYFIT_DEGREE];
        match solve_least_squares(lhs, &rhs) {
            Some(p) => {
                for j in 0..FIT_TERMS {
                    out[j] = (p[j] * scale[j]) as f32;
                }
            }
            None => warn!("Degenerate trajectory fit, publishing offset only"),
        }
        out[FIT_TERMS] = y0;
        out
    }
}

/// Minimize ||A p - b|| via thin QR: R p = Q^T b.
fn solve_least_squares(lhs: DMatrix<f64>, rhs: &DVector<f64>) -> Option<DVector<f64>> {
    if !lhs.iter().all(|v| v.is_finite()) || !rhs.iter().all(|v| v.is_finite()) {
        return None;
    }
    let qr = lhs.qr();
    let qtb = qr.q().transpose() * rhs;
    let p = qr.r().solve_upper_triangular(&qtb)?;
    if p.iter().all(|v| v.is_finite()) {
        Some(p)
    } else {
        None
    }
}

/// Evaluate `[a, b, c, d]` at `x` as `a x^3 + b x^2 + c x + d`.
pub fn eval_poly(poly: &PolyCoefficients, x: f32) -> f32 {
    poly.iter().fold(0.0, |acc, c| acc * x + c)
}
