// src/analysis/estimates.rs
//
// Raw activations -> physical estimates.
//
//   paths   : weighted cubic fit of one trajectory column, std at the near
//             end, probability and valid length per the conventions below
//   leads   : distance/lateral scaled by 10, spreads through softplus
//   pose    : translation as-is, rotation degrees -> radians, spreads
//             through softplus with a 1e-6 floor
//   meta    : passed through, the network already squashes these
//
// Convention asymmetry kept on purpose: the primary path takes its valid
// length from the network and a literal confidence; lane lines take their
// probability from the network, a literal +-1.8 m offset and are always
// valid to the full distance.

use super::poly_fit::{eval_poly, CurveFitter};
use crate::layout::{OutputLayout, MODEL_PATH_DISTANCE};
use crate::outputs::{LeadHorizon, ModelOutput, TrajectoryView};
use crate::pipeline::messages::{LeadData, MetaData, PathData, PoseEstimate};
use std::f32::consts::PI;
use tracing::debug;

/// Literal confidence published for the selected plan
pub const PATH_CONFIDENCE: f32 = 1.0;
/// Lateral offset added to left lane points (negated for the right lane)
pub const LANE_OFFSET: f32 = 1.8;
pub const MIN_VALID_LEN: f32 = 5.0;

const LEAD_X_SCALE: f32 = 10.0;
const LEAD_Y_SCALE: f32 = 10.0;
const POSE_STD_FLOOR: f32 = 1e-6;

/// Plan columns: longitudinal x and lateral y
const PLAN_X: usize = 0;
const PLAN_Y: usize = 1;
/// Lane line / road edge columns: lateral y
const LINE_Y: usize = 0;

/// Lane line indices of the ego lane boundaries
pub const LEFT_LANE_IDX: usize = 1;
pub const RIGHT_LANE_IDX: usize = 2;

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// `ln(1 + e^x)`, evaluated without overflow and never below the smallest
/// positive normal f32.
pub fn softplus(x: f32) -> f32 {
    let v = x.max(0.0) + (-x.abs()).exp().ln_1p();
    v.max(f32::MIN_POSITIVE)
}

/// Clamp a network valid length to `[5, MODEL_PATH_DISTANCE]`; NaN maps to 5.
pub fn clamp_valid_len(raw: f32) -> f32 {
    raw.max(MIN_VALID_LEN).min(MODEL_PATH_DISTANCE)
}

pub struct EstimateDecoder {
    fitter: CurveFitter,
    /// Attach raw points/stds to every path message
    debug_dump: bool,
}

impl EstimateDecoder {
    pub fn new(layout: &OutputLayout, debug_dump: bool) -> Self {
        Self {
            fitter: CurveFitter::new(layout.params().trajectory_size, MODEL_PATH_DISTANCE),
            debug_dump,
        }
    }

    fn fill_path(
        &self,
        trajectory: &TrajectoryView<'_>,
        column: usize,
        offset: f32,
        prob: f32,
        valid_len: f32,
    ) -> PathData {
        let points: Vec<f32> = trajectory
            .column(column)
            .into_iter()
            .map(|p| p + offset)
            .collect();
        let stds = trajectory.column_stds(column);
        let poly = self.fitter.fit(&points, &stds);
        let std = stds[0];

        let (points, stds) = if self.debug_dump {
            let last = points.len() - 1;
            let far = self.fitter.x_idxs()[last];
            debug!(
                "Fit residual at {:.0} m: {:.3}",
                far,
                eval_poly(&poly, far) - points[last]
            );
            (Some(points), Some(stds))
        } else {
            (None, None)
        };

        PathData {
            points,
            stds,
            poly,
            prob,
            std,
            valid_len,
        }
    }

    /// Path from the selected plan hypothesis
    pub fn path(&self, output: &ModelOutput<'_>, plan_idx: usize) -> PathData {
        let plan = output.plan_hypothesis(plan_idx);
        // x position at the last point (10 s) is the trusted extent
        let last = plan.trajectory.len() - 1;
        let valid_len = clamp_valid_len(plan.trajectory.value(last, PLAN_X));
        self.fill_path(&plan.trajectory, PLAN_Y, 0.0, PATH_CONFIDENCE, valid_len)
    }

    /// Lane line `idx`, shifted by `offset` and always valid to full distance
    pub fn lane(&self, output: &ModelOutput<'_>, idx: usize, offset: f32) -> PathData {
        let prob = sigmoid(output.lane_line_logits()[idx]);
        self.fill_path(
            &output.lane_line(idx),
            LINE_Y,
            offset,
            prob,
            MODEL_PATH_DISTANCE,
        )
    }

    /// Road edge `idx`; the network emits no edge probability
    pub fn road_edge(&self, output: &ModelOutput<'_>, idx: usize) -> PathData {
        self.fill_path(
            &output.road_edge(idx),
            LINE_Y,
            0.0,
            1.0,
            MODEL_PATH_DISTANCE,
        )
    }

    pub fn lane_line_probs(&self, output: &ModelOutput<'_>) -> Vec<f32> {
        output.lane_line_logits().iter().map(|&l| sigmoid(l)).collect()
    }

    pub fn lead_probs(&self, output: &ModelOutput<'_>) -> Vec<f32> {
        output.lead_prob_logits().iter().map(|&l| sigmoid(l)).collect()
    }

    /// Decode mixture component `component`, probability taken at `horizon`
    pub fn lead(
        &self,
        output: &ModelOutput<'_>,
        component: usize,
        horizon: LeadHorizon,
    ) -> LeadData {
        let c = output.lead_component(component);
        LeadData {
            prob: sigmoid(c.weight(horizon)),
            dist: LEAD_X_SCALE * c.mean(0),
            std: LEAD_X_SCALE * softplus(c.raw_std(0)),
            rel_y: LEAD_Y_SCALE * c.mean(1),
            rel_y_std: LEAD_Y_SCALE * softplus(c.raw_std(1)),
            rel_vel: c.mean(2),
            rel_vel_std: softplus(c.raw_std(2)),
            rel_a: c.mean(3),
            rel_a_std: softplus(c.raw_std(3)),
        }
    }

    pub fn meta(&self, output: &ModelOutput<'_>) -> MetaData {
        let engagement = output.engagement();
        MetaData {
            desire_state: output.desire_state().to_vec(),
            engaged_prob: engagement[0],
            gas_disengage_prob: engagement[1],
            brake_disengage_prob: engagement[2],
            steer_override_prob: engagement[3],
            desire_prediction: output.desire_prediction().to_vec(),
        }
    }

    pub fn pose(&self, output: &ModelOutput<'_>) -> PoseEstimate {
        let pose = output.pose();
        let mut est = PoseEstimate::default();
        for i in 0..3 {
            est.trans[i] = pose.trans()[i];
            est.trans_std[i] = softplus(pose.trans_std_raw()[i]) + POSE_STD_FLOOR;
            est.rot[i] = PI * pose.rot()[i] / 180.0;
            est.rot_std[i] = PI * (softplus(pose.rot_std_raw()[i]) + POSE_STD_FLOOR) / 180.0;
        }
        est
    }
}
