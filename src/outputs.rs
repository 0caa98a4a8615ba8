// src/outputs.rs
//
// Typed read-only views over one frame's flat output.
//
// All slicing goes through `OutputLayout`; the views below only know the
// inner arrangement of a segment (point-major trajectories, per-component
// lead blocks, the pose quadruple).

use crate::error::ModelError;
use crate::layout::{OutputLayout, SegmentKind};

/// Time horizons carried by the lead mixture weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadHorizon {
    Now,
    In2s,
}

impl LeadHorizon {
    /// Index of this horizon's weight logit within a component's selection block
    pub fn index(&self) -> usize {
        match self {
            Self::Now => 0,
            Self::In2s => 1,
        }
    }
}

/// One discretized trajectory: `len` points of `columns` values each, plus
/// a parallel block of log standard deviations.
#[derive(Debug, Clone, Copy)]
pub struct TrajectoryView<'a> {
    means: &'a [f32],
    log_stds: &'a [f32],
    columns: usize,
}

impl<'a> TrajectoryView<'a> {
    fn new(means: &'a [f32], log_stds: &'a [f32], columns: usize) -> Self {
        Self {
            means,
            log_stds,
            columns,
        }
    }

    pub fn len(&self) -> usize {
        self.means.len() / self.columns
    }

    pub fn value(&self, point: usize, column: usize) -> f32 {
        self.means[point * self.columns + column]
    }

    pub fn log_std(&self, point: usize, column: usize) -> f32 {
        self.log_stds[point * self.columns + column]
    }

    /// All point values of one column
    pub fn column(&self, column: usize) -> Vec<f32> {
        (0..self.len()).map(|i| self.value(i, column)).collect()
    }

    /// Per-point standard deviations of one column (decoded from log space)
    pub fn column_stds(&self, column: usize) -> Vec<f32> {
        (0..self.len()).map(|i| self.log_std(i, column).exp()).collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PlanHypothesis<'a> {
    pub trajectory: TrajectoryView<'a>,
    /// Unnormalized log-probability of this hypothesis
    pub logit: f32,
}

/// One Gaussian mixture component of the lead estimate.
#[derive(Debug, Clone, Copy)]
pub struct LeadComponent<'a> {
    block: &'a [f32],
    vals: usize,
}

impl<'a> LeadComponent<'a> {
    /// Mean of value `j` (0 dist, 1 lateral, 2 velocity, 3 acceleration)
    pub fn mean(&self, j: usize) -> f32 {
        self.block[j]
    }

    /// Raw (pre-softplus) spread of value `j`
    pub fn raw_std(&self, j: usize) -> f32 {
        self.block[self.vals + j]
    }

    pub fn weight(&self, horizon: LeadHorizon) -> f32 {
        self.block[2 * self.vals + horizon.index()]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PoseView<'a> {
    raw: &'a [f32],
}

impl<'a> PoseView<'a> {
    pub fn trans(&self) -> &'a [f32] {
        &self.raw[0..3]
    }

    /// Rotation rates, degrees-scaled
    pub fn rot(&self) -> &'a [f32] {
        &self.raw[3..6]
    }

    pub fn trans_std_raw(&self) -> &'a [f32] {
        &self.raw[6..9]
    }

    pub fn rot_std_raw(&self) -> &'a [f32] {
        &self.raw[9..12]
    }
}

/// Borrowed view of one frame's output buffer.
#[derive(Debug, Clone, Copy)]
pub struct ModelOutput<'a> {
    layout: &'a OutputLayout,
    data: &'a [f32],
}

impl<'a> ModelOutput<'a> {
    pub fn new(layout: &'a OutputLayout, data: &'a [f32]) -> Result<Self, ModelError> {
        layout.check_buffer_len(data.len())?;
        Ok(Self { layout, data })
    }

    pub fn layout(&self) -> &'a OutputLayout {
        self.layout
    }

    fn segment(&self, kind: SegmentKind) -> &'a [f32] {
        match self.layout.range(kind) {
            Some(range) => &self.data[range],
            None => &[],
        }
    }

    pub fn plan_hypothesis(&self, h: usize) -> PlanHypothesis<'a> {
        let params = self.layout.params();
        let vals = params.plan_vals();
        let base = h * params.plan_group_size();
        let seg = self.segment(SegmentKind::Plan);
        PlanHypothesis {
            trajectory: TrajectoryView::new(
                &seg[base..base + vals],
                &seg[base + vals..base + 2 * vals],
                params.plan_columns,
            ),
            logit: seg[base + 2 * vals],
        }
    }

    pub fn plan_logits(&self) -> impl Iterator<Item = f32> + 'a {
        let this = *self;
        (0..self.layout.params().plan_hypotheses).map(move |h| this.plan_hypothesis(h).logit)
    }

    fn line(&self, kind: SegmentKind, count: usize, idx: usize) -> TrajectoryView<'a> {
        let params = self.layout.params();
        let vals = params.line_vals();
        let seg = self.segment(kind);
        let means = idx * vals;
        let stds = count * vals + idx * vals;
        TrajectoryView::new(
            &seg[means..means + vals],
            &seg[stds..stds + vals],
            params.line_columns,
        )
    }

    pub fn lane_line(&self, idx: usize) -> TrajectoryView<'a> {
        self.line(SegmentKind::LaneLines, self.layout.params().lane_lines, idx)
    }

    pub fn lane_line_logits(&self) -> &'a [f32] {
        self.segment(SegmentKind::LaneLineProbs)
    }

    pub fn road_edge(&self, idx: usize) -> TrajectoryView<'a> {
        self.line(SegmentKind::RoadEdges, self.layout.params().road_edges, idx)
    }

    pub fn lead_component(&self, k: usize) -> LeadComponent<'a> {
        let params = self.layout.params();
        let group = params.lead_group_size();
        let seg = self.segment(SegmentKind::Lead);
        LeadComponent {
            block: &seg[k * group..(k + 1) * group],
            vals: params.lead_vals,
        }
    }

    pub fn lead_weights(&self, horizon: LeadHorizon) -> impl Iterator<Item = f32> + 'a {
        let this = *self;
        (0..self.layout.params().lead_hypotheses)
            .map(move |k| this.lead_component(k).weight(horizon))
    }

    pub fn lead_prob_logits(&self) -> &'a [f32] {
        self.segment(SegmentKind::LeadProbs)
    }

    pub fn desire_state(&self) -> &'a [f32] {
        self.segment(SegmentKind::DesireState)
    }

    /// Engaged, gas-disengage, brake-disengage, steer-override
    pub fn engagement(&self) -> &'a [f32] {
        &self.segment(SegmentKind::Meta)[..self.layout.params().other_meta]
    }

    pub fn desire_prediction(&self) -> &'a [f32] {
        &self.segment(SegmentKind::Meta)[self.layout.params().other_meta..]
    }

    pub fn pose(&self) -> PoseView<'a> {
        PoseView {
            raw: self.segment(SegmentKind::Pose),
        }
    }

    pub fn recurrent_state(&self) -> Option<&'a [f32]> {
        self.layout
            .range(SegmentKind::RecurrentState)
            .map(|range| &self.data[range])
    }
}
