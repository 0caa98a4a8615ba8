// src/layout.rs
//
// Index map over the network's flat output vector.
//
// Every offset used by the decoders comes from the segment table built here.
// The table is evaluated once from `LayoutParams`, in a fixed order, and the
// sum of its lengths is the size of the executor's output buffer. Nothing
// else in the crate does offset arithmetic on the raw buffer without going
// through this table.

use crate::error::ModelError;
use std::ops::Range;

pub const TRAJECTORY_SIZE: usize = 33;
pub const MODEL_PATH_DISTANCE: f32 = 192.0;
pub const POLYFIT_DEGREE: usize = 4;

pub const PLAN_MHP_N: usize = 5;
pub const PLAN_MHP_COLUMNS: usize = 15;
pub const LANE_LINES_N: usize = 4;
pub const ROAD_EDGES_N: usize = 2;
pub const LINE_COLUMNS: usize = 2;
pub const LEAD_MHP_N: usize = 5;
pub const LEAD_MHP_VALS: usize = 4;
pub const LEAD_MHP_SELECTION: usize = 3;
pub const LEAD_PROB_N: usize = 3;
pub const DESIRE_LEN: usize = 8;
pub const OTHER_META_SIZE: usize = 4;
pub const DESIRE_PRED_SIZE: usize = 32;
pub const POSE_SIZE: usize = 12;
pub const TEMPORAL_SIZE: usize = 512;
pub const TRAFFIC_CONVENTION_LEN: usize = 2;

/// Named segments of the flat output, in buffer order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Plan,
    LaneLines,
    LaneLineProbs,
    RoadEdges,
    Lead,
    LeadProbs,
    DesireState,
    Meta,
    Pose,
    RecurrentState,
}

impl SegmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::LaneLines => "lane_lines",
            Self::LaneLineProbs => "lane_line_probs",
            Self::RoadEdges => "road_edges",
            Self::Lead => "lead",
            Self::LeadProbs => "lead_probs",
            Self::DesireState => "desire_state",
            Self::Meta => "meta",
            Self::Pose => "pose",
            Self::RecurrentState => "recurrent_state",
        }
    }
}

/// The compile-time shape of one network export.
///
/// `Default` is the pinned supercombo contract. Other values exist so the
/// layout can be checked for arbitrary shapes, and so a re-exported network
/// with a different hypothesis count can be described without code changes.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutParams {
    pub trajectory_size: usize,
    pub plan_hypotheses: usize,
    pub plan_columns: usize,
    pub lane_lines: usize,
    pub road_edges: usize,
    pub line_columns: usize,
    pub lead_hypotheses: usize,
    pub lead_vals: usize,
    pub lead_selection: usize,
    pub lead_probs: usize,
    pub desire_len: usize,
    pub other_meta: usize,
    pub desire_pred: usize,
    pub pose: usize,
    /// Recurrent state width, appended only in temporal mode
    pub temporal: Option<usize>,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            trajectory_size: TRAJECTORY_SIZE,
            plan_hypotheses: PLAN_MHP_N,
            plan_columns: PLAN_MHP_COLUMNS,
            lane_lines: LANE_LINES_N,
            road_edges: ROAD_EDGES_N,
            line_columns: LINE_COLUMNS,
            lead_hypotheses: LEAD_MHP_N,
            lead_vals: LEAD_MHP_VALS,
            lead_selection: LEAD_MHP_SELECTION,
            lead_probs: LEAD_PROB_N,
            desire_len: DESIRE_LEN,
            other_meta: OTHER_META_SIZE,
            desire_pred: DESIRE_PRED_SIZE,
            pose: POSE_SIZE,
            temporal: None,
        }
    }
}

impl LayoutParams {
    pub fn with_temporal(mut self, width: usize) -> Self {
        self.temporal = Some(width);
        self
    }

    /// Values per trajectory (means only)
    pub fn plan_vals(&self) -> usize {
        self.plan_columns * self.trajectory_size
    }

    /// Means, log-stds and the trailing hypothesis logit
    pub fn plan_group_size(&self) -> usize {
        2 * self.plan_vals() + 1
    }

    /// Means, raw stds and one weight logit per horizon
    pub fn lead_group_size(&self) -> usize {
        2 * self.lead_vals + self.lead_selection
    }

    pub fn line_vals(&self) -> usize {
        self.trajectory_size * self.line_columns
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub offset: usize,
    pub len: usize,
}

impl Segment {
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }
}

#[derive(Debug, Clone)]
pub struct OutputLayout {
    params: LayoutParams,
    segments: Vec<Segment>,
    total_len: usize,
}

impl OutputLayout {
    pub fn new(params: LayoutParams) -> Self {
        let mut lengths = vec![
            (
                SegmentKind::Plan,
                params.plan_hypotheses * params.plan_group_size(),
            ),
            (
                SegmentKind::LaneLines,
                2 * params.lane_lines * params.line_vals(),
            ),
            (SegmentKind::LaneLineProbs, params.lane_lines),
            (
                SegmentKind::RoadEdges,
                2 * params.road_edges * params.line_vals(),
            ),
            (
                SegmentKind::Lead,
                params.lead_hypotheses * params.lead_group_size(),
            ),
            (SegmentKind::LeadProbs, params.lead_probs),
            (SegmentKind::DesireState, params.desire_len),
            (SegmentKind::Meta, params.other_meta + params.desire_pred),
            (SegmentKind::Pose, params.pose),
        ];
        if let Some(width) = params.temporal {
            lengths.push((SegmentKind::RecurrentState, width));
        }

        let mut segments = Vec::with_capacity(lengths.len());
        let mut offset = 0;
        for (kind, len) in lengths {
            segments.push(Segment { kind, offset, len });
            offset += len;
        }

        Self {
            params,
            segments,
            total_len: offset,
        }
    }

    pub fn params(&self) -> &LayoutParams {
        &self.params
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Length of the whole output buffer, recurrent state included
    pub fn total_len(&self) -> usize {
        self.total_len
    }

    /// Length of the decoded outputs, recurrent state excluded
    pub fn decoded_len(&self) -> usize {
        self.total_len - self.params.temporal.unwrap_or(0)
    }

    pub fn range(&self, kind: SegmentKind) -> Option<Range<usize>> {
        self.segments
            .iter()
            .find(|s| s.kind == kind)
            .map(Segment::range)
    }

    /// Fails unless `len` is exactly the buffer length this layout describes.
    pub fn check_buffer_len(&self, len: usize) -> Result<(), ModelError> {
        if len != self.total_len {
            return Err(ModelError::LayoutMismatch {
                expected: self.total_len,
                actual: len,
            });
        }
        Ok(())
    }
}

impl Default for OutputLayout {
    fn default() -> Self {
        Self::new(LayoutParams::default())
    }
}
