// src/pipeline/messages.rs
//
// Logical schema of the two outbound messages. Transport framing is the
// bus implementation's concern; these only derive Serialize.

use serde::Serialize;

/// Fitted path, lane line or road edge.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathData {
    /// Raw samples behind the fit, debug dumps only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<f32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stds: Option<Vec<f32>>,
    /// `[x^3, x^2, x, offset]`
    pub poly: [f32; 4],
    pub prob: f32,
    /// Standard deviation at the near end
    pub std: f32,
    pub valid_len: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadData {
    pub prob: f32,
    pub dist: f32,
    pub std: f32,
    pub rel_y: f32,
    pub rel_y_std: f32,
    pub rel_vel: f32,
    pub rel_vel_std: f32,
    pub rel_a: f32,
    pub rel_a_std: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaData {
    pub desire_state: Vec<f32>,
    pub engaged_prob: f32,
    pub gas_disengage_prob: f32,
    pub brake_disengage_prob: f32,
    pub steer_override_prob: f32,
    pub desire_prediction: Vec<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelData {
    pub frame_id: u32,
    pub frame_age: u32,
    pub frame_drop_perc: f32,
    pub timestamp_eof: u64,
    /// Seconds spent inside the executor
    pub model_execution_time: f32,
    pub path: PathData,
    pub left_lane: PathData,
    pub right_lane: PathData,
    /// Left then right
    pub road_edges: Vec<PathData>,
    pub lane_line_probs: Vec<f32>,
    pub lead: LeadData,
    pub lead_future: LeadData,
    pub lead_probs: Vec<f32>,
    pub meta: MetaData,
}

/// Ego-motion estimate, rotations in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoseEstimate {
    pub trans: [f32; 3],
    pub trans_std: [f32; 3],
    pub rot: [f32; 3],
    pub rot_std: [f32; 3],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraOdometry {
    pub frame_id: u32,
    pub timestamp_eof: u64,
    #[serde(flatten)]
    pub pose: PoseEstimate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventPayload {
    Model(ModelData),
    CameraOdometry(CameraOdometry),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub log_mono_time: u64,
    /// Advisory; the event is published either way
    pub valid: bool,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    pub fn new(log_mono_time: u64, valid: bool, payload: EventPayload) -> Self {
        Self {
            log_mono_time,
            valid,
            payload,
        }
    }

    /// Bus service this event is published on
    pub fn service(&self) -> &'static str {
        match self.payload {
            EventPayload::Model(_) => "model",
            EventPayload::CameraOdometry(_) => "cameraOdometry",
        }
    }
}
