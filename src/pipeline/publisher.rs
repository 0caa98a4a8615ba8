// src/pipeline/publisher.rs
//
// Builds the two outbound messages from one frame's outputs and hands them
// to the bus. Both are sent every frame; validity is a flag on the event,
// never a reason to withhold it.

use super::event_bus::MessageBus;
use super::frame_context::FrameBookkeeping;
use super::messages::{CameraOdometry, Event, EventPayload, ModelData};
use crate::analysis::estimates::{EstimateDecoder, LANE_OFFSET, LEFT_LANE_IDX, RIGHT_LANE_IDX};
use crate::analysis::hypothesis::{select_lead, select_plan};
use crate::outputs::{LeadHorizon, ModelOutput};
use anyhow::Result;
use std::time::{Duration, Instant};
use tracing::debug;

/// Model messages are valid while the filtered drop ratio stays below this
pub const MAX_FRAME_DROP: f32 = 0.05;

pub struct Publisher<B: MessageBus> {
    bus: B,
    decoder: EstimateDecoder,
    clock: Instant,
}

impl<B: MessageBus> Publisher<B> {
    pub fn new(bus: B, decoder: EstimateDecoder) -> Self {
        Self {
            bus,
            decoder,
            clock: Instant::now(),
        }
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    fn log_mono_time(&self) -> u64 {
        self.clock.elapsed().as_nanos() as u64
    }

    /// Decode the model message without sending it.
    pub fn build_model(
        &self,
        book: &FrameBookkeeping,
        output: &ModelOutput<'_>,
        timestamp_eof: u64,
        execution_time: Duration,
    ) -> ModelData {
        let plan_idx = select_plan(output);
        let lead_now_idx = select_lead(output, LeadHorizon::Now);
        let lead_future_idx = select_lead(output, LeadHorizon::In2s);
        debug!(
            "Selected plan {}, lead now {}, lead +2s {}",
            plan_idx, lead_now_idx, lead_future_idx
        );

        let road_edges = (0..output.layout().params().road_edges)
            .map(|e| self.decoder.road_edge(output, e))
            .collect();

        ModelData {
            frame_id: book.vipc_frame_id,
            frame_age: book.frame_age(),
            frame_drop_perc: book.frame_drop * 100.0,
            timestamp_eof,
            model_execution_time: execution_time.as_secs_f32(),
            path: self.decoder.path(output, plan_idx),
            left_lane: self.decoder.lane(output, LEFT_LANE_IDX, LANE_OFFSET),
            right_lane: self.decoder.lane(output, RIGHT_LANE_IDX, -LANE_OFFSET),
            road_edges,
            lane_line_probs: self.decoder.lane_line_probs(output),
            lead: self.decoder.lead(output, lead_now_idx, LeadHorizon::Now),
            lead_future: self.decoder.lead(output, lead_future_idx, LeadHorizon::In2s),
            lead_probs: self.decoder.lead_probs(output),
            meta: self.decoder.meta(output),
        }
    }

    pub fn build_odometry(
        &self,
        book: &FrameBookkeeping,
        output: &ModelOutput<'_>,
        timestamp_eof: u64,
    ) -> CameraOdometry {
        CameraOdometry {
            frame_id: book.vipc_frame_id,
            timestamp_eof,
            pose: self.decoder.pose(output),
        }
    }

    /// Publish the model message; returns its validity flag.
    pub fn publish_model(
        &mut self,
        book: &FrameBookkeeping,
        output: &ModelOutput<'_>,
        timestamp_eof: u64,
        execution_time: Duration,
    ) -> Result<bool> {
        let valid = book.frame_drop < MAX_FRAME_DROP;
        let model = self.build_model(book, output, timestamp_eof, execution_time);
        let event = Event::new(self.log_mono_time(), valid, EventPayload::Model(model));
        self.bus.send(event)?;
        Ok(valid)
    }

    /// Publish camera odometry; valid only when no frame was dropped.
    pub fn publish_odometry(
        &mut self,
        book: &FrameBookkeeping,
        output: &ModelOutput<'_>,
        timestamp_eof: u64,
    ) -> Result<bool> {
        let valid = book.vipc_dropped_frames < 1;
        let odometry = self.build_odometry(book, output, timestamp_eof);
        let event = Event::new(
            self.log_mono_time(),
            valid,
            EventPayload::CameraOdometry(odometry),
        );
        self.bus.send(event)?;
        Ok(valid)
    }
}
