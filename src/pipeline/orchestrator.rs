// src/pipeline/orchestrator.rs
//
// One frame end to end:
//
//   PreparedFrame → ModelState::eval_frame → ModelOutput
//                 → FrameDropTracker      → FrameBookkeeping
//                 → Publisher (model + cameraOdometry) → MessageBus

use super::event_bus::MessageBus;
use super::frame_context::{FrameBookkeeping, FrameDropTracker};
use super::metrics::PipelineMetrics;
use super::publisher::Publisher;
use crate::analysis::estimates::EstimateDecoder;
use crate::inference::Executor;
use crate::model::ModelState;
use crate::types::PreparedFrame;
use anyhow::Result;
use std::time::Instant;
use tracing::{debug, warn};

/// What happened to one processed frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub book: FrameBookkeeping,
    pub model_valid: bool,
    pub odometry_valid: bool,
}

pub struct DrivingPipeline<E: Executor, B: MessageBus> {
    model: ModelState<E>,
    publisher: Publisher<B>,
    drops: FrameDropTracker,
    metrics: PipelineMetrics,
}

impl<E: Executor, B: MessageBus> DrivingPipeline<E, B> {
    pub fn new(model: ModelState<E>, bus: B, debug_dump: bool) -> Self {
        let decoder = EstimateDecoder::new(model.layout(), debug_dump);
        Self {
            model,
            publisher: Publisher::new(bus, decoder),
            drops: FrameDropTracker::new(),
            metrics: PipelineMetrics::new(),
        }
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub fn bus_mut(&mut self) -> &mut B {
        self.publisher.bus_mut()
    }

    /// Run the network on `frame` and publish both messages for it.
    ///
    /// `latest_frame_id` is the newest camera frame known at publish time and
    /// only feeds `frame_age`.
    pub fn process_frame(
        &mut self,
        frame: &PreparedFrame,
        latest_frame_id: u32,
        desire_in: Option<&[f32]>,
    ) -> Result<FrameReport> {
        let execution_time = self.model.eval_frame(&frame.data, desire_in)?;
        let book = self.drops.update(frame.frame_id, latest_frame_id);

        let decode_start = Instant::now();
        let output = self.model.output()?;
        let model_valid =
            self.publisher
                .publish_model(&book, &output, frame.timestamp_eof, execution_time)?;
        let odometry_valid = self
            .publisher
            .publish_odometry(&book, &output, frame.timestamp_eof)?;
        let decode_time = decode_start.elapsed();

        let m = &self.metrics;
        m.inc(&m.total_frames);
        m.add(&m.dropped_frames, book.vipc_dropped_frames as u64);
        m.set_timing(&m.execute_time_us, execution_time.as_micros() as u64);
        m.set_timing(&m.decode_time_us, decode_time.as_micros() as u64);
        if !model_valid {
            m.inc(&m.invalid_model_msgs);
            warn!(
                "Frame {}: model message invalid (drop {:.1}%)",
                frame.frame_id,
                book.frame_drop * 100.0
            );
        }
        if !odometry_valid {
            m.inc(&m.invalid_odometry_msgs);
        }

        debug!(
            "Frame {} published: execute {:.2} ms, decode {:.2} ms",
            frame.frame_id,
            execution_time.as_secs_f64() * 1000.0,
            decode_time.as_secs_f64() * 1000.0
        );

        Ok(FrameReport {
            book,
            model_valid,
            odometry_valid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::ExecutorInputs;
    use crate::analysis::poly_fit::distance_samples;
    use crate::layout::{
        OutputLayout, SegmentKind, MODEL_PATH_DISTANCE, PLAN_MHP_COLUMNS, TRAJECTORY_SIZE,
    };
    use crate::model::ModelSettings;
    use crate::pipeline::event_bus::EventBus;
    use crate::pipeline::messages::{Event, EventPayload, ModelData};
    use std::sync::atomic::Ordering;

    const WINNING_PLAN: usize = 2;
    const PATH_OFFSET: f32 = 0.5;
    const PATH_HEADING: f32 = 0.01;
    const PATH_END_X: f32 = 60.0;

    /// Writes the same canned buffer on every call.
    struct ScriptedExecutor {
        output: Vec<f32>,
    }

    impl Executor for ScriptedExecutor {
        fn output_len(&self) -> usize {
            self.output.len()
        }

        fn execute(&mut self, _inputs: &ExecutorInputs<'_>, output: &mut [f32]) -> Result<()> {
            output.copy_from_slice(&self.output);
            Ok(())
        }
    }

    /// Straight path on plan 2 (0.5 m offset, 0.01 heading); lead component 0
    /// wins now and component 1 wins in two seconds.
    fn scripted_output(layout: &OutputLayout) -> Vec<f32> {
        let mut out = vec![0.0; layout.total_len()];
        let params = layout.params();

        let plan = layout.range(SegmentKind::Plan).unwrap();
        let base = plan.start + WINNING_PLAN * params.plan_group_size();
        let x_idxs = distance_samples(TRAJECTORY_SIZE, MODEL_PATH_DISTANCE);
        for (i, x) in x_idxs.iter().enumerate() {
            out[base + i * PLAN_MHP_COLUMNS] = PATH_END_X * i as f32 / 32.0;
            out[base + i * PLAN_MHP_COLUMNS + 1] = PATH_OFFSET + PATH_HEADING * x;
        }
        out[base + 2 * params.plan_vals()] = 3.0;

        let lead = layout.range(SegmentKind::Lead).unwrap();
        let group = params.lead_group_size();
        let weights = 2 * params.lead_vals;
        out[lead.start] = 2.5;
        out[lead.start + weights] = 4.0;
        out[lead.start + group] = 3.5;
        out[lead.start + group + weights + 1] = 4.0;

        let pose = layout.range(SegmentKind::Pose).unwrap();
        out[pose.start + 3] = 180.0;
        out
    }

    fn pipeline() -> DrivingPipeline<ScriptedExecutor, EventBus> {
        let settings = ModelSettings {
            frame_size: 4,
            temporal: false,
            desire: true,
            traffic_convention: true,
            is_rhd: false,
        };
        let layout = OutputLayout::new(settings.layout_params());
        let exec = ScriptedExecutor {
            output: scripted_output(&layout),
        };
        let model = ModelState::new(exec, &settings).unwrap();
        DrivingPipeline::new(model, EventBus::new(16), false)
    }

    fn frame(frame_id: u32) -> PreparedFrame {
        PreparedFrame {
            frame_id,
            timestamp_eof: frame_id as u64 * 50_000_000,
            data: vec![0.0; 4],
            desire: None,
        }
    }

    fn model_data(events: &[Event]) -> &ModelData {
        match &events[0].payload {
            EventPayload::Model(m) => m,
            other => panic!("expected model first, got {:?}", other),
        }
    }

    #[test]
    fn test_two_messages_per_frame() {
        let mut p = pipeline();
        for id in 0..3 {
            p.process_frame(&frame(id), id, None).unwrap();
        }
        let events = p.bus_mut().drain();
        let services: Vec<&str> = events.iter().map(|e| e.service()).collect();
        assert_eq!(
            services,
            vec!["model", "cameraOdometry"].repeat(3),
            "model then odometry, once per frame"
        );
        assert_eq!(p.metrics().total_frames.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_straight_path_decoded_from_winning_plan() {
        let mut p = pipeline();
        p.process_frame(&frame(1), 1, None).unwrap();
        let events = p.bus_mut().drain();
        let m = model_data(&events);

        assert_eq!(m.path.prob, 1.0);
        assert!((m.path.valid_len - PATH_END_X).abs() < 1e-4);
        assert!(m.path.poly[0].abs() < 1e-8, "cubic term {}", m.path.poly[0]);
        assert!(m.path.poly[1].abs() < 1e-6, "quadratic term {}", m.path.poly[1]);
        assert!(
            (m.path.poly[2] - PATH_HEADING).abs() < 1e-5,
            "heading {}",
            m.path.poly[2]
        );
        assert!((m.path.poly[3] - PATH_OFFSET).abs() < 1e-6);
        // log-std 0 everywhere
        assert!((m.path.std - 1.0).abs() < 1e-6);
        assert!(m.path.points.is_none());
    }

    #[test]
    fn test_lanes_offset_and_full_length() {
        let mut p = pipeline();
        p.process_frame(&frame(1), 1, None).unwrap();
        let events = p.bus_mut().drain();
        let m = model_data(&events);

        assert!((m.left_lane.poly[3] - 1.8).abs() < 1e-4);
        assert!((m.right_lane.poly[3] + 1.8).abs() < 1e-4);
        assert_eq!(m.left_lane.prob, 0.5);
        assert_eq!(m.left_lane.valid_len, 192.0);
        assert_eq!(m.road_edges.len(), 2);
    }

    #[test]
    fn test_lead_selected_per_horizon() {
        let mut p = pipeline();
        p.process_frame(&frame(1), 1, None).unwrap();
        let events = p.bus_mut().drain();
        let m = model_data(&events);

        assert!((m.lead.dist - 25.0).abs() < 1e-4);
        assert!((m.lead_future.dist - 35.0).abs() < 1e-4);
        let expected = 1.0 / (1.0 + (-4.0f32).exp());
        assert!((m.lead.prob - expected).abs() < 1e-6);
        assert!((m.lead_future.prob - expected).abs() < 1e-6);
    }

    #[test]
    fn test_odometry_rotation_in_radians() {
        let mut p = pipeline();
        p.process_frame(&frame(1), 1, None).unwrap();
        let events = p.bus_mut().drain();
        match &events[1].payload {
            EventPayload::CameraOdometry(o) => {
                assert_eq!(o.frame_id, 1);
                assert_eq!(o.timestamp_eof, 50_000_000);
                assert!((o.pose.rot[0] - std::f32::consts::PI).abs() < 1e-5);
                assert!(o.pose.rot_std[0] > 0.0);
            }
            other => panic!("expected odometry, got {:?}", other),
        }
    }

    #[test]
    fn test_validity_follows_frame_drops() {
        let mut p = pipeline();
        for id in 0..20 {
            let report = p.process_frame(&frame(id), id, None).unwrap();
            assert!(report.model_valid && report.odometry_valid);
        }

        let report = p.process_frame(&frame(24), 26, None).unwrap();
        assert_eq!(report.book.vipc_dropped_frames, 4);
        assert_eq!(report.book.frame_age(), 2);
        assert!(!report.odometry_valid);
        // 0.4 filtered -> 0.4 / 1.4 drop ratio
        assert!(!report.model_valid);

        let events = p.bus_mut().drain();
        let last_two = &events[events.len() - 2..];
        assert!(last_two.iter().all(|e| !e.valid));
        assert_eq!(p.metrics().dropped_frames.load(Ordering::Relaxed), 4);
        assert_eq!(p.metrics().invalid_odometry_msgs.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_executor_error_publishes_nothing() {
        let mut p = pipeline();
        let bad = PreparedFrame {
            frame_id: 0,
            timestamp_eof: 0,
            data: vec![0.0; 3],
            desire: None,
        };
        assert!(p.process_frame(&bad, 0, None).is_err());
        assert_eq!(p.bus_mut().pending_count(), 0);
    }
}
