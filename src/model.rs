// src/model.rs
//
// Process-lifetime model state: executor, two-frame input window, output
// buffer and the optional conditioning inputs.
//
// One instance per camera stream. Nothing here is shared or locked; a
// second stream gets its own ModelState.

use crate::error::ModelError;
use crate::frame_buffer::TemporalFrameBuffer;
use crate::inference::{Executor, ExecutorInputs};
use crate::layout::{
    LayoutParams, OutputLayout, SegmentKind, DESIRE_LEN, TEMPORAL_SIZE, TRAFFIC_CONVENTION_LEN,
};
use crate::outputs::ModelOutput;
use crate::types::Config;
use anyhow::Result;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// A desire component must jump by more than this to count as a rising edge
const DESIRE_EDGE_THRESHOLD: f32 = 0.99;

/// One-hot driving-side input: `[left-hand drive, right-hand drive]`
pub fn traffic_convention(is_rhd: bool) -> [f32; TRAFFIC_CONVENTION_LEN] {
    let mut tc = [0.0; TRAFFIC_CONVENTION_LEN];
    tc[if is_rhd { 1 } else { 0 }] = 1.0;
    tc
}

/// One-hot desire request; out-of-range requests yield all zeros.
pub fn desire_one_hot(desire: Option<usize>) -> [f32; DESIRE_LEN] {
    let mut v = [0.0; DESIRE_LEN];
    if let Some(d) = desire.filter(|&d| d < DESIRE_LEN) {
        v[d] = 1.0;
    }
    v
}

/// Rising-edge detector for the desire input.
///
/// The network decides when a requested action is done, so a desire is only
/// forwarded on the frame it switches on. The first frame has no history and
/// never pulses.
#[derive(Debug, Clone)]
pub struct DesirePulse {
    prev: Option<Vec<f32>>,
    pulse: Vec<f32>,
}

impl DesirePulse {
    pub fn new(len: usize) -> Self {
        Self {
            prev: None,
            pulse: vec![0.0; len],
        }
    }

    /// Compute this frame's pulse without touching the history.
    fn prepare(&mut self, desire_in: Option<&[f32]>) -> Result<(), ModelError> {
        self.pulse.iter_mut().for_each(|p| *p = 0.0);
        let desire_in = match desire_in {
            Some(d) => d,
            None => return Ok(()),
        };
        if desire_in.len() != self.pulse.len() {
            return Err(ModelError::InputSize {
                name: "desire",
                expected: self.pulse.len(),
                actual: desire_in.len(),
            });
        }
        if let Some(prev) = &self.prev {
            for (i, (&cur, &old)) in desire_in.iter().zip(prev.iter()).enumerate() {
                if cur - old > DESIRE_EDGE_THRESHOLD {
                    self.pulse[i] = cur;
                }
            }
        }
        Ok(())
    }

    /// Record this frame's desire as history for the next one.
    fn commit(&mut self, desire_in: Option<&[f32]>) {
        if let Some(d) = desire_in {
            match &mut self.prev {
                Some(prev) => prev.copy_from_slice(d),
                None => self.prev = Some(d.to_vec()),
            }
        }
    }

    pub fn pulse(&self) -> &[f32] {
        &self.pulse
    }
}

/// Construction-time switches for the optional model slots.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub frame_size: usize,
    pub temporal: bool,
    pub desire: bool,
    pub traffic_convention: bool,
    pub is_rhd: bool,
}

impl ModelSettings {
    pub fn from_config(config: &Config, is_rhd: bool) -> Self {
        Self {
            frame_size: config.model.frame_size,
            temporal: config.runtime.temporal,
            desire: config.runtime.desire,
            traffic_convention: config.runtime.traffic_convention,
            is_rhd,
        }
    }

    pub fn layout_params(&self) -> LayoutParams {
        let params = LayoutParams::default();
        if self.temporal {
            params.with_temporal(TEMPORAL_SIZE)
        } else {
            params
        }
    }
}

pub struct ModelState<E: Executor> {
    layout: OutputLayout,
    executor: E,
    frames: TemporalFrameBuffer,
    output: Vec<f32>,
    /// Fed back as input next frame; only in temporal mode
    recurrent_state: Option<Vec<f32>>,
    desire: Option<DesirePulse>,
    traffic_convention: Option<[f32; TRAFFIC_CONVENTION_LEN]>,
}

impl<E: Executor> ModelState<E> {
    /// Allocate buffers and validate the executor against the layout.
    ///
    /// A size mismatch aborts here: decoding with a drifted index map would
    /// silently corrupt every estimate.
    pub fn new(executor: E, settings: &ModelSettings) -> Result<Self> {
        let layout = OutputLayout::new(settings.layout_params());
        layout.check_buffer_len(executor.output_len())?;

        let recurrent_state = layout.params().temporal.map(|w| vec![0.0; w]);
        let desire = settings.desire.then(|| DesirePulse::new(DESIRE_LEN));
        let traffic_convention = settings
            .traffic_convention
            .then(|| traffic_convention(settings.is_rhd));

        for seg in layout.segments() {
            debug!("  {:<16} [{}..{})", seg.kind.as_str(), seg.offset, seg.offset + seg.len);
        }
        info!(
            "Model state ready: output={} floats ({} decoded), temporal={}, desire={}, traffic_convention={:?}",
            layout.total_len(),
            layout.decoded_len(),
            recurrent_state.is_some(),
            desire.is_some(),
            traffic_convention
        );

        Ok(Self {
            output: vec![0.0; layout.total_len()],
            frames: TemporalFrameBuffer::new(settings.frame_size),
            layout,
            executor,
            recurrent_state,
            desire,
            traffic_convention,
        })
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Run one frame: update conditioning, shift the input window and
    /// execute. Returns the forward-pass wall time; read the results with
    /// `output()`.
    pub fn eval_frame(&mut self, frame: &[f32], desire_in: Option<&[f32]>) -> Result<Duration> {
        if let Some(desire) = &mut self.desire {
            desire.prepare(desire_in)?;
        }
        self.frames.push(frame)?;

        let inputs = ExecutorInputs {
            frames: self.frames.as_slice(),
            desire: self.desire.as_ref().map(|d| d.pulse()),
            traffic_convention: self.traffic_convention.as_ref().map(|tc| &tc[..]),
            recurrent_state: self.recurrent_state.as_deref(),
        };

        let started = Instant::now();
        self.executor.execute(&inputs, &mut self.output)?;
        let execution_time = started.elapsed();

        if let Some(desire) = &mut self.desire {
            desire.commit(desire_in);
        }
        if let (Some(state), Some(range)) = (
            &mut self.recurrent_state,
            self.layout.range(SegmentKind::RecurrentState),
        ) {
            state.copy_from_slice(&self.output[range]);
        }

        debug!(
            "Executed frame in {:.2} ms",
            execution_time.as_secs_f64() * 1000.0
        );
        Ok(execution_time)
    }

    /// View of the most recent forward pass
    pub fn output(&self) -> Result<ModelOutput<'_>, ModelError> {
        ModelOutput::new(&self.layout, &self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records what it was fed and writes a counter into the output.
    struct RecordingExecutor {
        output_len: usize,
        calls: usize,
        seen_frames: Vec<Vec<f32>>,
        seen_desire: Vec<Option<Vec<f32>>>,
        seen_tc: Vec<Option<Vec<f32>>>,
        seen_state: Vec<Option<Vec<f32>>>,
    }

    impl RecordingExecutor {
        fn new(output_len: usize) -> Self {
            Self {
                output_len,
                calls: 0,
                seen_frames: Vec::new(),
                seen_desire: Vec::new(),
                seen_tc: Vec::new(),
                seen_state: Vec::new(),
            }
        }
    }

    impl Executor for RecordingExecutor {
        fn output_len(&self) -> usize {
            self.output_len
        }

        fn execute(&mut self, inputs: &ExecutorInputs<'_>, output: &mut [f32]) -> Result<()> {
            self.calls += 1;
            self.seen_frames.push(inputs.frames.to_vec());
            self.seen_desire.push(inputs.desire.map(|d| d.to_vec()));
            self.seen_tc.push(inputs.traffic_convention.map(|d| d.to_vec()));
            self.seen_state.push(inputs.recurrent_state.map(|d| d.to_vec()));
            output.iter_mut().for_each(|v| *v = self.calls as f32);
            Ok(())
        }
    }

    fn settings() -> ModelSettings {
        ModelSettings {
            frame_size: 2,
            temporal: false,
            desire: true,
            traffic_convention: true,
            is_rhd: false,
        }
    }

    #[test]
    fn test_output_size_mismatch_is_fatal() {
        let exec = RecordingExecutor::new(100);
        let err = match ModelState::new(exec, &settings()) {
            Ok(_) => panic!("mismatched executor must be rejected"),
            Err(e) => e,
        };
        assert!(matches!(
            err.downcast_ref::<ModelError>(),
            Some(ModelError::LayoutMismatch { actual: 100, .. })
        ));
    }

    #[test]
    fn test_frames_window_fed_to_executor() {
        let len = OutputLayout::default().total_len();
        let mut state = ModelState::new(RecordingExecutor::new(len), &settings()).unwrap();
        state.eval_frame(&[1.0, 2.0], None).unwrap();
        state.eval_frame(&[3.0, 4.0], None).unwrap();
        assert_eq!(state.executor.seen_frames[0], vec![0.0, 0.0, 1.0, 2.0]);
        assert_eq!(state.executor.seen_frames[1], vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(
            state.executor.seen_tc[0],
            Some(vec![1.0, 0.0]),
            "left-hand drive one-hot"
        );
    }

    #[test]
    fn test_desire_pulses_on_rising_edge_only() {
        let len = OutputLayout::default().total_len();
        let mut state = ModelState::new(RecordingExecutor::new(len), &settings()).unwrap();
        let off = desire_one_hot(None);
        let left = desire_one_hot(Some(3));

        // first frame: no history, no pulse even though the desire is on
        state.eval_frame(&[0.0, 0.0], Some(&left)).unwrap();
        state.eval_frame(&[0.0, 0.0], Some(&off)).unwrap();
        state.eval_frame(&[0.0, 0.0], Some(&left)).unwrap();
        state.eval_frame(&[0.0, 0.0], Some(&left)).unwrap();

        let seen: Vec<f32> = state
            .executor
            .seen_desire
            .iter()
            .map(|d| d.as_ref().unwrap()[3])
            .collect();
        assert_eq!(seen, vec![0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_desire_wrong_width_rejected() {
        let len = OutputLayout::default().total_len();
        let mut state = ModelState::new(RecordingExecutor::new(len), &settings()).unwrap();
        let err = state.eval_frame(&[0.0, 0.0], Some(&[1.0, 0.0])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ModelError>(),
            Some(ModelError::InputSize { name: "desire", .. })
        ));
    }

    #[test]
    fn test_recurrent_state_fed_back() {
        let settings = ModelSettings {
            temporal: true,
            ..settings()
        };
        let len = OutputLayout::new(settings.layout_params()).total_len();
        let mut state = ModelState::new(RecordingExecutor::new(len), &settings).unwrap();
        state.eval_frame(&[0.0, 0.0], None).unwrap();
        assert_eq!(
            state.output().unwrap().recurrent_state().unwrap(),
            &vec![1.0; TEMPORAL_SIZE][..]
        );
        state.eval_frame(&[0.0, 0.0], None).unwrap();

        assert_eq!(state.executor.seen_state[0], Some(vec![0.0; TEMPORAL_SIZE]));
        assert_eq!(state.executor.seen_state[1], Some(vec![1.0; TEMPORAL_SIZE]));
        assert!(state.layout().range(SegmentKind::RecurrentState).is_some());
    }

    #[test]
    fn test_optional_slots_absent_when_disabled() {
        let settings = ModelSettings {
            desire: false,
            traffic_convention: false,
            ..settings()
        };
        let len = OutputLayout::default().total_len();
        let mut state = ModelState::new(RecordingExecutor::new(len), &settings).unwrap();
        state.eval_frame(&[0.0, 0.0], Some(&desire_one_hot(Some(1)))).unwrap();
        assert_eq!(state.executor.seen_desire[0], None);
        assert_eq!(state.executor.seen_tc[0], None);
        assert_eq!(state.executor.seen_state[0], None);
    }

    #[test]
    fn test_traffic_convention_rhd() {
        assert_eq!(traffic_convention(true), [0.0, 1.0]);
        assert_eq!(traffic_convention(false), [1.0, 0.0]);
    }

    #[test]
    fn test_desire_one_hot_out_of_range() {
        assert_eq!(desire_one_hot(Some(DESIRE_LEN)), [0.0; DESIRE_LEN]);
        assert_eq!(desire_one_hot(Some(0))[0], 1.0);
    }
}
