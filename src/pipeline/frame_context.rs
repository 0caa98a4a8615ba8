// src/pipeline/frame_context.rs
//
// Per-publish frame bookkeeping. Only used to derive message validity and
// the frame metadata fields; never fed back into decoding.

use tracing::debug;

/// Low-pass coefficient of the dropped-frame filter
const FRAME_FILTER_K: f32 = 0.1;
/// Frames before the drop filter starts counting
const DROP_WARMUP_FRAMES: u64 = 10;
/// Largest single-step drop fed into the filter
const MAX_DROP_STEP: u32 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameBookkeeping {
    /// Camera frame this output was computed from
    pub vipc_frame_id: u32,
    /// Latest camera frame id known at publish time
    pub frame_id: u32,
    /// Frames skipped between this and the previous processed frame
    pub vipc_dropped_frames: u32,
    /// Filtered fraction of dropped frames, in [0, 1)
    pub frame_drop: f32,
}

impl FrameBookkeeping {
    /// Frames elapsed since `vipc_frame_id`; zero if the ids look reversed.
    pub fn frame_age(&self) -> u32 {
        self.frame_id.saturating_sub(self.vipc_frame_id)
    }
}

/// Derives dropped-frame counts and the filtered drop ratio from the
/// sequence of processed camera frame ids.
#[derive(Debug, Clone, Default)]
pub struct FrameDropTracker {
    last_frame_id: Option<u32>,
    frames_dropped: f32,
    run_count: u64,
}

impl FrameDropTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, vipc_frame_id: u32, latest_frame_id: u32) -> FrameBookkeeping {
        let dropped = match self.last_frame_id {
            Some(last) => vipc_frame_id.saturating_sub(last).saturating_sub(1),
            None => 0,
        };
        self.last_frame_id = Some(vipc_frame_id);
        self.run_count += 1;

        self.frames_dropped = (1.0 - FRAME_FILTER_K) * self.frames_dropped
            + FRAME_FILTER_K * dropped.min(MAX_DROP_STEP) as f32;
        if self.run_count < DROP_WARMUP_FRAMES {
            self.frames_dropped = 0.0;
        }
        let frame_drop = self.frames_dropped / (1.0 + self.frames_dropped);

        if dropped > 0 {
            debug!(
                "Dropped {} frame(s) before {}, drop ratio {:.3}",
                dropped, vipc_frame_id, frame_drop
            );
        }

        FrameBookkeeping {
            vipc_frame_id,
            frame_id: latest_frame_id,
            vipc_dropped_frames: dropped,
            frame_drop,
        }
    }
}
