// src/pipeline/metrics.rs
//
// Frame counters and last-frame timings, summarized into a serializable
// snapshot for logs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub total_frames: Arc<AtomicU64>,
    pub dropped_frames: Arc<AtomicU64>,
    pub invalid_model_msgs: Arc<AtomicU64>,
    pub invalid_odometry_msgs: Arc<AtomicU64>,
    pub execute_time_us: Arc<AtomicU64>,
    pub decode_time_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            total_frames: Arc::new(AtomicU64::new(0)),
            dropped_frames: Arc::new(AtomicU64::new(0)),
            invalid_model_msgs: Arc::new(AtomicU64::new(0)),
            invalid_odometry_msgs: Arc::new(AtomicU64::new(0)),
            execute_time_us: Arc::new(AtomicU64::new(0)),
            decode_time_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn set_timing(&self, counter: &AtomicU64, duration_us: u64) {
        counter.store(duration_us, Ordering::Relaxed);
    }

    pub fn fps(&self) -> f64 {
        let frames = self.total_frames.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_frames: self.total_frames.load(Ordering::Relaxed),
            fps: self.fps(),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
            invalid_model_msgs: self.invalid_model_msgs.load(Ordering::Relaxed),
            invalid_odometry_msgs: self.invalid_odometry_msgs.load(Ordering::Relaxed),
            last_execute_us: self.execute_time_us.load(Ordering::Relaxed),
            last_decode_us: self.decode_time_us.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub fps: f64,
    pub dropped_frames: u64,
    pub invalid_model_msgs: u64,
    pub invalid_odometry_msgs: u64,
    pub last_execute_us: u64,
    pub last_decode_us: u64,
    pub elapsed_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_reflects_counters() {
        let m = PipelineMetrics::new();
        m.inc(&m.total_frames);
        m.inc(&m.total_frames);
        m.add(&m.dropped_frames, 3);
        m.set_timing(&m.execute_time_us, 900);
        m.set_timing(&m.execute_time_us, 1200);

        let s = m.summary();
        assert_eq!(s.total_frames, 2);
        assert_eq!(s.dropped_frames, 3);
        assert_eq!(s.last_execute_us, 1200, "timings keep the latest value");
        assert_eq!(s.invalid_model_msgs, 0);

        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["total_frames"], 2);
    }
}
