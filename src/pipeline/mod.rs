// src/pipeline/mod.rs

pub mod event_bus;
pub mod frame_context;
pub mod messages;
pub mod metrics;
pub mod orchestrator;
pub mod publisher;

pub use event_bus::{EventBus, JsonLinesBus, MessageBus};
pub use orchestrator::DrivingPipeline;
