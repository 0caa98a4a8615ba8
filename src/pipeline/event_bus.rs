// src/pipeline/event_bus.rs
//
// Message bus seam. The decoder publishes through `MessageBus` and never
// knows which transport sits behind it.

use super::messages::Event;
use anyhow::Result;
use serde::Serialize;
use std::collections::VecDeque;
use std::io::Write;
use tracing::warn;

/// Events one frame puts on the bus before it is drained
pub const MIN_PENDING_EVENTS: usize = 2;

pub trait MessageBus {
    fn send(&mut self, event: Event) -> Result<()>;
}

/// Bounded in-process queue; drops the oldest event when full.
pub struct EventBus {
    events: VecDeque<Event>,
    max_pending: usize,
}

impl EventBus {
    pub fn new(max_pending: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_pending),
            max_pending,
        }
    }

    pub fn publish(&mut self, event: Event) {
        if self.events.len() >= self.max_pending {
            warn!(
                "Event bus full ({} events), dropping oldest",
                self.max_pending
            );
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.events.len()
    }
}

impl MessageBus for EventBus {
    fn send(&mut self, event: Event) -> Result<()> {
        self.publish(event);
        Ok(())
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    service: &'static str,
    event: &'a Event,
}

/// One JSON object per line: `{"service": ..., "event": {...}}`
pub struct JsonLinesBus<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesBus<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> MessageBus for JsonLinesBus<W> {
    fn send(&mut self, event: Event) -> Result<()> {
        let envelope = Envelope {
            service: event.service(),
            event: &event,
        };
        serde_json::to_writer(&mut self.writer, &envelope)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}
