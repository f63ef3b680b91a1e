//! Push Progress Events
//!
//! Structured events the core emits while a push runs. The sink is
//! injected; the core never writes to a terminal itself. Events from one
//! step are dispatched in program order; events from concurrent steps
//! interleave freely.

use crate::image::{Digest, Image};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Severity of a log event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Events during an image push
#[derive(Debug, Clone)]
pub enum PushEvent {
    /// Human-readable progress message
    Log { level: LogLevel, message: String },

    /// Completion counter over a set of like items
    Progress {
        unit: String,
        total: u64,
        done: u64,
    },

    /// Wall-clock span covering one step body, retries included
    TimerSpan { name: String, elapsed: Duration },

    /// Terminal event: the manifest is live under every target tag
    ImageCreated {
        image: Image,
        image_digest: Digest,
        config_digest: Digest,
    },
}

/// Receives push events. Implementations must be cheap and non-blocking;
/// they run inline on the emitting step's task.
pub trait EventSink: Send + Sync {
    fn dispatch(&self, event: PushEvent);
}

/// Sink that drops every event
pub struct NullSink;

impl EventSink for NullSink {
    fn dispatch(&self, _event: PushEvent) {}
}

/// Emits a `TimerSpan` for a step body when dropped, so the span covers
/// the body's full duration including retries and early error returns.
pub struct Timer {
    sink: Arc<dyn EventSink>,
    name: String,
    started: Instant,
}

impl Timer {
    pub fn start(sink: Arc<dyn EventSink>, name: impl Into<String>) -> Self {
        Self {
            sink,
            name: name.into(),
            started: Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.sink.dispatch(PushEvent::TimerSpan {
            name: std::mem::take(&mut self.name),
            elapsed: self.started.elapsed(),
        });
    }
}
