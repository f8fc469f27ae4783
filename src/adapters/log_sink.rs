//! Event sinks.
//!
//! [`LogEventSink`] mirrors every core event into the serial log — always
//! wired, so dose completions are visible even with no client attached.
//! [`ChannelEventSink`] forwards events to the northbound transport over a
//! std mpsc channel; the WebSocket broadcaster drains the receiver.

use std::sync::mpsc::Sender;
use std::sync::Mutex;

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use log::{info, warn};

/// Serial-log sink.
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn emit(&self, event: &AppEvent) {
        match event {
            AppEvent::DoseComplete { head, target_volume, estimated_volume, runtime } => {
                info!(
                    "event: dose_complete head={} target={:.2} mL est={:.2} mL runtime={} ms",
                    head, target_volume, estimated_volume, runtime
                );
            }
            AppEvent::DoseError { head, error } => {
                warn!("event: dose_error head={} error={}", head, error);
            }
            AppEvent::EmergencyStop { timestamp } => {
                warn!("event: emergency_stop timestamp={}", timestamp);
            }
        }
    }
}

/// Forwards events into an mpsc channel for the northbound transport.
/// `Sender` is not `Sync`, so it sits behind a mutex; sends are tiny.
pub struct ChannelEventSink {
    tx: Mutex<Sender<AppEvent>>,
}

impl ChannelEventSink {
    pub fn new(tx: Sender<AppEvent>) -> Self {
        Self { tx: Mutex::new(tx) }
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: &AppEvent) {
        let tx = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        // A disconnected receiver only loses the notification, never the
        // dose itself.
        let _ = tx.send(event.clone());
    }
}

/// Fan-out to several sinks (serial log + channel is the usual pair).
pub struct TeeEventSink {
    sinks: Vec<Box<dyn EventSink>>,
}

impl TeeEventSink {
    pub fn new(sinks: Vec<Box<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for TeeEventSink {
    fn emit(&self, event: &AppEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}
