#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Event system for pgb
//!
//! Every progress or status line produced while a step runs is an event sent
//! over an unbounded channel. The channel is the step's log sink: library
//! crates never print, the CLI decides how events are rendered.
//!
//! ## Architecture
//!
//! - **Domain events**: grouped by functional domain (General, Step, Provision, Remote)
//! - **`EventEmitter` trait**: single API for emitting events from anything holding a sender
//! - **Tracing integration**: each event maps to a log level

pub mod events;
pub use events::{AppEvent, FailureContext, GeneralEvent, ProvisionEvent, RemoteEvent, StepEvent};

use pgb_types::{Platform, PlatformStatus};
use std::path::PathBuf;

use tokio::sync::mpsc::UnboundedSender;

/// Type alias for the event sender
pub type EventSender = UnboundedSender<AppEvent>;

/// Type alias for the event receiver
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<AppEvent>;

/// Create a new event channel
#[must_use]
pub fn channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

/// The unified trait for emitting events
///
/// Implemented for a raw `EventSender` and for any struct that carries one.
pub trait EventEmitter {
    /// Get the event sender for this emitter
    fn event_sender(&self) -> Option<&EventSender>;

    /// Emit an event through this emitter
    fn emit(&self, event: AppEvent) {
        if let Some(sender) = self.event_sender() {
            // Ignore send errors - if receiver is dropped, we just continue
            let _ = sender.send(event);
        }
    }

    /// Emit a debug log event
    fn emit_debug(&self, message: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::debug(message)));
    }

    /// Emit a warning event
    fn emit_warning(&self, message: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::warning(message)));
    }

    /// Emit a warning event with context
    fn emit_warning_with_context(&self, message: impl Into<String>, context: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::warning_with_context(
            message, context,
        )));
    }

    /// Emit an error event
    fn emit_error(&self, message: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::error(message)));
    }

    /// Emit a remote platform status change
    fn emit_platform_status(&self, platform: Platform, status: PlatformStatus) {
        self.emit(AppEvent::Remote(RemoteEvent::PlatformStatusChanged {
            platform,
            status,
        }));
    }

    /// Emit an artifact download event
    fn emit_artifact_downloaded(&self, platform: Platform, path: PathBuf, size: u64) {
        self.emit(AppEvent::Remote(RemoteEvent::ArtifactDownloaded {
            platform,
            path,
            size,
        }));
    }
}

impl EventEmitter for EventSender {
    fn event_sender(&self) -> Option<&EventSender> {
        Some(self)
    }
}
