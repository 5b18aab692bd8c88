use pgb_types::Platform;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::FailureContext;

/// Lifecycle of one build step invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StepEvent {
    /// Invocation started; `app_id` is `None` while a new app is pending
    Started {
        app_id: Option<String>,
        workspace: PathBuf,
    },

    /// Name/version override resolved against the environment
    OverrideApplied { name: String, version: String },

    /// Signing keys are about to be unlocked
    KeysUnlocking { platforms: Vec<Platform> },

    Completed {
        app_id: String,
        duration: Duration,
        artifacts: usize,
    },

    Failed {
        app_id: Option<String>,
        failure: FailureContext,
    },

    /// The interruption signal fired while the step was waiting
    Cancelled { app_id: Option<String> },
}
