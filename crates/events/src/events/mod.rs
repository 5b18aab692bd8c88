use serde::{Deserialize, Serialize};

use pgb_errors::UserFacingError;

/// Structured failure information shared across domains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureContext {
    /// Stable error code, when the error has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Short user-facing message.
    pub message: String,
    /// Optional remediation hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Whether retrying the operation might succeed.
    pub retryable: bool,
}

impl FailureContext {
    /// Build failure context from a `UserFacingError` implementation.
    #[must_use]
    pub fn from_error<E: UserFacingError + ?Sized>(error: &E) -> Self {
        Self {
            code: error.user_code().map(Into::into),
            message: error.user_message().into_owned(),
            hint: error.user_hint().map(Into::into),
            retryable: error.is_retryable(),
        }
    }
}

pub mod general;
pub mod provision;
pub mod remote;
pub mod step;

pub use general::*;
pub use provision::*;
pub use remote::*;
pub use step::*;

/// Top-level application event enum that aggregates all domain-specific events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event", rename_all = "snake_case")]
pub enum AppEvent {
    /// General utility events (warnings, errors, debug lines)
    General(GeneralEvent),

    /// Build step lifecycle
    Step(StepEvent),

    /// Remote app provisioning
    Provision(ProvisionEvent),

    /// Progress reported by the remote build service client
    Remote(RemoteEvent),
}

impl AppEvent {
    /// Determine the appropriate tracing log level for this event
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;

        match self {
            Self::General(GeneralEvent::Error { .. })
            | Self::Step(StepEvent::Failed { .. })
            | Self::Provision(ProvisionEvent::Failed { .. }) => Level::ERROR,

            Self::General(GeneralEvent::Warning { .. })
            | Self::Step(StepEvent::Cancelled { .. })
            | Self::Remote(RemoteEvent::PlatformStatusChanged {
                status: pgb_types::PlatformStatus::Error,
                ..
            }) => Level::WARN,

            Self::General(GeneralEvent::DebugLog { .. })
            | Self::Remote(RemoteEvent::PollWaiting { .. }) => Level::DEBUG,

            _ => Level::INFO,
        }
    }

    /// Serialize the event as a single JSON line
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
