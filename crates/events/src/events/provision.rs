use serde::{Deserialize, Serialize};

use super::FailureContext;

/// Creation of a new remote app record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProvisionEvent {
    Started,

    /// The service assigned an id; callers persist it so later runs reuse the app
    AppCreated { app_id: String },

    Failed { failure: FailureContext },
}
