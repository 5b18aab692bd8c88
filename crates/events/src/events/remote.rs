use pgb_types::{Platform, PlatformStatus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Progress reported while talking to the remote build service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RemoteEvent {
    /// Workspace packed for upload
    ArchiveCreated { files: usize, bytes: u64 },

    UploadStarted { app_id: String, bytes: u64 },

    UploadCompleted { app_id: String },

    KeyUnlocked { platform: Platform, key_id: String },

    BuildQueued { app_id: String },

    PlatformStatusChanged {
        platform: Platform,
        status: PlatformStatus,
    },

    /// Still waiting for pending platforms
    PollWaiting { attempt: u32, pending: Vec<Platform> },

    ArtifactDownloaded {
        platform: Platform,
        path: PathBuf,
        size: u64,
    },
}
