//! Report type definitions for build runs

use crate::platform::{Platform, PlatformStatus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of one remote build
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildReport {
    /// Remote app that was built
    pub app_id: String,
    /// Final status of every platform the service reported
    pub platforms: Vec<PlatformResult>,
    /// Artifacts downloaded into the workspace
    pub artifacts: Vec<Artifact>,
    /// Total duration including upload and polling
    pub duration_ms: u64,
}

impl BuildReport {
    /// Whether any platform ended in error
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.platforms
            .iter()
            .any(|p| p.status == PlatformStatus::Error)
    }
}

/// Final status of a single platform
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlatformResult {
    pub platform: Platform,
    pub status: PlatformStatus,
    pub message: Option<String>,
}

/// Downloaded build artifact
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Artifact {
    pub platform: Platform,
    pub path: PathBuf,
    pub size: u64,
}
