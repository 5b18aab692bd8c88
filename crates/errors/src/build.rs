//! Build step error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum BuildError {
    #[error("app provisioning failed: {message}")]
    ProvisioningFailed { message: String },

    #[error("build failed: {message}")]
    BuildFailed { message: String },

    #[error("{platform} build failed: {message}")]
    PlatformFailed { platform: String, message: String },

    #[error("failed to unlock {platform} signing key: {message}")]
    KeyUnlockFailed { platform: String, message: String },

    #[error("failed to archive workspace: {message}")]
    ArchiveFailed { message: String },

    #[error("failed to fetch {platform} artifact: {message}")]
    ArtifactFailed { platform: String, message: String },
}

impl UserFacingError for BuildError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::ProvisioningFailed { .. } => {
                Some("Check the API token, or set an existing app id instead of creating one.")
            }
            Self::KeyUnlockFailed { .. } => {
                Some("Verify the signing key id and passwords configured for the step.")
            }
            Self::PlatformFailed { .. } | Self::BuildFailed { .. } => {
                Some("Inspect the remote build log for the failing platform.")
            }
            Self::ArchiveFailed { .. } => Some("Ensure the workspace directory is readable."),
            Self::ArtifactFailed { .. } => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::ArtifactFailed { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::ProvisioningFailed { .. } => "build.provisioning_failed",
            Self::BuildFailed { .. } => "build.failed",
            Self::PlatformFailed { .. } => "build.platform_failed",
            Self::KeyUnlockFailed { .. } => "build.key_unlock_failed",
            Self::ArchiveFailed { .. } => "build.archive_failed",
            Self::ArtifactFailed { .. } => "build.artifact_failed",
        };
        Some(code)
    }
}
