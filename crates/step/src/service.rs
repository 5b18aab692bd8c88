//! The seam between the step adapter and a remote build service

use async_trait::async_trait;
use pgb_errors::Error;
use pgb_events::EventSender;
use pgb_types::{BuildReport, Platform};
use secrecy::SecretString;
use std::path::Path;

/// Parameters a build session is bound to at construction
#[derive(Debug)]
pub struct SessionBinding {
    pub api_token: SecretString,
    pub app_id: String,
    pub android_key_id: Option<String>,
    pub ios_key_id: Option<String>,
    /// Log sink for progress and status lines
    pub events: EventSender,
}

/// Credentials needed to unlock one signing key
#[derive(Debug)]
pub enum KeyUnlock {
    Android {
        key_id: String,
        key_password: SecretString,
        keystore_password: SecretString,
    },
    Ios {
        key_id: String,
        password: SecretString,
    },
}

impl KeyUnlock {
    #[must_use]
    pub fn platform(&self) -> Platform {
        match self {
            Self::Android { .. } => Platform::Android,
            Self::Ios { .. } => Platform::Ios,
        }
    }

    #[must_use]
    pub fn key_id(&self) -> &str {
        match self {
            Self::Android { key_id, .. } | Self::Ios { key_id, .. } => key_id,
        }
    }
}

/// A remote build service
#[async_trait]
pub trait BuildService: Send + Sync {
    type Session: BuildSession;

    /// Register a new app record and return the id the service assigned
    async fn create_app(&self, api_token: &SecretString, events: &EventSender)
        -> Result<String, Error>;

    /// Construct a session bound to one app
    fn session(&self, binding: SessionBinding) -> Self::Session;
}

/// One build of one app
#[async_trait]
pub trait BuildSession: Send {
    /// Base name of downloaded artifacts
    fn set_file_base_name(&mut self, name: String);

    fn set_version(&mut self, version: String);

    fn set_app_name(&mut self, name: String);

    /// Unlock signing keys so the service can sign the next build
    async fn unlock_keys(&mut self, keys: &[KeyUnlock]) -> Result<(), Error>;

    /// Upload `workspace`, build it remotely and wait for the result
    async fn build_app(&mut self, workspace: &Path) -> Result<BuildReport, Error>;
}
