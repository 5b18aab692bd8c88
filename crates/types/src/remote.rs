//! Models of the app records kept by the remote build service

use crate::platform::{Platform, PlatformStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// App record as returned by `GET /apps/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteApp {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub package: Option<String>,
    /// Raw per-platform status, `null` when the platform is not built
    #[serde(default)]
    pub status: BTreeMap<String, Option<String>>,
    /// Per-platform error message for platforms in `error`
    #[serde(default)]
    pub error: BTreeMap<String, Option<String>>,
}

impl RemoteApp {
    #[must_use]
    pub fn platform_status(&self, platform: Platform) -> PlatformStatus {
        PlatformStatus::from_remote(
            self.status
                .get(platform.as_str())
                .and_then(Option::as_deref),
        )
    }

    #[must_use]
    pub fn platform_error(&self, platform: Platform) -> Option<&str> {
        self.error.get(platform.as_str()).and_then(Option::as_deref)
    }

    /// True once no platform is still pending
    #[must_use]
    pub fn is_settled(&self) -> bool {
        Platform::ALL
            .iter()
            .all(|p| self.platform_status(*p).is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_app_json() {
        let json = r#"{
            "id": 6453738,
            "title": "Nightly",
            "version": "1.0",
            "status": {"android": "complete", "ios": "pending", "winphone": null},
            "error": {"ios": null}
        }"#;
        let app: RemoteApp = serde_json::from_str(json).unwrap();
        assert_eq!(app.id, 6_453_738);
        assert_eq!(app.platform_status(Platform::Android), PlatformStatus::Complete);
        assert_eq!(app.platform_status(Platform::Ios), PlatformStatus::Pending);
        assert_eq!(
            app.platform_status(Platform::Winphone),
            PlatformStatus::Unrequested
        );
        assert!(!app.is_settled());
        assert!(app.platform_error(Platform::Ios).is_none());
    }
}
