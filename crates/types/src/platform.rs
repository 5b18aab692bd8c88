//! Target platforms and their remote build status

use pgb_errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A platform the remote service can build for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
    Winphone,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Android, Platform::Ios, Platform::Winphone];

    /// Identifier used by the remote API in URLs and JSON keys
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Android => "android",
            Self::Ios => "ios",
            Self::Winphone => "winphone",
        }
    }

    /// File extension of the downloaded artifact
    #[must_use]
    pub fn artifact_extension(self) -> &'static str {
        match self {
            Self::Android => "apk",
            Self::Ios => "ipa",
            Self::Winphone => "xap",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "android" => Ok(Self::Android),
            "ios" => Ok(Self::Ios),
            "winphone" => Ok(Self::Winphone),
            _ => Err(ConfigError::InvalidValue {
                field: "platform".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Remote build status of one platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformStatus {
    /// Queued or building
    Pending,
    Complete,
    Error,
    /// The service skipped the platform (e.g. missing signing key)
    Skipped,
    /// The app has no build for this platform
    Unrequested,
}

impl PlatformStatus {
    /// Map the raw status string of the API (which may be `null`)
    #[must_use]
    pub fn from_remote(raw: Option<&str>) -> Self {
        match raw {
            Some("pending") => Self::Pending,
            Some("complete") => Self::Complete,
            Some("error") => Self::Error,
            Some("skip" | "skipped") => Self::Skipped,
            _ => Self::Unrequested,
        }
    }

    #[must_use]
    pub fn is_finished(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for PlatformStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Skipped => "skipped",
            Self::Unrequested => "-",
        };
        f.write_str(s)
    }
}
