//! Build step definitions and the validated step configuration
//!
//! A [`StepDefinition`] is what a step file (or a submitted form) contains:
//! plain strings, possibly empty. [`BuildStepConfig`] is built from it once,
//! enforces the invariants between fields, and keeps credentials behind
//! [`SecretString`].

use pgb_errors::{ConfigError, Error};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Step as written in a step file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefinition {
    #[serde(default)]
    pub api_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default)]
    pub create_new_app: bool,
    /// Name/version override block; both keys are required when present
    #[serde(default, rename = "override", skip_serializing_if = "Option::is_none")]
    pub override_block: Option<OverrideSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub android: Option<AndroidSigning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ios: Option<IosSigning>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideSection {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AndroidSigning {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keystore_password: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IosSigning {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_password: Option<String>,
}

impl StepDefinition {
    /// Parse a step definition from TOML
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid TOML or an override
    /// block is missing `name` or `version`.
    pub fn from_toml_str(contents: &str) -> Result<Self, Error> {
        toml::from_str(contents).map_err(|e| {
            ConfigError::ParseError {
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Serialize the step definition back to TOML
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, Error> {
        toml::to_string_pretty(self).map_err(|e| {
            ConfigError::SerializeError {
                error: e.to_string(),
            }
            .into()
        })
    }

    /// Record the outcome of a provisioning event.
    ///
    /// Returns `true` when the definition changed and should be written back.
    pub fn apply_target(&mut self, target: &AppTarget) -> bool {
        match target {
            AppTarget::Provisioned { app_id } => {
                let changed = self.create_new_app || self.app_id.as_deref() != Some(app_id);
                self.app_id = Some(app_id.clone());
                self.create_new_app = false;
                changed
            }
            AppTarget::Pending => false,
        }
    }
}

/// Remote app the step builds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AppTarget {
    /// A new app has to be created before the first build
    Pending,
    /// The app exists remotely under this id
    Provisioned { app_id: String },
}

impl AppTarget {
    #[must_use]
    pub fn app_id(&self) -> Option<&str> {
        match self {
            Self::Pending => None,
            Self::Provisioned { app_id } => Some(app_id),
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// How strictly the app name of a step is checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameCheck {
    /// A name is only checked when an override block sets one
    #[default]
    Relaxed,
    /// A name must always be present
    Strict,
}

/// Name and version that supersede the values stored in the remote app
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppOverride {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Default)]
pub struct AndroidCredentials {
    pub key_id: Option<String>,
    pub key_password: Option<SecretString>,
    pub keystore_password: Option<SecretString>,
}

#[derive(Debug, Default)]
pub struct IosCredentials {
    pub key_id: Option<String>,
    pub key_password: Option<SecretString>,
}

/// Validated configuration of one build step
///
/// Immutable once built; the only transition is `Pending -> Provisioned`,
/// which is applied by producing a new value with [`BuildStepConfig::with_target`].
/// A single config must not be executed concurrently with itself.
#[derive(Debug)]
pub struct BuildStepConfig {
    api_token: SecretString,
    target: AppTarget,
    app_override: Option<AppOverride>,
    android: AndroidCredentials,
    ios: IosCredentials,
}

impl BuildStepConfig {
    /// Build a configuration from a step definition
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingField` if the API token is empty, or if
    /// no app id is given while `create_new_app` is off.
    pub fn from_definition(def: &StepDefinition) -> Result<Self, Error> {
        let token = def.api_token.trim();
        if token.is_empty() {
            return Err(ConfigError::MissingField {
                field: "api_token".to_string(),
            }
            .into());
        }

        // A stale id is dropped when a new app is requested
        let target = if def.create_new_app {
            AppTarget::Pending
        } else {
            match non_empty(def.app_id.as_deref()) {
                Some(app_id) => AppTarget::Provisioned {
                    app_id: app_id.to_string(),
                },
                None => {
                    return Err(ConfigError::MissingField {
                        field: "app_id".to_string(),
                    }
                    .into())
                }
            }
        };

        let app_override = def.override_block.as_ref().map(|o| AppOverride {
            name: o.name.clone(),
            version: o.version.clone(),
        });

        let android = def
            .android
            .as_ref()
            .map(|a| AndroidCredentials {
                key_id: non_empty(a.key_id.as_deref()).map(str::to_string),
                key_password: secret(a.key_password.as_deref()),
                keystore_password: secret(a.keystore_password.as_deref()),
            })
            .unwrap_or_default();

        let ios = def
            .ios
            .as_ref()
            .map(|i| IosCredentials {
                key_id: non_empty(i.key_id.as_deref()).map(str::to_string),
                key_password: secret(i.key_password.as_deref()),
            })
            .unwrap_or_default();

        Ok(Self {
            api_token: SecretString::from(token),
            target,
            app_override,
            android,
            ios,
        })
    }

    #[must_use]
    pub fn api_token(&self) -> &SecretString {
        &self.api_token
    }

    #[must_use]
    pub fn target(&self) -> &AppTarget {
        &self.target
    }

    #[must_use]
    pub fn remote_app_id(&self) -> Option<&str> {
        self.target.app_id()
    }

    #[must_use]
    pub fn create_new_app(&self) -> bool {
        self.target.is_pending()
    }

    #[must_use]
    pub fn app_override(&self) -> Option<&AppOverride> {
        self.app_override.as_ref()
    }

    #[must_use]
    pub fn android(&self) -> &AndroidCredentials {
        &self.android
    }

    #[must_use]
    pub fn ios(&self) -> &IosCredentials {
        &self.ios
    }

    /// Same configuration with a new app target
    #[must_use]
    pub fn with_target(mut self, target: AppTarget) -> Self {
        self.target = target;
        self
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn secret(value: Option<&str>) -> Option<SecretString> {
    value
        .filter(|v| !v.is_empty())
        .map(SecretString::from)
}

/// Copy a secret without exposing it to logs
#[must_use]
pub fn clone_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret())
}
