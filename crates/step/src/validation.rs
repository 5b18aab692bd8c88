//! Advisory and blocking checks on step definitions
//!
//! These run before a step is executed, the way a configuration form checks
//! its fields: an [`FormValidation::Error`] blocks execution, a
//! [`FormValidation::Warning`] is only shown.

use pgb_errors::{ConfigError, Error};
use pgb_types::{NameCheck, StepDefinition};
use std::fmt;

/// Minimum length below which an id or name looks suspicious
const MIN_ID_LEN: usize = 4;

/// Result of checking one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValidation {
    Ok,
    Warning(String),
    Error(String),
}

impl FormValidation {
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Ok => None,
            Self::Warning(m) | Self::Error(m) => Some(m),
        }
    }
}

/// Check the remote app id field
#[must_use]
pub fn check_app_id(value: &str, create_new_app: bool) -> FormValidation {
    let value = value.trim();
    if create_new_app {
        if !value.is_empty() {
            return FormValidation::Warning(
                "This ID will be lost because 'create new app' is set".to_string(),
            );
        }
    } else {
        if value.is_empty() {
            return FormValidation::Error("Please set the PhoneGap Build app id".to_string());
        }
        if value.chars().count() < MIN_ID_LEN {
            return FormValidation::Warning(
                "Isn't that ID too short? Should be something like 6453738".to_string(),
            );
        }
    }
    FormValidation::Ok
}

/// Check the app name of the override block
///
/// With [`NameCheck::Relaxed`] an absent name is fine; with
/// [`NameCheck::Strict`] it is an error. A present name must be non-empty
/// and should be at least four characters long.
#[must_use]
pub fn check_app_name(value: Option<&str>, policy: NameCheck) -> FormValidation {
    match (value.map(str::trim), policy) {
        (None, NameCheck::Relaxed) => FormValidation::Ok,
        (None, NameCheck::Strict) => FormValidation::Error("Please set the app name".to_string()),
        (Some(""), _) => FormValidation::Error("Please set the app name".to_string()),
        (Some(name), _) if name.chars().count() < MIN_ID_LEN => {
            FormValidation::Warning("Isn't that name too short?".to_string())
        }
        (Some(_), _) => FormValidation::Ok,
    }
}

#[must_use]
pub fn check_api_token(value: &str) -> FormValidation {
    if value.trim().is_empty() {
        FormValidation::Error("Please set the PhoneGap Build API token".to_string())
    } else {
        FormValidation::Ok
    }
}

/// One checked field
#[derive(Debug, Clone)]
pub struct FieldCheck {
    pub field: &'static str,
    pub result: FormValidation,
}

impl fmt::Display for FieldCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.result.message() {
            Some(message) => write!(f, "{}: {message}", self.field),
            None => write!(f, "{}: ok", self.field),
        }
    }
}

/// All field checks of a step definition
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub checks: Vec<FieldCheck>,
}

impl ValidationReport {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.checks.iter().any(|c| c.result.is_blocking())
    }

    pub fn errors(&self) -> impl Iterator<Item = &FieldCheck> {
        self.checks.iter().filter(|c| c.result.is_blocking())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &FieldCheck> {
        self.checks
            .iter()
            .filter(|c| matches!(c.result, FormValidation::Warning(_)))
    }

    /// Turn blocking problems into an error
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` listing every blocking check.
    pub fn ensure_valid(&self) -> Result<(), Error> {
        if self.has_errors() {
            return Err(ConfigError::ValidationFailed {
                messages: self.errors().map(ToString::to_string).collect(),
            }
            .into());
        }
        Ok(())
    }
}

/// Check every field of a step definition
#[must_use]
pub fn validate_definition(def: &StepDefinition, policy: NameCheck) -> ValidationReport {
    let checks = vec![
        FieldCheck {
            field: "api_token",
            result: check_api_token(&def.api_token),
        },
        FieldCheck {
            field: "app_id",
            result: check_app_id(def.app_id.as_deref().unwrap_or_default(), def.create_new_app),
        },
        FieldCheck {
            field: "override.name",
            result: check_app_name(
                def.override_block.as_ref().map(|o| o.name.as_str()),
                policy,
            ),
        },
    ];
    ValidationReport { checks }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgb_types::OverrideSection;

    #[test]
    fn test_app_id_with_create_new_app() {
        assert_eq!(check_app_id("", true), FormValidation::Ok);
        assert!(matches!(
            check_app_id("6453738", true),
            FormValidation::Warning(_)
        ));
    }

    #[test]
    fn test_app_id_required_without_create() {
        assert!(check_app_id("", false).is_blocking());
        assert!(check_app_id("   ", false).is_blocking());
        assert!(matches!(check_app_id("123", false), FormValidation::Warning(_)));
        assert_eq!(check_app_id("1234", false), FormValidation::Ok);
    }

    #[test]
    fn test_app_name_policies() {
        assert_eq!(check_app_name(None, NameCheck::Relaxed), FormValidation::Ok);
        assert!(check_app_name(None, NameCheck::Strict).is_blocking());
        assert!(check_app_name(Some(""), NameCheck::Relaxed).is_blocking());
        assert!(matches!(
            check_app_name(Some("abc"), NameCheck::Relaxed),
            FormValidation::Warning(_)
        ));
        assert_eq!(
            check_app_name(Some("${JOB_NAME}-rc"), NameCheck::Strict),
            FormValidation::Ok
        );
    }

    #[test]
    fn test_validate_definition() {
        let def = StepDefinition {
            api_token: String::new(),
            app_id: Some("12".to_string()),
            override_block: Some(OverrideSection {
                name: "nightly".to_string(),
                version: "1.0".to_string(),
            }),
            ..StepDefinition::default()
        };
        let report = validate_definition(&def, NameCheck::Relaxed);
        assert!(report.has_errors());
        assert_eq!(report.errors().count(), 1);
        assert_eq!(report.warnings().count(), 1);

        let err = report.ensure_valid().unwrap_err();
        assert!(err.to_string().contains("api_token"));
    }

    #[test]
    fn test_valid_definition_passes() {
        let def = StepDefinition {
            api_token: "T".to_string(),
            create_new_app: true,
            ..StepDefinition::default()
        };
        let report = validate_definition(&def, NameCheck::Relaxed);
        assert!(!report.has_errors());
        assert!(report.ensure_valid().is_ok());
    }
}
