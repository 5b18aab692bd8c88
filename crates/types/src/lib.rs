#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core type definitions for pgb
//!
//! This crate provides the plain data shared by every other crate: the step
//! definition as written in a step file, the validated [`BuildStepConfig`],
//! the remote app models returned by the build service, and reports.

pub mod platform;
pub mod remote;
pub mod reports;
pub mod step;

// Re-export commonly used types
pub use platform::{Platform, PlatformStatus};
pub use remote::RemoteApp;
pub use reports::{Artifact, BuildReport, PlatformResult};
pub use step::{
    clone_secret, AndroidCredentials, AndroidSigning, AppOverride, AppTarget, BuildStepConfig,
    IosCredentials, IosSigning, NameCheck, OverrideSection, StepDefinition,
};

use serde::{Deserialize, Serialize};

/// Color output choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColorChoice {
    Always,
    #[default]
    Auto,
    Never,
}

impl clap::ValueEnum for ColorChoice {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Always, Self::Auto, Self::Never]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::Always => clap::builder::PossibleValue::new("always"),
            Self::Auto => clap::builder::PossibleValue::new("auto"),
            Self::Never => clap::builder::PossibleValue::new("never"),
        })
    }
}
