#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Build step adapter for pgb
//!
//! A build step resolves its parameters (static step configuration plus
//! `${VAR}` expansion against the invocation environment), makes sure a
//! remote app exists, and delegates the actual build to a [`BuildService`].
//! The adapter itself never talks to the network; it only sequences calls
//! on the service and reports what happened.

mod adapter;
mod expand;
mod service;
pub mod validation;

pub use adapter::{BuildStepAdapter, RuntimeContext, StepRun};
pub use expand::expand;
pub use service::{BuildService, BuildSession, KeyUnlock, SessionBinding};
pub use validation::{validate_definition, FormValidation, ValidationReport};
