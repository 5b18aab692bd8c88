//! The build step adapter
//!
//! One invocation runs strictly in sequence: provision a remote app when the
//! step asks for a new one, bind a session, apply overrides, unlock signing
//! keys, build. Every wait is raced against the invocation's cancellation
//! token so an interruption surfaces as [`Error::Cancelled`] right away.

use crate::expand::expand;
use crate::service::{BuildService, BuildSession, KeyUnlock, SessionBinding};
use pgb_errors::{BuildError, Error, UserFacingError};
use pgb_events::{
    AppEvent, EventEmitter, EventSender, FailureContext, ProvisionEvent, StepEvent,
};
use pgb_types::{
    clone_secret, AppTarget, BuildReport, BuildStepConfig, Platform, PlatformStatus,
};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Per-invocation context supplied by the host
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    /// Variables available to `${VAR}` expansion
    pub environment: BTreeMap<String, String>,
    /// Root of the workspace handed to the build service
    pub workspace: PathBuf,
    /// Log sink
    pub events: EventSender,
    /// Interruption signal
    pub cancel: CancellationToken,
}

impl RuntimeContext {
    #[must_use]
    pub fn new(workspace: impl Into<PathBuf>, events: EventSender) -> Self {
        Self {
            environment: BTreeMap::new(),
            workspace: workspace.into(),
            events,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_environment<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.environment
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }
}

impl EventEmitter for RuntimeContext {
    fn event_sender(&self) -> Option<&EventSender> {
        Some(&self.events)
    }
}

/// Outcome of one invocation
#[derive(Debug)]
pub struct StepRun {
    /// App target the caller should persist. It is `Provisioned` after a
    /// successful provisioning even when the build itself failed.
    pub target: AppTarget,
    pub result: Result<BuildReport, Error>,
}

impl StepRun {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.result, Err(Error::Cancelled))
    }

    /// Drop the target and keep the build result
    ///
    /// # Errors
    ///
    /// Returns the error the invocation failed with.
    pub fn into_result(self) -> Result<BuildReport, Error> {
        self.result
    }
}

/// Orchestrates one build invocation against a [`BuildService`]
pub struct BuildStepAdapter<S> {
    service: S,
}

impl<S: BuildService> BuildStepAdapter<S> {
    #[must_use]
    pub fn new(service: S) -> Self {
        Self { service }
    }

    #[must_use]
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Run the step once.
    ///
    /// Never mutates `config`; a provisioning event is reported through
    /// [`StepRun::target`]. Do not run the same config concurrently with
    /// itself, as two runs would both provision an app.
    pub async fn execute(&self, config: &BuildStepConfig, ctx: &RuntimeContext) -> StepRun {
        let mut target = config.target().clone();
        let span = tracing::info_span!(
            "build_step",
            app_id = target.app_id().unwrap_or("pending"),
            workspace = %ctx.workspace.display()
        );

        let result = self
            .run(config, ctx, &mut target)
            .instrument(span)
            .await;

        match &result {
            Ok(report) => {
                tracing::info!(app_id = %report.app_id, "build step succeeded");
            }
            Err(Error::Cancelled) => {
                tracing::warn!("build step cancelled");
                ctx.emit(AppEvent::Step(StepEvent::Cancelled {
                    app_id: target.app_id().map(str::to_string),
                }));
            }
            Err(e) => {
                tracing::error!(error = %e, "build step failed");
                ctx.emit(AppEvent::Step(StepEvent::Failed {
                    app_id: target.app_id().map(str::to_string),
                    failure: FailureContext::from_error(e),
                }));
            }
        }

        StepRun { target, result }
    }

    async fn run(
        &self,
        config: &BuildStepConfig,
        ctx: &RuntimeContext,
        target: &mut AppTarget,
    ) -> Result<BuildReport, Error> {
        let started = Instant::now();
        ctx.emit(AppEvent::Step(StepEvent::Started {
            app_id: target.app_id().map(str::to_string),
            workspace: ctx.workspace.clone(),
        }));

        if ctx.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let app_id = if let Some(app_id) = target.app_id() {
            app_id.to_string()
        } else {
            let app_id = self.provision(config, ctx).await?;
            *target = AppTarget::Provisioned {
                app_id: app_id.clone(),
            };
            app_id
        };

        let mut session = self.service.session(SessionBinding {
            api_token: clone_secret(config.api_token()),
            app_id: app_id.clone(),
            android_key_id: config.android().key_id.clone(),
            ios_key_id: config.ios().key_id.clone(),
            events: ctx.events.clone(),
        });

        if let Some(job_name) = ctx.environment.get("JOB_NAME").filter(|n| !n.is_empty()) {
            session.set_file_base_name(job_name.clone());
        }

        if let Some(app_override) = config.app_override() {
            let version = expand(&app_override.version, &ctx.environment);
            let name = expand(&app_override.name, &ctx.environment);
            tracing::debug!(%name, %version, "applying name/version override");
            ctx.emit(AppEvent::Step(StepEvent::OverrideApplied {
                name: name.clone(),
                version: version.clone(),
            }));
            session.set_version(version);
            session.set_app_name(name);
        }

        let keys = unlock_requests(config, ctx);
        if !keys.is_empty() {
            ctx.emit(AppEvent::Step(StepEvent::KeysUnlocking {
                platforms: keys.iter().map(KeyUnlock::platform).collect(),
            }));
            cancellable(&ctx.cancel, session.unlock_keys(&keys))
                .await
                .map_err(into_build_failure)?;
        }

        let report = cancellable(&ctx.cancel, session.build_app(&ctx.workspace))
            .await
            .map_err(into_build_failure)?;

        if report.has_failures() {
            let failed: Vec<String> = report
                .platforms
                .iter()
                .filter(|p| p.status == PlatformStatus::Error)
                .map(|p| match &p.message {
                    Some(message) => format!("{}: {message}", p.platform),
                    None => p.platform.to_string(),
                })
                .collect();
            return Err(BuildError::BuildFailed {
                message: failed.join(", "),
            }
            .into());
        }

        ctx.emit(AppEvent::Step(StepEvent::Completed {
            app_id,
            duration: started.elapsed(),
            artifacts: report.artifacts.len(),
        }));
        Ok(report)
    }

    async fn provision(
        &self,
        config: &BuildStepConfig,
        ctx: &RuntimeContext,
    ) -> Result<String, Error> {
        ctx.emit(AppEvent::Provision(ProvisionEvent::Started));

        let created = cancellable(
            &ctx.cancel,
            self.service.create_app(config.api_token(), &ctx.events),
        )
        .await;

        let failure = match created {
            Ok(app_id) if !app_id.trim().is_empty() => {
                tracing::info!(%app_id, "provisioned new app");
                ctx.emit(AppEvent::Provision(ProvisionEvent::AppCreated {
                    app_id: app_id.clone(),
                }));
                return Ok(app_id);
            }
            Ok(_) => BuildError::ProvisioningFailed {
                message: "the service returned an empty app id".to_string(),
            },
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => BuildError::ProvisioningFailed {
                message: e.user_message().into_owned(),
            },
        };

        ctx.emit(AppEvent::Provision(ProvisionEvent::Failed {
            failure: FailureContext::from_error(&failure),
        }));
        Err(failure.into())
    }
}

/// Keys with a complete set of credentials; incomplete ones are reported and skipped
fn unlock_requests(config: &BuildStepConfig, ctx: &RuntimeContext) -> Vec<KeyUnlock> {
    let mut keys = Vec::new();

    let android = config.android();
    if let Some(key_id) = &android.key_id {
        match (&android.key_password, &android.keystore_password) {
            (Some(key_password), Some(keystore_password)) => keys.push(KeyUnlock::Android {
                key_id: key_id.clone(),
                key_password: clone_secret(key_password),
                keystore_password: clone_secret(keystore_password),
            }),
            (None, None) => {}
            _ => incomplete(ctx, Platform::Android, key_id),
        }
    }

    let ios = config.ios();
    if let (Some(key_id), Some(password)) = (&ios.key_id, &ios.key_password) {
        keys.push(KeyUnlock::Ios {
            key_id: key_id.clone(),
            password: clone_secret(password),
        });
    }

    keys
}

fn incomplete(ctx: &RuntimeContext, platform: Platform, key_id: &str) {
    ctx.emit_warning_with_context(
        format!("{platform} key {key_id} is missing a password and will not be unlocked"),
        "both the key password and the keystore password are required",
    );
}

/// Await `fut` unless the token fires first
async fn cancellable<T, F>(token: &CancellationToken, fut: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    tokio::select! {
        biased;
        () = token.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}

/// Any session failure other than cancellation surfaces as `BuildFailed`
fn into_build_failure(err: Error) -> Error {
    match err {
        Error::Cancelled | Error::Build(BuildError::BuildFailed { .. }) => err,
        other => BuildError::BuildFailed {
            message: other.user_message().into_owned(),
        }
        .into(),
    }
}
