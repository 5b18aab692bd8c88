//! Integration tests for the build step adapter

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use pgb_errors::{BuildError, Error, NetworkError};
    use pgb_events::{AppEvent, EventReceiver, EventSender, ProvisionEvent, StepEvent};
    use pgb_step::{
        BuildService, BuildSession, BuildStepAdapter, KeyUnlock, RuntimeContext, SessionBinding,
    };
    use pgb_types::{
        AndroidSigning, AppTarget, BuildReport, BuildStepConfig, OverrideSection, Platform,
        PlatformResult, PlatformStatus, StepDefinition,
    };
    use secrecy::{ExposeSecret, SecretString};
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        CreateApp { token: String },
        Session { app_id: String },
        FileBaseName(String),
        Version(String),
        AppName(String),
        UnlockKeys(Vec<(Platform, String)>),
        BuildApp,
    }

    #[derive(Clone, Copy)]
    enum Outcome {
        Succeed,
        FailTransport,
        FailArtifact,
        FailIo,
        ReportPlatformError,
        Hang,
    }

    #[derive(Clone)]
    struct MockService {
        calls: Arc<Mutex<Vec<Call>>>,
        create_result: Result<String, ()>,
        build: Outcome,
        unlock_fails: bool,
    }

    impl MockService {
        fn new() -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                create_result: Ok("12345".to_string()),
                build: Outcome::Succeed,
                unlock_fails: false,
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
            self.calls().iter().filter(|c| pred(c)).count()
        }
    }

    struct MockSession {
        calls: Arc<Mutex<Vec<Call>>>,
        app_id: String,
        build: Outcome,
        unlock_fails: bool,
    }

    #[async_trait]
    impl BuildService for MockService {
        type Session = MockSession;

        async fn create_app(
            &self,
            api_token: &SecretString,
            _events: &EventSender,
        ) -> Result<String, Error> {
            self.calls.lock().unwrap().push(Call::CreateApp {
                token: api_token.expose_secret().to_string(),
            });
            self.create_result
                .clone()
                .map_err(|()| NetworkError::Unauthorized.into())
        }

        fn session(&self, binding: SessionBinding) -> MockSession {
            self.calls.lock().unwrap().push(Call::Session {
                app_id: binding.app_id.clone(),
            });
            MockSession {
                calls: self.calls.clone(),
                app_id: binding.app_id,
                build: self.build,
                unlock_fails: self.unlock_fails,
            }
        }
    }

    #[async_trait]
    impl BuildSession for MockSession {
        fn set_file_base_name(&mut self, name: String) {
            self.calls.lock().unwrap().push(Call::FileBaseName(name));
        }

        fn set_version(&mut self, version: String) {
            self.calls.lock().unwrap().push(Call::Version(version));
        }

        fn set_app_name(&mut self, name: String) {
            self.calls.lock().unwrap().push(Call::AppName(name));
        }

        async fn unlock_keys(&mut self, keys: &[KeyUnlock]) -> Result<(), Error> {
            self.calls.lock().unwrap().push(Call::UnlockKeys(
                keys.iter()
                    .map(|k| (k.platform(), k.key_id().to_string()))
                    .collect(),
            ));
            if self.unlock_fails {
                return Err(BuildError::KeyUnlockFailed {
                    platform: "android".to_string(),
                    message: "wrong keystore password".to_string(),
                }
                .into());
            }
            Ok(())
        }

        async fn build_app(&mut self, _workspace: &Path) -> Result<BuildReport, Error> {
            self.calls.lock().unwrap().push(Call::BuildApp);
            match self.build {
                Outcome::Succeed => Ok(report(&self.app_id, PlatformStatus::Complete)),
                Outcome::ReportPlatformError => {
                    Ok(report(&self.app_id, PlatformStatus::Error))
                }
                Outcome::FailTransport => Err(NetworkError::ConnectionRefused(
                    "build.phonegap.com".to_string(),
                )
                .into()),
                Outcome::FailArtifact => Err(BuildError::ArtifactFailed {
                    platform: "android".to_string(),
                    message: "disk full".to_string(),
                }
                .into()),
                Outcome::FailIo => Err(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "dist is read-only",
                )
                .into()),
                Outcome::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(report(&self.app_id, PlatformStatus::Complete))
                }
            }
        }
    }

    fn report(app_id: &str, android: PlatformStatus) -> BuildReport {
        BuildReport {
            app_id: app_id.to_string(),
            platforms: vec![PlatformResult {
                platform: Platform::Android,
                status: android,
                message: (android == PlatformStatus::Error)
                    .then(|| "signing key locked".to_string()),
            }],
            artifacts: Vec::new(),
            duration_ms: 0,
        }
    }

    fn existing_app() -> StepDefinition {
        StepDefinition {
            api_token: "T".to_string(),
            app_id: Some("6453738".to_string()),
            ..StepDefinition::default()
        }
    }

    fn new_app() -> StepDefinition {
        StepDefinition {
            api_token: "T".to_string(),
            create_new_app: true,
            ..StepDefinition::default()
        }
    }

    fn context() -> (RuntimeContext, EventReceiver) {
        let (tx, rx) = pgb_events::channel();
        (RuntimeContext::new("/tmp/workspace", tx), rx)
    }

    fn drain(rx: &mut EventReceiver) -> Vec<AppEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_existing_app_never_provisions() {
        let service = MockService::new();
        let adapter = BuildStepAdapter::new(service.clone());
        let config = BuildStepConfig::from_definition(&existing_app()).unwrap();
        let (ctx, _rx) = context();

        let run = adapter.execute(&config, &ctx).await;

        assert!(run.succeeded());
        assert_eq!(
            run.target,
            AppTarget::Provisioned {
                app_id: "6453738".to_string()
            }
        );
        assert_eq!(
            service.count(|c| matches!(c, Call::CreateApp { .. })),
            0
        );
        assert!(service.calls().contains(&Call::Session {
            app_id: "6453738".to_string()
        }));
    }

    #[tokio::test]
    async fn test_new_app_provisions_exactly_once() {
        let service = MockService::new();
        let adapter = BuildStepAdapter::new(service.clone());
        let mut def = new_app();
        let config = BuildStepConfig::from_definition(&def).unwrap();
        let (ctx, mut rx) = context();

        let run = adapter.execute(&config, &ctx).await;

        assert!(run.succeeded());
        assert_eq!(
            service.count(|c| matches!(c, Call::CreateApp { .. })),
            1
        );
        assert_eq!(
            service.calls()[0],
            Call::CreateApp {
                token: "T".to_string()
            }
        );
        assert_eq!(
            run.target,
            AppTarget::Provisioned {
                app_id: "12345".to_string()
            }
        );
        assert!(service.calls().contains(&Call::Session {
            app_id: "12345".to_string()
        }));

        // The caller persists the new target; the next run reuses the app
        assert!(def.apply_target(&run.target));
        assert_eq!(def.app_id.as_deref(), Some("12345"));
        assert!(!def.create_new_app);

        let config = config.with_target(run.target);
        assert_eq!(config.remote_app_id(), Some("12345"));
        let second = adapter.execute(&config, &ctx).await;
        assert!(second.succeeded());
        assert_eq!(
            service.count(|c| matches!(c, Call::CreateApp { .. })),
            1
        );

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            AppEvent::Provision(ProvisionEvent::AppCreated { app_id }) if app_id == "12345"
        )));
    }

    #[tokio::test]
    async fn test_no_override_leaves_name_and_version() {
        let service = MockService::new();
        let adapter = BuildStepAdapter::new(service.clone());
        let config = BuildStepConfig::from_definition(&existing_app()).unwrap();
        let (ctx, _rx) = context();

        adapter.execute(&config, &ctx).await.into_result().unwrap();

        assert_eq!(
            service.count(|c| matches!(c, Call::Version(_) | Call::AppName(_))),
            0
        );
    }

    #[tokio::test]
    async fn test_override_is_expanded() {
        let service = MockService::new();
        let adapter = BuildStepAdapter::new(service.clone());
        let def = StepDefinition {
            override_block: Some(OverrideSection {
                name: "${JOB_NAME}-rc".to_string(),
                version: "1.${BUILD_NUMBER}".to_string(),
            }),
            ..existing_app()
        };
        let config = BuildStepConfig::from_definition(&def).unwrap();
        let (ctx, _rx) = context();
        let ctx = ctx.with_environment([("JOB_NAME", "nightly"), ("BUILD_NUMBER", "42")]);

        adapter.execute(&config, &ctx).await.into_result().unwrap();

        let calls = service.calls();
        assert!(calls.contains(&Call::AppName("nightly-rc".to_string())));
        assert!(calls.contains(&Call::Version("1.42".to_string())));
        assert!(calls.contains(&Call::FileBaseName("nightly".to_string())));
    }

    #[tokio::test]
    async fn test_no_job_name_keeps_default_base_name() {
        let service = MockService::new();
        let adapter = BuildStepAdapter::new(service.clone());
        let config = BuildStepConfig::from_definition(&existing_app()).unwrap();
        let (ctx, _rx) = context();

        adapter.execute(&config, &ctx).await.into_result().unwrap();

        assert_eq!(
            service.count(|c| matches!(c, Call::FileBaseName(_))),
            0
        );
    }

    #[tokio::test]
    async fn test_build_failure_surfaces_as_build_failed() {
        let service = MockService {
            build: Outcome::FailTransport,
            ..MockService::new()
        };
        let adapter = BuildStepAdapter::new(service.clone());
        let config = BuildStepConfig::from_definition(&existing_app()).unwrap();
        let (ctx, mut rx) = context();

        let run = adapter.execute(&config, &ctx).await;

        assert!(matches!(
            run.result,
            Err(Error::Build(BuildError::BuildFailed { .. }))
        ));
        assert_eq!(service.count(|c| matches!(c, Call::BuildApp)), 1);
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, AppEvent::Step(StepEvent::Failed { .. }))));
    }

    #[tokio::test]
    async fn test_platform_error_fails_the_step() {
        let service = MockService {
            build: Outcome::ReportPlatformError,
            ..MockService::new()
        };
        let adapter = BuildStepAdapter::new(service.clone());
        let config = BuildStepConfig::from_definition(&existing_app()).unwrap();
        let (ctx, _rx) = context();

        let err = adapter.execute(&config, &ctx).await.into_result().unwrap_err();
        match err {
            Error::Build(BuildError::BuildFailed { message }) => {
                assert!(message.contains("android"));
                assert!(message.contains("signing key locked"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_provisioning_failure_skips_build() {
        let service = MockService {
            create_result: Err(()),
            ..MockService::new()
        };
        let adapter = BuildStepAdapter::new(service.clone());
        let config = BuildStepConfig::from_definition(&new_app()).unwrap();
        let (ctx, _rx) = context();

        let run = adapter.execute(&config, &ctx).await;

        assert!(matches!(
            run.result,
            Err(Error::Build(BuildError::ProvisioningFailed { .. }))
        ));
        assert_eq!(run.target, AppTarget::Pending);
        assert_eq!(service.count(|c| matches!(c, Call::BuildApp)), 0);
        assert_eq!(
            service.count(|c| matches!(c, Call::Session { .. })),
            0
        );
    }

    #[tokio::test]
    async fn test_provisioned_target_survives_build_failure() {
        let service = MockService {
            build: Outcome::FailTransport,
            ..MockService::new()
        };
        let adapter = BuildStepAdapter::new(service.clone());
        let config = BuildStepConfig::from_definition(&new_app()).unwrap();
        let (ctx, _rx) = context();

        let run = adapter.execute(&config, &ctx).await;

        assert!(!run.succeeded());
        assert_eq!(run.target.app_id(), Some("12345"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_wait() {
        let service = MockService {
            build: Outcome::Hang,
            ..MockService::new()
        };
        let adapter = BuildStepAdapter::new(service.clone());
        let config = BuildStepConfig::from_definition(&existing_app()).unwrap();
        let token = CancellationToken::new();
        let (ctx, mut rx) = context();
        let ctx = ctx.with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            token.cancel();
        });

        let run = adapter.execute(&config, &ctx).await;
        canceller.await.unwrap();

        assert!(run.is_cancelled());
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, AppEvent::Step(StepEvent::Cancelled { .. }))));
    }

    #[tokio::test]
    async fn test_already_cancelled_does_nothing() {
        let service = MockService::new();
        let adapter = BuildStepAdapter::new(service.clone());
        let config = BuildStepConfig::from_definition(&new_app()).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let (ctx, _rx) = context();
        let ctx = ctx.with_cancellation(token);

        let run = adapter.execute(&config, &ctx).await;

        assert!(run.is_cancelled());
        assert!(service.calls().is_empty());
        assert_eq!(run.target, AppTarget::Pending);
    }

    #[tokio::test]
    async fn test_keys_skipped_without_credentials() {
        let service = MockService::new();
        let adapter = BuildStepAdapter::new(service.clone());
        let config = BuildStepConfig::from_definition(&existing_app()).unwrap();
        let (ctx, _rx) = context();

        adapter.execute(&config, &ctx).await.into_result().unwrap();

        assert_eq!(
            service.count(|c| matches!(c, Call::UnlockKeys(_))),
            0
        );
    }

    #[tokio::test]
    async fn test_android_key_unlocked_with_both_passwords() {
        let service = MockService::new();
        let adapter = BuildStepAdapter::new(service.clone());
        let def = StepDefinition {
            android: Some(AndroidSigning {
                key_id: Some("77".to_string()),
                key_password: Some("kp".to_string()),
                keystore_password: Some("sp".to_string()),
            }),
            ..existing_app()
        };
        let config = BuildStepConfig::from_definition(&def).unwrap();
        let (ctx, _rx) = context();

        adapter.execute(&config, &ctx).await.into_result().unwrap();

        let calls = service.calls();
        let unlock = calls
            .iter()
            .position(|c| matches!(c, Call::UnlockKeys(_)))
            .unwrap();
        let build = calls.iter().position(|c| matches!(c, Call::BuildApp)).unwrap();
        assert!(unlock < build);
        assert_eq!(
            calls[unlock],
            Call::UnlockKeys(vec![(Platform::Android, "77".to_string())])
        );
    }

    #[tokio::test]
    async fn test_incomplete_android_key_warns_and_skips() {
        let service = MockService::new();
        let adapter = BuildStepAdapter::new(service.clone());
        let def = StepDefinition {
            android: Some(AndroidSigning {
                key_id: Some("77".to_string()),
                key_password: Some("kp".to_string()),
                keystore_password: None,
            }),
            ..existing_app()
        };
        let config = BuildStepConfig::from_definition(&def).unwrap();
        let (ctx, mut rx) = context();

        adapter.execute(&config, &ctx).await.into_result().unwrap();

        assert_eq!(
            service.count(|c| matches!(c, Call::UnlockKeys(_))),
            0
        );
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, AppEvent::General(_))));
    }

    #[tokio::test]
    async fn test_artifact_failure_surfaces_as_build_failed() {
        let service = MockService {
            build: Outcome::FailArtifact,
            ..MockService::new()
        };
        let adapter = BuildStepAdapter::new(service.clone());
        let config = BuildStepConfig::from_definition(&existing_app()).unwrap();
        let (ctx, _rx) = context();

        let run = adapter.execute(&config, &ctx).await;

        match run.result {
            Err(Error::Build(BuildError::BuildFailed { message })) => {
                assert!(message.contains("android"));
                assert!(message.contains("disk full"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(service.count(|c| matches!(c, Call::BuildApp)), 1);
    }

    #[tokio::test]
    async fn test_io_failure_surfaces_as_build_failed() {
        let service = MockService {
            build: Outcome::FailIo,
            ..MockService::new()
        };
        let adapter = BuildStepAdapter::new(service.clone());
        let config = BuildStepConfig::from_definition(&existing_app()).unwrap();
        let (ctx, _rx) = context();

        let err = adapter.execute(&config, &ctx).await.into_result().unwrap_err();
        match err {
            Error::Build(BuildError::BuildFailed { message }) => {
                assert!(message.contains("read-only"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_key_unlock_failure_surfaces_as_build_failed() {
        let service = MockService {
            unlock_fails: true,
            ..MockService::new()
        };
        let adapter = BuildStepAdapter::new(service.clone());
        let def = StepDefinition {
            android: Some(AndroidSigning {
                key_id: Some("77".to_string()),
                key_password: Some("kp".to_string()),
                keystore_password: Some("sp".to_string()),
            }),
            ..existing_app()
        };
        let config = BuildStepConfig::from_definition(&def).unwrap();
        let (ctx, _rx) = context();

        let err = adapter.execute(&config, &ctx).await.into_result().unwrap_err();
        match err {
            Error::Build(BuildError::BuildFailed { message }) => {
                assert!(message.contains("wrong keystore password"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(service.count(|c| matches!(c, Call::BuildApp)), 0);
    }
}
