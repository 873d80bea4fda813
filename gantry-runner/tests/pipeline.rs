//! Pipeline orchestration against an in-memory engine and reporter

use async_trait::async_trait;
use gantry_client::{ClientError, ReportOutcome, ScanReporter};
use gantry_core::{
    BuildOptions, BuildRecipe, ExecutionContext, Phase, RegistryCredentials, ScanOptions,
    ScanPhaseOutcome, ScanWarningKind, SecretString, VERSION_LABEL,
};
use gantry_runner::{
    ContainerEngine, ContainerId, ContainerSpec, EngineError, EngineResult, EngineSession,
    ExecOutput, ImageRef, Pipeline, PipelineError,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// =============================================================================
// Fakes
// =============================================================================

#[derive(Debug, Default)]
struct Calls {
    connects: usize,
    closes: usize,
    builds: Vec<BTreeMap<String, String>>,
    logins: Vec<(String, String)>,
    publishes: Vec<String>,
    starts: Vec<ContainerSpec>,
    execs: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
struct Behavior {
    fail_connect: bool,
    fail_start: bool,
    fail_build: bool,
    fail_publish: bool,
    hang_build: bool,
    hang_exec: bool,
    setup_exit: i32,
    scan_exit: i32,
    scan_stdout: String,
}

#[derive(Clone, Default)]
struct FakeEngine {
    calls: Arc<Mutex<Calls>>,
    behavior: Behavior,
}

impl FakeEngine {
    fn with(behavior: Behavior) -> Self {
        Self {
            calls: Arc::default(),
            behavior,
        }
    }

    fn calls(&self) -> std::sync::MutexGuard<'_, Calls> {
        self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn connect(&self) -> EngineResult<Box<dyn EngineSession>> {
        if self.behavior.fail_connect {
            return Err(EngineError::Unavailable("socket not found".to_string()));
        }
        self.calls().connects += 1;
        Ok(Box::new(FakeSession {
            calls: self.calls.clone(),
            behavior: self.behavior.clone(),
            closed: false,
        }))
    }
}

struct FakeSession {
    calls: Arc<Mutex<Calls>>,
    behavior: Behavior,
    closed: bool,
}

#[async_trait]
impl EngineSession for FakeSession {
    async fn build_image(&mut self, recipe: &BuildRecipe) -> EngineResult<ImageRef> {
        if self.behavior.hang_build {
            std::future::pending::<()>().await;
        }
        self.calls.lock().unwrap().builds.push(recipe.labels().clone());
        if self.behavior.fail_build {
            return Err(EngineError::Build("exit_code=1: no such file".to_string()));
        }
        Ok(ImageRef::new("localhost/fake-build"))
    }

    async fn login(
        &mut self,
        registry: &str,
        credentials: &RegistryCredentials,
    ) -> EngineResult<()> {
        self.calls
            .lock()
            .unwrap()
            .logins
            .push((registry.to_string(), credentials.username.clone()));
        Ok(())
    }

    async fn publish(&mut self, _image: &ImageRef, destination: &str) -> EngineResult<String> {
        self.calls
            .lock()
            .unwrap()
            .publishes
            .push(destination.to_string());
        if self.behavior.fail_publish {
            return Err(EngineError::Publish {
                destination: destination.to_string(),
                detail: "unauthorized".to_string(),
            });
        }
        Ok(format!("{}@sha256:abc123", destination))
    }

    async fn start(&mut self, spec: &ContainerSpec) -> EngineResult<ContainerId> {
        self.calls.lock().unwrap().starts.push(spec.clone());
        if self.behavior.fail_start {
            return Err(EngineError::Start {
                image: spec.image.clone(),
                detail: "manifest unknown".to_string(),
            });
        }
        Ok(ContainerId("fake-scan".to_string()))
    }

    async fn exec(
        &mut self,
        _container: &ContainerId,
        command: &[String],
    ) -> EngineResult<ExecOutput> {
        if self.behavior.hang_exec {
            std::future::pending::<()>().await;
        }
        let is_setup = {
            let mut calls = self.calls.lock().unwrap();
            calls.execs.push(command.to_vec());
            command.last().is_some_and(|line| line.starts_with("pip"))
        };
        if is_setup {
            return Ok(ExecOutput {
                stdout: String::new(),
                stderr: if self.behavior.setup_exit != 0 {
                    "ERROR: could not open requirements.txt".to_string()
                } else {
                    String::new()
                },
                exit_code: self.behavior.setup_exit,
            });
        }
        Ok(ExecOutput {
            stdout: self.behavior.scan_stdout.clone(),
            stderr: String::new(),
            exit_code: self.behavior.scan_exit,
        })
    }

    fn close(&mut self) -> EngineResult<()> {
        if !self.closed {
            self.closed = true;
            self.calls.lock().unwrap().closes += 1;
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
struct FakeReporter {
    reports: Arc<Mutex<Vec<String>>>,
    reject: Option<(u16, String)>,
}

impl FakeReporter {
    fn rejecting(status: u16, body: &str) -> Self {
        Self {
            reports: Arc::default(),
            reject: Some((status, body.to_string())),
        }
    }

    fn count(&self) -> usize {
        self.reports.lock().unwrap().len()
    }
}

#[async_trait]
impl ScanReporter for FakeReporter {
    async fn report(
        &self,
        scan_output: &str,
        _repo: &str,
        issue_number: &str,
        _token: &SecretString,
    ) -> gantry_client::Result<ReportOutcome> {
        self.reports.lock().unwrap().push(scan_output.to_string());
        if let Some((status, body)) = &self.reject {
            return Err(ClientError::rejected(*status, body.clone()));
        }
        Ok(ReportOutcome {
            comment_url: Some(format!(
                "https://github.com/acme/app/pull/{}#issuecomment-1",
                issue_number
            )),
            truncated: false,
        })
    }
}

fn context() -> ExecutionContext {
    ExecutionContext::new(".", Duration::from_secs(60))
        .with_image("ghcr.io", "acme/app")
        .with_review_thread("acme/app", "42", "t0ken")
}

fn pipeline(engine: &FakeEngine, reporter: &FakeReporter) -> Pipeline {
    Pipeline::new(Arc::new(engine.clone()), Arc::new(reporter.clone()))
}

// =============================================================================
// Full pipeline
// =============================================================================

#[tokio::test]
async fn test_success_publishes_and_reports() {
    let engine = FakeEngine::with(Behavior {
        scan_stdout: "app/main.py:3:80: E501 line too long\n".to_string(),
        scan_exit: 1,
        ..Behavior::default()
    });
    let reporter = FakeReporter::default();

    let outcome = pipeline(&engine, &reporter).run(&context()).await.unwrap();

    assert_eq!(
        outcome.published.as_str(),
        "ghcr.io/acme/app:latest@sha256:abc123"
    );
    assert!(!outcome.has_warnings());
    match &outcome.scan {
        ScanPhaseOutcome::Reported(report) => {
            assert_eq!(report.exit_code, 1);
            assert!(report.has_output);
            assert_eq!(
                report.comment_url.as_deref(),
                Some("https://github.com/acme/app/pull/42#issuecomment-1")
            );
        }
        other => panic!("unexpected scan outcome: {:?}", other),
    }
    assert!(
        outcome
            .message()
            .starts_with("Image successfully pushed to ghcr.io/acme/app:latest@sha256:abc123")
    );
    assert!(outcome.finished_at >= outcome.started_at);

    assert_eq!(
        reporter.reports.lock().unwrap().as_slice(),
        ["app/main.py:3:80: E501 line too long\n"]
    );

    let calls = engine.calls();
    assert_eq!(calls.publishes, vec!["ghcr.io/acme/app:latest"]);
    assert_eq!(calls.connects, 2);
    assert_eq!(calls.closes, calls.connects);
}

#[tokio::test]
async fn test_scan_runs_setup_then_tool_in_mounted_source() {
    let engine = FakeEngine::default();
    let reporter = FakeReporter::default();

    pipeline(&engine, &reporter).run(&context()).await.unwrap();

    let calls = engine.calls();
    assert_eq!(calls.starts.len(), 1);
    assert_eq!(calls.starts[0].image, "python:3.10");
    assert_eq!(calls.starts[0].mount.container_path, "/src");
    assert_eq!(calls.starts[0].workdir, "/src");
    assert_eq!(
        calls.execs,
        vec![
            vec!["sh", "-c", "pip install -r requirements.txt"],
            vec!["sh", "-c", "flake8 app"],
        ]
    );
}

#[tokio::test]
async fn test_clean_scan_reports_no_findings() {
    let engine = FakeEngine::default();
    let reporter = FakeReporter::default();

    let outcome = pipeline(&engine, &reporter).run(&context()).await.unwrap();

    assert!(outcome.scan.summary().starts_with("Scan results posted (no findings)"));
    assert_eq!(reporter.reports.lock().unwrap().as_slice(), [""]);
}

#[tokio::test]
async fn test_build_failure_is_fatal_even_when_scan_succeeds() {
    let engine = FakeEngine::with(Behavior {
        fail_build: true,
        ..Behavior::default()
    });
    let reporter = FakeReporter::default();

    let err = pipeline(&engine, &reporter).run(&context()).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Engine {
            phase: Phase::Build,
            source: EngineError::Build(_)
        }
    ));
    assert_eq!(err.exit_code(), 1);
    // scan still ran and was reported
    assert_eq!(reporter.count(), 1);

    let calls = engine.calls();
    assert!(calls.publishes.is_empty());
    assert_eq!(calls.closes, calls.connects);
}

#[tokio::test]
async fn test_build_failure_is_fatal_when_scan_also_fails() {
    let engine = FakeEngine::with(Behavior {
        fail_start: true,
        fail_publish: true,
        ..Behavior::default()
    });
    let reporter = FakeReporter::default();

    let err = pipeline(&engine, &reporter).run(&context()).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Engine {
            phase: Phase::Build,
            source: EngineError::Publish { .. }
        }
    ));
    assert_eq!(reporter.count(), 0);
}

#[tokio::test]
async fn test_scan_failure_does_not_block_publish() {
    let engine = FakeEngine::with(Behavior {
        fail_start: true,
        ..Behavior::default()
    });
    let reporter = FakeReporter::default();

    let outcome = pipeline(&engine, &reporter).run(&context()).await.unwrap();

    assert_eq!(
        outcome.published.as_str(),
        "ghcr.io/acme/app:latest@sha256:abc123"
    );
    assert!(outcome.has_warnings());
    let warning = outcome.scan.warning().unwrap();
    assert_eq!(warning.kind, ScanWarningKind::Engine);
    assert!(warning.detail.contains("manifest unknown"));
    assert_eq!(reporter.count(), 0);

    let calls = engine.calls();
    assert_eq!(calls.closes, calls.connects);
}

#[tokio::test]
async fn test_failing_setup_command_is_a_scan_warning() {
    let engine = FakeEngine::with(Behavior {
        setup_exit: 1,
        ..Behavior::default()
    });
    let reporter = FakeReporter::default();

    let outcome = pipeline(&engine, &reporter).run(&context()).await.unwrap();

    let warning = outcome.scan.warning().unwrap();
    assert_eq!(warning.kind, ScanWarningKind::Engine);
    assert!(warning.detail.contains("pip install -r requirements.txt"));
    assert!(warning.detail.contains("could not open requirements.txt"));
    // the scan tool never ran
    assert_eq!(engine.calls().execs.len(), 1);
    assert_eq!(reporter.count(), 0);
}

#[tokio::test]
async fn test_rejected_comment_surfaces_api_body() {
    let engine = FakeEngine::default();
    let reporter = FakeReporter::rejecting(403, r#"{"message":"Bad credentials"}"#);

    let outcome = pipeline(&engine, &reporter).run(&context()).await.unwrap();

    let warning = outcome.scan.warning().unwrap();
    assert_eq!(warning.kind, ScanWarningKind::Report);
    assert!(warning.detail.contains("403"));
    assert!(warning.detail.contains(r#"{"message":"Bad credentials"}"#));
    assert!(outcome.message().contains("warning: scan results could not be posted"));
}

#[tokio::test]
async fn test_unavailable_engine_fails_build() {
    let engine = FakeEngine::with(Behavior {
        fail_connect: true,
        ..Behavior::default()
    });
    let reporter = FakeReporter::default();

    let err = pipeline(&engine, &reporter).run(&context()).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Engine {
            phase: Phase::Build,
            source: EngineError::Unavailable(_)
        }
    ));
}

#[tokio::test]
async fn test_build_labels_and_login_pass_through() {
    let engine = FakeEngine::default();
    let reporter = FakeReporter::default();
    let ctx = context()
        .with_registry_credentials("bot", "s3cret")
        .with_build_options(BuildOptions {
            version_label: "2.3.4".to_string(),
            tag: "pr-42".to_string(),
            ..BuildOptions::default()
        });

    let outcome = pipeline(&engine, &reporter).run(&ctx).await.unwrap();

    assert_eq!(
        outcome.published.as_str(),
        "ghcr.io/acme/app:pr-42@sha256:abc123"
    );
    let calls = engine.calls();
    assert_eq!(calls.builds.len(), 1);
    assert_eq!(
        calls.builds[0].get(VERSION_LABEL).map(String::as_str),
        Some("2.3.4")
    );
    assert_eq!(
        calls.logins,
        vec![("ghcr.io".to_string(), "bot".to_string())]
    );
}

#[tokio::test]
async fn test_repeated_runs_publish_same_reference() {
    let engine = FakeEngine::default();
    let reporter = FakeReporter::default();
    let pipeline = pipeline(&engine, &reporter);

    let first = pipeline.run(&context()).await.unwrap();
    let second = pipeline.run(&context()).await.unwrap();

    assert_eq!(first.published, second.published);
    assert_ne!(first.invocation_id, second.invocation_id);
}

// =============================================================================
// Configuration
// =============================================================================

#[tokio::test]
async fn test_missing_fields_fail_before_any_external_call() {
    let cases: Vec<(&str, Box<dyn Fn(&mut ExecutionContext)>)> = vec![
        ("registry", Box::new(|c: &mut ExecutionContext| c.registry.clear())),
        ("image name", Box::new(|c: &mut ExecutionContext| c.image_name.clear())),
        ("repository", Box::new(|c: &mut ExecutionContext| c.repo.clear())),
        (
            "pull request number",
            Box::new(|c: &mut ExecutionContext| c.issue_number.clear()),
        ),
        (
            "token",
            Box::new(|c: &mut ExecutionContext| c.token = SecretString::default()),
        ),
        (
            "scan command",
            Box::new(|c: &mut ExecutionContext| {
                c.scan = ScanOptions {
                    command: "  ".to_string(),
                    ..ScanOptions::default()
                }
            }),
        ),
    ];

    for (field, blank) in cases {
        let engine = FakeEngine::default();
        let reporter = FakeReporter::default();
        let mut ctx = context();
        blank(&mut ctx);

        let err = pipeline(&engine, &reporter).run(&ctx).await.unwrap_err();

        match &err {
            PipelineError::Config(config) => assert_eq!(config.field(), field),
            other => panic!("expected config error for {}, got {:?}", field, other),
        }
        assert_eq!(err.exit_code(), 2);
        assert_eq!(engine.calls().connects, 0, "engine touched for {}", field);
        assert_eq!(reporter.count(), 0, "reporter touched for {}", field);
    }
}

#[tokio::test]
async fn test_build_only_ignores_review_thread() {
    let engine = FakeEngine::default();
    let reporter = FakeReporter::default();
    let ctx = ExecutionContext::new(".", Duration::from_secs(60)).with_image("ghcr.io", "acme/app");

    let published = pipeline(&engine, &reporter)
        .build_and_push(&ctx)
        .await
        .unwrap();

    assert_eq!(published.as_str(), "ghcr.io/acme/app:latest@sha256:abc123");
    assert!(engine.calls().starts.is_empty());
    assert_eq!(reporter.count(), 0);
}

#[tokio::test]
async fn test_scan_only_ignores_registry() {
    let engine = FakeEngine::default();
    let reporter = FakeReporter::default();
    let ctx = ExecutionContext::new(".", Duration::from_secs(60))
        .with_review_thread("acme/app", "42", "t0ken");

    let outcome = pipeline(&engine, &reporter)
        .scan_and_report(&ctx)
        .await
        .unwrap();

    assert!(!outcome.is_warned());
    assert!(engine.calls().publishes.is_empty());
    assert_eq!(reporter.count(), 1);
}

// =============================================================================
// Deadline
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_deadline_during_build_times_out_and_releases_session() {
    let engine = FakeEngine::with(Behavior {
        hang_build: true,
        ..Behavior::default()
    });
    let reporter = FakeReporter::default();
    let ctx = context().with_deadline(tokio::time::Instant::now() + Duration::from_secs(5));

    let err = pipeline(&engine, &reporter).run(&ctx).await.unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(err.exit_code(), 124);
    assert_eq!(err.phase(), Some(Phase::Build));

    let calls = engine.calls();
    assert_eq!(calls.connects, 2);
    assert_eq!(calls.closes, 2);
    assert!(calls.publishes.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_deadline_during_scan_is_a_warning() {
    let engine = FakeEngine::with(Behavior {
        hang_exec: true,
        ..Behavior::default()
    });
    let reporter = FakeReporter::default();
    let ctx = context().with_deadline(tokio::time::Instant::now() + Duration::from_secs(5));

    let outcome = pipeline(&engine, &reporter)
        .scan_and_report(&ctx)
        .await
        .unwrap();

    assert_eq!(outcome.warning().unwrap().kind, ScanWarningKind::Timeout);
    assert_eq!(reporter.count(), 0);

    let calls = engine.calls();
    assert_eq!(calls.connects, 1);
    assert_eq!(calls.closes, 1);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_during_scan_stops_run_before_build() {
    let engine = FakeEngine::with(Behavior {
        hang_exec: true,
        ..Behavior::default()
    });
    let reporter = FakeReporter::default();
    let ctx = context().with_deadline(tokio::time::Instant::now() + Duration::from_secs(5));

    let err = pipeline(&engine, &reporter).run(&ctx).await.unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(err.exit_code(), 124);
    assert_eq!(err.phase(), Some(Phase::Scan));
    assert_eq!(err.to_string(), "scan phase timed out: deadline exceeded");
    assert_eq!(reporter.count(), 0);

    // the build session was never opened
    let calls = engine.calls();
    assert_eq!(calls.connects, 1);
    assert_eq!(calls.closes, 1);
    assert!(calls.builds.is_empty());
}
