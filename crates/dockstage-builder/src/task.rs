//! # Builder task: the staging workflow.
//!
//! ```text
//!   ResolvingReference ──► WaitingForDaemon? ──► FetchingOrCaching ──► WritingResult ──► Done
//!          │                     │                      │                    │
//!          └─────────────────────┴──────────────────────┴────────────────────┴──► Failed
//! ```
//!
//! `WaitingForDaemon` is entered only when caching is configured. It races daemon readiness,
//! the configured timeout and a termination request; whichever comes first decides. Every
//! later external call is raced against the termination request as well, so the task never
//! waits on I/O alone.

use std::{fmt, future::Future, sync::Arc, time::Instant};

use async_trait::async_trait;
use dockstage_core::{Ready, ReadyWait, Task, TaskError};
use dockstage_model::{ImageRef, StagingResult};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    config::{CacheConfig, StagingConfig},
    destination::generate_destination,
    dockercfg::write_dockercfg,
    registry::Registry,
    result::write_result,
};

/// Workflow state, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ResolvingReference,
    WaitingForDaemon,
    FetchingOrCaching,
    WritingResult,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::ResolvingReference => "resolving_reference",
            Stage::WaitingForDaemon => "waiting_for_daemon",
            Stage::FetchingOrCaching => "fetching_or_caching",
            Stage::WritingResult => "writing_result",
            Stage::Done => "done",
            Stage::Failed => "failed",
        })
    }
}

pub struct BuilderTask {
    cfg: Arc<StagingConfig>,
    registry: Arc<dyn Registry>,
    daemon_ready: Option<ReadyWait>,
}

impl BuilderTask {
    pub fn new(cfg: Arc<StagingConfig>, registry: Arc<dyn Registry>) -> Self {
        Self {
            cfg,
            registry,
            daemon_ready: None,
        }
    }

    /// Readiness of the daemon this builder caches through.
    pub fn with_daemon_ready(mut self, ready: ReadyWait) -> Self {
        self.daemon_ready = Some(ready);
        self
    }

    async fn stage(&mut self, ctx: &CancellationToken) -> Result<(), TaskError> {
        enter(Stage::ResolvingReference);
        let source = self
            .cfg
            .locator
            .resolve()
            .map_err(|e| TaskError::InvalidReference {
                reason: e.to_string(),
            })?;
        debug!(target: "dockstage.builder.task", locator = %self.cfg.locator, %source, "reference resolved");

        if self.cfg.caching() {
            enter(Stage::WaitingForDaemon);
            self.wait_for_daemon(ctx).await?;
        }

        enter(Stage::FetchingOrCaching);
        let metadata = interruptible(ctx, self.registry.fetch_metadata(&source)).await??;
        let image = match &self.cfg.cache {
            Some(cache) => self.cache(ctx, cache, &source).await?,
            None => source,
        };

        enter(Stage::WritingResult);
        let result = StagingResult::new(&image, &metadata).map_err(|e| TaskError::ResultWrite {
            reason: e.to_string(),
        })?;
        write_result(&self.cfg.output_path, &result)
            .await
            .map_err(|e| TaskError::ResultWrite {
                reason: format!("{}: {e}", self.cfg.output_path.display()),
            })?;

        info!(target: "dockstage.builder.task", docker_image = %result.docker_image, "staging result written");
        Ok(())
    }

    async fn wait_for_daemon(&mut self, ctx: &CancellationToken) -> Result<(), TaskError> {
        let timeout = self.cfg.daemon_timeout;
        let started = Instant::now();
        let daemon_ready = self.daemon_ready.take();

        let ready = async move {
            let became_ready = match daemon_ready {
                Some(wait) => wait.await,
                None => false,
            };
            // a dropped notifier means the daemon will never be ready
            if !became_ready {
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            biased;

            _ = ctx.cancelled() => {
                debug!(target: "dockstage.builder.task", "interrupted while waiting for daemon");
                Err(TaskError::Interrupted)
            }
            _ = ready => {
                debug!(target: "dockstage.builder.task", elapsed = ?started.elapsed(), "daemon ready");
                Ok(())
            }
            _ = tokio::time::sleep(timeout) => {
                Err(TaskError::DaemonStartTimeout { elapsed: started.elapsed() })
            }
        }
    }

    async fn cache(
        &self,
        ctx: &CancellationToken,
        cache: &CacheConfig,
        source: &ImageRef,
    ) -> Result<ImageRef, TaskError> {
        let destination =
            generate_destination(&cache.registries).ok_or_else(|| TaskError::Registry {
                reason: "no registry address to cache into".into(),
            })?;

        if let Some(creds) = &cache.credentials {
            write_dockercfg(&cache.dockercfg_path, creds)
                .await
                .map_err(|e| TaskError::Registry {
                    reason: format!("writing {}: {e}", cache.dockercfg_path.display()),
                })?;
        }

        interruptible(ctx, self.registry.cache(source, &destination)).await??;
        info!(target: "dockstage.builder.task", %source, %destination, "image cached");
        Ok(destination)
    }
}

fn enter(stage: Stage) {
    debug!(target: "dockstage.builder.task", %stage, "entering stage");
}

/// Runs `fut` unless a termination request arrives first.
async fn interruptible<T, E>(
    ctx: &CancellationToken,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<Result<T, TaskError>, TaskError>
where
    TaskError: From<E>,
{
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(TaskError::Interrupted),
        out = fut => Ok(out.map_err(TaskError::from)),
    }
}

#[async_trait]
impl Task for BuilderTask {
    #[instrument(level = "debug", name = "builder", skip_all)]
    async fn run(self: Box<Self>, ctx: CancellationToken, ready: Ready) -> Result<(), TaskError> {
        let mut this = *self;
        ready.notify();
        info!(target: "dockstage.builder.task", caching = this.cfg.caching(), "staging started");

        match this.stage(&ctx).await {
            Ok(()) => {
                enter(Stage::Done);
                Ok(())
            }
            Err(e) => {
                warn!(target: "dockstage.builder.task", stage = %Stage::Failed, error = %e, label = e.as_label(), "staging failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        path::{Path, PathBuf},
        sync::Mutex,
        time::Duration,
    };

    use dockstage_core::{Group, TaskFn, TaskHandle, observe};
    use dockstage_model::{ExecutionMetadata, RegistryAddress};

    use super::*;
    use crate::{config::ImageLocator, registry::RegistryError};

    #[derive(Default)]
    struct FakeRegistry {
        cached: Mutex<Vec<(String, String)>>,
        fail_fetch: bool,
    }

    #[async_trait]
    impl Registry for FakeRegistry {
        async fn fetch_metadata(&self, _image: &ImageRef) -> Result<ExecutionMetadata, RegistryError> {
            if self.fail_fetch {
                return Err(RegistryError::Status {
                    url: "https://registry-1.docker.io/v2/library/ubuntu/manifests/latest".into(),
                    status: 404,
                });
            }
            Ok(ExecutionMetadata {
                entrypoint: vec!["/docker-entrypoint.sh".into()],
                workdir: Some("/srv".into()),
                ..Default::default()
            })
        }

        async fn cache(&self, source: &ImageRef, destination: &ImageRef) -> Result<(), RegistryError> {
            self.cached
                .lock()
                .unwrap()
                .push((source.to_string(), destination.to_string()));
            Ok(())
        }
    }

    fn config(output: &Path, cache: Option<CacheConfig>, timeout: Duration) -> Arc<StagingConfig> {
        Arc::new(StagingConfig {
            locator: ImageLocator::Url("docker:///ubuntu#trusty".into()),
            output_path: output.to_path_buf(),
            insecure_registries: Vec::new(),
            daemon_program: PathBuf::from("/tmp/docker_app_lifecycle/docker"),
            daemon_timeout: timeout,
            cache,
        })
    }

    fn cache_config(dockercfg: &Path) -> CacheConfig {
        CacheConfig {
            registries: RegistryAddress::parse_list("10.0.0.1:5000").unwrap(),
            credentials: None,
            dockercfg_path: dockercfg.to_path_buf(),
        }
    }

    /// Never ready; interrupted on request.
    fn stuck_daemon() -> dockstage_core::BoxTask {
        TaskFn::boxed(|ctx: CancellationToken, _ready: Ready| async move {
            ctx.cancelled().await;
            Err(TaskError::Interrupted)
        })
    }

    /// Ready at once; stops cleanly on request.
    fn healthy_daemon() -> dockstage_core::BoxTask {
        TaskFn::boxed(|ctx: CancellationToken, ready: Ready| async move {
            ready.notify();
            ctx.cancelled().await;
            Ok(())
        })
    }

    #[tokio::test]
    async fn writes_source_reference_without_caching() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("result").join("result.json");
        let task = BuilderTask::new(
            config(&output, None, Duration::from_secs(10)),
            Arc::new(FakeRegistry::default()),
        );

        let handle = TaskHandle::spawn("builder", Box::new(task));
        handle.wait().await.unwrap();

        let result: StagingResult =
            serde_json::from_slice(&std::fs::read(&output).unwrap()).unwrap();
        assert_eq!(result.docker_image, "docker.io/library/ubuntu:trusty");
        assert_eq!(result.metadata().unwrap().workdir.as_deref(), Some("/srv"));
    }

    #[tokio::test]
    async fn daemon_start_timeout_is_reported_by_the_group() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("result.json");
        let cfg = config(
            &output,
            Some(cache_config(&dir.path().join(".dockercfg"))),
            Duration::from_millis(300),
        );

        let (daemon, daemon_ready) = observe(stuck_daemon());
        let builder =
            BuilderTask::new(cfg, Arc::new(FakeRegistry::default())).with_daemon_ready(daemon_ready);
        let group = Group::default()
            .with_member("builder", builder)
            .with_member("docker_daemon", daemon);

        let started = Instant::now();
        let err = TaskHandle::spawn("staging", Box::new(group))
            .wait()
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "{elapsed:?}");
        let msg = err.to_string();
        assert!(
            msg.contains("builder exited with error: timed out waiting for daemon to start"),
            "{msg}"
        );
        assert!(msg.contains("docker_daemon exited with error: interrupted"), "{msg}");
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn interrupt_while_waiting_for_daemon() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(
            &dir.path().join("result.json"),
            Some(cache_config(&dir.path().join(".dockercfg"))),
            Duration::from_secs(30),
        );

        let (daemon, daemon_ready) = observe(stuck_daemon());
        let builder =
            BuilderTask::new(cfg, Arc::new(FakeRegistry::default())).with_daemon_ready(daemon_ready);
        let group = Group::default()
            .with_member("builder", builder)
            .with_member("docker_daemon", daemon);

        let handle = TaskHandle::spawn("staging", Box::new(group));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.signal();

        let msg = handle.wait().await.unwrap_err().to_string();
        assert!(msg.contains("builder exited with error: interrupted"), "{msg}");
        assert!(msg.contains("docker_daemon exited with error: interrupted"), "{msg}");
    }

    #[tokio::test]
    async fn caches_into_pool_once_daemon_is_ready() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("result.json");
        let dockercfg = dir.path().join(".dockercfg");
        let mut cache = cache_config(&dockercfg);
        cache.credentials = Some(crate::Credentials {
            server: "http://a-server.com".into(),
            token: "a-token".into(),
            email: "my-email@example.com".into(),
        });
        let cfg = config(&output, Some(cache), Duration::from_secs(10));
        let registry = Arc::new(FakeRegistry::default());

        let (daemon, daemon_ready) = observe(healthy_daemon());
        let builder = BuilderTask::new(cfg, registry.clone()).with_daemon_ready(daemon_ready);
        let group = Group::default()
            .with_member("builder", builder)
            .with_member("docker_daemon", daemon);

        TaskHandle::spawn("staging", Box::new(group))
            .wait()
            .await
            .unwrap();

        let cached = registry.cached.lock().unwrap().clone();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].0, "docker.io/library/ubuntu:trusty");
        assert!(cached[0].1.starts_with("10.0.0.1:5000/"));

        let result: StagingResult =
            serde_json::from_slice(&std::fs::read(&output).unwrap()).unwrap();
        assert_eq!(result.docker_image, cached[0].1);
        assert_eq!(
            std::fs::read_to_string(&dockercfg).unwrap(),
            r#"{"http://a-server.com": {"auth": "a-token", "email": "my-email@example.com"} }"#
        );
    }

    #[tokio::test]
    async fn invalid_reference_fails_before_waiting() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Arc::new(StagingConfig {
            locator: ImageLocator::Ref("Not/Valid".into()),
            ..(*config(&dir.path().join("result.json"), None, Duration::from_secs(10))).clone()
        });

        let handle = TaskHandle::spawn(
            "builder",
            Box::new(BuilderTask::new(cfg, Arc::new(FakeRegistry::default()))),
        );
        assert!(matches!(
            handle.wait().await,
            Err(TaskError::InvalidReference { .. })
        ));
    }

    #[tokio::test]
    async fn registry_failure_leaves_no_result() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("result.json");
        let registry = Arc::new(FakeRegistry {
            fail_fetch: true,
            ..Default::default()
        });

        let handle = TaskHandle::spawn(
            "builder",
            Box::new(BuilderTask::new(
                config(&output, None, Duration::from_secs(10)),
                registry,
            )),
        );
        let err = handle.wait().await.unwrap_err();
        assert!(err.to_string().contains("returned 404"), "{err}");
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn unwritable_output_is_a_result_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();

        let handle = TaskHandle::spawn(
            "builder",
            Box::new(BuilderTask::new(
                config(&blocker.join("result.json"), None, Duration::from_secs(10)),
                Arc::new(FakeRegistry::default()),
            )),
        );
        assert!(matches!(
            handle.wait().await,
            Err(TaskError::ResultWrite { .. })
        ));
    }
}
