use crate::backend::ImageBackend;
use crate::cluster::{CleanupReport, ClusterClient};
use crate::config::EngineConfig;
use crate::events::{EventHub, ImageEvent};
use crate::parse::{parse_images, ImageRecord};
use crate::resources::{Resources, Tool};
use crate::runner::{CommandResult, CommandRunner, Spawner};
use crate::ImageError;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, info_span, instrument, warn, Instrument};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessorState {
    pub active: bool,
    pub is_k8s_ready: bool,
    pub current_namespace: String,
}

struct Inner {
    backend: Arc<dyn ImageBackend>,
    runner: CommandRunner,
    hub: EventHub,
    state: Mutex<ProcessorState>,
    /// Bumped by every `start`; a watch task only acts for its own generation.
    generation: AtomicU64,
    last_published: Mutex<Option<Vec<ImageRecord>>>,
}

struct WatchHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Runs image operations through an [`ImageBackend`] and keeps subscribers'
/// image lists in step with cluster readiness while active.
///
/// Lifecycle: inactive after construction; [`start`](Self::start) subscribes to
/// readiness events and spawns the watch task, [`stop`](Self::stop) (or drop)
/// ends it. Commands already running when stopped are not cancelled.
pub struct ImageProcessor {
    inner: Arc<Inner>,
    watch: Mutex<Option<WatchHandle>>,
    refresh_interval: Option<Duration>,
}

impl ImageProcessor {
    pub fn new(
        backend: Arc<dyn ImageBackend>,
        spawner: Arc<dyn Spawner>,
        resources: Resources,
        hub: EventHub,
        namespace: &str,
    ) -> Self {
        let runner = CommandRunner::new(backend.name(), spawner, resources, hub.clone());
        Self {
            inner: Arc::new(Inner {
                backend,
                runner,
                hub,
                state: Mutex::new(ProcessorState {
                    active: false,
                    is_k8s_ready: false,
                    current_namespace: namespace.to_owned(),
                }),
                generation: AtomicU64::new(0),
                last_published: Mutex::new(None),
            }),
            watch: Mutex::new(None),
            refresh_interval: None,
        }
    }

    pub fn from_config(
        backend: Arc<dyn ImageBackend>,
        spawner: Arc<dyn Spawner>,
        hub: EventHub,
        config: &EngineConfig,
    ) -> Self {
        Self::new(backend, spawner, config.resources(), hub, &config.namespace)
            .with_refresh_interval(config.refresh_interval())
    }

    /// Also poll the image list on this interval while active and ready.
    #[must_use]
    pub fn with_refresh_interval(mut self, interval: Option<Duration>) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn processor_name(&self) -> &str {
        self.inner.backend.name()
    }

    pub fn state(&self) -> ProcessorState {
        self.inner.state().clone()
    }

    pub fn namespace(&self) -> String {
        self.inner.state().current_namespace.clone()
    }

    pub fn hub(&self) -> &EventHub {
        &self.inner.hub
    }

    /// Activate the processor. Must be called from within a tokio runtime.
    /// Calling it while already active does nothing.
    pub fn start(&self) {
        let mut watch = lock(&self.watch);
        let (readiness, generation) = {
            let mut state = self.inner.state();
            if state.active {
                return;
            }
            state.active = true;
            let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            (self.inner.hub.subscribe_readiness(), generation)
        };

        let (shutdown, shutdown_rx) = oneshot::channel();
        let span = info_span!("watch", processor = self.processor_name());
        let task = tokio::spawn(
            watch_loop(
                self.inner.clone(),
                generation,
                readiness,
                shutdown_rx,
                self.refresh_interval,
            )
            .instrument(span),
        );
        *watch = Some(WatchHandle { shutdown, task });
        info!("{} image processor started", self.processor_name());
    }

    /// Deactivate the processor and unsubscribe from readiness events.
    pub fn stop(&self) {
        let handle = {
            let mut watch = lock(&self.watch);
            let mut state = self.inner.state();
            if !state.active {
                return;
            }
            state.active = false;
            watch.take()
        };
        if let Some(handle) = handle {
            // The task may already have exited; either way it no longer needs the signal.
            let _ = handle.shutdown.send(());
            drop(handle.task);
        }
        info!("{} image processor stopped", self.processor_name());
    }

    /// Whether a watch task is attached and still running.
    pub fn watching(&self) -> bool {
        lock(&self.watch)
            .as_ref()
            .is_some_and(|h| !h.task.is_finished())
    }

    #[instrument(skip(self), fields(processor = self.processor_name()))]
    pub async fn build(
        &self,
        context_dir: &Path,
        file: &Path,
        tagged_name: &str,
    ) -> Result<CommandResult, ImageError> {
        require("image tag", tagged_name)?;
        let args = self
            .inner
            .backend
            .build_args(&self.namespace(), context_dir, file, tagged_name);
        self.run_checked(self.inner.backend.tool(), "build", &args).await
    }

    #[instrument(skip(self), fields(processor = self.processor_name()))]
    pub async fn pull(&self, tagged_name: &str) -> Result<CommandResult, ImageError> {
        require("image reference", tagged_name)?;
        let args = self.inner.backend.pull_args(&self.namespace(), tagged_name);
        self.run_checked(self.inner.backend.tool(), "pull", &args).await
    }

    #[instrument(skip(self), fields(processor = self.processor_name()))]
    pub async fn push(&self, tagged_name: &str) -> Result<CommandResult, ImageError> {
        require("image reference", tagged_name)?;
        let args = self.inner.backend.push_args(&self.namespace(), tagged_name);
        self.run_checked(self.inner.backend.tool(), "push", &args).await
    }

    #[instrument(skip(self), fields(processor = self.processor_name()))]
    pub async fn delete(&self, image_id: &str) -> Result<CommandResult, ImageError> {
        require("image ID", image_id)?;
        let args = self.inner.backend.delete_args(&self.namespace(), image_id);
        self.run_checked(self.inner.backend.tool(), "rmi", &args).await
    }

    #[instrument(skip(self), fields(processor = self.processor_name()))]
    pub async fn scan(&self, tagged_name: &str) -> Result<CommandResult, ImageError> {
        require("image reference", tagged_name)?;
        let args = self.inner.backend.scan_args(tagged_name);
        self.run_checked(Tool::Trivy, "scan", &args).await
    }

    /// Current images in the current namespace, sorted. A nonzero exit of the
    /// listing command is an error, never an empty list.
    pub async fn list(&self) -> Result<Vec<ImageRecord>, ImageError> {
        self.inner.list().await
    }

    /// List and publish `ImagesChanged` unconditionally.
    pub async fn refresh(&self) -> Result<Vec<ImageRecord>, ImageError> {
        self.inner.refresh(true).await
    }

    /// Namespaces known to the backend, trimmed and sorted. Stderr noise is
    /// logged; output is used whenever there is any.
    #[instrument(skip(self), fields(processor = self.processor_name()))]
    pub async fn namespaces(&self) -> Result<Vec<String>, ImageError> {
        let args = self.inner.backend.namespaces_args(&self.namespace());
        let result = self
            .inner
            .runner
            .run(self.inner.backend.tool(), "namespace", &args, false)
            .await?;

        let mut names: Vec<String> = result
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect();

        if !result.success() && names.is_empty() {
            return Err(ImageError::CommandFailed {
                subcommand: "namespace list".to_owned(),
                result,
            });
        }
        if !result.stderr.trim().is_empty() || !result.success() {
            warn!(
                "namespace list ({}) reported: {}",
                result.describe_exit(),
                result.stderr.trim()
            );
        }

        names.sort();
        Ok(names)
    }

    /// Switch the namespace all later operations are scoped to. When active
    /// and ready, the image list for the new namespace is published.
    pub async fn set_namespace(&self, namespace: &str) -> Result<(), ImageError> {
        let namespace = namespace.trim();
        require("namespace", namespace)?;

        let refresh = {
            let mut state = self.inner.state();
            if state.current_namespace == namespace {
                return Ok(());
            }
            state.current_namespace = namespace.to_owned();
            state.active && state.is_k8s_ready
        };
        info!("image namespace is now {namespace}");
        self.inner.hub.publish(ImageEvent::NamespaceChanged {
            namespace: namespace.to_owned(),
        });

        if refresh {
            if let Err(e) = self.inner.refresh(true).await {
                warn!("image refresh after namespace change failed: {e}");
            }
        }
        Ok(())
    }

    pub async fn remove_legacy_builder(&self, cluster: &dyn ClusterClient) -> CleanupReport {
        let report = self.inner.backend.remove_legacy_builder(cluster).await;
        if !report.is_clean() {
            warn!(
                "legacy builder cleanup left {} resource(s) behind",
                report.failed.len()
            );
        }
        report
    }

    async fn run_checked(
        &self,
        tool: Tool,
        subcommand: &str,
        args: &[String],
    ) -> Result<CommandResult, ImageError> {
        self.inner
            .runner
            .run(tool, subcommand, args, true)
            .await?
            .into_checked(subcommand)
    }
}

impl Drop for ImageProcessor {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.watch).take() {
            handle.task.abort();
        }
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, ProcessorState> {
        lock(&self.state)
    }

    async fn list(&self) -> Result<Vec<ImageRecord>, ImageError> {
        let namespace = self.state().current_namespace.clone();
        let args = self.backend.list_args(&namespace);
        let result = self
            .runner
            .run(self.backend.tool(), "images", &args, false)
            .await?
            .into_checked("images")?;
        if !result.stderr.trim().is_empty() {
            debug!("images stderr: {}", result.stderr.trim());
        }
        Ok(parse_images(&result.stdout))
    }

    /// List, then publish. With `force` unset the event is skipped when the
    /// list equals the one published last.
    async fn refresh(&self, force: bool) -> Result<Vec<ImageRecord>, ImageError> {
        let images = self.list().await?;
        {
            let mut last = lock(&self.last_published);
            if !force && last.as_ref() == Some(&images) {
                return Ok(images);
            }
            *last = Some(images.clone());
        }
        debug!("publishing {} image(s)", images.len());
        self.hub.publish(ImageEvent::ImagesChanged {
            images: images.clone(),
        });
        Ok(images)
    }

    /// Apply a readiness transition; returns whether a refresh should follow.
    fn apply_readiness(&self, generation: u64, ready: bool) -> bool {
        let mut state = self.state();
        if !self.is_current(&state, generation) {
            debug!("readiness event ({ready}) ignored: processor inactive");
            return false;
        }
        if state.is_k8s_ready != ready {
            info!("cluster readiness changed: {ready}");
        }
        state.is_k8s_ready = ready;
        true
    }

    fn polling_allowed(&self, generation: u64) -> bool {
        let state = self.state();
        self.is_current(&state, generation) && state.is_k8s_ready
    }

    /// Callers hold the state lock, which `start` also holds while bumping
    /// the generation.
    fn is_current(&self, state: &ProcessorState, generation: u64) -> bool {
        state.active && self.generation.load(Ordering::SeqCst) == generation
    }
}

async fn watch_loop(
    inner: Arc<Inner>,
    generation: u64,
    mut readiness: broadcast::Receiver<bool>,
    mut shutdown: oneshot::Receiver<()>,
    refresh_interval: Option<Duration>,
) {
    let mut ticker = refresh_interval.map(|period| {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    });

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            event = readiness.recv() => {
                let ready = match event {
                    Ok(ready) => latest_readiness(ready, &mut readiness),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("skipped {skipped} stale readiness event(s)");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                if inner.apply_readiness(generation, ready) {
                    if let Err(e) = inner.refresh(true).await {
                        warn!("image refresh failed: {e}");
                    }
                }
            }
            () = next_tick(ticker.as_mut()) => {
                if inner.polling_allowed(generation) {
                    if let Err(e) = inner.refresh(false).await {
                        warn!("periodic image refresh failed: {e}");
                    }
                }
            }
        }
    }
    debug!("watch loop finished");
}

/// Drain readiness events that queued up meanwhile; only the newest matters.
fn latest_readiness(mut ready: bool, readiness: &mut broadcast::Receiver<bool>) -> bool {
    loop {
        match readiness.try_recv() {
            Ok(next) => ready = next,
            Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty | TryRecvError::Closed) => return ready,
        }
    }
}

async fn next_tick(ticker: Option<&mut tokio::time::Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn require(what: &str, value: &str) -> Result<(), ImageError> {
    if value.trim().is_empty() {
        Err(ImageError::InvalidArgument(format!("{what} must not be empty")))
    } else {
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
