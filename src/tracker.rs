//! Import tracker: submits raster imports, polls their jobs and projects each
//! status transition onto the shared library.
//!
//! Every tracked import owns one poll task. Status queries for an import are
//! strictly sequential, and each result is applied before the next query is
//! scheduled. Cancellation removes the map entry and cancels the task's token in
//! the same critical section, so a cancelled job never issues another query and
//! a response still in flight is dropped unapplied.
//!
//! Events are sent after the map lock is released. A per-import order lock keeps
//! one import's events in sequence, so a slow consumer stalls only that import.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};
use tokio_util::sync::CancellationToken;

use crate::api::ImportBackend;
use crate::config::ImportCfg;
use crate::error::{ApiError, ImportError};
use crate::library::SharedLibrary;
use crate::model::{DataSource, ImportJob, JobStatus, Raster};
use crate::projector::{StateChange, Transition, project_and_apply};
use crate::timer::{PollTimer, backoff_delay, cancellable, sleep_or_cancel};

/// Poll cadence and transport retry policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    /// Consecutive transport failures tolerated before the job stalls.
    pub max_transport_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl From<&ImportCfg> for PollSettings {
    fn from(cfg: &ImportCfg) -> Self {
        Self {
            interval: cfg.poll_interval(),
            max_transport_retries: cfg.max_transport_retries,
            initial_backoff: Duration::from_millis(cfg.retry_initial_backoff_ms),
            max_backoff: Duration::from_millis(cfg.retry_max_backoff_ms),
        }
    }
}

/// Events emitted for the UI layer. Events for one import arrive in order.
#[derive(Clone, Debug)]
pub enum TrackerEvent {
    /// The backend accepted the import; hide the import prompt and clear its selection.
    Submitted { import_id: String, name: String },
    /// Library changes applied for an import.
    Changed {
        import_id: String,
        changes: Vec<StateChange>,
    },
    Succeeded { job: ImportJob },
    Failed { job: ImportJob },
    Cancelled { import_id: String },
    /// Polling stopped after repeated transport errors; `resume` restarts it.
    Stalled { import_id: String, error: String },
    /// A non-fatal side effect failed.
    Warning { import_id: String, message: String },
}

struct TrackedImport {
    job: ImportJob,
    /// `None` while stalled.
    timer: Option<PollTimer>,
    /// Held while emitting this import's events; keeps them in order.
    order: Arc<Mutex<()>>,
}

fn changed(import_id: &str, changes: Vec<StateChange>) -> Option<TrackerEvent> {
    (!changes.is_empty()).then(|| TrackerEvent::Changed {
        import_id: import_id.to_string(),
        changes,
    })
}

enum Step {
    Continue,
    Done,
}

struct Inner {
    backend: Arc<dyn ImportBackend>,
    settings: PollSettings,
    library: SharedLibrary,
    tracked: Mutex<HashMap<String, TrackedImport>>,
    events: mpsc::Sender<TrackerEvent>,
}

/// Cheap-to-clone handle on the tracker state.
#[derive(Clone)]
pub struct ImportTracker {
    inner: Arc<Inner>,
}

impl ImportTracker {
    pub fn new(
        backend: Arc<dyn ImportBackend>,
        library: SharedLibrary,
        settings: PollSettings,
        events: mpsc::Sender<TrackerEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                settings,
                library,
                tracked: Mutex::new(HashMap::new()),
                events,
            }),
        }
    }

    pub fn library(&self) -> SharedLibrary {
        self.inner.library.clone()
    }

    /// Submit an import. On success the placeholder already exists when this returns.
    pub async fn submit(
        &self,
        source: DataSource,
        collection_id: Option<String>,
    ) -> Result<String, ImportError> {
        tracing::info!(name = %source.name, "import requested");
        let import_id = self
            .inner
            .backend
            .create_import(&source)
            .await
            .map_err(|e| {
                tracing::error!(name = %source.name, "import submission failed: {e}");
                ImportError::Submission(e)
            })?;

        let collection_id = collection_id.filter(|c| !c.is_empty());
        let job = ImportJob::pending(import_id.clone(), source.name.clone(), collection_id);

        // The poll task emits only after Submitted: it waits on this guard.
        let order = Arc::new(Mutex::new(()));
        let _order = order.clone().lock_owned().await;
        let changes = {
            let mut tracked = self.inner.tracked.lock().await;
            if tracked.contains_key(&import_id) {
                tracing::error!(import_id = %import_id, "backend returned a tracked import id");
                return Err(ImportError::Duplicate(import_id));
            }
            let changes = {
                let mut lib = self.inner.library.lock().await;
                project_and_apply(&mut lib, &Transition::Pending(job.clone()))
            };
            let timer = self.spawn_poll(import_id.clone());
            tracked.insert(
                import_id.clone(),
                TrackedImport {
                    job,
                    timer: Some(timer),
                    order,
                },
            );
            changes
        };
        tracing::info!(import_id = %import_id, "import tracked");

        let mut events = vec![TrackerEvent::Submitted {
            import_id: import_id.clone(),
            name: source.name,
        }];
        events.extend(changed(&import_id, changes));
        self.emit_all(events).await;
        Ok(import_id)
    }

    /// Cancel a tracked import: no further query is issued and its placeholder goes away.
    pub async fn cancel(&self, import_id: &str) -> Result<(), ImportError> {
        let not_tracked = || ImportError::NotTracked(import_id.to_string());
        let order = self.lock_order(import_id).await.ok_or_else(not_tracked)?;
        let changes = {
            let mut tracked = self.inner.tracked.lock().await;
            let entry = tracked.remove(import_id).ok_or_else(not_tracked)?;
            if let Some(timer) = &entry.timer {
                timer.cancel();
            }
            let mut lib = self.inner.library.lock().await;
            project_and_apply(
                &mut lib,
                &Transition::Cancelled {
                    import_id: import_id.to_string(),
                    collection_id: entry.job.collection_id,
                },
            )
        };
        tracing::info!(import_id = %import_id, "import cancelled");

        let mut events: Vec<TrackerEvent> = changed(import_id, changes).into_iter().collect();
        events.push(TrackerEvent::Cancelled {
            import_id: import_id.to_string(),
        });
        self.emit_all(events).await;
        drop(order);

        self.inner
            .backend
            .delete_job(import_id)
            .await
            .map_err(|e| {
                tracing::warn!(import_id = %import_id, "backend job deletion failed: {e}");
                ImportError::Api(e)
            })
    }

    /// Restart polling for a stalled import.
    pub async fn resume(&self, import_id: &str) -> Result<(), ImportError> {
        let mut tracked = self.inner.tracked.lock().await;
        let entry = tracked
            .get_mut(import_id)
            .ok_or_else(|| ImportError::NotTracked(import_id.to_string()))?;
        if entry.timer.as_ref().is_some_and(|t| !t.is_finished()) {
            return Err(ImportError::AlreadyPolling(import_id.to_string()));
        }
        entry.timer = Some(self.spawn_poll(import_id.to_string()));
        tracing::info!(import_id = %import_id, "polling resumed");
        Ok(())
    }

    /// Snapshot of a tracked job.
    pub async fn job(&self, import_id: &str) -> Option<ImportJob> {
        self.inner
            .tracked
            .lock()
            .await
            .get(import_id)
            .map(|t| t.job.clone())
    }

    pub async fn tracked_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.tracked.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Whether a poll task is live for the import (false when stalled or untracked).
    pub async fn is_polling(&self, import_id: &str) -> bool {
        self.inner
            .tracked
            .lock()
            .await
            .get(import_id)
            .and_then(|t| t.timer.as_ref())
            .is_some_and(|t| !t.is_finished())
    }

    /// Return the raster from the library, fetching and storing it when absent.
    pub async fn ensure_raster_loaded(&self, raster_id: &str) -> Result<Raster, ApiError> {
        let raster = self.load_raster(raster_id).await?;
        let mut lib = self.inner.library.lock().await;
        if lib.raster(raster_id).is_none() {
            lib.apply(&StateChange::MaterializeRaster(raster.clone()));
        }
        Ok(raster)
    }

    async fn load_raster(&self, raster_id: &str) -> Result<Raster, ApiError> {
        let cached = self.inner.library.lock().await.raster(raster_id).cloned();
        match cached {
            Some(r) => Ok(r),
            None => self.inner.backend.fetch_raster(raster_id).await,
        }
    }

    fn spawn_poll(&self, import_id: String) -> PollTimer {
        let tracker = self.clone();
        PollTimer::spawn(move |token| tracker.poll_loop(import_id, token))
    }

    async fn poll_loop(self, import_id: String, token: CancellationToken) {
        let mut failures = 0u32;
        loop {
            let delay = match self.poll_once(&import_id, &token).await {
                Ok(Step::Continue) => {
                    failures = 0;
                    self.inner.settings.interval
                }
                Ok(Step::Done) => return,
                Err(e) => {
                    failures += 1;
                    if failures > self.inner.settings.max_transport_retries {
                        self.stall(&import_id, &token, e).await;
                        return;
                    }
                    let delay = backoff_delay(
                        failures,
                        self.inner.settings.initial_backoff,
                        self.inner.settings.max_backoff,
                    );
                    tracing::warn!(
                        import_id = %import_id,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        "status query failed, retrying: {e}"
                    );
                    delay
                }
            };
            if !sleep_or_cancel(&token, delay).await {
                tracing::debug!(import_id = %import_id, "poll cancelled");
                return;
            }
        }
    }

    async fn poll_once(
        &self,
        import_id: &str,
        token: &CancellationToken,
    ) -> Result<Step, ApiError> {
        let status = self.inner.backend.job_status(import_id);
        let Some(report) = cancellable(token, status).await else {
            return Ok(Step::Done);
        };
        let report = report?;
        tracing::debug!(import_id = %import_id, status = ?report.status, "status received");
        match report.status {
            JobStatus::Pending => self.apply_pending(import_id, token).await,
            JobStatus::Failed => {
                self.finish_failed(import_id, token, report.reason.unwrap_or_default())
                    .await
            }
            JobStatus::Ok => {
                let raster_id = report.raster_id.filter(|id| !id.is_empty()).ok_or_else(|| {
                    ApiError::Malformed(format!("import {import_id} finished without rasterId"))
                })?;
                self.finish_ok(import_id, token, raster_id).await
            }
        }
    }

    async fn apply_pending(
        &self,
        import_id: &str,
        token: &CancellationToken,
    ) -> Result<Step, ApiError> {
        let Some(_order) = self.lock_order(import_id).await else {
            return Ok(Step::Done);
        };
        let changes = {
            let tracked = self.inner.tracked.lock().await;
            if token.is_cancelled() {
                return Ok(Step::Done);
            }
            let Some(entry) = tracked.get(import_id) else {
                return Ok(Step::Done);
            };
            let mut lib = self.inner.library.lock().await;
            project_and_apply(&mut lib, &Transition::Pending(entry.job.clone()))
        };
        self.emit_all(changed(import_id, changes)).await;
        Ok(Step::Continue)
    }

    async fn finish_ok(
        &self,
        import_id: &str,
        token: &CancellationToken,
        raster_id: String,
    ) -> Result<Step, ApiError> {
        let collection_id = match self.inner.tracked.lock().await.get(import_id) {
            Some(entry) => entry.job.collection_id.clone(),
            None => return Ok(Step::Done),
        };

        let Some(raster) = cancellable(token, self.load_raster(&raster_id)).await else {
            return Ok(Step::Done);
        };
        let raster = raster?;

        let mut events = Vec::new();
        if let Some(cid) = &collection_id {
            let add = self
                .inner
                .backend
                .add_to_collection(cid, std::slice::from_ref(&raster.id));
            match cancellable(token, add).await {
                None => return Ok(Step::Done),
                Some(Ok(())) => {}
                Some(Err(e)) => {
                    // The local membership is still applied; the next refresh reconciles it.
                    tracing::warn!(
                        import_id = %import_id,
                        collection_id = %cid,
                        "collection update failed: {e}"
                    );
                    events.push(TrackerEvent::Warning {
                        import_id: import_id.to_string(),
                        message: format!("adding {} to collection {cid} failed: {e}", raster.id),
                    });
                }
            }
        }

        let Some(_order) = self.lock_order(import_id).await else {
            return Ok(Step::Done);
        };
        let (job, changes) = {
            let mut tracked = self.inner.tracked.lock().await;
            if token.is_cancelled() {
                return Ok(Step::Done);
            }
            let Some(mut entry) = tracked.remove(import_id) else {
                return Ok(Step::Done);
            };
            if let Err(e) = entry.job.complete(raster.id.clone()) {
                tracing::warn!(import_id = %import_id, "{e}");
            }
            let mut lib = self.inner.library.lock().await;
            let changes = project_and_apply(
                &mut lib,
                &Transition::Succeeded {
                    import_id: import_id.to_string(),
                    raster,
                    collection_id,
                },
            );
            (entry.job, changes)
        };
        tracing::info!(import_id = %import_id, raster_id = %raster_id, "import finished");
        events.extend(changed(import_id, changes));
        events.push(TrackerEvent::Succeeded { job });
        self.emit_all(events).await;
        Ok(Step::Done)
    }

    async fn finish_failed(
        &self,
        import_id: &str,
        token: &CancellationToken,
        reason: String,
    ) -> Result<Step, ApiError> {
        let Some(_order) = self.lock_order(import_id).await else {
            return Ok(Step::Done);
        };
        let (job, changes) = {
            let mut tracked = self.inner.tracked.lock().await;
            if token.is_cancelled() {
                return Ok(Step::Done);
            }
            let Some(mut entry) = tracked.remove(import_id) else {
                return Ok(Step::Done);
            };
            if let Err(e) = entry.job.fail(reason) {
                tracing::warn!(import_id = %import_id, "{e}");
            }
            let mut lib = self.inner.library.lock().await;
            let changes = project_and_apply(&mut lib, &Transition::Failed(entry.job.clone()));
            (entry.job, changes)
        };
        tracing::warn!(
            import_id = %import_id,
            reason = job.failure_reason.as_deref().unwrap_or(""),
            "import failed"
        );
        let mut events: Vec<TrackerEvent> = changed(import_id, changes).into_iter().collect();
        events.push(TrackerEvent::Failed { job });
        self.emit_all(events).await;
        Ok(Step::Done)
    }

    async fn stall(&self, import_id: &str, token: &CancellationToken, source: ApiError) {
        let Some(_order) = self.lock_order(import_id).await else {
            return;
        };
        {
            let mut tracked = self.inner.tracked.lock().await;
            if token.is_cancelled() {
                return;
            }
            let Some(entry) = tracked.get_mut(import_id) else {
                return;
            };
            entry.timer = None;
        }
        let err = ImportError::PollTransport {
            import_id: import_id.to_string(),
            source,
        };
        tracing::error!(import_id = %import_id, "{err}");
        self.emit(TrackerEvent::Stalled {
            import_id: import_id.to_string(),
            error: err.to_string(),
        })
        .await;
    }

    /// Serialize event emission for one import. The map lock is only held to look
    /// the entry up, so waiting here never blocks other imports.
    async fn lock_order(&self, import_id: &str) -> Option<OwnedMutexGuard<()>> {
        let order = self
            .inner
            .tracked
            .lock()
            .await
            .get(import_id)
            .map(|t| t.order.clone())?;
        Some(order.lock_owned().await)
    }

    /// Send events in order. Called without the map lock held.
    async fn emit_all(&self, events: impl IntoIterator<Item = TrackerEvent>) {
        for ev in events {
            self.emit(ev).await;
        }
    }

    async fn emit(&self, ev: TrackerEvent) {
        let _ = self.inner.events.send(ev).await;
    }
}
