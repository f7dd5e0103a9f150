//! Background worker handling backend calls and the import tracker.

use std::sync::Arc;

use anyhow::Result;
use raster_import::{
    api::{self, BackendClient},
    auth::AuthContext,
    config::Config,
    library::SharedLibrary,
    model::DataSource,
    tracker::{ImportTracker, PollSettings, TrackerEvent},
};
use reqwest::Client;
use tokio::sync::mpsc;

/// Commands sent from the UI to the worker.
#[derive(Debug)]
pub enum WorkerCmd {
    /// Reload rasters, collections and visualisations from the backend.
    RefreshLibrary,
    /// Start a raster import.
    SubmitImport {
        source: DataSource,
        collection_id: Option<String>,
    },
    /// Drop a pending import.
    CancelImport(String),
    /// Restart polling for a stalled import.
    ResumeImport(String),
    /// Delete a finished raster on the backend.
    DeleteRaster(String),
    Logout,
}

/// Events emitted by the worker for UI updates.
#[derive(Clone, Debug)]
pub enum WorkerEvent {
    /// Auth and backend client are ready.
    Ready { provider: &'static str },
    LibraryLoaded { rasters: usize },
    RasterDeleted {
        raster_id: String,
        visualisations: Vec<String>,
    },
    /// The backend refused the import; the wizard stays open.
    ImportRejected(String),
    /// Informational log message.
    Log(String),
    /// User-visible error message.
    Error(String),
}

/// Build the auth context, seeding it from `/env` when configured.
async fn build_auth(http: &Client, cfg: &Config) -> Result<AuthContext> {
    let env = if cfg.auth.discover {
        let env = api::fetch_env(http, &cfg.backend.base_url).await?;
        tracing::info!(tenant = env.tenant.as_deref().unwrap_or("-"), "env discovered");
        Some(env)
    } else {
        None
    };
    let auth = AuthContext::from_config(&cfg.auth, env.as_ref())?;
    auth.initialize().await?;
    Ok(auth)
}

/// Main worker loop: authenticate, then handle commands sequentially.
pub async fn run(
    mut rx: mpsc::Receiver<WorkerCmd>,
    tx: mpsc::Sender<WorkerEvent>,
    cfg: Config,
    library: SharedLibrary,
    tracker_tx: mpsc::Sender<TrackerEvent>,
) {
    // Shared HTTP client for all API calls.
    let http = Client::new();
    tracing::info!("worker started");

    // Auth setup is done once; failures are terminal.
    let auth = match build_auth(&http, &cfg).await {
        Ok(a) => a,
        Err(e) => {
            tracing::error!("auth init failed: {e}");
            let _ = tx
                .send(WorkerEvent::Error(format!("auth init failed: {e}")))
                .await;
            return;
        }
    };
    let provider = auth.provider_name();
    let backend = BackendClient::new(http, &cfg.backend.base_url, auth);
    let tracker = ImportTracker::new(
        Arc::new(backend.clone()),
        library.clone(),
        PollSettings::from(&cfg.import),
        tracker_tx,
    );
    tracing::info!(provider, "backend client ready");
    let _ = tx.send(WorkerEvent::Ready { provider }).await;

    while let Some(cmd) = rx.recv().await {
        match cmd {
            WorkerCmd::RefreshLibrary => {
                tracing::info!("refresh library");
                // Imports finishing during the fetch must survive the merge.
                let since = library.lock().await.generation();
                match backend.fetch_library().await {
                    Ok(snapshot) => {
                        let rasters = snapshot.rasters.len();
                        library.lock().await.merge_remote(snapshot, since);
                        tracing::info!("library loaded: {rasters} rasters");
                        let _ = tx.send(WorkerEvent::LibraryLoaded { rasters }).await;
                    }
                    Err(e) => {
                        tracing::error!("library fetch failed: {e}");
                        let _ = tx
                            .send(WorkerEvent::Error(format!("refresh failed: {e}")))
                            .await;
                    }
                }
            }

            WorkerCmd::SubmitImport {
                source,
                collection_id,
            } => {
                // Success is reported through the tracker's own events.
                if let Err(e) = tracker.submit(source, collection_id).await {
                    let _ = tx.send(WorkerEvent::ImportRejected(e.to_string())).await;
                }
            }

            WorkerCmd::CancelImport(import_id) => {
                if let Err(e) = tracker.cancel(&import_id).await {
                    let _ = tx
                        .send(WorkerEvent::Error(format!("cancel failed: {e}")))
                        .await;
                }
            }

            WorkerCmd::ResumeImport(import_id) => match tracker.resume(&import_id).await {
                Ok(()) => {
                    let _ = tx
                        .send(WorkerEvent::Log(format!("resumed {import_id}")))
                        .await;
                }
                Err(e) => {
                    let _ = tx
                        .send(WorkerEvent::Error(format!("resume failed: {e}")))
                        .await;
                }
            },

            WorkerCmd::DeleteRaster(raster_id) => {
                tracing::info!(raster_id = %raster_id, "delete raster");
                match backend.delete_raster(&raster_id).await {
                    Ok(()) => {
                        let visualisations = library.lock().await.remove_raster(&raster_id);
                        let _ = tx
                            .send(WorkerEvent::RasterDeleted {
                                raster_id,
                                visualisations,
                            })
                            .await;
                    }
                    Err(e) => {
                        tracing::error!(raster_id = %raster_id, "delete failed: {e}");
                        let _ = tx
                            .send(WorkerEvent::Error(format!("delete failed: {e}")))
                            .await;
                    }
                }
            }

            WorkerCmd::Logout => match backend.auth().logout().await {
                Ok(()) => {
                    let _ = tx.send(WorkerEvent::Log("logged out".into())).await;
                }
                Err(e) => {
                    let _ = tx
                        .send(WorkerEvent::Error(format!("logout failed: {e}")))
                        .await;
                }
            },
        }
    }
}
