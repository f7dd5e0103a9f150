//! TUIのイベントループ、入力処理、状態管理。

mod handlers;
mod render;

use anyhow::Result;
use crossterm::event::{self, Event};
use std::{path::PathBuf, time::Duration};
use tokio::sync::mpsc;

use raster_import::{
    config::Config,
    library::{Entity, Library, SharedLibrary},
    tracker::TrackerEvent,
    wizard::ImportWizard,
};

use crate::{
    events::{Screen, UiState},
    input::InputBoxState,
    shortcuts::Shortcuts,
    ui::Tui,
    worker::{self, WorkerCmd, WorkerEvent},
};

use handlers::{handle_key, is_ctrl_c};
use render::draw;

/// 入力処理と描画で共有するアプリ状態。
pub struct App {
    /// メモリ上の現在設定。
    pub cfg: Config,
    /// 選択位置やステータスなどUI固有の状態。
    pub ui: UiState,
    /// 描画用のライブラリのスナップショット。
    pub library: Library,
    /// TrackerとWorkerが更新する共有ライブラリ。
    pub shared: SharedLibrary,
    /// Workerへのコマンド送信チャネル。
    pub worker_tx: mpsc::Sender<WorkerCmd>,
    /// Workerからのイベント受信チャネル。
    pub worker_rx: mpsc::Receiver<WorkerEvent>,
    /// インポート状態の通知。
    pub tracker_rx: mpsc::Receiver<TrackerEvent>,
    /// 入力ボックスの状態（入力中はSome）。
    pub input_box: Option<InputBoxState>,
    /// インポートウィザードの状態。
    pub wizard: ImportWizard,
    /// ショートカットキー設定。
    pub shortcuts: Shortcuts,
}

impl App {
    /// 一覧の並び順（新しい順）で選択中のエンティティ。
    pub fn selected_entity(&self) -> Option<&Entity> {
        self.library.entities().get(self.ui.selected).copied()
    }
}

/// ユーザーが終了するまでメインTUIループを回す。
pub async fn run_app(terminal: &mut Tui) -> Result<()> {
    // 設定ファイルを読み込む（初回はデフォルトを生成）。
    let cfg = Config::load_or_default(&PathBuf::from("config.toml"))?;
    let shortcuts = Shortcuts::load_or_default(PathBuf::from("shortcut.toml"))?;

    let (tx_cmd, rx_cmd) = mpsc::channel::<WorkerCmd>(64);
    let (tx_ev, rx_ev) = mpsc::channel::<WorkerEvent>(256);
    let (tx_track, rx_track) = mpsc::channel::<TrackerEvent>(256);

    let shared = Library::shared();
    tokio::spawn(worker::run(
        rx_cmd,
        tx_ev,
        cfg.clone(),
        shared.clone(),
        tx_track,
    ));

    let mut app = App {
        wizard: ImportWizard::new(&cfg.import.default_collection),
        cfg,
        ui: UiState::new(),
        library: Library::default(),
        shared,
        worker_tx: tx_cmd,
        worker_rx: rx_ev,
        tracker_rx: rx_track,
        input_box: None,
        shortcuts,
    };

    loop {
        terminal.draw(|f| draw(f, &app))?;

        // 入力処理の前にイベントを消化する。
        let mut dirty = false;
        while let Ok(ev) = app.worker_rx.try_recv() {
            dirty |= handle_worker_event(&mut app, ev).await?;
        }
        while let Ok(ev) = app.tracker_rx.try_recv() {
            handle_tracker_event(&mut app, ev);
            dirty = true;
        }
        if dirty {
            resync_library(&mut app).await;
        }

        // UIの応答性確保のため短いタイムアウトで入力をポーリングする。
        if event::poll(Duration::from_millis(50))?
            && let Event::Key(k) = event::read()?
        {
            if is_ctrl_c(&k) {
                break;
            }
            if handle_key(&mut app, k).await? {
                break;
            }
        }
        app.ui.tick = app.ui.tick.wrapping_add(1);
    }
    Ok(())
}

/// 共有ライブラリを描画用に取り込み、選択位置を範囲内に収める。
pub async fn resync_library(app: &mut App) {
    app.library = app.shared.lock().await.clone();
    let len = app.library.entities().len();
    if app.ui.selected >= len {
        app.ui.selected = len.saturating_sub(1);
    }
}

/// WorkerイベントをUI状態へ反映する。ライブラリが変わり得るならtrue。
async fn handle_worker_event(app: &mut App, ev: WorkerEvent) -> Result<bool> {
    let changed = match ev {
        WorkerEvent::Ready { provider } => {
            app.ui.push_log(format!("signed in via {provider}"));
            app.ui.status = "Refreshing library...".into();
            app.worker_tx.send(WorkerCmd::RefreshLibrary).await?;
            false
        }
        WorkerEvent::LibraryLoaded { rasters } => {
            app.ui.status = format!("Loaded {rasters} rasters");
            true
        }
        WorkerEvent::RasterDeleted {
            raster_id,
            visualisations,
        } => {
            app.ui.status = format!("Deleted {raster_id}");
            if !visualisations.is_empty() {
                app.ui.push_log(format!(
                    "removed {} visualisation(s) of {raster_id}",
                    visualisations.len()
                ));
            }
            true
        }
        WorkerEvent::ImportRejected(msg) => {
            // ウィザードは開いたまま、再送信できるようにする。
            app.ui.error = Some(msg);
            app.ui.status = "Import rejected".into();
            false
        }
        WorkerEvent::Log(s) => {
            app.ui.push_log(s);
            false
        }
        WorkerEvent::Error(s) => {
            app.ui.push_log(format!("error: {s}"));
            app.ui.error = Some(s);
            false
        }
    };
    Ok(changed)
}

/// インポートの状態変化をUIへ反映する。
fn handle_tracker_event(app: &mut App, ev: TrackerEvent) {
    match ev {
        TrackerEvent::Submitted { import_id, name } => {
            // 送信が受理されたらウィザードを閉じて一覧へ戻る。
            app.wizard.clear(&app.cfg.import.default_collection);
            app.ui.screen = Screen::Main;
            app.ui.selected = 0;
            app.ui.error = None;
            app.ui.status = format!("Importing {name}");
            app.ui.push_log(format!("submitted {name} ({import_id})"));
        }
        TrackerEvent::Changed { import_id, changes } => {
            tracing::debug!(import_id = %import_id, changes = changes.len(), "library changed");
        }
        TrackerEvent::Succeeded { job } => {
            app.ui.status = format!("Imported {}", job.name);
            app.ui.push_log(format!("{} finished", job.name));
        }
        TrackerEvent::Failed { job } => {
            let reason = job.failure_reason.unwrap_or_default();
            app.ui.push_log(format!("{} failed: {reason}", job.name));
        }
        TrackerEvent::Cancelled { import_id } => {
            app.ui.status = format!("Cancelled {import_id}");
        }
        TrackerEvent::Stalled { import_id, error } => {
            app.ui.error = Some(format!("{import_id}: {error} (press s to resume)"));
        }
        TrackerEvent::Warning { import_id, message } => {
            app.ui.push_log(format!("warning ({import_id}): {message}"));
        }
    }
}
