//! キー入力ハンドラー関数。

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use raster_import::{library::Entity, wizard::WizardPage};

use crate::{
    events::Screen,
    input::{InputBoxState, InputCallbackId},
    shortcuts,
    worker::WorkerCmd,
};

use super::{App, resync_library};

/// キー入力を1件処理し、終了すべきならtrueを返す。
pub async fn handle_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    // 入力ボックスが開いていれば最優先で処理する。
    if app.input_box.is_some() {
        handle_input_box_key(app, k);
        return Ok(false);
    }

    match app.ui.screen {
        Screen::Main => handle_main_key(app, k).await,
        Screen::Import => handle_import_key(app, k).await,
    }
}

/// Ctrl+Cかどうかを判定する。
pub fn is_ctrl_c(k: &KeyEvent) -> bool {
    k.modifiers.contains(KeyModifiers::CONTROL) && k.code == KeyCode::Char('c')
}

/// メイン画面のキー処理。
async fn handle_main_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let sc = &app.shortcuts.main;

    if shortcuts::matches_shortcut(&k, &sc.quit) {
        return Ok(true);
    } else if shortcuts::matches_shortcut(&k, &sc.refresh) {
        tracing::info!("refresh requested");
        app.worker_tx.send(WorkerCmd::RefreshLibrary).await?;
        app.ui.status = "Refreshing library...".into();
    } else if shortcuts::matches_shortcut(&k, &sc.import) {
        app.wizard.clear(&app.cfg.import.default_collection);
        app.ui.error = None;
        app.ui.screen = Screen::Import;
    } else if shortcuts::matches_shortcut(&k, &sc.delete) {
        // 処理中のものはキャンセル、完了済みのラスターは削除する。
        let cmd = match app.selected_entity() {
            Some(Entity::Placeholder(job)) => Some(WorkerCmd::CancelImport(job.import_id.clone())),
            Some(Entity::Raster(r)) => Some(WorkerCmd::DeleteRaster(r.id.clone())),
            None => None,
        };
        if let Some(cmd) = cmd {
            app.worker_tx.send(cmd).await?;
        }
    } else if shortcuts::matches_shortcut(&k, &sc.resume) {
        if let Some(Entity::Placeholder(job)) = app.selected_entity() {
            let id = job.import_id.clone();
            app.ui.error = None;
            app.worker_tx.send(WorkerCmd::ResumeImport(id)).await?;
        }
    } else if shortcuts::matches_shortcut(&k, &sc.dismiss) {
        // 失敗通知をすべて閉じる。
        app.ui.error = None;
        let ids: Vec<String> = app
            .library
            .failures()
            .map(|f| f.import_id.clone())
            .collect();
        if !ids.is_empty() {
            let mut lib = app.shared.lock().await;
            for id in &ids {
                lib.dismiss_failure(id);
            }
        }
        resync_library(app).await;
    } else if shortcuts::matches_shortcut(&k, &sc.logout) {
        app.worker_tx.send(WorkerCmd::Logout).await?;
        app.ui.status = "Logging out...".into();
    } else if shortcuts::matches_shortcut(&k, &sc.down) {
        if app.ui.selected + 1 < app.library.entities().len() {
            app.ui.selected += 1;
        }
    } else if shortcuts::matches_shortcut(&k, &sc.up) {
        app.ui.selected = app.ui.selected.saturating_sub(1);
    }

    Ok(false)
}

/// インポートウィザード画面のキー処理。
async fn handle_import_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let sc = &app.shortcuts.import;

    if shortcuts::matches_shortcut(&k, &sc.proceed) {
        match app.wizard.page {
            WizardPage::SelectSource => {
                let current = app.wizard.source_url.clone().unwrap_or_default();
                app.input_box = Some(InputBoxState::new(
                    "Raster URL:",
                    &current,
                    InputCallbackId::ImportSource,
                ));
            }
            WizardPage::Settings => {
                app.input_box = Some(InputBoxState::new(
                    "Raster name:",
                    &app.wizard.name,
                    InputCallbackId::ImportName,
                ));
            }
            WizardPage::Collection => {
                app.input_box = Some(InputBoxState::new(
                    "Collection id (empty for none):",
                    &app.wizard.collection_id,
                    InputCallbackId::ImportCollection,
                ));
            }
            WizardPage::Confirm => {
                let Some((source, collection_id)) = app.wizard.to_data_source() else {
                    app.ui.error = Some("Source URL and name are required.".into());
                    return Ok(false);
                };
                // 画面はTrackerの受理通知が来るまで閉じない。
                app.worker_tx
                    .send(WorkerCmd::SubmitImport {
                        source,
                        collection_id,
                    })
                    .await?;
                app.ui.error = None;
                app.ui.status = "Submitting import...".into();
            }
        }
    } else if shortcuts::matches_shortcut(&k, &sc.back) && !app.wizard.previous_page() {
        // 先頭ページで戻ればウィザードを破棄する。
        app.wizard.clear(&app.cfg.import.default_collection);
        app.ui.screen = Screen::Main;
    }

    Ok(false)
}

/// 入力ボックスのキー処理。
fn handle_input_box_key(app: &mut App, k: KeyEvent) {
    let Some(input_state) = &mut app.input_box else {
        return;
    };
    let sc = &app.shortcuts.input_box;

    if shortcuts::matches_shortcut(&k, &sc.confirm) {
        let value = input_state.value.clone();
        let callback_id = input_state.callback_id;
        app.input_box = None;
        apply_input_callback(app, callback_id, &value);
    } else if shortcuts::matches_shortcut(&k, &sc.cancel) {
        app.input_box = None;
    } else if shortcuts::matches_shortcut(&k, &sc.backspace) {
        input_state.backspace();
    } else if shortcuts::matches_shortcut(&k, &sc.delete) {
        input_state.delete();
    } else if shortcuts::matches_shortcut(&k, &sc.left) {
        input_state.move_left();
    } else if shortcuts::matches_shortcut(&k, &sc.right) {
        input_state.move_right();
    } else if shortcuts::matches_shortcut(&k, &sc.home) {
        input_state.move_home();
    } else if shortcuts::matches_shortcut(&k, &sc.end) {
        input_state.move_end();
    } else if shortcuts::matches_shortcut(&k, &sc.clear_line) {
        input_state.clear_line();
    } else if let KeyCode::Char(c) = k.code
        && !k.modifiers.contains(KeyModifiers::CONTROL)
    {
        input_state.insert_char(c);
    }
}

/// 入力ボックスの値をウィザードへ反映し、次のページへ進める。
fn apply_input_callback(app: &mut App, callback_id: InputCallbackId, value: &str) {
    match callback_id {
        InputCallbackId::ImportSource => app.wizard.select_data_source(value),
        InputCallbackId::ImportName => app.wizard.define_settings(value),
        InputCallbackId::ImportCollection => app.wizard.set_collection(value),
    }
    if app.wizard.next_page() {
        app.ui.error = None;
    } else if app.wizard.page == WizardPage::SelectSource {
        app.ui.error = Some("Enter a source URL to continue.".into());
    }
}
