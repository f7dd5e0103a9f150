//! TUI描画関連の関数。

use ratatui::{
    Frame,
    prelude::*,
    widgets::{Block, Borders, Paragraph, Row, Table, TableState, Wrap},
};

use raster_import::{library::Entity, model::JobStatus};

use crate::{events::Screen, input, layout, shortcuts::Shortcuts};

use super::App;

/// 画面全体のレイアウトを描画する。
pub fn draw(f: &mut Frame, app: &App) {
    match app.ui.screen {
        Screen::Main => draw_main_screen(f, app),
        Screen::Import => draw_import_screen(f, app),
    }
    // 入力ボックスが開いていれば重ねて描画する。
    if let Some(input_state) = &app.input_box {
        input::render_input_box(f, input_state);
    }
}

fn draw_main_screen(f: &mut Frame, app: &App) {
    let failures: Vec<String> = app
        .library
        .failures()
        .map(|r| format!("Import of {} failed: {}", r.name, r.reason))
        .collect();
    let main_layout = layout::create_main_layout(f.area(), failures.len() as u16);
    let body_layout = layout::create_body_layout(main_layout.body);

    if let Some(area) = main_layout.banner {
        let banner = Paragraph::new(failures.join("\n"))
            .block(Block::default().borders(Borders::ALL).title("FAILED (x: dismiss)"))
            .style(Style::default().fg(Color::Red))
            .wrap(Wrap { trim: true });
        f.render_widget(banner, area);
    }

    let entities = app.library.entities();
    let rows = entities.iter().enumerate().map(|(i, e)| {
        Row::new(vec![
            format!("{}", i + 1),
            e.name().to_string(),
            status_str(app, e),
            app.library.memberships(e.id()).join(", "),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(3),
            Constraint::Min(12),
            Constraint::Length(12),
            Constraint::Length(20),
        ],
    )
    .block(Block::default().borders(Borders::ALL).title("LIBRARY"))
    .header(Row::new(vec!["#", "name", "status", "collections"]).bold())
    .row_highlight_style(
        Style::default()
            .bg(Color::Rgb(255, 140, 0))
            .fg(Color::Black)
            .add_modifier(Modifier::BOLD),
    );

    let mut table_state = TableState::default();
    if !entities.is_empty() {
        table_state.select(Some(app.ui.selected));
    }
    f.render_stateful_widget(table, body_layout.library_table, &mut table_state);

    let info_panel = Paragraph::new(build_info_text(app))
        .block(Block::default().borders(Borders::ALL).title("INFO"))
        .wrap(Wrap { trim: true });
    f.render_widget(info_panel, body_layout.info_panel);

    let help_bar = Paragraph::new(get_help_text(app.ui.screen, &app.shortcuts))
        .block(Block::default().borders(Borders::ALL).title("HELP"))
        .wrap(Wrap { trim: true });
    f.render_widget(help_bar, main_layout.help_bar);

    f.render_widget(build_status_bar(app), main_layout.status_bar);
}

/// 一覧の状態列。処理中はスピナーを付ける。
fn status_str(app: &App, e: &Entity) -> String {
    match e {
        Entity::Placeholder(job) => match job.status {
            JobStatus::Pending => format!("{} importing", app.ui.spinner()),
            JobStatus::Ok => "finishing".into(),
            JobStatus::Failed => "failed".into(),
        },
        Entity::Raster(_) => "raster".into(),
    }
}

/// 選択中エンティティの詳細とログを組み立てる。
fn build_info_text(app: &App) -> String {
    let mut lines = Vec::new();
    match app.selected_entity() {
        Some(Entity::Placeholder(job)) => {
            lines.push(format!("Importing: {}", job.name));
            lines.push(format!("Import ID: {}", job.import_id));
            lines.push(format!(
                "Started: {}",
                job.created_at.format("%Y-%m-%d %H:%M:%S")
            ));
            lines.push(format!(
                "Collection: {}",
                job.collection_id.as_deref().unwrap_or("-")
            ));
        }
        Some(Entity::Raster(r)) => {
            lines.push(format!("Raster: {}", r.name));
            lines.push(format!("ID: {}", r.id));
            let visualisations = app
                .library
                .visualisations()
                .filter(|v| v.raster_id.as_deref() == Some(r.id.as_str()))
                .count();
            lines.push(format!("Visualisations: {visualisations}"));
        }
        None => lines.push("No entity selected".into()),
    }

    lines.push(String::new());
    lines.push(format!("Collections: {}", app.library.collections().count()));
    lines.push(String::new());
    lines.push("Log:".into());
    lines.extend(app.ui.log.iter().rev().take(8).rev().cloned());
    lines.join("\n")
}

/// ステータスバーを構築する。
fn build_status_bar(app: &App) -> Paragraph<'static> {
    let screen_name = match app.ui.screen {
        Screen::Main => "Library",
        Screen::Import => "Import",
    };

    let entities = app.library.entities();
    let pending = entities.iter().filter(|e| e.is_placeholder()).count();
    let summary = format!(
        "{} rasters, {} importing",
        entities.len() - pending,
        pending
    );

    let status_text = match &app.ui.error {
        Some(err) => format!("[{screen_name}] {summary} | ERROR: {err}"),
        None => format!("[{screen_name}] {summary} | {}", app.ui.status),
    };

    let mut status_bar = Paragraph::new(status_text)
        .block(Block::default().borders(Borders::ALL).title("STATUS"))
        .wrap(Wrap { trim: true });
    if app.ui.error.is_some() {
        status_bar = status_bar.style(Style::default().fg(Color::Red));
    }
    status_bar
}

/// インポートウィザード画面を描画する。
fn draw_import_screen(f: &mut Frame, app: &App) {
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(20),
            Constraint::Min(10),
            Constraint::Percentage(20),
        ])
        .split(f.area());

    let content_text = format!(
        "=== Import Raster ===\n\nPage {}/{}\n\n{}\n\n{}",
        app.wizard.page.number(),
        app.wizard.total_pages(),
        app.wizard.prompt(),
        get_help_text(app.ui.screen, &app.shortcuts),
    );
    let content = Paragraph::new(content_text)
        .block(Block::default().borders(Borders::ALL).title("Import"))
        .alignment(Alignment::Left)
        .wrap(Wrap { trim: true });
    f.render_widget(content, outer[1]);

    if let Some(err) = &app.ui.error {
        let error_layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(3)])
            .split(f.area());
        let error_text = Paragraph::new(format!("ERROR: {err}"))
            .block(Block::default().borders(Borders::ALL).title("Error"))
            .style(Style::default().fg(Color::Red))
            .wrap(Wrap { trim: true });
        f.render_widget(error_text, error_layout[1]);
    }
}

/// 現在画面に応じたヘルプ文字列を返す。
fn get_help_text(screen: Screen, shortcuts: &Shortcuts) -> String {
    match screen {
        Screen::Main => {
            let sc = &shortcuts.main;
            format!(
                "{}: quit | {}: refresh | {}: import | {}: cancel/delete | {}: resume | {}: dismiss | {}: logout | {}/{}: navigate",
                format_keys(&sc.quit),
                format_keys(&sc.refresh),
                format_keys(&sc.import),
                format_keys(&sc.delete),
                format_keys(&sc.resume),
                format_keys(&sc.dismiss),
                format_keys(&sc.logout),
                format_keys(&sc.up),
                format_keys(&sc.down)
            )
        }
        Screen::Import => format!(
            "{}: edit / submit | {}: back",
            format_keys(&shortcuts.import.proceed),
            format_keys(&shortcuts.import.back)
        ),
    }
}

/// ショートカットキーの配列を表示用文字列に変換する。
fn format_keys(keys: &[String]) -> String {
    keys.join("/")
}
