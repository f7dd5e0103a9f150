//! レイアウト計算のヘルパー関数

use ratatui::prelude::*;

/// メイン画面の領域
pub struct MainLayout {
    /// 失敗通知のバナー（通知が無ければNone）
    pub banner: Option<Rect>,
    /// ライブラリ一覧 + INFO Panel
    pub body: Rect,
    pub help_bar: Rect,
    pub status_bar: Rect,
}

/// ボディ部の2つの領域
pub struct BodyLayout {
    pub library_table: Rect,
    pub info_panel: Rect,
}

/// メイン画面を分割する。`banner_lines` が0ならバナー領域は作らない。
pub fn create_main_layout(area: Rect, banner_lines: u16) -> MainLayout {
    if banner_lines == 0 {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(1),
                Constraint::Length(3),
                Constraint::Length(3),
            ])
            .split(area);
        return MainLayout {
            banner: None,
            body: chunks[0],
            help_bar: chunks[1],
            status_bar: chunks[2],
        };
    }

    // 枠線の2行分を足す。
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(banner_lines.min(5) + 2),
            Constraint::Min(1),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(area);
    MainLayout {
        banner: Some(chunks[0]),
        body: chunks[1],
        help_bar: chunks[2],
        status_bar: chunks[3],
    }
}

/// Body領域を一覧 65% + INFO 35% に分割
pub fn create_body_layout(area: Rect) -> BodyLayout {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(area);

    BodyLayout {
        library_table: chunks[0],
        info_panel: chunks[1],
    }
}
