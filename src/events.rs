//! 画面遷移用のUI状態と画面種別。

/// TUIで現在表示中の画面。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Screen {
    /// ライブラリ一覧画面。
    Main,
    /// インポートウィザード画面。
    Import,
}

/// 描画側と共有するUI状態。
#[derive(Clone, Debug)]
pub struct UiState {
    /// 現在の画面。
    pub screen: Screen,
    /// ライブラリ一覧の選択行。
    pub selected: usize,
    /// 右側パネルに表示するログ。
    pub log: Vec<String>,
    /// 画面下部のステータス文言。
    pub status: String,
    /// エラーメッセージ（強調表示用、xで閉じる）。
    pub error: Option<String>,
    /// 処理中エンティティのスピナー用カウンタ。
    pub tick: usize,
}

impl UiState {
    pub fn new() -> Self {
        Self {
            screen: Screen::Main,
            selected: 0,
            log: vec![],
            status: "Starting...".into(),
            error: None,
            tick: 0,
        }
    }

    /// ログを追加する（古いものから捨てる）。
    pub fn push_log(&mut self, line: impl Into<String>) {
        const MAX_LOG: usize = 200;
        self.log.push(line.into());
        if self.log.len() > MAX_LOG {
            let excess = self.log.len() - MAX_LOG;
            self.log.drain(..excess);
        }
    }

    /// 現在のスピナー文字。
    pub fn spinner(&self) -> char {
        const FRAMES: [char; 4] = ['|', '/', '-', '\\'];
        FRAMES[(self.tick / 2) % FRAMES.len()]
    }
}

impl Default for UiState {
    fn default() -> Self {
        Self::new()
    }
}
