//! ショートカット設定の管理。

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// ショートカット設定の全体。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shortcuts {
    pub main: MainShortcuts,
    pub import: ImportShortcuts,
    pub input_box: InputBoxShortcuts,
}

/// ライブラリ画面のショートカット。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MainShortcuts {
    pub quit: Vec<String>,
    pub refresh: Vec<String>,
    pub import: Vec<String>,
    /// 処理中ならキャンセル、ラスターなら削除。
    pub delete: Vec<String>,
    pub resume: Vec<String>,
    pub dismiss: Vec<String>,
    pub logout: Vec<String>,
    pub down: Vec<String>,
    pub up: Vec<String>,
}

/// インポートウィザードのショートカット。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportShortcuts {
    pub proceed: Vec<String>,
    pub back: Vec<String>,
}

/// InputBoxのショートカット。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputBoxShortcuts {
    pub confirm: Vec<String>,
    pub cancel: Vec<String>,
    pub backspace: Vec<String>,
    pub delete: Vec<String>,
    pub left: Vec<String>,
    pub right: Vec<String>,
    pub home: Vec<String>,
    pub end: Vec<String>,
    pub clear_line: Vec<String>,
}

impl Shortcuts {
    /// TOMLから読み込み、無ければデフォルトを返す。
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

impl Default for Shortcuts {
    fn default() -> Self {
        Self {
            main: MainShortcuts {
                quit: vec!["q".into()],
                refresh: vec!["r".into()],
                import: vec!["i".into()],
                delete: vec!["d".into(), "Delete".into()],
                resume: vec!["s".into()],
                dismiss: vec!["x".into()],
                logout: vec!["L".into()],
                down: vec!["Down".into(), "j".into()],
                up: vec!["Up".into(), "k".into()],
            },
            import: ImportShortcuts {
                proceed: vec!["Enter".into()],
                back: vec!["Esc".into()],
            },
            // 文字入力と衝突しないよう特殊キーのみ。
            input_box: InputBoxShortcuts {
                confirm: vec!["Enter".into()],
                cancel: vec!["Esc".into()],
                backspace: vec!["Backspace".into()],
                delete: vec!["Delete".into()],
                left: vec!["Left".into()],
                right: vec!["Right".into()],
                home: vec!["Home".into()],
                end: vec!["End".into()],
                clear_line: vec!["Ctrl+u".into()],
            },
        }
    }
}

/// KeyEventがいずれかのショートカット文字列と一致するか判定する。
pub fn matches_shortcut(key: &KeyEvent, shortcuts: &[String]) -> bool {
    shortcuts.iter().any(|s| matches_single_shortcut(key, s))
}

/// KeyEventが単一のショートカット文字列と一致するか判定する。
fn matches_single_shortcut(key: &KeyEvent, shortcut: &str) -> bool {
    // "Ctrl+u" のように最後の要素がキー本体。
    let mut parts: Vec<&str> = shortcut.split('+').collect();
    let Some(key_str) = parts.pop() else {
        return false;
    };

    let mut expected = KeyModifiers::empty();
    for modifier in parts {
        match modifier {
            "Ctrl" | "ctrl" => expected |= KeyModifiers::CONTROL,
            "Alt" | "alt" => expected |= KeyModifiers::ALT,
            "Shift" | "shift" => expected |= KeyModifiers::SHIFT,
            _ => return false,
        }
    }

    // 大文字はSHIFT付きで届くため、文字キーではSHIFTを比較から外す。
    let mut actual = key.modifiers;
    if matches!(key.code, KeyCode::Char(_)) && !expected.contains(KeyModifiers::SHIFT) {
        actual.remove(KeyModifiers::SHIFT);
    }
    if actual != expected {
        return false;
    }

    match key_str {
        "Enter" | "enter" => key.code == KeyCode::Enter,
        "Esc" | "esc" => key.code == KeyCode::Esc,
        "Tab" | "tab" => key.code == KeyCode::Tab,
        "Backspace" | "backspace" => key.code == KeyCode::Backspace,
        "Delete" | "delete" => key.code == KeyCode::Delete,
        "Up" | "up" => key.code == KeyCode::Up,
        "Down" | "down" => key.code == KeyCode::Down,
        "Left" | "left" => key.code == KeyCode::Left,
        "Right" | "right" => key.code == KeyCode::Right,
        "Home" | "home" => key.code == KeyCode::Home,
        "End" | "end" => key.code == KeyCode::End,
        s => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => key.code == KeyCode::Char(c),
                _ => false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_shortcut_simple_char() {
        let key = KeyEvent::new(KeyCode::Char('q'), KeyModifiers::empty());
        assert!(matches_shortcut(&key, &[String::from("q")]));
        assert!(!matches_shortcut(&key, &[String::from("w")]));
    }

    #[test]
    fn test_matches_shortcut_special_key() {
        let key = KeyEvent::new(KeyCode::Enter, KeyModifiers::empty());
        assert!(matches_shortcut(&key, &[String::from("Enter")]));
        assert!(!matches_shortcut(&key, &[String::from("Esc")]));
    }

    #[test]
    fn test_matches_shortcut_with_modifier() {
        let key = KeyEvent::new(KeyCode::Char('u'), KeyModifiers::CONTROL);
        assert!(matches_shortcut(&key, &[String::from("Ctrl+u")]));
        assert!(!matches_shortcut(&key, &[String::from("u")]));
    }

    #[test]
    fn test_matches_shortcut_uppercase_with_shift() {
        // 端末はShift+lを 'L' + SHIFT として送ってくる。
        let key = KeyEvent::new(KeyCode::Char('L'), KeyModifiers::SHIFT);
        assert!(matches_shortcut(&key, &[String::from("L")]));
        assert!(!matches_shortcut(&key, &[String::from("l")]));
    }

    #[test]
    fn test_matches_shortcut_multiple_keys() {
        let key_d = KeyEvent::new(KeyCode::Char('d'), KeyModifiers::empty());
        let key_del = KeyEvent::new(KeyCode::Delete, KeyModifiers::empty());
        let shortcuts = Shortcuts::default();

        assert!(matches_shortcut(&key_d, &shortcuts.main.delete));
        assert!(matches_shortcut(&key_del, &shortcuts.main.delete));
        assert!(!matches_shortcut(&key_d, &shortcuts.main.dismiss));
    }

    #[test]
    fn test_input_box_bindings_leave_letters_free() {
        let sc = Shortcuts::default().input_box;
        for c in ['h', 'l', 'q', 'x'] {
            let key = KeyEvent::new(KeyCode::Char(c), KeyModifiers::empty());
            for binding in [&sc.confirm, &sc.cancel, &sc.left, &sc.right, &sc.clear_line] {
                assert!(!matches_shortcut(&key, binding));
            }
        }
    }

    #[test]
    fn test_shortcuts_parse_from_toml() {
        let text = toml::to_string(&Shortcuts::default()).unwrap();
        let parsed: Shortcuts = toml::from_str(&text).unwrap();
        assert_eq!(parsed.main.import, vec!["i".to_string()]);
        assert_eq!(parsed.import.back, vec!["Esc".to_string()]);
    }
}
