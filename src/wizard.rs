//! インポートウィザードのステート管理。

use crate::model::DataSource;

/// ウィザードの各ページ
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WizardPage {
    /// データソース（URL）の選択
    SelectSource,
    /// ラスター設定（名前）
    Settings,
    /// 追加先コレクション
    Collection,
    /// 確認
    Confirm,
}

impl WizardPage {
    const ALL: [WizardPage; 4] = [
        WizardPage::SelectSource,
        WizardPage::Settings,
        WizardPage::Collection,
        WizardPage::Confirm,
    ];

    /// ページ番号（1始まり）
    pub fn number(self) -> usize {
        Self::ALL.iter().position(|p| *p == self).unwrap_or(0) + 1
    }
}

/// インポート中の選択状態
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportWizard {
    pub page: WizardPage,
    /// 選択されたデータソースURL
    pub source_url: Option<String>,
    /// ラスター名
    pub name: String,
    /// 追加先コレクション（空なら無し）
    pub collection_id: String,
}

impl ImportWizard {
    pub fn new(default_collection: &str) -> Self {
        Self {
            page: WizardPage::SelectSource,
            source_url: None,
            name: String::new(),
            collection_id: default_collection.to_string(),
        }
    }

    pub fn total_pages(&self) -> usize {
        WizardPage::ALL.len()
    }

    /// 次のページへ進む。ソース未選択なら進まない。
    pub fn next_page(&mut self) -> bool {
        if self.page == WizardPage::SelectSource && self.source_url.is_none() {
            return false;
        }
        let idx = self.page.number() - 1;
        match WizardPage::ALL.get(idx + 1) {
            Some(p) => {
                self.page = *p;
                true
            }
            None => false,
        }
    }

    /// 前のページへ戻る。先頭ならfalse。
    pub fn previous_page(&mut self) -> bool {
        let idx = self.page.number() - 1;
        if idx == 0 {
            return false;
        }
        self.page = WizardPage::ALL[idx - 1];
        true
    }

    /// データソースを選択し、名前が空ならURL末尾から補完する。
    pub fn select_data_source(&mut self, url: &str) {
        let url = url.trim();
        if url.is_empty() {
            self.source_url = None;
            return;
        }
        self.source_url = Some(url.to_string());
        if self.name.is_empty() {
            self.name = name_from_url(url);
        }
    }

    pub fn define_settings(&mut self, name: &str) {
        self.name = name.trim().to_string();
    }

    pub fn set_collection(&mut self, collection_id: &str) {
        self.collection_id = collection_id.trim().to_string();
    }

    /// 送信用のデータソースと追加先コレクションを組み立てる。
    pub fn to_data_source(&self) -> Option<(DataSource, Option<String>)> {
        let url = self.source_url.as_ref()?;
        if self.name.is_empty() {
            return None;
        }
        let collection = Some(self.collection_id.clone()).filter(|c| !c.is_empty());
        Some((DataSource::link(self.name.clone(), url.clone()), collection))
    }

    /// 入力内容を破棄して最初のページへ戻る。
    pub fn clear(&mut self, default_collection: &str) {
        *self = Self::new(default_collection);
    }

    /// 現在のページの説明文
    pub fn prompt(&self) -> String {
        match self.page {
            WizardPage::SelectSource => format!(
                "Data source\n\nEnter the URL of the raster file (GeoTIFF).\nCurrent: {}",
                self.source_url.as_deref().unwrap_or("-")
            ),
            WizardPage::Settings => format!("Raster settings\n\nName: {}", self.name),
            WizardPage::Collection => format!(
                "Target collection\n\nCollection id (empty for none): {}",
                if self.collection_id.is_empty() {
                    "-"
                } else {
                    &self.collection_id
                }
            ),
            WizardPage::Confirm => format!(
                "Confirm import\n\nSource: {}\nName: {}\nCollection: {}\n\nPress Enter to start the import.",
                self.source_url.as_deref().unwrap_or("-"),
                self.name,
                if self.collection_id.is_empty() {
                    "-"
                } else {
                    &self.collection_id
                }
            ),
        }
    }
}

fn name_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cannot_leave_first_page_without_source() {
        let mut w = ImportWizard::new("");
        assert!(!w.next_page());
        assert_eq!(w.page, WizardPage::SelectSource);
        assert!(!w.previous_page());
    }

    #[test]
    fn test_source_proposes_name() {
        let mut w = ImportWizard::new("");
        w.select_data_source("https://example.org/data/rivers.tif?token=1");
        assert_eq!(w.name, "rivers.tif");
        // 既に名前があれば上書きしない。
        w.define_settings("Rivers 2020");
        w.select_data_source("https://example.org/other.tif");
        assert_eq!(w.name, "Rivers 2020");
    }

    #[test]
    fn test_pages_forward_and_back() {
        let mut w = ImportWizard::new("C1");
        w.select_data_source("https://example.org/rivers.tif");
        assert!(w.next_page());
        assert_eq!(w.page, WizardPage::Settings);
        assert!(w.next_page());
        assert!(w.next_page());
        assert_eq!(w.page, WizardPage::Confirm);
        assert_eq!(w.page.number(), w.total_pages());
        assert!(!w.next_page());
        assert!(w.previous_page());
        assert_eq!(w.page, WizardPage::Collection);
    }

    #[test]
    fn test_to_data_source_and_clear() {
        let mut w = ImportWizard::new("C1");
        assert!(w.to_data_source().is_none());
        w.select_data_source("https://example.org/rivers.tif");
        let (ds, coll) = w.to_data_source().unwrap();
        assert_eq!(ds.name, "rivers.tif");
        assert_eq!(coll.as_deref(), Some("C1"));

        w.set_collection("  ");
        assert_eq!(w.to_data_source().unwrap().1, None);

        w.clear("C1");
        assert_eq!(w, ImportWizard::new("C1"));
    }
}
