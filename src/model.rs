//! インポートジョブとライブラリエンティティのモデル。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// バックエンドが報告するジョブ状態。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// 処理中。
    Pending,
    /// 正常完了（終端）。
    Ok,
    /// 失敗（終端）。
    Failed,
}

impl JobStatus {
    /// 終端状態かどうか。
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Ok | JobStatus::Failed)
    }
}

/// ジョブステータスAPIのレスポンス。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub status: JobStatus,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub raster_id: Option<String>,
}

/// 送信済みインポート1件の追跡状態。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportJob {
    /// 送信時にバックエンドが発行したID。
    pub import_id: String,
    /// 表示名（ユーザー入力をそのまま保持）。
    pub name: String,
    /// 現在の状態。
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    /// 状態遷移を観測するたびに更新する。
    pub modified_at: DateTime<Utc>,
    /// 完了後に所属させるコレクション。
    pub collection_id: Option<String>,
    /// 完了したラスターのID（Okのときのみ）。
    pub result_entity_id: Option<String>,
    /// 失敗理由（Failedのときのみ）。
    pub failure_reason: Option<String>,
}

impl ImportJob {
    /// 送信直後の待機状態ジョブを作成する。
    pub fn pending(import_id: String, name: String, collection_id: Option<String>) -> Self {
        // 作成時刻と更新時刻は同じ値から始める。
        let now = Utc::now();
        Self {
            import_id,
            name,
            status: JobStatus::Pending,
            created_at: now,
            modified_at: now,
            collection_id,
            result_entity_id: None,
            failure_reason: None,
        }
    }

    /// Ok へ遷移させ、結果ラスターIDを記録する。
    pub fn complete(&mut self, raster_id: String) -> Result<(), ModelError> {
        self.transition(JobStatus::Ok)?;
        self.result_entity_id = Some(raster_id);
        Ok(())
    }

    /// Failed へ遷移させ、失敗理由を記録する。
    pub fn fail(&mut self, reason: String) -> Result<(), ModelError> {
        self.transition(JobStatus::Failed)?;
        self.failure_reason = Some(reason);
        Ok(())
    }

    fn transition(&mut self, to: JobStatus) -> Result<(), ModelError> {
        // 終端状態からは遷移できない。
        if self.status.is_terminal() {
            return Err(ModelError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.modified_at = Utc::now();
        Ok(())
    }
}

/// インポート元の記述。`source` はバックエンド定義の任意ペイロード。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    pub name: String,
    pub source: serde_json::Value,
}

impl DataSource {
    /// URLリンク形式のデータソースを作る。
    pub fn link(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: serde_json::json!({ "kind": "LINK", "url": url.into() }),
        }
    }
}

/// バックエンドから取得したラスター。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Raster {
    pub id: String,
    pub name: String,
    /// エポックミリ秒。
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub modified: Option<i64>,
    /// 未知のフィールドはそのまま保持する。
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// コレクション（エンティティのまとまり）。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RemoteCollection {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub entities: Vec<String>,
}

/// ラスター削除時の連鎖削除に必要な範囲の可視化情報。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visualisation {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub raster_id: Option<String>,
}

/// `GET /api/library` のレスポンス。
#[derive(Clone, Debug, Default, Deserialize)]
pub struct LibrarySnapshot {
    #[serde(default)]
    pub rasters: Vec<Raster>,
    #[serde(default)]
    pub collections: Vec<RemoteCollection>,
    #[serde(default)]
    pub visualisations: Vec<Visualisation>,
}

/// 失敗したインポートの記録（通知で閉じられる）。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailureRecord {
    pub import_id: String,
    pub name: String,
    pub reason: String,
    pub modified_at: DateTime<Utc>,
}
