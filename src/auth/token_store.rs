//! OAuthトークンのファイル保存。

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use std::{collections::HashMap, io::ErrorKind, path::PathBuf};
use tokio::{
    fs,
    io::{AsyncWriteExt, BufWriter},
};
use yup_oauth2::storage::{TokenInfo, TokenStorage, TokenStorageError};

/// プロバイダ名とスコープをキーにしてトークンをJSONファイルへ保存する。
#[derive(Clone, Debug)]
pub struct FileTokenStorage {
    /// 保存先ファイル。
    path: PathBuf,
    /// キーの先頭に付けるプロバイダ名。
    provider: &'static str,
}

fn other(e: impl ToString) -> TokenStorageError {
    TokenStorageError::Other(e.to_string().into())
}

impl FileTokenStorage {
    pub fn new(path: impl Into<PathBuf>, provider: &'static str) -> Self {
        Self {
            path: path.into(),
            provider,
        }
    }

    /// スコープ集合（順序・重複は無視）からキーを作る。
    fn entry_key(&self, scopes: &[&str]) -> String {
        let mut v: Vec<&str> = scopes.to_vec();
        v.sort_unstable();
        v.dedup();
        let hash = Sha256::digest(v.join(" ").as_bytes());
        format!("{}:{}", self.provider, URL_SAFE_NO_PAD.encode(hash))
    }

    async fn load_map(&self) -> Result<HashMap<String, TokenInfo>, TokenStorageError> {
        match fs::read(&self.path).await {
            Ok(data) if data.is_empty() => Ok(HashMap::new()),
            Ok(data) => serde_json::from_slice(&data).map_err(other),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(other(e)),
        }
    }

    async fn save_map(&self, map: &HashMap<String, TokenInfo>) -> Result<(), TokenStorageError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await.map_err(other)?;
        }
        let data = serde_json::to_vec_pretty(map).map_err(other)?;
        let file = fs::File::create(&self.path).await.map_err(other)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&data).await.map_err(other)?;
        writer.flush().await.map_err(other)?;
        Ok(())
    }

    /// このプロバイダのトークンだけを削除する（ログアウト用）。
    pub async fn clear(&self) -> Result<(), TokenStorageError> {
        let mut map = self.load_map().await?;
        let prefix = format!("{}:", self.provider);
        let before = map.len();
        map.retain(|k, _| !k.starts_with(&prefix));
        if map.len() != before {
            self.save_map(&map).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TokenStorage for FileTokenStorage {
    async fn set(&self, scopes: &[&str], token: TokenInfo) -> Result<(), TokenStorageError> {
        let mut map = self.load_map().await?;
        map.insert(self.entry_key(scopes), token);
        self.save_map(&map).await
    }

    async fn get(&self, scopes: &[&str]) -> Option<TokenInfo> {
        let mut map = self.load_map().await.ok()?;
        map.remove(&self.entry_key(scopes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(s: &str) -> TokenInfo {
        TokenInfo {
            access_token: Some(s.into()),
            refresh_token: None,
            expires_at: None,
            id_token: None,
        }
    }

    #[tokio::test]
    async fn test_keys_ignore_scope_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStorage::new(dir.path().join("token.json"), "keycloak");
        store.set(&["openid", "email"], token("abc")).await.unwrap();
        let got = store.get(&["email", "openid", "email"]).await.unwrap();
        assert_eq!(got.access_token.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_clear_only_touches_own_provider() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("token.json");
        let kc = FileTokenStorage::new(&path, "keycloak");
        let a0 = FileTokenStorage::new(&path, "auth0");
        kc.set(&["openid"], token("kc")).await.unwrap();
        a0.set(&["openid"], token("a0")).await.unwrap();

        kc.clear().await.unwrap();
        assert!(kc.get(&["openid"]).await.is_none());
        assert_eq!(
            a0.get(&["openid"]).await.unwrap().access_token.as_deref(),
            Some("a0")
        );
    }
}
