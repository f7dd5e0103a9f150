//! OIDCプロバイダ共通のインストールフローセッション。

use std::{future::Future, pin::Pin, result::Result as StdResult};

use tokio::sync::Mutex;
use yup_oauth2::authenticator::Authenticator;
use yup_oauth2::authenticator_delegate::{DefaultInstalledFlowDelegate, InstalledFlowDelegate};
use yup_oauth2::{
    ApplicationSecret, DefaultHyperClientBuilder, HyperClientBuilder, InstalledFlowAuthenticator,
    InstalledFlowReturnMethod,
};

use super::token_store::FileTokenStorage;
use crate::error::AuthError;

/// セッションで使うAuthenticator型。
pub type InstalledAuth =
    Authenticator<<DefaultHyperClientBuilder as HyperClientBuilder>::Connector>;

#[derive(Copy, Clone)]
/// ブラウザ起動後、標準のフロー処理へ委譲するデリゲート。
struct InstalledFlowBrowserDelegate;

async fn browser_user_url(url: &str, need_code: bool) -> StdResult<String, String> {
    // 認証URLをブラウザで開く（失敗は無視）。
    let _ = webbrowser::open(url);
    DefaultInstalledFlowDelegate
        .present_user_url(url, need_code)
        .await
}

impl InstalledFlowDelegate for InstalledFlowBrowserDelegate {
    fn present_user_url<'a>(
        &'a self,
        url: &'a str,
        need_code: bool,
    ) -> Pin<Box<dyn Future<Output = StdResult<String, String>> + Send + 'a>> {
        Box::pin(browser_user_url(url, need_code))
    }
}

/// プロバイダごとのOAuthエンドポイント。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OidcEndpoints {
    pub auth_uri: String,
    pub token_uri: String,
    pub logout_uri: String,
}

/// 遅延初期化されるインストールフローのセッション。
pub struct OidcSession {
    label: &'static str,
    client_id: String,
    endpoints: OidcEndpoints,
    scopes: Vec<&'static str>,
    storage: FileTokenStorage,
    authn: Mutex<Option<InstalledAuth>>,
}

impl OidcSession {
    pub fn new(
        label: &'static str,
        client_id: String,
        endpoints: OidcEndpoints,
        token_path: &str,
    ) -> Self {
        Self {
            label,
            client_id,
            endpoints,
            scopes: vec!["openid", "email", "profile"],
            storage: FileTokenStorage::new(token_path, label),
            authn: Mutex::new(None),
        }
    }

    pub fn endpoints(&self) -> &OidcEndpoints {
        &self.endpoints
    }

    fn secret(&self) -> ApplicationSecret {
        // 公開クライアントとしてシークレット無しで登録する。
        ApplicationSecret {
            client_id: self.client_id.clone(),
            client_secret: String::new(),
            auth_uri: self.endpoints.auth_uri.clone(),
            token_uri: self.endpoints.token_uri.clone(),
            redirect_uris: vec!["http://localhost".into()],
            ..Default::default()
        }
    }

    async fn build(&self) -> Result<InstalledAuth, AuthError> {
        let auth = InstalledFlowAuthenticator::builder(
            self.secret(),
            InstalledFlowReturnMethod::HTTPRedirect,
        )
        .with_storage(Box::new(self.storage.clone()))
        .flow_delegate(Box::new(InstalledFlowBrowserDelegate))
        .build()
        .await?;
        Ok(auth)
    }

    /// Authenticatorを構築する。二重初期化はエラー。
    pub async fn initialize(&self) -> Result<(), AuthError> {
        let mut guard = self.authn.lock().await;
        if guard.is_some() {
            return Err(AuthError::AlreadyInitialized(self.label));
        }
        *guard = Some(self.build().await?);
        tracing::info!(provider = self.label, "oauth session ready");
        Ok(())
    }

    /// アクセストークンを取得する（未初期化なら初期化する）。
    pub async fn token(&self) -> Result<String, AuthError> {
        let mut guard = self.authn.lock().await;
        if guard.is_none() {
            *guard = Some(self.build().await?);
        }
        let Some(authn) = guard.as_ref() else {
            return Err(AuthError::NoToken);
        };
        let token = authn.token(&self.scopes).await?;
        token
            .token()
            .map(str::to_string)
            .ok_or(AuthError::NoToken)
    }

    /// セッションを破棄し、保存済みトークンを削除してログアウトURLを開く。
    pub async fn logout(&self, logout_url: &str) -> Result<(), AuthError> {
        self.authn.lock().await.take();
        self.storage
            .clear()
            .await
            .map_err(|e| AuthError::Misconfigured(format!("token store: {e}")))?;
        let _ = webbrowser::open(logout_url);
        tracing::info!(provider = self.label, "logged out");
        Ok(())
    }
}
