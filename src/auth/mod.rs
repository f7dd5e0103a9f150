//! Identity providers and the auth context passed into the backend client.

pub mod oidc;
pub mod token_store;

use std::sync::Arc;

use async_trait::async_trait;

use crate::api::BackendEnv;
use crate::config::{AuthCfg, ProviderKind};
use crate::error::AuthError;
use oidc::{OidcEndpoints, OidcSession};

/// Capabilities every identity provider offers.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &'static str;
    /// Prepare the provider (e.g. run the login flow). Calling it twice is an error.
    async fn initialize(&self) -> Result<(), AuthError>;
    /// Current access token, or `None` when requests go unauthenticated.
    async fn token(&self) -> Result<Option<String>, AuthError>;
    async fn logout(&self) -> Result<(), AuthError>;
}

/// Keycloak realm login.
pub struct KeycloakProvider {
    session: OidcSession,
}

impl KeycloakProvider {
    pub fn new(url: &str, realm: &str, client_id: String, token_path: &str) -> Self {
        let base = format!(
            "{}/realms/{}/protocol/openid-connect",
            url.trim_end_matches('/'),
            realm
        );
        let endpoints = OidcEndpoints {
            auth_uri: format!("{base}/auth"),
            token_uri: format!("{base}/token"),
            logout_uri: format!(
                "{base}/logout?client_id={}",
                urlencoding::encode(&client_id)
            ),
        };
        Self {
            session: OidcSession::new("keycloak", client_id, endpoints, token_path),
        }
    }

    pub fn endpoints(&self) -> &OidcEndpoints {
        self.session.endpoints()
    }
}

#[async_trait]
impl IdentityProvider for KeycloakProvider {
    fn name(&self) -> &'static str {
        "keycloak"
    }

    async fn initialize(&self) -> Result<(), AuthError> {
        self.session.initialize().await
    }

    async fn token(&self) -> Result<Option<String>, AuthError> {
        self.session.token().await.map(Some)
    }

    async fn logout(&self) -> Result<(), AuthError> {
        let url = self.session.endpoints().logout_uri.clone();
        self.session.logout(&url).await
    }
}

/// Auth0 tenant login.
pub struct Auth0Provider {
    session: OidcSession,
}

impl Auth0Provider {
    /// `url` is the tenant URL; only its host is used.
    pub fn new(url: &str, client_id: String, token_path: &str) -> Result<Self, AuthError> {
        let host = url
            .split("://")
            .nth(1)
            .unwrap_or(url)
            .split('/')
            .next()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| AuthError::Misconfigured(format!("bad auth0 url: {url}")))?;
        let endpoints = OidcEndpoints {
            auth_uri: format!("https://{host}/authorize"),
            token_uri: format!("https://{host}/oauth/token"),
            logout_uri: format!(
                "https://{host}/v2/logout?client_id={}",
                urlencoding::encode(&client_id)
            ),
        };
        Ok(Self {
            session: OidcSession::new("auth0", client_id, endpoints, token_path),
        })
    }

    pub fn endpoints(&self) -> &OidcEndpoints {
        self.session.endpoints()
    }
}

#[async_trait]
impl IdentityProvider for Auth0Provider {
    fn name(&self) -> &'static str {
        "auth0"
    }

    async fn initialize(&self) -> Result<(), AuthError> {
        self.session.initialize().await
    }

    async fn token(&self) -> Result<Option<String>, AuthError> {
        self.session.token().await.map(Some)
    }

    async fn logout(&self) -> Result<(), AuthError> {
        let url = self.session.endpoints().logout_uri.clone();
        self.session.logout(&url).await
    }
}

/// Preset token, used for exports and public backends.
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenProvider {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn initialize(&self) -> Result<(), AuthError> {
        Ok(())
    }

    async fn token(&self) -> Result<Option<String>, AuthError> {
        Ok(self.token.clone())
    }

    async fn logout(&self) -> Result<(), AuthError> {
        Ok(())
    }
}

/// The active identity provider, constructed once and passed down explicitly.
#[derive(Clone)]
pub struct AuthContext {
    provider: Arc<dyn IdentityProvider>,
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("provider", &self.provider.name())
            .finish()
    }
}

impl AuthContext {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    /// Context that never attaches a token.
    pub fn anonymous() -> Self {
        Self::new(Arc::new(StaticTokenProvider::new(None)))
    }

    /// Build the provider named in config, optionally overridden by the backend's `/env`.
    pub fn from_config(cfg: &AuthCfg, env: Option<&BackendEnv>) -> Result<Self, AuthError> {
        let mut kind = cfg.provider;
        let mut client_id = cfg.client_id.clone();
        let mut url = cfg.url.clone();
        if let Some(env) = env {
            kind = match env.auth_provider.as_deref() {
                Some("keycloak") => ProviderKind::Keycloak,
                Some("auth0") => ProviderKind::Auth0,
                _ => kind,
            };
            if let Some(id) = &env.auth_client_id {
                client_id = id.clone();
            }
            if let Some(u) = &env.auth_url {
                url = u.clone();
            }
        }

        let provider: Arc<dyn IdentityProvider> = match kind {
            ProviderKind::Static => {
                Arc::new(StaticTokenProvider::new(Some(cfg.access_token.clone())))
            }
            ProviderKind::Keycloak | ProviderKind::Auth0
                if client_id.is_empty() || url.is_empty() =>
            {
                return Err(AuthError::Misconfigured(
                    "auth.client_id and auth.url are required".into(),
                ));
            }
            ProviderKind::Keycloak => Arc::new(KeycloakProvider::new(
                &url,
                &cfg.realm,
                client_id,
                &cfg.token_path,
            )),
            ProviderKind::Auth0 => Arc::new(Auth0Provider::new(&url, client_id, &cfg.token_path)?),
        };
        tracing::info!(provider = provider.name(), "auth context built");
        Ok(Self::new(provider))
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub async fn initialize(&self) -> Result<(), AuthError> {
        self.provider.initialize().await
    }

    pub async fn token(&self) -> Result<Option<String>, AuthError> {
        self.provider.token().await
    }

    pub async fn logout(&self) -> Result<(), AuthError> {
        self.provider.logout().await
    }
}
