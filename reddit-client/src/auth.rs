//! Script-app authentication using the OAuth2 resource-owner password grant.

use oauth2::basic::BasicClient;
use oauth2::reqwest::Error as OAuthHttpError;
use oauth2::{
    AuthUrl, ClientId, ClientSecret, HttpRequest, HttpResponse, RequestTokenError,
    ResourceOwnerPassword, ResourceOwnerUsername, Scope, TokenResponse, TokenUrl,
};
use salesflow_core::{ConfigError, CoreError, RedditApiError, RedditConfig};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const AUTHORIZE_URL: &str = "https://www.reddit.com/api/v1/authorize";
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);
/// Tokens this close to expiry are refreshed before use.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub user_agent: String,
    pub token_url: String,
}

impl RedditCredentials {
    /// Returns `None` unless all four secrets are configured.
    pub fn from_config(config: &RedditConfig) -> Option<Self> {
        if !config.has_oauth_credentials() {
            return None;
        }
        Some(Self {
            client_id: config.client_id.clone()?,
            client_secret: config.client_secret.clone()?,
            username: config.username.clone()?,
            password: config.password.clone()?,
            user_agent: config.user_agent(),
            token_url: config.token_url.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditToken {
    pub access_token: String,
    pub expires_at: SystemTime,
    pub scope: Vec<String>,
}

impl RedditToken {
    pub fn is_expired(&self) -> bool {
        SystemTime::now() + EXPIRY_MARGIN >= self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    NotAuthenticated,
    Authenticated { expires_at: SystemTime },
    TokenExpired { expired_at: SystemTime },
}

#[derive(Debug)]
pub struct PasswordAuthenticator {
    oauth_client: BasicClient,
    username: ResourceOwnerUsername,
    password: ResourceOwnerPassword,
    user_agent: String,
    http: reqwest::Client,
    token: Mutex<Option<RedditToken>>,
}

impl PasswordAuthenticator {
    pub fn new(credentials: RedditCredentials) -> Result<Self, CoreError> {
        let auth_url = AuthUrl::new(AUTHORIZE_URL.to_string()).map_err(|e| {
            CoreError::Config(ConfigError::InvalidValue {
                field: "reddit.authorize_url".to_string(),
                value: e.to_string(),
            })
        })?;
        let token_url = TokenUrl::new(credentials.token_url.clone()).map_err(|e| {
            CoreError::Config(ConfigError::InvalidValue {
                field: "reddit.token_url".to_string(),
                value: e.to_string(),
            })
        })?;

        // Reddit expects the client credentials as HTTP basic auth, which is
        // the BasicClient default.
        let oauth_client = BasicClient::new(
            ClientId::new(credentials.client_id),
            Some(ClientSecret::new(credentials.client_secret)),
            auth_url,
            Some(token_url),
        );

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            oauth_client,
            username: ResourceOwnerUsername::new(credentials.username),
            password: ResourceOwnerPassword::new(credentials.password),
            user_agent: credentials.user_agent,
            http,
            token: Mutex::new(None),
        })
    }

    pub async fn auth_state(&self) -> AuthState {
        match self.token.lock().await.as_ref() {
            None => AuthState::NotAuthenticated,
            Some(token) if token.is_expired() => AuthState::TokenExpired {
                expired_at: token.expires_at,
            },
            Some(token) => AuthState::Authenticated {
                expires_at: token.expires_at,
            },
        }
    }

    pub async fn set_token(&self, token: RedditToken) {
        *self.token.lock().await = Some(token);
    }

    /// Drops the cached token so the next call fetches a fresh one.
    pub async fn invalidate(&self) {
        if self.token.lock().await.take().is_some() {
            debug!("cached reddit token invalidated");
        }
    }

    /// Returns a valid bearer token, fetching one if the cache is empty or
    /// close to expiry.
    pub async fn access_token(&self) -> Result<String, CoreError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if !token.is_expired() {
                return Ok(token.access_token.clone());
            }
            debug!("reddit token expired, requesting a new one");
        }

        let token = self.fetch_token().await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    async fn fetch_token(&self) -> Result<RedditToken, CoreError> {
        let http = self.http.clone();
        let user_agent = self.user_agent.clone();

        let response = self
            .oauth_client
            .exchange_password(&self.username, &self.password)
            .add_scope(Scope::new("read".to_string()))
            .request_async(move |request| send_token_request(http, user_agent, request))
            .await
            .map_err(|e| {
                let error = match e {
                    RequestTokenError::ServerResponse(response) => {
                        RedditApiError::AuthenticationFailed {
                            reason: response.error().to_string(),
                        }
                    }
                    RequestTokenError::Request(OAuthHttpError::Reqwest(e)) => {
                        return CoreError::Network(e);
                    }
                    RequestTokenError::Request(other) => RedditApiError::AuthenticationFailed {
                        reason: other.to_string(),
                    },
                    RequestTokenError::Parse(e, _) => RedditApiError::InvalidResponse {
                        details: format!("token response: {}", e),
                    },
                    RequestTokenError::Other(message) => {
                        RedditApiError::AuthenticationFailed { reason: message }
                    }
                };
                warn!(error = %error, "reddit token request failed");
                CoreError::RedditApi(error)
            })?;

        let lifetime = response.expires_in().unwrap_or(DEFAULT_TOKEN_LIFETIME);
        let scope = response
            .scopes()
            .map(|scopes| scopes.iter().map(|s| s.to_string()).collect())
            .unwrap_or_default();

        info!(lifetime_secs = lifetime.as_secs(), "obtained reddit access token");
        Ok(RedditToken {
            access_token: response.access_token().secret().clone(),
            expires_at: SystemTime::now() + lifetime,
            scope,
        })
    }
}

/// Sends the token request through our own reqwest client so Reddit sees
/// the configured User-Agent.
async fn send_token_request(
    http: reqwest::Client,
    user_agent: String,
    request: HttpRequest,
) -> Result<HttpResponse, OAuthHttpError<reqwest::Error>> {
    let mut builder = http
        .request(request.method, request.url.as_str())
        .header(reqwest::header::USER_AGENT, user_agent)
        .body(request.body);
    for (name, value) in request.headers.iter() {
        builder = builder.header(name, value);
    }

    let response = builder.send().await.map_err(OAuthHttpError::Reqwest)?;
    let status_code = response.status();
    let headers = response.headers().clone();
    let body = response
        .bytes()
        .await
        .map_err(OAuthHttpError::Reqwest)?
        .to_vec();

    Ok(HttpResponse {
        status_code,
        headers,
        body,
    })
}
