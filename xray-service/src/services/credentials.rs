//! Credentials for the Gemini API.
//!
//! Two sources are supported and chosen explicitly in configuration:
//! a static API key, or OAuth access tokens minted from a credential file
//! (`service_account` or `authorized_user`). Token values are held in
//! [`Secret`] and never logged.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;

/// Scope requested for Gemini access tokens.
pub const DEFAULT_OAUTH_SCOPE: &str = "https://www.googleapis.com/auth/generative-language.tuning";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Tokens this close to expiry are treated as already expired.
const EXPIRY_SKEW_SECS: i64 = 60;

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Failed to read credential file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed credential file: {0}")]
    Malformed(String),

    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Token request failed: {0}")]
    Network(String),

    #[error("Token endpoint rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("API key is not configured")]
    MissingApiKey,
}

/// A short-lived OAuth access token.
#[derive(Clone, Debug)]
pub struct AccessToken {
    value: Secret<String>,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(value: String, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: Secret::new(value),
            expires_at,
        }
    }

    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_SKEW_SECS) >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Credential attached to one model request.
#[derive(Clone, Debug)]
pub enum Authorization {
    Bearer(AccessToken),
    ApiKey(Secret<String>),
}

impl Authorization {
    pub fn scheme(&self) -> &'static str {
        match self {
            Authorization::Bearer(_) => "bearer",
            Authorization::ApiKey(_) => "api_key",
        }
    }

    pub fn is_api_key(&self) -> bool {
        matches!(self, Authorization::ApiKey(_))
    }
}

/// Produces the [`Authorization`] for each model request.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Short label for logs and readiness output.
    fn kind(&self) -> &'static str;

    async fn authorize(&self) -> Result<Authorization, CredentialError>;

    /// Cheap local check used by the readiness endpoint. Must not hit the network.
    async fn check(&self) -> Result<(), CredentialError>;
}

/// Static Gemini API key.
pub struct ApiKeyCredentials {
    key: Secret<String>,
}

impl ApiKeyCredentials {
    pub fn new(key: Secret<String>) -> Result<Self, CredentialError> {
        if key.expose_secret().trim().is_empty() {
            return Err(CredentialError::MissingApiKey);
        }
        Ok(Self { key })
    }
}

#[async_trait]
impl CredentialProvider for ApiKeyCredentials {
    fn kind(&self) -> &'static str {
        "api_key"
    }

    async fn authorize(&self) -> Result<Authorization, CredentialError> {
        Ok(Authorization::ApiKey(self.key.clone()))
    }

    async fn check(&self) -> Result<(), CredentialError> {
        Ok(())
    }
}

/// Settings for [`OAuthCredentials`].
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub credentials_file: PathBuf,
    pub scope: String,
    /// Keep the token across requests until it expires.
    pub cache_tokens: bool,
    pub timeout: std::time::Duration,
}

/// OAuth access tokens minted from a Google credential file.
pub struct OAuthCredentials {
    settings: OAuthSettings,
    client: Client,
    cached: RwLock<Option<AccessToken>>,
}

impl OAuthCredentials {
    pub fn new(settings: OAuthSettings) -> Result<Self, CredentialError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| CredentialError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            settings,
            client,
            cached: RwLock::new(None),
        })
    }

    async fn load_file(&self) -> Result<CredentialFile, CredentialError> {
        CredentialFile::load(&self.settings.credentials_file).await
    }

    async fn fetch_token(&self) -> Result<AccessToken, CredentialError> {
        let file = self.load_file().await?;
        let now = Utc::now();

        let response = match &file {
            CredentialFile::ServiceAccount(key) => {
                let assertion = key.sign_assertion(&self.settings.scope, now)?;
                self.client
                    .post(&key.token_uri)
                    .form(&[
                        ("grant_type", JWT_BEARER_GRANT),
                        ("assertion", assertion.as_str()),
                    ])
                    .send()
                    .await
            }
            CredentialFile::AuthorizedUser(user) => {
                self.client
                    .post(&user.token_uri)
                    .form(&[
                        ("grant_type", "refresh_token"),
                        ("client_id", user.client_id.as_str()),
                        ("client_secret", user.client_secret.expose_secret().as_str()),
                        ("refresh_token", user.refresh_token.expose_secret().as_str()),
                    ])
                    .send()
                    .await
            }
        }
        .map_err(|e| CredentialError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<TokenErrorResponse>(&body)
                .map(|e| match e.error_description {
                    Some(description) => format!("{}: {}", e.error, description),
                    None => e.error,
                })
                .unwrap_or(body);

            return Err(CredentialError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::Network(format!("Invalid token response: {}", e)))?;

        let expires_at = Duration::try_seconds(token.expires_in)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                CredentialError::Network(format!(
                    "Invalid token response: expires_in {} out of range",
                    token.expires_in
                ))
            })?;

        tracing::info!(
            credential_type = file.kind(),
            principal = %file.principal(),
            expires_at = %expires_at,
            "Obtained access token"
        );

        Ok(AccessToken::new(token.access_token, expires_at))
    }
}

#[async_trait]
impl CredentialProvider for OAuthCredentials {
    fn kind(&self) -> &'static str {
        "oauth"
    }

    async fn authorize(&self) -> Result<Authorization, CredentialError> {
        if !self.settings.cache_tokens {
            return self.fetch_token().await.map(Authorization::Bearer);
        }

        if let Some(token) = self.cached.read().await.as_ref() {
            if !token.is_expired() {
                return Ok(Authorization::Bearer(token.clone()));
            }
        }

        let mut cached = self.cached.write().await;
        // Another request may have refreshed while we waited for the lock.
        if let Some(token) = cached.as_ref() {
            if !token.is_expired() {
                return Ok(Authorization::Bearer(token.clone()));
            }
            tracing::debug!(expired_at = %token.expires_at(), "Cached access token expired, refreshing");
        }

        let token = self.fetch_token().await?;
        *cached = Some(token.clone());

        Ok(Authorization::Bearer(token))
    }

    async fn check(&self) -> Result<(), CredentialError> {
        self.load_file().await.map(|_| ())
    }
}

// ============================================================================
// Credential file formats
// ============================================================================

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CredentialFile {
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser(AuthorizedUser),
}

impl CredentialFile {
    async fn load(path: &Path) -> Result<Self, CredentialError> {
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| CredentialError::Read {
                    path: path.display().to_string(),
                    source,
                })?;

        serde_json::from_str(&contents).map_err(|e| CredentialError::Malformed(e.to_string()))
    }

    fn kind(&self) -> &'static str {
        match self {
            CredentialFile::ServiceAccount(_) => "service_account",
            CredentialFile::AuthorizedUser(_) => "authorized_user",
        }
    }

    fn principal(&self) -> &str {
        match self {
            CredentialFile::ServiceAccount(key) => &key.client_email,
            CredentialFile::AuthorizedUser(user) => &user.client_id,
        }
    }
}

#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: Secret<String>,
    #[serde(default)]
    private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

#[derive(Deserialize)]
struct AuthorizedUser {
    client_id: String,
    client_secret: Secret<String>,
    refresh_token: Secret<String>,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Claims of the JWT bearer assertion exchanged for an access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl ServiceAccountKey {
    fn sign_assertion(&self, scope: &str, now: DateTime<Utc>) -> Result<String, CredentialError> {
        let encoding_key = EncodingKey::from_rsa_pem(self.private_key.expose_secret().as_bytes())
            .map_err(|e| CredentialError::InvalidKey(e.to_string()))?;

        let claims = AssertionClaims {
            iss: self.client_email.clone(),
            scope: scope.to_string(),
            aud: self.token_uri.clone(),
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();

        encode(&header, &claims, &encoding_key)
            .map_err(|e| CredentialError::InvalidKey(format!("Failed to sign assertion: {}", e)))
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}
