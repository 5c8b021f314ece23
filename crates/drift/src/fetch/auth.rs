//! Bearer tokens for the Admin Reports API.
//!
//! A token is either supplied directly, read from a file kept fresh by
//! something else, or minted from a service-account key with domain-wide
//! delegation: a signed JWT assertion naming the impersonated admin is
//! exchanged at the key's token endpoint, and the access token is cached
//! until shortly before it expires.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

use crate::error::{
    CredentialsParseSnafu, CredentialsReadSnafu, EmptyTokenSnafu, FetchError, SignAssertionSnafu,
    SigningKeySnafu, TokenDecodeSnafu, TokenExchangeSnafu, TokenReadSnafu, TokenRequestSnafu,
};

/// Scopes requested for service-account tokens.
pub const REPORTS_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/admin.reports.audit.readonly",
    "https://www.googleapis.com/auth/admin.reports.usage.readonly",
];

/// Token endpoint used when the key file does not name one.
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime requested for each signed assertion.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Cached tokens are replaced this long before they expire.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Where the bearer token comes from.
#[derive(Debug, Clone)]
pub enum TokenSource {
    /// Fixed token from configuration.
    Static(String),
    /// File re-read before every request, so an external refresher can rotate it.
    File(PathBuf),
    /// Minted from a service-account key on behalf of a delegated user.
    ServiceAccount(Arc<ServiceAccount>),
}

impl TokenSource {
    pub fn service_account(key_path: impl Into<PathBuf>, subject: impl Into<String>) -> Self {
        TokenSource::ServiceAccount(Arc::new(ServiceAccount::new(key_path, subject)))
    }

    /// Current bearer token. `http` is used only for service-account exchanges.
    pub async fn resolve(&self, http: &reqwest::Client) -> Result<String, FetchError> {
        let token = match self {
            TokenSource::Static(token) => token.trim().to_string(),
            TokenSource::File(path) => tokio::fs::read_to_string(path)
                .await
                .context(TokenReadSnafu { path: path.clone() })?
                .trim()
                .to_string(),
            TokenSource::ServiceAccount(account) => account.token(http).await?,
        };
        ensure!(!token.is_empty(), EmptyTokenSnafu);
        Ok(token)
    }
}

/// The fields of a service-account JSON key that token minting needs.
#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default)]
    private_key_id: Option<String>,
    #[serde(default = "default_token_url")]
    token_uri: String,
}

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.to_string()
}

struct Signer {
    client_email: String,
    key_id: Option<String>,
    token_url: String,
    key: EncodingKey,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iss: String,
    sub: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Service-account credentials with domain-wide delegation.
///
/// The key file is read on first use; tokens are shared by every clone of the
/// owning [`TokenSource`].
pub struct ServiceAccount {
    key_path: PathBuf,
    subject: String,
    signer: OnceCell<Signer>,
    cached: Mutex<Option<CachedToken>>,
}

impl fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("key_path", &self.key_path)
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

impl ServiceAccount {
    pub fn new(key_path: impl Into<PathBuf>, subject: impl Into<String>) -> Self {
        Self {
            key_path: key_path.into(),
            subject: subject.into(),
            signer: OnceCell::new(),
            cached: Mutex::new(None),
        }
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Return the cached access token, exchanging a fresh assertion when it
    /// is missing or about to expire.
    async fn token(&self, http: &reqwest::Client) -> Result<String, FetchError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();
        let margin = Duration::seconds(EXPIRY_MARGIN_SECS);
        if let Some(token) = cached.as_ref().filter(|t| t.expires_at - margin > now) {
            return Ok(token.value.clone());
        }

        let signer = self
            .signer
            .get_or_try_init(|| load_signer(&self.key_path))
            .await?;
        let fresh = exchange(http, signer, &self.subject, now).await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }
}

async fn load_signer(path: &Path) -> Result<Signer, FetchError> {
    let contents = tokio::fs::read(path)
        .await
        .context(CredentialsReadSnafu { path })?;
    let key: ServiceAccountKey =
        serde_json::from_slice(&contents).context(CredentialsParseSnafu { path })?;
    let encoding_key =
        EncodingKey::from_rsa_pem(key.private_key.as_bytes()).context(SigningKeySnafu { path })?;

    debug!(
        client_email = %key.client_email,
        token_url = %key.token_uri,
        "Loaded service account key"
    );

    Ok(Signer {
        client_email: key.client_email,
        key_id: key.private_key_id,
        token_url: key.token_uri,
        key: encoding_key,
    })
}

async fn exchange(
    http: &reqwest::Client,
    signer: &Signer,
    subject: &str,
    now: DateTime<Utc>,
) -> Result<CachedToken, FetchError> {
    let claims = Claims {
        iss: signer.client_email.clone(),
        sub: subject.to_string(),
        scope: REPORTS_SCOPES.join(" "),
        aud: signer.token_url.clone(),
        iat: now.timestamp(),
        exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
    };
    let mut header = Header::new(Algorithm::RS256);
    header.kid = signer.key_id.clone();
    let assertion =
        jsonwebtoken::encode(&header, &claims, &signer.key).context(SignAssertionSnafu)?;

    let response = http
        .post(&signer.token_url)
        .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
        .send()
        .await
        .context(TokenRequestSnafu)?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return TokenExchangeSnafu {
            status: status.as_u16(),
            body,
        }
        .fail();
    }

    let token: TokenResponse = response.json().await.context(TokenDecodeSnafu)?;
    let lifetime = token.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS);

    debug!(subject, expires_in = lifetime, "Exchanged service account assertion");

    Ok(CachedToken {
        value: token.access_token,
        expires_at: now + Duration::seconds(lifetime),
    })
}
