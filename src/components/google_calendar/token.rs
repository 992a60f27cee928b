use crate::config::Config;
use crate::error::{BotResult, Error};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

/// Google OAuth token endpoint
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Google OAuth consent page
pub const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Read-only access to the user's calendars
pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar.readonly";

/// Access tokens are refreshed this long before they expire
const EXPIRY_MARGIN_SECONDS: i64 = 60;

/// Upper bound for one token endpoint request
const REQUEST_TIMEOUT_SECONDS: u64 = 15;

/// Opaque access credential for one user's calendars
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    access_token: String,
}

impl Credential {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }

    /// Bearer token for API requests
    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(..)")
    }
}

/// Store of per-user calendar credentials
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Whether the user has completed authorization. Never does I/O.
    fn has_linked_credential(&self, user_id: u64) -> bool;

    /// Get a usable credential, refreshing it if needed
    async fn get_credential(&self, user_id: u64) -> BotResult<Credential>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
}

fn default_expires_in() -> i64 {
    3600
}

struct CachedToken {
    credential: Credential,
    expires_at: DateTime<Utc>,
}

/// Cached access token of one user, locked while it is refreshed
type TokenSlot = Arc<Mutex<Option<CachedToken>>>;

/// Credential store backed by Google refresh tokens from the configuration.
///
/// Access tokens live in memory only. Each user has their own slot, so a slow
/// refresh only holds up callers asking for the same user.
#[derive(Clone)]
pub struct GoogleCredentialStore {
    config: Arc<Config>,
    client: Client,
    token_url: Url,
    slots: Arc<Mutex<HashMap<u64, TokenSlot>>>,
}

impl GoogleCredentialStore {
    pub fn new(config: Arc<Config>) -> BotResult<Self> {
        Self::with_token_url(config, TOKEN_URL)
    }

    /// Use another token endpoint, e.g. a local test server
    pub fn with_token_url(config: Arc<Config>, token_url: &str) -> BotResult<Self> {
        let token_url = Url::parse(token_url)
            .map_err(|e| Error::Credential(format!("Invalid token URL: {}", e)))?;
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()?;

        Ok(Self {
            config,
            client,
            token_url,
            slots: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// The user's cache slot; the map itself is only locked for the lookup
    async fn slot(&self, user_id: u64) -> TokenSlot {
        let mut slots = self.slots.lock().await;
        Arc::clone(slots.entry(user_id).or_default())
    }

    /// Exchange a refresh token for a new access token
    async fn refresh_token(&self, refresh_token: &str) -> BotResult<CachedToken> {
        let params = [
            ("client_id", self.config.google_client_id.as_str()),
            ("client_secret", self.config.google_client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post(self.token_url.clone())
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::Credential(format!("Failed to refresh token: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error response".to_string());
            return Err(Error::Credential(format!(
                "Failed to refresh token: HTTP {} - {}",
                status, error_body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Credential(format!("Failed to parse token response: {}", e)))?;

        Ok(CachedToken {
            credential: Credential::new(token.access_token),
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
        })
    }

    /// Exchange an authorization code for a long-lived refresh token
    pub async fn exchange_code(&self, code: &str) -> BotResult<String> {
        let params = [
            ("client_id", self.config.google_client_id.as_str()),
            ("client_secret", self.config.google_client_secret.as_str()),
            ("code", code),
            ("redirect_uri", self.config.google_redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .client
            .post(self.token_url.clone())
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(Error::Credential(format!(
                "Failed to get token: HTTP {} - {}",
                status, error_text
            )));
        }

        let token: TokenResponse = response.json().await?;
        token.refresh_token.ok_or_else(|| {
            Error::Credential("No refresh token in response, revoke access and retry".to_string())
        })
    }
}

/// Consent page URL asking for offline read-only calendar access
pub fn consent_url(config: &Config, state: &str) -> BotResult<Url> {
    Url::parse_with_params(
        AUTH_URL,
        &[
            ("client_id", config.google_client_id.as_str()),
            ("redirect_uri", config.google_redirect_uri.as_str()),
            ("response_type", "code"),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("scope", CALENDAR_SCOPE),
            ("state", state),
        ],
    )
    .map_err(|e| Error::Credential(format!("Invalid consent URL: {}", e)))
}

#[async_trait]
impl CredentialStore for GoogleCredentialStore {
    fn has_linked_credential(&self, user_id: u64) -> bool {
        self.config.refresh_token(user_id).is_some()
    }

    async fn get_credential(&self, user_id: u64) -> BotResult<Credential> {
        let refresh_token = self
            .config
            .refresh_token(user_id)
            .ok_or(Error::NotLinked(user_id))?;

        // Held across the refresh so concurrent callers for this user share one exchange
        let slot = self.slot(user_id).await;
        let mut cached = slot.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at - Duration::seconds(EXPIRY_MARGIN_SECONDS) > Utc::now() {
                return Ok(token.credential.clone());
            }
        }

        debug!(user_id, "Refreshing Google access token");
        let fresh = self.refresh_token(refresh_token).await?;
        let credential = fresh.credential.clone();
        *cached = Some(fresh);
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> GoogleCredentialStore {
        let config = Config::from_toml_str(
            "allowed_user_ids = [1, 2, 3]\n[users.1]\nname = \"a\"\n[users.2]\nname = \"b\"\n[users.3]\nname = \"c\"\n",
            |id| (id != 2).then(|| format!("refresh-{}", id)),
        )
        .unwrap();
        GoogleCredentialStore::new(Arc::new(config)).unwrap()
    }

    async fn seed(store: &GoogleCredentialStore, user_id: u64, access_token: &str) {
        *store.slot(user_id).await.lock().await = Some(CachedToken {
            credential: Credential::new(access_token),
            expires_at: Utc::now() + Duration::hours(1),
        });
    }

    #[test]
    fn test_has_linked_credential() {
        let store = store();
        assert!(store.has_linked_credential(1));
        assert!(!store.has_linked_credential(2));
        assert!(store.has_linked_credential(3));
        assert!(!store.has_linked_credential(4));
    }

    #[tokio::test]
    async fn test_unlinked_user_fails_without_request() {
        let store = store();
        assert!(matches!(
            store.get_credential(2).await,
            Err(Error::NotLinked(2))
        ));
    }

    #[tokio::test]
    async fn test_cached_token_is_reused() {
        let store = store();
        seed(&store, 1, "cached").await;

        let credential = store.get_credential(1).await.unwrap();
        assert_eq!(credential.access_token(), "cached");
    }

    #[tokio::test]
    async fn test_busy_user_does_not_block_others() {
        let store = store();
        seed(&store, 3, "cached-3").await;

        // Stands in for a refresh of user 1 that never finishes
        let slot = store.slot(1).await;
        let _refreshing = slot.lock().await;

        let credential =
            tokio::time::timeout(std::time::Duration::from_secs(2), store.get_credential(3))
                .await
                .expect("user 3 waited for user 1")
                .unwrap();
        assert_eq!(credential.access_token(), "cached-3");
    }

    #[test]
    fn test_invalid_token_url() {
        let config = Arc::new(Config::from_toml_str("", |_| None).unwrap());
        assert!(matches!(
            GoogleCredentialStore::with_token_url(config, "not a url"),
            Err(Error::Credential(_))
        ));
    }

    #[test]
    fn test_consent_url() {
        let config = Config::from_toml_str("", |_| None).unwrap();
        let url = consent_url(&config, "42:abc").unwrap();
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["prompt"], "consent");
        assert_eq!(params["scope"], CALENDAR_SCOPE);
        assert_eq!(params["state"], "42:abc");
        assert_eq!(params["redirect_uri"], "http://localhost:8080");
    }

    #[test]
    fn test_credential_debug_hides_token() {
        assert_eq!(format!("{:?}", Credential::new("secret")), "Credential(..)");
    }
}
