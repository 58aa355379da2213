//! Azure Authentication
//!
//! Acquires Resource Manager access tokens from a static token or the
//! `azure_identity` default credential chain, and caches them until shortly
//! before they expire.

use super::cloud::CloudEnvironment;
use anyhow::{Context, Result};
use async_trait::async_trait;
use azure_core::auth::TokenCredential;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Token expiry buffer - refresh tokens this much before they actually expire
/// This prevents using tokens that are about to expire during a request
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Default token TTL if we can't determine expiry (conservative: 30 minutes)
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// An access token and its lifetime, if known
#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_in: Option<Duration>,
}

/// Something that can mint a bearer token for an audience
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self, audience: &str) -> Result<AccessToken>;

    fn name(&self) -> &'static str;
}

/// A pre-acquired bearer token, e.g. from `AZURE_ACCESS_TOKEN`
pub struct StaticTokenCredential {
    token: String,
}

impl StaticTokenCredential {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenCredential {
    async fn token(&self, _audience: &str) -> Result<AccessToken> {
        Ok(AccessToken {
            token: self.token.clone(),
            expires_in: None,
        })
    }

    fn name(&self) -> &'static str {
        "static token"
    }
}

/// Tokens from the `azure_identity` default credential chain: environment
/// (client secret or certificate), workload identity, managed identity and the
/// Azure CLI
pub struct IdentityCredential {
    credential: Arc<dyn TokenCredential>,
}

impl IdentityCredential {
    pub fn new(credential: Arc<dyn TokenCredential>) -> Self {
        Self { credential }
    }

    /// Build the default chain after exporting the `ARM_*` aliases and the
    /// cloud's authority host
    pub fn from_env(cloud: CloudEnvironment) -> Result<Self> {
        for (name, value) in identity_env(cloud, |name| std::env::var(name).ok()) {
            tracing::debug!("Setting {} for the credential chain", name);
            std::env::set_var(name, value);
        }

        let credential = azure_identity::create_default_credential()
            .context("Failed to create the default Azure credential")?;
        Ok(Self::new(credential))
    }
}

#[async_trait]
impl TokenProvider for IdentityCredential {
    async fn token(&self, audience: &str) -> Result<AccessToken> {
        let scope = default_scope(audience);
        let token = self
            .credential
            .get_token(&[scope.as_str()])
            .await
            .with_context(|| format!("Failed to get a token for {}", scope))?;

        Ok(AccessToken {
            token: token.token.secret().to_string(),
            expires_in: seconds_until(token.expires_on.unix_timestamp()),
        })
    }

    fn name(&self) -> &'static str {
        "azure identity"
    }
}

/// `ARM_*` variables mirrored onto the `AZURE_*` names the credential chain reads
const ARM_ALIASES: [(&str, &str); 4] = [
    ("ARM_TENANT_ID", "AZURE_TENANT_ID"),
    ("ARM_CLIENT_ID", "AZURE_CLIENT_ID"),
    ("ARM_CLIENT_SECRET", "AZURE_CLIENT_SECRET"),
    ("ARM_CLIENT_CERTIFICATE_PATH", "AZURE_CLIENT_CERTIFICATE_PATH"),
];

/// Variables to export before building the credential chain.
///
/// An `ARM_*` value fills its `AZURE_*` name when that one is unset or empty,
/// and `AZURE_AUTHORITY_HOST` follows the cloud unless already set.
fn identity_env(
    cloud: CloudEnvironment,
    lookup: impl Fn(&str) -> Option<String>,
) -> Vec<(&'static str, String)> {
    let is_set = |name: &str| lookup(name).is_some_and(|v| !v.trim().is_empty());

    let mut vars: Vec<(&'static str, String)> = ARM_ALIASES
        .iter()
        .filter(|&&(_, azure)| !is_set(azure))
        .filter_map(|&(arm, azure)| {
            lookup(arm)
                .filter(|v| !v.trim().is_empty())
                .map(|v| (azure, v))
        })
        .collect();

    if !is_set("AZURE_AUTHORITY_HOST") {
        vars.push(("AZURE_AUTHORITY_HOST", cloud.authority_host().to_string()));
    }
    vars
}

fn default_scope(audience: &str) -> String {
    format!("{}/.default", audience.trim_end_matches('/'))
}

fn seconds_until(epoch: i64) -> Option<Duration> {
    let remaining = epoch - chrono::Utc::now().timestamp();
    u64::try_from(remaining).ok().map(Duration::from_secs)
}

/// Azure credentials holder with token caching
#[derive(Clone)]
pub struct AzureCredentials {
    provider: Arc<dyn TokenProvider>,
    audience: String,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl AzureCredentials {
    pub fn new(provider: Arc<dyn TokenProvider>, cloud: CloudEnvironment) -> Self {
        Self {
            provider,
            audience: cloud.audience().to_string(),
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Pick a provider from the environment.
    ///
    /// `AZURE_ACCESS_TOKEN` wins, otherwise the default credential chain.
    pub fn from_env(cloud: CloudEnvironment) -> Result<Self> {
        let provider: Arc<dyn TokenProvider> = match std::env::var("AZURE_ACCESS_TOKEN") {
            Ok(token) if !token.trim().is_empty() => Arc::new(StaticTokenCredential::new(&token)),
            _ => Arc::new(IdentityCredential::from_env(cloud)?),
        };

        tracing::debug!("Using {} credential", provider.name());
        Ok(Self::new(provider, cloud))
    }

    /// Get an access token for API calls
    /// Security: Checks token expiry before returning cached token
    pub async fn get_token(&self) -> Result<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let token = self
            .provider
            .token(&self.audience)
            .await
            .context("Failed to get access token")?;

        let ttl = token.expires_in.unwrap_or(DEFAULT_TOKEN_TTL);
        let expires_at = Instant::now() + ttl.saturating_sub(TOKEN_EXPIRY_BUFFER);

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token.token.clone(),
                expires_at,
            });
        }

        tracing::debug!("New token cached, expires in ~{} minutes", ttl.as_secs() / 60);

        Ok(token.token)
    }

    /// Force refresh the token
    pub async fn refresh_token(&self) -> Result<String> {
        {
            let mut cache = self.token_cache.write().await;
            *cache = None;
        }
        self.get_token().await
    }
}

/// Get the Azure CLI configuration directory
pub fn get_azure_config_dir() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("AZURE_CONFIG_DIR") {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|p| p.join(".azure"))
}

/// Validate a subscription id: a GUID such as `00000000-0000-0000-0000-000000000000`
pub fn validate_subscription_id(subscription_id: &str) -> bool {
    let groups: Vec<&str> = subscription_id.split('-').collect();
    let lengths = [8, 4, 4, 4, 12];
    groups.len() == lengths.len()
        && groups
            .iter()
            .zip(lengths)
            .all(|(g, len)| g.len() == len && g.chars().all(|c| c.is_ascii_hexdigit()))
}

#[derive(Deserialize)]
struct AzureProfile {
    #[serde(default)]
    subscriptions: Vec<ProfileSubscription>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileSubscription {
    id: String,
    #[serde(default)]
    is_default: bool,
}

/// Read the default subscription from `AZURE_SUBSCRIPTION_ID` or the Azure CLI profile
/// Security: Validates subscription id format before returning
pub fn get_default_subscription() -> Option<String> {
    if let Ok(subscription) = std::env::var("AZURE_SUBSCRIPTION_ID") {
        if validate_subscription_id(&subscription) {
            return Some(subscription);
        }
        tracing::warn!("Invalid subscription id format in AZURE_SUBSCRIPTION_ID");
    }

    let path = get_azure_config_dir()?.join("azureProfile.json");
    let content = std::fs::read_to_string(&path).ok()?;
    default_subscription_from_profile(&content)
}

fn default_subscription_from_profile(content: &str) -> Option<String> {
    // The CLI writes this file with a UTF-8 BOM
    let content = content.trim_start_matches('\u{feff}');
    let profile: AzureProfile = serde_json::from_str(content).ok()?;
    profile
        .subscriptions
        .into_iter()
        .find(|s| s.is_default)
        .map(|s| s.id)
        .filter(|id| validate_subscription_id(id))
}
