//! Signing key lookup for ALB and Cognito tokens
//!
//! ALB publishes one PEM per key id; Cognito publishes a JWKS per user pool.
//! Fetched keys are cached since key ids are never reused.

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::{Clock, SystemClock, TtlCache};
use crate::types::{LandscapeError, Result};

const KEY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// A key plus the only algorithm it may verify
#[derive(Clone)]
pub struct VerificationKey {
    pub key: DecodingKey,
    pub algorithm: Algorithm,
}

/// Resolves key ids to verification keys
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Key that signed an `x-amzn-oidc-data` token
    async fn alb_key(&self, kid: &str) -> Result<VerificationKey>;

    /// Key that signed a Cognito access token
    async fn cognito_key(&self, kid: &str) -> Result<VerificationKey>;
}

/// Fetches keys from the public AWS endpoints
pub struct HttpKeySource {
    client: Client,
    region: String,
    user_pool_id: String,
    alb_keys: TtlCache<String, VerificationKey>,
    cognito_keys: TtlCache<String, VerificationKey>,
}

impl HttpKeySource {
    pub fn new(region: impl Into<String>, user_pool_id: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("landscape/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        Self {
            client,
            region: region.into(),
            user_pool_id: user_pool_id.into(),
            alb_keys: TtlCache::new(clock.clone()),
            cognito_keys: TtlCache::new(clock),
        }
    }

    fn jwks_url(&self) -> String {
        format!(
            "https://cognito-idp.{}.amazonaws.com/{}/.well-known/jwks.json",
            self.region, self.user_pool_id
        )
    }

    async fn refresh_cognito_keys(&self) -> Result<()> {
        let url = self.jwks_url();
        debug!("Fetching Cognito JWKS from {}", url);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(LandscapeError::Upstream(format!(
                "JWKS fetch failed: {}",
                resp.status()
            )));
        }
        let jwks: JwkSet = resp.json().await?;
        for jwk in &jwks.keys {
            let Some(kid) = jwk.common.key_id.clone() else {
                continue;
            };
            match DecodingKey::from_jwk(jwk) {
                Ok(key) => self.cognito_keys.insert(
                    kid,
                    VerificationKey {
                        key,
                        algorithm: Algorithm::RS256,
                    },
                    KEY_TTL,
                ),
                Err(e) => warn!(kid = %kid, error = %e, "Skipping unusable JWK"),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl KeySource for HttpKeySource {
    async fn alb_key(&self, kid: &str) -> Result<VerificationKey> {
        if let Some(key) = self.alb_keys.get(&kid.to_string()) {
            return Ok(key);
        }

        if kid.is_empty() || !kid.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(LandscapeError::Unauthorized("Invalid ALB key id".into()));
        }
        let url = format!(
            "https://public-keys.auth.elb.{}.amazonaws.com/{}",
            self.region, kid
        );
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(LandscapeError::Unauthorized(format!(
                "Unknown ALB key id: {}",
                kid
            )));
        }
        let pem = resp.text().await?;
        let key = VerificationKey {
            key: DecodingKey::from_ec_pem(pem.as_bytes())?,
            algorithm: Algorithm::ES256,
        };
        self.alb_keys.insert(kid.to_string(), key.clone(), KEY_TTL);
        Ok(key)
    }

    async fn cognito_key(&self, kid: &str) -> Result<VerificationKey> {
        let kid = kid.to_string();
        if let Some(key) = self.cognito_keys.get(&kid) {
            return Ok(key);
        }
        self.refresh_cognito_keys().await?;
        self.cognito_keys
            .get(&kid)
            .ok_or_else(|| LandscapeError::Unauthorized(format!("Unknown Cognito key id: {}", kid)))
    }
}
