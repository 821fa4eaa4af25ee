//! Cognito identity behind an AWS Application Load Balancer
//!
//! The ALB authenticates the user against Cognito and forwards two headers:
//! `x-amzn-oidc-data`, a JWT signed by the ALB itself carrying the user's
//! claims, and `x-amzn-oidc-accesstoken`, the Cognito access token carrying
//! `cognito:groups`. Both must verify.
//!
//! ALB tokens are not strictly JWS compact: segments may carry base64 padding
//! and the header has a non-standard `signer` field. They are therefore
//! verified over the raw `header.payload` bytes rather than through
//! `jsonwebtoken::decode`.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hyper::HeaderMap;
use jsonwebtoken::{decode, decode_header, Validation};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

use super::{extract_groups, Identity, IdentityVerifier, KeySource};
use super::{OIDC_ACCESS_TOKEN_HEADER, OIDC_DATA_HEADER};
use crate::types::{LandscapeError, Result};

/// What a token must match
#[derive(Debug, Clone)]
pub struct CognitoConfig {
    pub region: String,
    pub user_pool_id: String,
    pub client_id: String,
    pub alb_arn: String,
}

impl CognitoConfig {
    /// Issuer claim of tokens minted by the user pool
    pub fn issuer(&self) -> String {
        format!(
            "https://cognito-idp.{}.amazonaws.com/{}",
            self.region, self.user_pool_id
        )
    }
}

#[derive(Debug, Deserialize)]
struct AlbHeader {
    kid: String,
    #[serde(default)]
    signer: Option<String>,
    #[serde(default)]
    client: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlbClaims {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    iss: Option<String>,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct AccessClaims {
    token_use: String,
    client_id: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(rename = "cognito:groups", default)]
    groups: Option<Value>,
}

pub struct CognitoVerifier {
    config: CognitoConfig,
    keys: Arc<dyn KeySource>,
}

impl CognitoVerifier {
    pub fn new(config: CognitoConfig, keys: Arc<dyn KeySource>) -> Self {
        Self { config, keys }
    }

    async fn verify_alb_token(&self, token: &str) -> Result<AlbClaims> {
        let segments: Vec<&str> = token.split('.').collect();
        let &[header_b64, payload_b64, signature_b64] = segments.as_slice() else {
            return Err(LandscapeError::Unauthorized("Malformed ALB token".into()));
        };

        let header: AlbHeader = decode_segment(header_b64)?;
        match header.signer.as_deref() {
            Some(signer) if signer == self.config.alb_arn => {}
            _ => return Err(LandscapeError::Unauthorized("ALB token signer mismatch".into())),
        }
        if let Some(client) = header.client.as_deref() {
            if client != self.config.client_id {
                return Err(LandscapeError::Unauthorized("ALB token client mismatch".into()));
            }
        }

        let key = self.keys.alb_key(&header.kid).await?;
        let message = format!("{}.{}", header_b64, payload_b64);
        let valid = jsonwebtoken::crypto::verify(
            signature_b64.trim_end_matches('='),
            message.as_bytes(),
            &key.key,
            key.algorithm,
        )?;
        if !valid {
            return Err(LandscapeError::Unauthorized("Invalid ALB token signature".into()));
        }

        let claims: AlbClaims = decode_segment(payload_b64)?;
        if claims.exp <= unix_now() {
            return Err(LandscapeError::Unauthorized("ALB token expired".into()));
        }
        if let Some(iss) = claims.iss.as_deref() {
            if iss != self.config.issuer() {
                return Err(LandscapeError::Unauthorized("ALB token issuer mismatch".into()));
            }
        }
        Ok(claims)
    }

    async fn verify_access_token(&self, token: &str) -> Result<AccessClaims> {
        let header = decode_header(token)?;
        let kid = header
            .kid
            .ok_or_else(|| LandscapeError::Unauthorized("Access token has no key id".into()))?;
        let key = self.keys.cognito_key(&kid).await?;

        let mut validation = Validation::new(key.algorithm);
        validation.set_issuer(&[self.config.issuer()]);
        // Access tokens carry client_id instead of aud
        validation.validate_aud = false;

        let claims = decode::<AccessClaims>(token, &key.key, &validation)?.claims;
        if claims.token_use != "access" {
            return Err(LandscapeError::Unauthorized(format!(
                "Expected an access token, got {}",
                claims.token_use
            )));
        }
        if claims.client_id != self.config.client_id {
            return Err(LandscapeError::Unauthorized("Access token client mismatch".into()));
        }
        Ok(claims)
    }
}

#[async_trait]
impl IdentityVerifier for CognitoVerifier {
    async fn verify(&self, headers: &HeaderMap) -> Result<Identity> {
        let (Some(data), Some(access)) = (
            header_str(headers, OIDC_DATA_HEADER),
            header_str(headers, OIDC_ACCESS_TOKEN_HEADER),
        ) else {
            return Err(LandscapeError::Unauthorized(
                "Missing authentication tokens".into(),
            ));
        };

        let user = self.verify_alb_token(data).await.map_err(|e| {
            warn!(error = %e, "ALB token rejected");
            e
        })?;
        let access = self.verify_access_token(access).await.map_err(|e| {
            warn!(error = %e, "Access token rejected");
            e
        })?;

        let email = user
            .email
            .or(user.username)
            .or(access.username)
            .unwrap_or_default();
        Ok(Identity::new(email, extract_groups(access.groups.as_ref())))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn decode_segment<T: DeserializeOwned>(segment: &str) -> Result<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| LandscapeError::Unauthorized(format!("Malformed token segment: {}", e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| LandscapeError::Unauthorized(format!("Malformed token segment: {}", e)))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
