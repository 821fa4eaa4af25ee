//! Authentication and role checks
//!
//! Identities come from headers injected by the load balancer (see
//! [`cognito`]); in development mode a fixed identity holding every role is
//! used instead.

pub mod cognito;
pub mod keys;

pub use cognito::{CognitoConfig, CognitoVerifier};
pub use keys::{HttpKeySource, KeySource, VerificationKey};

use async_trait::async_trait;
use hyper::HeaderMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{LandscapeError, Result};

/// Header carrying the ALB-signed user claims
pub const OIDC_DATA_HEADER: &str = "x-amzn-oidc-data";
/// Header carrying the Cognito access token
pub const OIDC_ACCESS_TOKEN_HEADER: &str = "x-amzn-oidc-accesstoken";

/// Email of the development identity
pub const DEV_EMAIL: &str = "dev@ons.gov.uk";

/// Roles granted through group membership
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Reviewer,
}

impl Role {
    /// Group that grants the role
    pub fn group(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Reviewer => "reviewer",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Reviewer => "Reviewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.group())
    }
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub email: String,
    pub groups: Vec<String>,
}

impl Identity {
    pub fn new(email: impl Into<String>, groups: Vec<String>) -> Self {
        Self {
            email: email.into(),
            groups,
        }
    }

    /// The development identity (admin and reviewer)
    pub fn development() -> Self {
        Self::new(
            DEV_EMAIL,
            vec![Role::Admin.group().to_string(), Role::Reviewer.group().to_string()],
        )
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.groups.iter().any(|g| g == role.group())
    }
}

/// Turns request headers into an [`Identity`]
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// `LandscapeError::Unauthorized` when credentials are missing or invalid
    async fn verify(&self, headers: &HeaderMap) -> Result<Identity>;

    /// True when identities are synthetic
    fn is_development(&self) -> bool {
        false
    }
}

/// Always yields [`Identity::development`]
#[derive(Debug, Default, Clone, Copy)]
pub struct DevVerifier;

#[async_trait]
impl IdentityVerifier for DevVerifier {
    async fn verify(&self, _headers: &HeaderMap) -> Result<Identity> {
        Ok(Identity::development())
    }

    fn is_development(&self) -> bool {
        true
    }
}

/// Forbidden unless the identity holds `role`
pub fn require_role(identity: &Identity, role: Role) -> Result<()> {
    if identity.has_role(role) {
        Ok(())
    } else {
        Err(LandscapeError::Forbidden(format!(
            "{} access required",
            role.label()
        )))
    }
}

/// Normalize `cognito:groups`, which arrives as an array or a comma list
pub fn extract_groups(raw: Option<&serde_json::Value>) -> Vec<String> {
    use serde_json::Value;

    match raw {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Extract token from Authorization header (`Bearer <token>`)
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_groups_from_array_or_string() {
        assert_eq!(
            extract_groups(Some(&json!(["admin", "reviewer"]))),
            vec!["admin", "reviewer"]
        );
        assert_eq!(
            extract_groups(Some(&json!("admin, reviewer"))),
            vec!["admin", "reviewer"]
        );
        assert!(extract_groups(Some(&json!(42))).is_empty());
        assert!(extract_groups(None).is_empty());
    }

    #[test]
    fn test_require_role() {
        let reviewer = Identity::new("r@ons.gov.uk", vec!["reviewer".into()]);
        assert!(require_role(&reviewer, Role::Reviewer).is_ok());

        let err = require_role(&reviewer, Role::Admin).unwrap_err();
        assert_eq!(err.to_string(), "Admin access required");
        assert_eq!(err.status_code(), hyper::StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_development_identity_has_every_role() {
        let dev = Identity::development();
        assert_eq!(dev.email, DEV_EMAIL);
        assert!(dev.has_role(Role::Admin));
        assert!(dev.has_role(Role::Reviewer));
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());
        headers.insert("authorization", "Bearer gho_abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("gho_abc"));
        headers.insert("authorization", "Basic xyz".parse().unwrap());
        assert!(bearer_token(&headers).is_none());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        assert_eq!(Role::Reviewer.to_string(), "reviewer");
    }
}
