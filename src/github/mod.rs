//! GitHub API access
//!
//! Organisation-level Copilot data is read with a GitHub App installation
//! token; team membership is read with the signed-in user's OAuth token.

pub mod client;

pub use client::{GitHubClient, GitHubConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::Result;

/// GitHub REST API version header value
pub const API_VERSION: &str = "2022-11-28";

/// Seats requested per page; a shorter page is the last one
pub const SEATS_PAGE_SIZE: usize = 100;

/// The subset of a team exposed to the frontend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSummary {
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub url: Option<String>,
}

#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// Organisation Copilot metrics
    async fn org_copilot_metrics(&self) -> Result<Value>;

    /// Every Copilot seat in the organisation
    async fn copilot_seats(&self) -> Result<Vec<Value>>;

    /// Copilot metrics for one team
    async fn team_copilot_metrics(&self, team_slug: &str) -> Result<Value>;

    /// Teams the token's user belongs to
    async fn user_teams(&self, user_token: &str) -> Result<Vec<TeamSummary>>;

    /// Where to send the browser to start the OAuth flow
    fn authorize_url(&self, state: &str) -> Result<String>;

    /// Exchange an OAuth code for a user access token
    async fn exchange_code(&self, code: &str) -> Result<String>;
}

/// Team slugs are lowercase alphanumerics, dashes and underscores
pub fn is_valid_team_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= 100
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_slug_validation() {
        assert!(is_valid_team_slug("keh-dev"));
        assert!(is_valid_team_slug("team_1"));
        assert!(!is_valid_team_slug(""));
        assert!(!is_valid_team_slug("../admin"));
        assert!(!is_valid_team_slug("a b"));
    }
}
