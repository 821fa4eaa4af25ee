//! GitHub REST client

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info};

use super::{is_valid_team_slug, GitHubApi, TeamSummary, API_VERSION, SEATS_PAGE_SIZE};
use crate::cache::{Clock, TtlCache};
use crate::config::GitHubArgs;
use crate::types::{LandscapeError, Result};

const OAUTH_BASE_URL: &str = "https://github.com/login/oauth";
const INSTALLATION_TOKEN_KEY: &str = "installation";
/// Refresh installation tokens this long before GitHub expires them
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Connection settings
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub api_url: String,
    pub org: String,
    pub app_id: Option<String>,
    pub app_private_key: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
}

impl From<&GitHubArgs> for GitHubConfig {
    fn from(args: &GitHubArgs) -> Self {
        Self {
            api_url: args.github_api_url.trim_end_matches('/').to_string(),
            org: args.github_org.clone(),
            app_id: args.github_app_id.clone(),
            app_private_key: args.github_app_private_key.clone(),
            client_id: args.github_client_id.clone(),
            client_secret: args.github_client_secret.clone(),
            redirect_uri: args.github_oauth_redirect_uri.clone(),
        }
    }
}

/// JWT claims identifying the App itself
#[derive(Debug, Serialize)]
struct AppClaims {
    iat: u64,
    exp: u64,
    iss: String,
}

#[derive(Debug, Deserialize)]
struct Installation {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct InstallationToken {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct RawTeam {
    slug: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

pub struct GitHubClient {
    config: GitHubConfig,
    app_key: Option<EncodingKey>,
    http: Client,
    tokens: TtlCache<String, String>,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig, timeout: Duration, clock: Arc<dyn Clock>) -> Result<Self> {
        let app_key = config
            .app_private_key
            .as_deref()
            .map(|pem| EncodingKey::from_rsa_pem(pem.replace("\\n", "\n").as_bytes()))
            .transpose()
            .map_err(|e| LandscapeError::Config(format!("Invalid GitHub App private key: {}", e)))?;

        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("landscape/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Ok(Self {
            config,
            app_key,
            http,
            tokens: TtlCache::new(clock),
        })
    }

    fn api(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url, path)
    }

    fn with_headers(req: RequestBuilder, token: &str) -> RequestBuilder {
        req.bearer_auth(token)
            .header(header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// Short-lived JWT authenticating as the App
    fn app_jwt(&self) -> Result<String> {
        let (Some(app_id), Some(key)) = (self.config.app_id.as_ref(), self.app_key.as_ref()) else {
            return Err(LandscapeError::Config(
                "GitHub App credentials are not configured".into(),
            ));
        };
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| LandscapeError::Internal(format!("System time error: {}", e)))?
            .as_secs();
        // Backdated to absorb clock drift; GitHub caps lifetime at ten minutes
        let claims = AppClaims {
            iat: now.saturating_sub(60),
            exp: now + 540,
            iss: app_id.clone(),
        };
        Ok(encode(&Header::new(Algorithm::RS256), &claims, key)?)
    }

    /// Installation token for the organisation, cached until near expiry
    async fn installation_token(&self) -> Result<String> {
        let cache_key = INSTALLATION_TOKEN_KEY.to_string();
        if let Some(token) = self.tokens.get(&cache_key) {
            return Ok(token);
        }

        let jwt = self.app_jwt()?;
        let installation: Installation = self
            .send_json(Self::with_headers(
                self.http.get(self.api(&format!("/orgs/{}/installation", self.config.org))),
                &jwt,
            ))
            .await?;
        let minted: InstallationToken = self
            .send_json(Self::with_headers(
                self.http.post(self.api(&format!(
                    "/app/installations/{}/access_tokens",
                    installation.id
                ))),
                &jwt,
            ))
            .await?;

        let ttl = minted
            .expires_at
            .and_then(|at| (at - Utc::now()).to_std().ok())
            .map(|left| left.saturating_sub(TOKEN_EXPIRY_MARGIN))
            .unwrap_or(Duration::from_secs(50 * 60));
        info!(
            installation = installation.id,
            ttl_secs = ttl.as_secs(),
            "Minted GitHub installation token"
        );
        self.tokens.insert(cache_key, minted.token.clone(), ttl);
        Ok(minted.token)
    }

    async fn send_json<T: serde::de::DeserializeOwned>(&self, req: RequestBuilder) -> Result<T> {
        let resp = req.send().await?;
        let status = resp.status();
        let url = resp.url().path().to_string();
        if status.is_success() {
            debug!(path = %url, status = status.as_u16(), "GitHub request succeeded");
            return Ok(resp.json().await?);
        }

        let body: Value = resp.json().await.unwrap_or(Value::Null);
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("no message")
            .to_string();
        error!(path = %url, status = status.as_u16(), message = %message, "GitHub request failed");
        match status {
            StatusCode::UNAUTHORIZED => Err(LandscapeError::Unauthorized(format!(
                "GitHub rejected the token: {}",
                message
            ))),
            StatusCode::NOT_FOUND => Err(LandscapeError::NotFound(format!("GitHub {}", url))),
            _ => Err(LandscapeError::GitHub(format!(
                "{} returned {}: {}",
                url, status, message
            ))),
        }
    }
}

#[async_trait]
impl GitHubApi for GitHubClient {
    async fn org_copilot_metrics(&self) -> Result<Value> {
        let token = self.installation_token().await?;
        let url = self.api(&format!("/orgs/{}/copilot/metrics", self.config.org));
        self.send_json(Self::with_headers(self.http.get(url), &token))
            .await
    }

    async fn copilot_seats(&self) -> Result<Vec<Value>> {
        #[derive(Deserialize)]
        struct SeatPage {
            #[serde(default)]
            seats: Vec<Value>,
        }

        let token = self.installation_token().await?;
        let url = self.api(&format!("/orgs/{}/copilot/billing/seats", self.config.org));
        let mut seats = Vec::new();
        let mut page = 1usize;
        loop {
            let req = self
                .http
                .get(&url)
                .query(&[("per_page", SEATS_PAGE_SIZE), ("page", page)]);
            let current: SeatPage = self.send_json(Self::with_headers(req, &token)).await?;
            let fetched = current.seats.len();
            seats.extend(current.seats);
            if fetched < SEATS_PAGE_SIZE {
                break;
            }
            page += 1;
        }
        debug!(seats = seats.len(), pages = page, "Fetched Copilot seats");
        Ok(seats)
    }

    async fn team_copilot_metrics(&self, team_slug: &str) -> Result<Value> {
        if !is_valid_team_slug(team_slug) {
            return Err(LandscapeError::Validation(format!(
                "Invalid team slug: {}",
                team_slug
            )));
        }
        let token = self.installation_token().await?;
        let url = self.api(&format!(
            "/orgs/{}/team/{}/copilot/metrics",
            self.config.org, team_slug
        ));
        self.send_json(Self::with_headers(self.http.get(url), &token))
            .await
    }

    async fn user_teams(&self, user_token: &str) -> Result<Vec<TeamSummary>> {
        let req = self
            .http
            .get(self.api("/user/teams"))
            .query(&[("per_page", SEATS_PAGE_SIZE)]);
        let teams: Vec<RawTeam> = self.send_json(Self::with_headers(req, user_token)).await?;
        Ok(teams
            .into_iter()
            .map(|t| TeamSummary {
                slug: t.slug,
                name: t.name,
                description: t.description,
                url: t.html_url,
            })
            .collect())
    }

    fn authorize_url(&self, state: &str) -> Result<String> {
        let client_id = self
            .config
            .client_id
            .as_deref()
            .ok_or_else(|| LandscapeError::Config("GITHUB_CLIENT_ID is not configured".into()))?;
        let mut url = format!(
            "{}/authorize?client_id={}&scope={}&state={}",
            OAUTH_BASE_URL,
            urlencoding::encode(client_id),
            urlencoding::encode("read:org"),
            urlencoding::encode(state)
        );
        if let Some(redirect) = self.config.redirect_uri.as_deref() {
            url.push_str("&redirect_uri=");
            url.push_str(&urlencoding::encode(redirect));
        }
        Ok(url)
    }

    async fn exchange_code(&self, code: &str) -> Result<String> {
        let (Some(client_id), Some(client_secret)) = (
            self.config.client_id.as_deref(),
            self.config.client_secret.as_deref(),
        ) else {
            return Err(LandscapeError::Config(
                "GitHub OAuth client is not configured".into(),
            ));
        };

        let mut body = serde_json::json!({
            "client_id": client_id,
            "client_secret": client_secret,
            "code": code,
        });
        if let Some(redirect) = self.config.redirect_uri.as_deref() {
            body["redirect_uri"] = Value::String(redirect.to_string());
        }

        let resp: OAuthTokenResponse = self
            .http
            .post(format!("{}/access_token", OAUTH_BASE_URL))
            .header(header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        match resp.access_token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(LandscapeError::Unauthorized(
                resp.error_description
                    .or(resp.error)
                    .unwrap_or_else(|| "OAuth code exchange failed".into()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SystemClock;

    fn config() -> GitHubConfig {
        GitHubConfig {
            api_url: "https://api.github.com".into(),
            org: "ONSdigital".into(),
            app_id: None,
            app_private_key: None,
            client_id: Some("Iv1.abc".into()),
            client_secret: Some("secret".into()),
            redirect_uri: Some("https://landscape.example/callback".into()),
        }
    }

    fn client(config: GitHubConfig) -> GitHubClient {
        GitHubClient::new(config, Duration::from_secs(5), Arc::new(SystemClock)).unwrap()
    }

    #[test]
    fn test_authorize_url_encodes_parameters() {
        let url = client(config()).authorize_url("st ate").unwrap();
        assert!(url.starts_with("https://github.com/login/oauth/authorize?client_id=Iv1.abc"));
        assert!(url.contains("scope=read%3Aorg"));
        assert!(url.contains("state=st%20ate"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Flandscape.example%2Fcallback"));
    }

    #[test]
    fn test_authorize_url_needs_client_id() {
        let mut cfg = config();
        cfg.client_id = None;
        assert!(matches!(
            client(cfg).authorize_url("s"),
            Err(LandscapeError::Config(_))
        ));
    }

    #[test]
    fn test_app_jwt_requires_credentials() {
        assert!(matches!(
            client(config()).app_jwt(),
            Err(LandscapeError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_private_key_is_config_error() {
        let mut cfg = config();
        cfg.app_id = Some("1".into());
        cfg.app_private_key = Some("not a pem".into());
        let result = GitHubClient::new(cfg, Duration::from_secs(5), Arc::new(SystemClock));
        assert!(matches!(result, Err(LandscapeError::Config(_))));
    }

    #[tokio::test]
    async fn test_team_metrics_rejects_bad_slug() {
        let err = client(config())
            .team_copilot_metrics("../secrets")
            .await
            .unwrap_err();
        assert!(matches!(err, LandscapeError::Validation(_)));
    }
}
