//! Alert relay to an Azure AD protected webhook

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

use crate::config::AlertArgs;
use crate::types::{LandscapeError, Result};

const TOKEN_URL_BASE: &str = "https://login.microsoftonline.com";

#[derive(Debug, Clone)]
pub struct AlertConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
    pub webhook_url: String,
}

impl AlertConfig {
    /// `None` unless every setting is present
    pub fn from_args(args: &AlertArgs) -> Option<Self> {
        Some(Self {
            tenant_id: args.azure_tenant_id.clone()?,
            client_id: args.azure_client_id.clone()?,
            client_secret: args.azure_client_secret.clone()?,
            scope: args.webhook_scope.clone()?,
            webhook_url: args.webhook_url.clone()?,
        })
    }

    fn token_url(&self) -> String {
        format!("{}/{}/oauth2/v2.0/token", TOKEN_URL_BASE, self.tenant_id)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error_description: Option<String>,
}

#[derive(Clone)]
pub struct AlertService {
    client: Client,
    config: Option<AlertConfig>,
}

impl AlertService {
    pub fn new(config: Option<AlertConfig>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("landscape/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    fn config(&self) -> Result<&AlertConfig> {
        self.config
            .as_ref()
            .ok_or_else(|| LandscapeError::Config("Alert webhook is not configured".into()))
    }

    async fn access_token(&self, config: &AlertConfig) -> Result<String> {
        let form = [
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("scope", config.scope.as_str()),
            ("grant_type", "client_credentials"),
        ];
        let resp = self.client.post(config.token_url()).form(&form).send().await?;
        let status = resp.status();
        let body: TokenResponse = resp.json().await?;

        match body.access_token {
            Some(token) if status.is_success() => Ok(token),
            _ => {
                let reason = body
                    .error_description
                    .unwrap_or_else(|| "Failed to get access token".to_string());
                error!(%status, "Alert token request failed: {}", reason);
                Err(LandscapeError::Upstream(reason))
            }
        }
    }

    /// Post `payload` to the webhook, returning its response text
    pub async fn send(&self, payload: &Value) -> Result<String> {
        if !payload.is_object() {
            return Err(LandscapeError::Validation(
                "Invalid payload: expected JSON object".into(),
            ));
        }
        let config = self.config()?;
        let token = self.access_token(config).await?;

        let resp = self
            .client
            .post(&config.webhook_url)
            .bearer_auth(token)
            .json(payload)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(LandscapeError::Upstream(if text.is_empty() {
                "Error has occurred during sending an alert message! Please investigate the alert service."
                    .to_string()
            } else {
                text
            }));
        }
        debug!(%status, "Alert delivered");
        Ok(text)
    }
}
