//! Configuration for the landscape backend
//!
//! CLI arguments and environment variable handling using clap.

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Digital Landscape backend
#[derive(Parser, Debug, Clone)]
#[command(name = "landscape")]
#[command(about = "Tech radar, repository statistics and Copilot usage API")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:5001")]
    pub listen: SocketAddr,

    /// Enable development mode (static admin/reviewer identity, no Cognito)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Timeout for outbound HTTP calls in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,

    /// Maximum accepted request body size in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value = "1048576")]
    pub max_body_bytes: usize,

    /// Requests allowed per client address per route group each minute
    #[arg(long, env = "RATE_LIMIT_PER_MINUTE", default_value = "60")]
    pub rate_limit_per_minute: u32,

    /// How long the teams history document stays cached
    #[arg(long, env = "TEAMS_HISTORY_TTL_SECS", default_value = "3600")]
    pub teams_history_ttl_secs: u64,

    /// Reject radar entries whose timeline is empty
    #[arg(long, env = "RADAR_REQUIRE_TIMELINE", default_value = "false")]
    pub radar_require_timeline: bool,

    /// Read-reconcile-write attempts before a radar update gives up on conflicts
    #[arg(long, env = "RADAR_WRITE_ATTEMPTS", default_value = "3")]
    pub radar_write_attempts: u32,

    /// Append audit events as JSON lines to this file
    #[arg(long, env = "AUDIT_LOG_PATH")]
    pub audit_log_path: Option<PathBuf>,

    /// AWS region used for S3 and Cognito endpoints
    #[arg(long, env = "AWS_REGION", default_value = "eu-west-2")]
    pub aws_region: String,

    /// Object storage configuration
    #[command(flatten)]
    pub storage: StorageArgs,

    /// Cognito / ALB authentication configuration
    #[command(flatten)]
    pub cognito: CognitoArgs,

    /// GitHub configuration
    #[command(flatten)]
    pub github: GitHubArgs,

    /// Alert webhook configuration
    #[command(flatten)]
    pub alerts: AlertArgs,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Object store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    /// S3-compatible HTTP endpoint
    S3,
    /// Directory tree on local disk
    Local,
    /// Process memory (lost on restart)
    Memory,
}

/// Object storage configuration
#[derive(Parser, Debug, Clone)]
pub struct StorageArgs {
    /// Which backend stores the JSON documents
    #[arg(long, env = "STORAGE_BACKEND", value_enum, default_value = "s3")]
    pub storage_backend: StorageBackend,

    /// S3-compatible endpoint (path-style addressing)
    #[arg(
        long,
        env = "S3_ENDPOINT",
        default_value = "https://s3.eu-west-2.amazonaws.com"
    )]
    pub s3_endpoint: String,

    /// Bearer token sent to the S3-compatible endpoint (optional)
    #[arg(long, env = "S3_TOKEN")]
    pub s3_token: Option<String>,

    /// Root directory for the local backend
    #[arg(long, env = "LOCAL_STORAGE_ROOT", default_value = "./data")]
    pub local_storage_root: PathBuf,

    /// Bucket holding the radar, repositories, banners and address book
    #[arg(long, env = "BUCKET_NAME", default_value = "sdp-dev-digital-landscape")]
    pub bucket_name: String,

    /// Bucket holding tech audit tool project data
    #[arg(long, env = "TAT_BUCKET_NAME", default_value = "sdp-dev-tech-audit-tool-api")]
    pub tat_bucket_name: String,

    /// Bucket holding Copilot usage data
    #[arg(
        long,
        env = "COPILOT_BUCKET_NAME",
        default_value = "sdp-dev-copilot-usage-dashboard"
    )]
    pub copilot_bucket_name: String,
}

/// Cognito / ALB authentication configuration
#[derive(Parser, Debug, Clone)]
pub struct CognitoArgs {
    /// Cognito user pool id
    #[arg(long, env = "COGNITO_USER_POOL_ID")]
    pub cognito_user_pool_id: Option<String>,

    /// Cognito app client id
    #[arg(long, env = "COGNITO_CLIENT_ID")]
    pub cognito_client_id: Option<String>,

    /// Cognito hosted UI domain (used to build the logout URL)
    #[arg(long, env = "COGNITO_DOMAIN")]
    pub cognito_domain: Option<String>,

    /// ARN of the load balancer that signs x-amzn-oidc-data
    #[arg(long, env = "ALB_ARN")]
    pub alb_arn: Option<String>,
}

/// GitHub configuration
#[derive(Parser, Debug, Clone)]
pub struct GitHubArgs {
    /// GitHub organisation
    #[arg(long, env = "GITHUB_ORG", default_value = "ONSdigital")]
    pub github_org: String,

    /// GitHub REST API base URL
    #[arg(long, env = "GITHUB_API_URL", default_value = "https://api.github.com")]
    pub github_api_url: String,

    /// GitHub App id
    #[arg(long, env = "GITHUB_APP_ID")]
    pub github_app_id: Option<String>,

    /// GitHub App private key (PEM)
    #[arg(long, env = "GITHUB_APP_PRIVATE_KEY", hide_env_values = true)]
    pub github_app_private_key: Option<String>,

    /// OAuth app client id
    #[arg(long, env = "GITHUB_CLIENT_ID")]
    pub github_client_id: Option<String>,

    /// OAuth app client secret
    #[arg(long, env = "GITHUB_CLIENT_SECRET", hide_env_values = true)]
    pub github_client_secret: Option<String>,

    /// OAuth redirect URI registered with the OAuth app
    #[arg(long, env = "GITHUB_OAUTH_REDIRECT_URI")]
    pub github_oauth_redirect_uri: Option<String>,
}

/// Alert webhook configuration
#[derive(Parser, Debug, Clone)]
pub struct AlertArgs {
    /// Azure AD tenant
    #[arg(long, env = "AZURE_TENANT_ID")]
    pub azure_tenant_id: Option<String>,

    /// Azure AD client id
    #[arg(long, env = "AZURE_CLIENT_ID")]
    pub azure_client_id: Option<String>,

    /// Azure AD client secret
    #[arg(long, env = "AZURE_CLIENT_SECRET", hide_env_values = true)]
    pub azure_client_secret: Option<String>,

    /// OAuth scope requested for the webhook
    #[arg(long, env = "WEBHOOK_SCOPE")]
    pub webhook_scope: Option<String>,

    /// Webhook that receives alerts
    #[arg(long, env = "WEBHOOK_URL")]
    pub webhook_url: Option<String>,
}

impl Args {
    /// Timeout applied to outbound HTTP clients
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            if self.cognito.cognito_user_pool_id.is_none() {
                return Err("COGNITO_USER_POOL_ID is required in production mode".to_string());
            }
            if self.cognito.cognito_client_id.is_none() {
                return Err("COGNITO_CLIENT_ID is required in production mode".to_string());
            }
            if self.cognito.alb_arn.is_none() {
                return Err("ALB_ARN is required in production mode".to_string());
            }
        }

        if self.max_body_bytes == 0 {
            return Err("MAX_BODY_BYTES must be greater than zero".to_string());
        }

        if self.rate_limit_per_minute == 0 {
            return Err("RATE_LIMIT_PER_MINUTE must be greater than zero".to_string());
        }

        if self.radar_write_attempts == 0 {
            return Err("RADAR_WRITE_ATTEMPTS must be at least 1".to_string());
        }

        if self.github.github_app_id.is_some() != self.github.github_app_private_key.is_some() {
            return Err(
                "GITHUB_APP_ID and GITHUB_APP_PRIVATE_KEY must be set together".to_string(),
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["landscape"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_dev_mode_needs_no_cognito() {
        let args = parse(&["--dev-mode", "--storage-backend", "memory"]);
        assert!(args.validate().is_ok());
        assert_eq!(args.storage.storage_backend, StorageBackend::Memory);
    }

    #[test]
    fn test_production_requires_cognito() {
        let args = parse(&["--storage-backend", "memory"]);
        let err = args.validate().unwrap_err();
        assert!(err.contains("COGNITO_USER_POOL_ID"));
    }

    #[test]
    fn test_app_credentials_must_pair() {
        let args = parse(&["--dev-mode", "--github-app-id", "42"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["--dev-mode"]);
        assert_eq!(args.listen.port(), 5001);
        assert_eq!(args.max_body_bytes, 1024 * 1024);
        assert_eq!(args.rate_limit_per_minute, 60);
        assert_eq!(args.teams_history_ttl_secs, 3600);
        assert!(!args.radar_require_timeline);
    }
}
