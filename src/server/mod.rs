//! HTTP server and shared application state

pub mod http;
pub mod rate_limit;

pub use http::{route, run};
pub use rate_limit::{RateLimiter, RouteGroup};

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::auth::{CognitoConfig, CognitoVerifier, DevVerifier, HttpKeySource, IdentityVerifier};
use crate::cache::{Clock, SystemClock};
use crate::config::{Args, StorageBackend};
use crate::github::{GitHubApi, GitHubClient, GitHubConfig};
use crate::logging::AuditLogger;
use crate::radar::{ReconcileOptions, TechRadarService};
use crate::services::{
    AddressBookService, AlertConfig, AlertService, BannerService, CopilotService, ProjectService,
    RepositoryService, TechnologyService,
};
use crate::storage::{Buckets, DocumentGateway, LocalStore, MemoryStore, ObjectStore, S3Store};
use crate::types::{LandscapeError, Result};

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub documents: DocumentGateway,
    pub radar: TechRadarService,
    pub banners: BannerService,
    pub repositories: RepositoryService,
    pub projects: ProjectService,
    pub technology: TechnologyService,
    pub address_book: AddressBookService,
    pub alerts: AlertService,
    pub copilot: CopilotService,
    /// Turns request headers into identities
    pub verifier: Arc<dyn IdentityVerifier>,
    pub github: Arc<dyn GitHubApi>,
    pub rate_limiter: Arc<RateLimiter>,
    pub audit: AuditLogger,
    pub started_at: Instant,
}

impl AppState {
    /// Build state from configuration, choosing backends and verifier
    pub fn new(args: Args) -> Result<Self> {
        let timeout = args.request_timeout();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let store: Arc<dyn ObjectStore> = match args.storage.storage_backend {
            StorageBackend::S3 => {
                info!("Object storage: S3-compatible endpoint {}", args.storage.s3_endpoint);
                Arc::new(
                    S3Store::new(args.storage.s3_endpoint.clone(), timeout)
                        .with_bearer_token(args.storage.s3_token.clone()),
                )
            }
            StorageBackend::Local => {
                info!("Object storage: local directory {}", args.storage.local_storage_root.display());
                Arc::new(LocalStore::new(args.storage.local_storage_root.clone()))
            }
            StorageBackend::Memory => {
                warn!("Object storage: in-memory, documents are lost on restart");
                Arc::new(MemoryStore::new())
            }
        };

        let verifier: Arc<dyn IdentityVerifier> = if args.dev_mode {
            warn!("Development mode enabled - authentication disabled");
            Arc::new(DevVerifier)
        } else {
            let cognito = &args.cognito;
            let (Some(user_pool_id), Some(client_id), Some(alb_arn)) = (
                cognito.cognito_user_pool_id.clone(),
                cognito.cognito_client_id.clone(),
                cognito.alb_arn.clone(),
            ) else {
                return Err(LandscapeError::Config(
                    "Cognito user pool, client id and ALB ARN are required".into(),
                ));
            };
            let keys = Arc::new(HttpKeySource::new(
                args.aws_region.clone(),
                user_pool_id.clone(),
                timeout,
            ));
            Arc::new(CognitoVerifier::new(
                CognitoConfig {
                    region: args.aws_region.clone(),
                    user_pool_id,
                    client_id,
                    alb_arn,
                },
                keys,
            ))
        };

        let github: Arc<dyn GitHubApi> = Arc::new(GitHubClient::new(
            GitHubConfig::from(&args.github),
            timeout,
            Arc::clone(&clock),
        )?);

        Ok(Self::with_components(args, store, verifier, github, clock))
    }

    /// Assemble state around explicit components
    pub fn with_components(
        args: Args,
        store: Arc<dyn ObjectStore>,
        verifier: Arc<dyn IdentityVerifier>,
        github: Arc<dyn GitHubApi>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let documents = DocumentGateway::new(store, Buckets::from(&args.storage));
        let options = ReconcileOptions {
            require_non_empty_timeline: args.radar_require_timeline,
        };
        let alerts = AlertService::new(AlertConfig::from_args(&args.alerts), args.request_timeout());
        let copilot = CopilotService::new(
            documents.clone(),
            Arc::clone(&clock),
            Duration::from_secs(args.teams_history_ttl_secs),
        );

        Self {
            radar: TechRadarService::new(documents.clone(), options, args.radar_write_attempts),
            banners: BannerService::new(documents.clone()),
            repositories: RepositoryService::new(documents.clone()),
            projects: ProjectService::new(documents.clone()),
            technology: TechnologyService::new(documents.clone()),
            address_book: AddressBookService::new(documents.clone()),
            alerts,
            copilot,
            verifier,
            github,
            rate_limiter: Arc::new(RateLimiter::new(args.rate_limit_per_minute, clock)),
            audit: AuditLogger::new(),
            started_at: Instant::now(),
            documents,
            args,
        }
    }
}
