//! Copilot usage documents and the Copilot admin check
//!
//! Historic usage and per-team history are produced by an offline job into
//! the Copilot bucket. The teams history document is large and changes at
//! most daily, so it is held in a [`TtlCache`].

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::cache::{Clock, TtlCache};
use crate::github::GitHubApi;
use crate::storage::{BucketAlias, DocumentGateway};
use crate::types::Result;

pub const HISTORIC_USAGE_KEY: &str = "historic_usage_data.json";
pub const TEAMS_HISTORY_KEY: &str = "teams_history.json";
pub const ADMIN_TEAMS_KEY: &str = "admin_teams.json";
pub const COPILOT_TEAMS_KEY: &str = "copilot_teams.json";

/// Teams a user can view and whether they administer Copilot reporting
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStatus {
    pub is_admin: bool,
    pub teams: Value,
    pub user_team_slugs: Vec<String>,
}

/// Keep history records whose `team.slug` equals `slug`
pub fn filter_team_history(history: &Value, slug: &str) -> Value {
    match history {
        Value::Array(records) => Value::Array(
            records
                .iter()
                .filter(|r| r.pointer("/team/slug").and_then(Value::as_str) == Some(slug))
                .cloned()
                .collect(),
        ),
        other => other.clone(),
    }
}

pub struct CopilotService {
    documents: DocumentGateway,
    history: Arc<TtlCache<&'static str, Arc<Value>>>,
    history_ttl: Duration,
}

impl CopilotService {
    pub fn new(documents: DocumentGateway, clock: Arc<dyn Clock>, history_ttl: Duration) -> Self {
        Self {
            documents,
            history: Arc::new(TtlCache::new(clock)),
            history_ttl,
        }
    }

    /// Cache behind [`Self::teams_history`]
    pub fn history_cache(&self) -> Arc<TtlCache<&'static str, Arc<Value>>> {
        Arc::clone(&self.history)
    }

    pub async fn historic_usage(&self) -> Result<Value> {
        self.documents
            .get_json(BucketAlias::Copilot, HISTORIC_USAGE_KEY)
            .await
    }

    /// The full teams history, served from cache while fresh
    pub async fn teams_history(&self) -> Result<Arc<Value>> {
        if let Some(cached) = self.history.get(&TEAMS_HISTORY_KEY) {
            info!("Returning teams history from cache");
            return Ok(cached);
        }

        let value: Value = self
            .documents
            .get_json(BucketAlias::Copilot, TEAMS_HISTORY_KEY)
            .await?;
        let value = Arc::new(value);
        self.history
            .insert(TEAMS_HISTORY_KEY, Arc::clone(&value), self.history_ttl);
        info!(
            teams = value.as_array().map(Vec::len).unwrap_or(0),
            "Cached teams history"
        );
        Ok(value)
    }

    /// Teams history, optionally narrowed to one team
    pub async fn team_history(&self, team_slug: Option<&str>) -> Result<Value> {
        let history = self.teams_history().await?;
        Ok(match team_slug {
            Some(slug) => filter_team_history(&history, slug),
            None => (*history).clone(),
        })
    }

    /// Compare the user's teams with the configured admin teams
    pub async fn admin_status(&self, github: &dyn GitHubApi, user_token: &str) -> Result<AdminStatus> {
        let user_teams = github.user_teams(user_token).await?;
        let slugs: Vec<String> = user_teams.iter().map(|t| t.slug.clone()).collect();
        let own_teams = || serde_json::to_value(&user_teams).unwrap_or(Value::Array(Vec::new()));

        let admin_teams: Vec<String> = match self
            .documents
            .get_json(BucketAlias::Copilot, ADMIN_TEAMS_KEY)
            .await
        {
            Ok(teams) => teams,
            Err(e) => {
                warn!(error = %e, "Could not read {}", ADMIN_TEAMS_KEY);
                return Ok(AdminStatus {
                    is_admin: false,
                    teams: own_teams(),
                    user_team_slugs: slugs,
                });
            }
        };

        if !admin_teams.iter().any(|t| slugs.contains(t)) {
            return Ok(AdminStatus {
                is_admin: false,
                teams: own_teams(),
                user_team_slugs: slugs,
            });
        }

        let teams = match self
            .documents
            .get_json::<Value>(BucketAlias::Copilot, COPILOT_TEAMS_KEY)
            .await
        {
            Ok(teams) => teams,
            Err(e) => {
                warn!(error = %e, "Could not read {}, falling back to user teams", COPILOT_TEAMS_KEY);
                own_teams()
            }
        };
        Ok(AdminStatus {
            is_admin: true,
            teams,
            user_team_slugs: slugs,
        })
    }
}
