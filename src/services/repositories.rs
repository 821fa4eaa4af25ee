//! Repository statistics over `repositories.json`

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::storage::{BucketAlias, DocumentGateway};
use crate::types::{LandscapeError, Result};

pub const REPOSITORIES_KEY: &str = "repositories.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryDocument {
    #[serde(default)]
    pub repositories: Vec<Repository>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RepositoryMetadata>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Repository {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_archived: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technologies: Option<Technologies>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Repository {
    fn archived(&self) -> bool {
        self.is_archived.unwrap_or(false)
    }

    fn languages(&self) -> &[LanguageUsage] {
        self.technologies
            .as_ref()
            .and_then(|t| t.languages.as_deref())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Technologies {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub languages: Option<Vec<LanguageUsage>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LanguageUsage {
    pub name: String,
    #[serde(default)]
    pub percentage: f64,
    #[serde(default)]
    pub size: u64,
}

/// Optional narrowing applied before counting
#[derive(Debug, Clone, Default)]
pub struct RepositoryFilter {
    /// Raw `datetime` query value
    pub since: Option<String>,
    /// Raw `archived` query value; only `true` and `false` filter
    pub archived: Option<String>,
}

impl RepositoryFilter {
    /// Parsed `since`, `None` when absent or not a date
    pub fn since_date(&self) -> Option<DateTime<Utc>> {
        self.since.as_deref().and_then(parse_timestamp)
    }

    fn matches(&self, repo: &Repository, since: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        if let Some(since) = since {
            match repo.last_commit.as_deref().and_then(parse_timestamp) {
                Some(commit) if commit >= since && commit <= now => {}
                _ => return false,
            }
        }
        match self.archived.as_deref() {
            Some("true") => repo.archived(),
            Some("false") => !repo.archived(),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepositoryStats {
    pub total_repos: usize,
    pub total_private_repos: usize,
    pub total_public_repos: usize,
    pub total_internal_repos: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LanguageStat {
    pub repo_count: usize,
    pub average_percentage: f64,
    pub total_size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsMetadata {
    pub last_updated: String,
    pub filter_date: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub stats: RepositoryStats,
    pub language_statistics: BTreeMap<String, LanguageStat>,
    pub metadata: StatsMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectMetadata {
    pub last_updated: String,
    pub requested_repos: Vec<String>,
    pub found_repos: Vec<String>,
    pub filter_date: Option<String>,
    pub filter_archived: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectReport {
    pub repositories: Vec<Repository>,
    pub stats: RepositoryStats,
    pub language_statistics: BTreeMap<String, LanguageStat>,
    pub metadata: ProjectMetadata,
}

#[derive(Clone)]
pub struct RepositoryService {
    documents: DocumentGateway,
}

impl RepositoryService {
    pub fn new(documents: DocumentGateway) -> Self {
        Self { documents }
    }

    async fn load(&self) -> Result<RepositoryDocument> {
        self.documents.get_json(BucketAlias::Main, REPOSITORIES_KEY).await
    }

    /// Organisation-wide statistics
    pub async fn stats(&self, filter: &RepositoryFilter) -> Result<StatsReport> {
        let doc = self.load().await?;
        Ok(build_stats(doc, filter, Utc::now()))
    }

    /// Statistics over a comma-separated list of repository names
    pub async fn project_stats(&self, names: Option<&str>, filter: &RepositoryFilter) -> Result<ProjectReport> {
        let requested = parse_repository_names(names)?;
        let doc = self.load().await?;
        Ok(build_project_stats(doc, requested, filter, Utc::now()))
    }
}

/// Split and lowercase the `repositories` query value
pub fn parse_repository_names(raw: Option<&str>) -> Result<Vec<String>> {
    match raw {
        Some(raw) if !raw.is_empty() => Ok(raw
            .split(',')
            .map(|name| name.trim().to_lowercase())
            .collect()),
        _ => Err(LandscapeError::Validation("No repositories specified".into())),
    }
}

pub fn build_stats(doc: RepositoryDocument, filter: &RepositoryFilter, now: DateTime<Utc>) -> StatsReport {
    let since = filter.since_date();
    let repos: Vec<Repository> = doc
        .repositories
        .into_iter()
        .filter(|r| filter.matches(r, since, now))
        .collect();

    StatsReport {
        stats: count_visibility(&repos),
        language_statistics: language_statistics(&repos),
        metadata: StatsMetadata {
            last_updated: last_updated(doc.metadata.as_ref(), now),
            filter_date: since.and(filter.since.clone()),
        },
    }
}

pub fn build_project_stats(
    doc: RepositoryDocument,
    requested: Vec<String>,
    filter: &RepositoryFilter,
    now: DateTime<Utc>,
) -> ProjectReport {
    let since = filter.since_date();
    let repos: Vec<Repository> = doc
        .repositories
        .into_iter()
        .filter(|r| requested.contains(&r.name.to_lowercase()))
        .filter(|r| filter.matches(r, since, now))
        .collect();

    ProjectReport {
        stats: count_visibility(&repos),
        language_statistics: language_statistics(&repos),
        metadata: ProjectMetadata {
            last_updated: last_updated(doc.metadata.as_ref(), now),
            requested_repos: requested,
            found_repos: repos.iter().map(|r| r.name.clone()).collect(),
            filter_date: since.and(filter.since.clone()),
            filter_archived: filter.archived.clone(),
        },
        repositories: repos,
    }
}

fn count_visibility(repos: &[Repository]) -> RepositoryStats {
    let count = |v: &str| {
        repos
            .iter()
            .filter(|r| r.visibility.as_deref() == Some(v))
            .count()
    };
    RepositoryStats {
        total_repos: repos.len(),
        total_private_repos: count("PRIVATE"),
        total_public_repos: count("PUBLIC"),
        total_internal_repos: count("INTERNAL"),
    }
}

fn language_statistics(repos: &[Repository]) -> BTreeMap<String, LanguageStat> {
    let mut totals: BTreeMap<String, (usize, f64, u64)> = BTreeMap::new();
    for lang in repos.iter().flat_map(Repository::languages) {
        let entry = totals.entry(lang.name.clone()).or_default();
        entry.0 += 1;
        entry.1 += lang.percentage;
        entry.2 += lang.size;
    }

    totals
        .into_iter()
        .map(|(name, (count, percentage, size))| {
            let average = percentage / count as f64;
            (
                name,
                LanguageStat {
                    repo_count: count,
                    average_percentage: (average * 1000.0).round() / 1000.0,
                    total_size: size,
                },
            )
        })
        .collect()
}

fn last_updated(metadata: Option<&RepositoryMetadata>, now: DateTime<Utc>) -> String {
    metadata
        .and_then(|m| m.last_updated.clone())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
}

/// Accepts RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS` (read as UTC) or a bare date
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn doc() -> RepositoryDocument {
        serde_json::from_value(json!({
            "repositories": [
                {
                    "name": "Alpha", "visibility": "PUBLIC", "is_archived": false,
                    "last_commit": "2024-06-01T10:00:00Z",
                    "technologies": {"languages": [
                        {"name": "Python", "percentage": 80.0, "size": 800},
                        {"name": "Shell", "percentage": 20.0, "size": 200}
                    ]},
                    "url": "https://github.com/ONSdigital/alpha"
                },
                {
                    "name": "beta", "visibility": "PRIVATE", "is_archived": true,
                    "last_commit": "2023-01-01T00:00:00Z",
                    "technologies": {"languages": [
                        {"name": "Python", "percentage": 33.3333, "size": 100}
                    ]}
                },
                {
                    "name": "gamma", "visibility": "INTERNAL",
                    "last_commit": "not a date"
                }
            ],
            "metadata": {"last_updated": "2024-06-02"}
        }))
        .unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_unfiltered_stats() {
        let report = build_stats(doc(), &RepositoryFilter::default(), now());
        assert_eq!(
            report.stats,
            RepositoryStats {
                total_repos: 3,
                total_private_repos: 1,
                total_public_repos: 1,
                total_internal_repos: 1
            }
        );
        let python = &report.language_statistics["Python"];
        assert_eq!(python.repo_count, 2);
        assert_eq!(python.average_percentage, 56.667);
        assert_eq!(python.total_size, 900);
        assert_eq!(report.metadata.last_updated, "2024-06-02");
        assert!(report.metadata.filter_date.is_none());
    }

    #[test]
    fn test_date_and_archived_filters() {
        let filter = RepositoryFilter {
            since: Some("2024-01-01".into()),
            archived: None,
        };
        let report = build_stats(doc(), &filter, now());
        assert_eq!(report.stats.total_repos, 1);
        assert_eq!(report.metadata.filter_date.as_deref(), Some("2024-01-01"));

        let filter = RepositoryFilter {
            since: None,
            archived: Some("true".into()),
        };
        assert_eq!(build_stats(doc(), &filter, now()).stats.total_repos, 1);

        let filter = RepositoryFilter {
            since: None,
            archived: Some("false".into()),
        };
        assert_eq!(build_stats(doc(), &filter, now()).stats.total_repos, 2);
    }

    #[test]
    fn test_invalid_date_is_ignored() {
        let filter = RepositoryFilter {
            since: Some("yesterday".into()),
            archived: None,
        };
        let report = build_stats(doc(), &filter, now());
        assert_eq!(report.stats.total_repos, 3);
        assert!(report.metadata.filter_date.is_none());
    }

    #[test]
    fn test_project_stats_match_names_case_insensitively() {
        let requested = parse_repository_names(Some("ALPHA, gamma ,missing")).unwrap();
        let report = build_project_stats(doc(), requested, &RepositoryFilter::default(), now());
        assert_eq!(report.metadata.found_repos, vec!["Alpha", "gamma"]);
        assert_eq!(report.metadata.requested_repos, vec!["alpha", "gamma", "missing"]);
        assert_eq!(report.repositories.len(), 2);
        assert_eq!(report.repositories[0].extra["url"], "https://github.com/ONSdigital/alpha");
    }

    #[test]
    fn test_repository_names_required() {
        assert!(parse_repository_names(None).is_err());
        assert_eq!(
            parse_repository_names(Some("")).unwrap_err().to_string(),
            "No repositories specified"
        );
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2024-06-01T10:00:00Z").is_some());
        assert!(parse_timestamp("2024-06-01T10:00:00+01:00").is_some());
        assert!(parse_timestamp("2024-06-01T10:00:00").is_some());
        assert!(parse_timestamp("2024-06-01").is_some());
        assert!(parse_timestamp("June").is_none());
    }
}
