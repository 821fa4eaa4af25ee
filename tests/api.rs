//! End-to-end tests driving the router with an in-memory object store

use async_trait::async_trait;
use bytes::Bytes;
use clap::Parser;
use http_body_util::{BodyExt, Full};
use hyper::header::{self, HeaderMap};
use hyper::{Method, Response, StatusCode};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;

use landscape::auth::{Identity, IdentityVerifier};
use landscape::cache::ManualClock;
use landscape::github::{GitHubApi, TeamSummary};
use landscape::routes::ApiRequest;
use landscape::storage::{MemoryStore, ObjectStore, PutCondition, StoredObject};
use landscape::{route, AppState, Args, LandscapeError, Result};

const MAIN: &str = "sdp-dev-digital-landscape";
const TAT: &str = "sdp-dev-tech-audit-tool-api";
const COPILOT: &str = "sdp-dev-copilot-usage-dashboard";
const RADAR_KEY: &str = "onsRadarSkeleton.json";

/// Grants a fixed identity; `None` rejects every request
struct StaticVerifier(Option<Identity>);

#[async_trait]
impl IdentityVerifier for StaticVerifier {
    async fn verify(&self, _headers: &HeaderMap) -> Result<Identity> {
        self.0
            .clone()
            .ok_or_else(|| LandscapeError::Unauthorized("No valid session".into()))
    }
}

struct FakeGitHub;

#[async_trait]
impl GitHubApi for FakeGitHub {
    async fn org_copilot_metrics(&self) -> Result<Value> {
        Ok(json!([{"date": "2024-06-01", "total_active_users": 12}]))
    }
    async fn copilot_seats(&self) -> Result<Vec<Value>> {
        Ok(vec![json!({"assignee": {"login": "octocat"}})])
    }
    async fn team_copilot_metrics(&self, team_slug: &str) -> Result<Value> {
        Ok(json!([{"team": team_slug}]))
    }
    async fn user_teams(&self, user_token: &str) -> Result<Vec<TeamSummary>> {
        if user_token != "gho_valid" {
            return Err(LandscapeError::Unauthorized("Bad credentials".into()));
        }
        Ok(vec![TeamSummary {
            slug: "keh-dev".into(),
            name: "KEH Dev".into(),
            description: None,
            url: None,
        }])
    }
    fn authorize_url(&self, state: &str) -> Result<String> {
        Ok(format!("https://github.com/login/oauth/authorize?state={}", state))
    }
    async fn exchange_code(&self, code: &str) -> Result<String> {
        if code == "good-code" {
            Ok("gho_valid".into())
        } else {
            Err(LandscapeError::Unauthorized("bad_verification_code".into()))
        }
    }
}

/// Loses every conditional write, as if another writer always got there first
struct ContendedStore(Arc<MemoryStore>);

#[async_trait]
impl ObjectStore for ContendedStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject> {
        self.0.get_object(bucket, key).await
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
        condition: PutCondition,
    ) -> Result<String> {
        match condition {
            PutCondition::None => self.0.put_object(bucket, key, body, content_type, condition).await,
            _ => Err(LandscapeError::Conflict(format!("{}/{} changed since it was read", bucket, key))),
        }
    }

    fn name(&self) -> &'static str {
        "contended"
    }
}

fn args(extra: &[&str]) -> Args {
    let mut argv = vec!["landscape", "--dev-mode", "--storage-backend", "memory"];
    argv.extend_from_slice(extra);
    Args::parse_from(argv)
}

fn state_with(groups: Option<&[&str]>, extra_args: &[&str]) -> (Arc<MemoryStore>, AppState) {
    let store = Arc::new(MemoryStore::new());
    let identity = groups.map(|g| {
        Identity::new("jane.doe@ons.gov.uk", g.iter().map(|s| s.to_string()).collect())
    });
    let state = AppState::with_components(
        args(extra_args),
        store.clone(),
        Arc::new(StaticVerifier(identity)),
        Arc::new(FakeGitHub),
        Arc::new(ManualClock::new()),
    );
    (store, state)
}

fn seed_radar(store: &MemoryStore) {
    let doc = json!({
        "title": "ONS Tech Radar",
        "quadrants": [{"id": "1", "name": "Languages"}, {"id": "2", "name": "Frameworks"}],
        "rings": [{"id": "adopt", "name": "ADOPT"}],
        "entries": []
    });
    store.insert(MAIN, RADAR_KEY, serde_json::to_vec_pretty(&doc).unwrap());
}

fn entry(id: &str, title: &str, quadrant: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "quadrant": quadrant,
        "timeline": [{"moved": 0, "ringId": "review", "date": "2024-05", "description": "Proposed"}]
    })
}

fn get(path: &str) -> ApiRequest {
    ApiRequest::new(Method::GET, path, SocketAddr::from(([127, 0, 0, 1], 5001)))
}

fn post(path: &str, body: Value) -> ApiRequest {
    ApiRequest::new(Method::POST, path, SocketAddr::from(([127, 0, 0, 1], 5001)))
        .with_body(body.to_string())
}

async fn body_json(resp: Response<Full<Bytes>>) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_radar_update_inserts_single_entry() {
    let (store, state) = state_with(Some(&["admin"]), &[]);
    seed_radar(&store);

    let resp = route(
        &state,
        post("/admin/api/tech-radar/update", json!({"entries": [entry("a", "Alpha", "1")]})),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["message"], "Tech radar updated successfully");

    let resp = route(&state, get("/api/tech-radar/json")).await;
    let doc = body_json(resp).await;
    let entries = doc["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["id"], "a");
    assert_eq!(doc["title"], "ONS Tech Radar");
}

#[tokio::test]
async fn test_unknown_quadrant_leaves_document_untouched() {
    let (store, state) = state_with(Some(&["admin"]), &[]);
    seed_radar(&store);
    let before = store.raw(MAIN, RADAR_KEY).unwrap();

    let resp = route(
        &state,
        post("/admin/api/tech-radar/update", json!({"entries": [entry("a", "Alpha", "99")]})),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(resp).await["error"].as_str().unwrap().contains("Invalid entry structure"));
    assert_eq!(store.raw(MAIN, RADAR_KEY).unwrap(), before);
}

#[tokio::test]
async fn test_duplicate_ids_last_one_wins() {
    let (store, state) = state_with(Some(&["admin"]), &[]);
    seed_radar(&store);

    let batch = json!({"entries": [entry("a", "First", "1"), entry("a", "Second", "2")]});
    let resp = route(&state, post("/admin/api/tech-radar/update", batch)).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let doc: Value = serde_json::from_slice(&store.raw(MAIN, RADAR_KEY).unwrap()).unwrap();
    let entries = doc["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["title"], "Second");
    assert_eq!(entries[0]["quadrant"], "2");
}

#[tokio::test]
async fn test_review_update_reports_payload_size() {
    let (store, state) = state_with(Some(&["reviewer"]), &[]);
    seed_radar(&store);

    let body = json!({"entries": [entry("b", "Beta", "2"), entry("a", "Alpha", "1")]});
    let size = body.to_string().len();
    let resp = route(&state, post("/review/api/tech-radar/update", body)).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let value = body_json(resp).await;
    assert_eq!(value["entriesProcessed"], 2);
    assert_eq!(value["payloadSize"], size);

    let doc: Value = serde_json::from_slice(&store.raw(MAIN, RADAR_KEY).unwrap()).unwrap();
    let ids: Vec<&str> = doc["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[tokio::test]
async fn test_review_errors_carry_type_and_suggestion() {
    let (store, state) = state_with(Some(&["reviewer"]), &[]);
    seed_radar(&store);

    let resp = route(&state, post("/review/api/tech-radar/update", json!({"entries": []}))).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let value = body_json(resp).await;
    assert_eq!(value["type"], "VALIDATION_ERROR");
    assert!(value["suggestion"].is_string());
    assert_eq!(value["error"], "Invalid or empty entries data");
}

#[tokio::test]
async fn test_roles_are_enforced() {
    let (store, state) = state_with(Some(&["reviewer"]), &[]);
    seed_radar(&store);

    let resp = route(
        &state,
        post("/admin/api/tech-radar/update", json!({"entries": [entry("a", "Alpha", "1")]})),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(resp).await["message"], "Admin access required");

    let (_store, state) = state_with(None, &[]);
    let resp = route(&state, get("/admin/api/banners")).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let value = body_json(resp).await;
    assert_eq!(value["message"], "Unauthorized");
    assert_eq!(value["error"], "No valid session");
}

#[tokio::test]
async fn test_banner_lifecycle() {
    let (_store, state) = state_with(Some(&["admin"]), &[]);

    let resp = route(&state, get("/api/banners")).await;
    assert_eq!(body_json(resp).await["messages"], json!([]));

    let banner = json!({"banner": {"title": "Maintenance", "message": "Down at 6pm", "pages": ["radar"]}});
    let resp = route(&state, post("/admin/api/banners/update", banner)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["message"], "Banner added successfully");

    let resp = route(&state, post("/admin/api/banners/toggle", json!({"index": 0, "show": false}))).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let active = body_json(route(&state, get("/api/banners")).await).await;
    assert_eq!(active["messages"], json!([]));
    let all = body_json(route(&state, get("/api/banners/all")).await).await;
    assert_eq!(all["messages"][0]["title"], "Maintenance");
    assert_eq!(all["messages"][0]["type"], "info");

    let resp = route(&state, post("/admin/api/banners/delete", json!({"index": 3}))).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let resp = route(&state, post("/admin/api/banners/delete", json!({"index": 0}))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let all = body_json(route(&state, get("/api/banners/all")).await).await;
    assert_eq!(all["messages"], json!([]));
}

#[tokio::test]
async fn test_repository_statistics_with_filters() {
    let (store, state) = state_with(None, &[]);
    store.insert(
        MAIN,
        "repositories.json",
        json!({
            "repositories": [
                {"name": "alpha", "visibility": "PUBLIC", "is_archived": false,
                 "last_commit": "2024-06-01T10:00:00Z",
                 "technologies": {"languages": [{"name": "Rust", "percentage": 80.0, "size": 800}]}},
                {"name": "beta", "visibility": "PRIVATE", "is_archived": true,
                 "last_commit": "2020-01-01T10:00:00Z",
                 "technologies": {"languages": [{"name": "Rust", "percentage": 40.0, "size": 400}]}}
            ],
            "metadata": {"last_updated": "2024-06-02"}
        })
        .to_string(),
    );

    let value = body_json(route(&state, get("/api/json")).await).await;
    assert_eq!(value["stats"]["total_repos"], 2);
    assert_eq!(value["language_statistics"]["Rust"]["repo_count"], 2);
    assert_eq!(value["language_statistics"]["Rust"]["total_size"], 1200);

    let value = body_json(route(&state, get("/api/json?archived=false")).await).await;
    assert_eq!(value["stats"]["total_repos"], 1);
    assert_eq!(value["stats"]["total_public_repos"], 1);

    let resp = route(&state, get("/api/repository/project/json")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let value = body_json(route(&state, get("/api/repository/project/json?repositories=beta")).await).await;
    assert_eq!(value["repositories"][0]["name"], "beta");
    assert_eq!(value["stats"]["total_private_repos"], 1);
}

#[tokio::test]
async fn test_project_records_include_reverse_dependencies() {
    let (store, state) = state_with(None, &[]);
    store.insert(
        TAT,
        "new_project_data.json",
        json!({"projects": [
            {"details": [{"name": "Survey Platform", "short_name": "SP",
                          "project_dependencies": [{"name": "Auth Service"}]}]},
            {"details": [{"name": "Auth Service", "short_name": "AUTH"}]}
        ]})
        .to_string(),
    );

    let resp = route(&state, get("/api/csv")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let rows = body_json(resp).await;
    assert_eq!(rows[0]["Project"], "Survey Platform");
    assert_eq!(rows[1]["Listed_As_Project_Dependency"][0]["name"], "Survey Platform");
}

#[tokio::test]
async fn test_missing_documents_become_500() {
    let (_store, state) = state_with(None, &[]);
    let resp = route(&state, get("/api/tech-radar/json")).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(resp).await["error"], "Failed to fetch tech radar data");
}

#[tokio::test]
async fn test_copilot_routes_need_user_token() {
    let (store, state) = state_with(None, &[]);

    let resp = route(&state, get("/copilot/api/teams")).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await["error"], "Missing GitHub user token");

    let mut headers = HeaderMap::new();
    headers.insert(header::COOKIE, "githubUserToken=gho_valid".parse().unwrap());
    let resp = route(&state, get("/copilot/api/teams").with_headers(headers.clone())).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await[0]["slug"], "keh-dev");

    store.insert(COPILOT, "admin_teams.json", json!(["keh-dev"]).to_string());
    store.insert(COPILOT, "copilot_teams.json", json!([{"slug": "all"}]).to_string());
    let resp = route(&state, get("/copilot/api/teams/admin-status").with_headers(headers)).await;
    let value = body_json(resp).await;
    assert_eq!(value["isAdmin"], true);
    assert_eq!(value["teams"], json!([{"slug": "all"}]));
}

#[tokio::test]
async fn test_oauth_token_sets_cookie() {
    let (_store, state) = state_with(None, &[]);

    let resp = route(&state, get("/copilot/api/github/oauth/login")).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert!(resp.headers()[header::LOCATION]
        .to_str()
        .unwrap()
        .starts_with("https://github.com/login/oauth/authorize"));

    let resp = route(&state, post("/copilot/api/github/oauth/token", json!({"code": "good-code"}))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookies: Vec<&str> = resp
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap())
        .collect();
    assert!(cookies.iter().any(|c| c.starts_with("githubUserToken=gho_valid") && c.contains("HttpOnly")));

    let resp = route(&state, post("/copilot/api/github/oauth/token", json!({"code": "bad"}))).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_teams_history_filtered_by_slug() {
    let (store, state) = state_with(None, &[]);
    store.insert(
        COPILOT,
        "teams_history.json",
        json!([{"team": {"slug": "a"}, "data": 1}, {"team": {"slug": "b"}, "data": 2}]).to_string(),
    );

    let value = body_json(route(&state, get("/copilot/api/teams/history?teamSlug=b")).await).await;
    assert_eq!(value, json!([{"team": {"slug": "b"}, "data": 2}]));
}

#[tokio::test]
async fn test_address_book_resolves_both_directions() {
    let (store, state) = state_with(None, &[]);
    store.insert(MAIN, "addressBookEmailKey.json", json!({"jane.doe@ons.gov.uk": "janedoe"}).to_string());
    store.insert(MAIN, "addressBookUsernameKey.json", json!({"janedoe": "jane.doe@ons.gov.uk"}).to_string());

    let resp = route(&state, get("/addressbook/api/request")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "Missing input");

    let value = body_json(route(&state, get("/addressbook/api/request?q=janedoe")).await).await;
    assert_eq!(value[0]["email"], "jane.doe@ons.gov.uk");
    assert_eq!(value[0]["fullname"], "jane doe");
}

#[tokio::test]
async fn test_normalise_technology_counts_projects() {
    let (store, state) = state_with(Some(&["admin"]), &[]);
    store.insert(
        TAT,
        "new_project_data.json",
        json!({"projects": [
            {"architecture": {"languages": {"main": ["Javascript"], "others": []}}},
            {"architecture": {"languages": {"main": ["Python"], "others": []}}}
        ]})
        .to_string(),
    );

    let resp = route(
        &state,
        post("/admin/api/normalise-technology", json!({"from": "Javascript", "to": "JavaScript"})),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["updatedProjects"], 1);

    let resp = route(&state, post("/admin/api/normalise-technology", json!({"from": ""}))).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_and_preflight() {
    let (_store, state) = state_with(None, &[]);

    let resp = route(&state, get("/api/health")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-health-check"], "true");
    let value = body_json(resp).await;
    assert_eq!(value["status"], "healthy");
    assert!(value["pid"].is_u64());

    let preflight = ApiRequest::new(Method::OPTIONS, "/admin/api/banners", SocketAddr::from(([127, 0, 0, 1], 1)));
    let resp = route(&state, preflight).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(resp.headers()["access-control-allow-methods"], "GET, POST, OPTIONS");

    let resp = route(&state, get("/nope")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_user_info_reports_identity() {
    let (_store, state) = state_with(Some(&["admin"]), &[]);
    let value = body_json(route(&state, get("/user/api/info")).await).await;
    assert_eq!(value["message"], "User information retrieved successfully");
    assert_eq!(value["user"]["email"], "jane.doe@ons.gov.uk");

    let resp = route(&state, get("/user/api/logout")).await;
    let cleared = resp
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter(|v| v.to_str().unwrap().contains("Max-Age=0"))
        .count();
    assert_eq!(cleared, 2);
}

#[tokio::test]
async fn test_radar_write_conflicts_past_retries_become_500() {
    let memory = Arc::new(MemoryStore::new());
    seed_radar(&memory);
    let state = AppState::with_components(
        args(&[]),
        Arc::new(ContendedStore(memory.clone())),
        Arc::new(StaticVerifier(Some(Identity::new(
            "jane.doe@ons.gov.uk",
            vec!["admin".to_string()],
        )))),
        Arc::new(FakeGitHub),
        Arc::new(ManualClock::new()),
    );

    let resp = route(
        &state,
        post("/admin/api/tech-radar/update", json!({"entries": [entry("a", "Alpha", "1")]})),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(resp).await["error"], "Failed to update tech radar");

    let resp = route(&state, get("/api/tech-radar/json")).await;
    assert_eq!(body_json(resp).await["entries"], json!([]));
}
