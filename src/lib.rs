//! Landscape - Digital Landscape backend
//!
//! HTTP API over a handful of JSON documents in object storage and the
//! GitHub REST API.
//!
//! ## Services
//!
//! - **Tech radar**: public radar document, validated admin and reviewer edits
//! - **Repositories**: repository and language statistics
//! - **Projects**: flattened project inventory
//! - **Banners**: site-wide banner messages
//! - **Copilot**: live and historic Copilot usage, team views
//! - **Address book**: GitHub username and email resolution

pub mod auth;
pub mod cache;
pub mod config;
pub mod github;
pub mod logging;
pub mod radar;
pub mod routes;
pub mod server;
pub mod services;
pub mod storage;
pub mod types;

pub use config::Args;
pub use server::{route, run, AppState};
pub use types::{LandscapeError, Result};
