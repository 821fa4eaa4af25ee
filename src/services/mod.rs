//! Services layer
//!
//! Document-backed features behind the HTTP routes. Each service owns the
//! object keys it reads and writes.
//!
//! - **Banners**: site banners in `messages.json`
//! - **Repositories**: repository and language statistics
//! - **Projects**: flattened project inventory with reverse dependencies
//! - **Technology**: technology lists and renames across projects
//! - **AddressBook**: username and email resolution
//! - **Alerts**: webhook relay
//! - **Copilot**: historic usage, teams history and the admin check

pub mod address_book;
pub mod alerts;
pub mod banners;
pub mod copilot;
pub mod projects;
pub mod repositories;
pub mod technology;

pub use address_book::{AddressBookEntry, AddressBookService};
pub use alerts::{AlertConfig, AlertService};
pub use banners::{Banner, BannerDocument, BannerService, NewBanner};
pub use copilot::{AdminStatus, CopilotService};
pub use projects::{ProjectRow, ProjectService};
pub use repositories::{RepositoryFilter, RepositoryService};
pub use technology::{ArrayDataUpdate, NormaliseOutcome, TechnologyService};
