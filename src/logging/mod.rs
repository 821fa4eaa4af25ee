//! Logging infrastructure
//!
//! Structured audit events for edits to stored documents.

pub mod audit;

pub use audit::{AuditAction, AuditEvent, AuditLogger};
