//! Tech radar
//!
//! Document model, batch validation, reconciliation and the persistence
//! cycle around it.

pub mod model;
pub mod reconcile;
pub mod service;
pub mod validate;

pub use model::{Quadrant, RadarDocument, RadarEntry, Ring, TimelineEvent, PSEUDO_RINGS};
pub use reconcile::{reconcile, ReconcileSummary};
pub use service::{TechRadarService, UpdateOutcome, RADAR_KEY};
pub use validate::{
    EntryFault, EntryPatch, FieldPatch, ReconcileOptions, TimelineFault, ValidationError,
};
