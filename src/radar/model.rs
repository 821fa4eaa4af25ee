//! Tech radar document model
//!
//! Unknown fields at every level are kept in `extra` so a read-modify-write
//! cycle never drops data this crate does not interpret.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Pseudo-rings accepted in timelines regardless of the document's rings
pub const PSEUDO_RINGS: [&str; 2] = ["review", "ignore"];

/// The persisted radar document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadarDocument {
    #[serde(default)]
    pub quadrants: Vec<Quadrant>,
    #[serde(default)]
    pub rings: Vec<Ring>,
    #[serde(default)]
    pub entries: Vec<RadarEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RadarDocument {
    pub fn is_known_quadrant(&self, id: &str) -> bool {
        self.quadrants.iter().any(|q| q.id == id)
    }

    /// Document rings plus the pseudo-rings
    pub fn is_known_ring(&self, id: &str) -> bool {
        PSEUDO_RINGS.contains(&id) || self.rings.iter().any(|r| r.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quadrant {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ring {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One technology on the radar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadarEntry {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub quadrant: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<Value>>,
    /// Ring history; the last element is the current ring
    #[serde(default)]
    pub timeline: Vec<TimelineEvent>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RadarEntry {
    /// Ring the entry currently sits in
    pub fn current_ring(&self) -> Option<&str> {
        self.timeline.last().map(|event| event.ring_id.as_str())
    }
}

/// A ring movement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// Signed rank delta; integer or float as submitted
    #[serde(default = "zero")]
    pub moved: Number,
    #[serde(rename = "ringId")]
    pub ring_id: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directorate: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn zero() -> Number {
    Number::from(0)
}
