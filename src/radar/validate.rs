//! Incoming entry validation
//!
//! Every way a batch can be rejected is a variant of [`ValidationError`],
//! [`EntryFault`] or [`TimelineFault`]. A batch is accepted or rejected as a
//! whole; on success each raw entry becomes an [`EntryPatch`].

use serde_json::{Map, Value};
use std::fmt;

use super::model::{RadarDocument, TimelineEvent};

/// Why a batch was rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid or empty entries data")]
    EmptyBatch,

    #[error("Invalid entry structure: entry {index}{}: {fault}", id_suffix(.id))]
    InvalidEntry {
        index: usize,
        id: Option<String>,
        fault: EntryFault,
    },
}

fn id_suffix(id: &Option<String>) -> String {
    match id {
        Some(id) => format!(" ({:?})", id),
        None => String::new(),
    }
}

/// What is wrong with a single entry
#[derive(Debug, Clone, PartialEq)]
pub enum EntryFault {
    NotAnObject,
    MissingId,
    IdNotString,
    MissingTitle,
    TitleNotString,
    MissingQuadrant,
    QuadrantNotString,
    UnknownQuadrant(String),
    TimelineNotArray,
    EmptyTimeline,
    OptionalNotString(&'static str),
    LinksNotArray,
    Timeline { position: usize, fault: TimelineFault },
}

impl fmt::Display for EntryFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "entry is not an object"),
            Self::MissingId => write!(f, "id is required"),
            Self::IdNotString => write!(f, "id must be a string"),
            Self::MissingTitle => write!(f, "title is required"),
            Self::TitleNotString => write!(f, "title must be a string"),
            Self::MissingQuadrant => write!(f, "quadrant is required"),
            Self::QuadrantNotString => write!(f, "quadrant must be a string"),
            Self::UnknownQuadrant(q) => write!(f, "quadrant {:?} is not a known quadrant", q),
            Self::TimelineNotArray => write!(f, "timeline must be an array"),
            Self::EmptyTimeline => write!(f, "timeline must not be empty"),
            Self::OptionalNotString(field) => write!(f, "{} must be a string", field),
            Self::LinksNotArray => write!(f, "links must be an array"),
            Self::Timeline { position, fault } => {
                write!(f, "timeline[{}]: {}", position, fault)
            }
        }
    }
}

/// What is wrong with a timeline element
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineFault {
    NotAnObject,
    MovedNotNumber,
    RingIdNotString,
    UnknownRing(String),
    DateNotString,
    DescriptionNotString,
    OptionalNotString(&'static str),
}

impl fmt::Display for TimelineFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "event is not an object"),
            Self::MovedNotNumber => write!(f, "moved must be a number"),
            Self::RingIdNotString => write!(f, "ringId must be a string"),
            Self::UnknownRing(r) => write!(f, "ringId {:?} is not a known ring", r),
            Self::DateNotString => write!(f, "date must be a string"),
            Self::DescriptionNotString => write!(f, "description must be a string"),
            Self::OptionalNotString(field) => write!(f, "{} must be a string", field),
        }
    }
}

/// Validation switches
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    /// Reject entries with an empty timeline
    pub require_non_empty_timeline: bool,
}

/// Change to one optional field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldPatch<T> {
    /// Key not present: keep the stored value
    Absent,
    /// Explicit `null`: remove the stored value
    Clear,
    Set(T),
}

impl<T> FieldPatch<T> {
    pub fn apply(self, slot: &mut Option<T>) {
        match self {
            Self::Absent => {}
            Self::Clear => *slot = None,
            Self::Set(v) => *slot = Some(v),
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Set(v) => Some(v),
            Self::Absent | Self::Clear => None,
        }
    }
}

/// A validated incoming entry
#[derive(Debug, Clone, PartialEq)]
pub struct EntryPatch {
    pub id: String,
    pub title: String,
    pub quadrant: String,
    pub description: FieldPatch<String>,
    pub key: FieldPatch<String>,
    pub url: FieldPatch<String>,
    pub links: FieldPatch<Vec<Value>>,
    pub timeline: Vec<TimelineEvent>,
    /// Fields outside the known schema, copied verbatim
    pub extra: Map<String, Value>,
}

const KNOWN_ENTRY_FIELDS: [&str; 8] = [
    "id",
    "title",
    "quadrant",
    "description",
    "key",
    "url",
    "links",
    "timeline",
];

/// Validate a whole batch against the document's vocabulary
pub fn validate_batch(
    document: &RadarDocument,
    incoming: Option<&Value>,
    options: ReconcileOptions,
) -> Result<Vec<EntryPatch>, ValidationError> {
    let entries = match incoming {
        Some(Value::Array(entries)) if !entries.is_empty() => entries,
        _ => return Err(ValidationError::EmptyBatch),
    };

    entries
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            validate_entry(document, raw, options).map_err(|fault| {
                ValidationError::InvalidEntry {
                    index,
                    id: raw.get("id").and_then(Value::as_str).map(str::to_string),
                    fault,
                }
            })
        })
        .collect()
}

/// Validate one raw entry
pub fn validate_entry(
    document: &RadarDocument,
    raw: &Value,
    options: ReconcileOptions,
) -> Result<EntryPatch, EntryFault> {
    let obj = raw.as_object().ok_or(EntryFault::NotAnObject)?;

    let id = required_string(obj, "id", EntryFault::MissingId, EntryFault::IdNotString)?;
    let title = required_string(obj, "title", EntryFault::MissingTitle, EntryFault::TitleNotString)?;
    let quadrant = required_string(
        obj,
        "quadrant",
        EntryFault::MissingQuadrant,
        EntryFault::QuadrantNotString,
    )?;
    if !document.is_known_quadrant(&quadrant) {
        return Err(EntryFault::UnknownQuadrant(quadrant));
    }

    let raw_timeline = match obj.get("timeline") {
        Some(Value::Array(events)) => events,
        _ => return Err(EntryFault::TimelineNotArray),
    };
    if options.require_non_empty_timeline && raw_timeline.is_empty() {
        return Err(EntryFault::EmptyTimeline);
    }
    let timeline = raw_timeline
        .iter()
        .enumerate()
        .map(|(position, event)| {
            validate_event(document, event)
                .map_err(|fault| EntryFault::Timeline { position, fault })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let description = optional_string(obj, "description")?;
    let key = optional_string(obj, "key")?;
    let url = optional_string(obj, "url")?;
    let links = match obj.get("links") {
        None => FieldPatch::Absent,
        Some(Value::Null) => FieldPatch::Clear,
        Some(Value::Array(links)) => FieldPatch::Set(links.clone()),
        Some(_) => return Err(EntryFault::LinksNotArray),
    };

    let extra = obj
        .iter()
        .filter(|(k, _)| !KNOWN_ENTRY_FIELDS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Ok(EntryPatch {
        id,
        title,
        quadrant,
        description,
        key,
        url,
        links,
        timeline,
        extra,
    })
}

fn validate_event(document: &RadarDocument, raw: &Value) -> Result<TimelineEvent, TimelineFault> {
    let obj = raw.as_object().ok_or(TimelineFault::NotAnObject)?;

    let moved = match obj.get("moved") {
        Some(Value::Number(n)) => n.clone(),
        _ => return Err(TimelineFault::MovedNotNumber),
    };
    let ring_id = match obj.get("ringId") {
        Some(Value::String(r)) => r.clone(),
        _ => return Err(TimelineFault::RingIdNotString),
    };
    if !document.is_known_ring(&ring_id) {
        return Err(TimelineFault::UnknownRing(ring_id));
    }
    let date = match obj.get("date") {
        Some(Value::String(d)) => d.clone(),
        _ => return Err(TimelineFault::DateNotString),
    };
    let description = match obj.get("description") {
        Some(Value::String(d)) => d.clone(),
        _ => return Err(TimelineFault::DescriptionNotString),
    };
    let author = optional_event_string(obj, "author")?;
    let directorate = optional_event_string(obj, "directorate")?;

    let extra = obj
        .iter()
        .filter(|(k, _)| {
            !matches!(
                k.as_str(),
                "moved" | "ringId" | "date" | "description" | "author" | "directorate"
            )
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Ok(TimelineEvent {
        moved,
        ring_id,
        date,
        description,
        author,
        directorate,
        extra,
    })
}

fn required_string(
    obj: &Map<String, Value>,
    field: &str,
    missing: EntryFault,
    wrong_type: EntryFault,
) -> Result<String, EntryFault> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(missing),
        Some(Value::String(s)) if s.is_empty() => Err(missing),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(wrong_type),
    }
}

fn optional_string(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<FieldPatch<String>, EntryFault> {
    match obj.get(field) {
        None => Ok(FieldPatch::Absent),
        Some(Value::Null) => Ok(FieldPatch::Clear),
        Some(Value::String(s)) => Ok(FieldPatch::Set(s.clone())),
        Some(_) => Err(EntryFault::OptionalNotString(field)),
    }
}

fn optional_event_string(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, TimelineFault> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(TimelineFault::OptionalNotString(field)),
    }
}
