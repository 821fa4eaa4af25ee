//! Radar entry reconciliation
//!
//! Pure merge of a validated batch onto a document: entries are matched by id,
//! incoming fields overwrite stored ones, absent optional fields are kept and
//! the result is sorted by quadrant number then title.

use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use super::model::{RadarDocument, RadarEntry};
use super::validate::{validate_batch, EntryPatch, ReconcileOptions, ValidationError};

/// Counts describing one reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Entries in the incoming batch
    pub entries_processed: usize,
    pub inserted: usize,
    pub updated: usize,
    /// Entries in the resulting document
    pub total_entries: usize,
}

/// Validate `incoming` against `existing` and merge it in.
///
/// Fails without touching anything when any entry is invalid. Duplicate ids
/// inside the batch are applied in order, so the later one wins.
pub fn reconcile(
    existing: &RadarDocument,
    incoming: Option<&Value>,
    options: ReconcileOptions,
) -> Result<(RadarDocument, ReconcileSummary), ValidationError> {
    let patches = validate_batch(existing, incoming, options)?;
    let entries_processed = patches.len();

    let mut entries: Vec<RadarEntry> = Vec::with_capacity(existing.entries.len() + patches.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for entry in &existing.entries {
        match index.get(&entry.id) {
            Some(&pos) => entries[pos] = entry.clone(),
            None => {
                index.insert(entry.id.clone(), entries.len());
                entries.push(entry.clone());
            }
        }
    }

    let mut inserted = 0;
    let mut updated = 0;
    for patch in patches {
        match index.get(&patch.id) {
            Some(&pos) => {
                merge_into(&mut entries[pos], patch);
                updated += 1;
            }
            None => {
                index.insert(patch.id.clone(), entries.len());
                entries.push(new_entry(patch));
                inserted += 1;
            }
        }
    }

    sort_entries(&mut entries);

    let summary = ReconcileSummary {
        entries_processed,
        inserted,
        updated,
        total_entries: entries.len(),
    };
    let document = RadarDocument {
        quadrants: existing.quadrants.clone(),
        rings: existing.rings.clone(),
        entries,
        extra: existing.extra.clone(),
    };
    Ok((document, summary))
}

fn merge_into(entry: &mut RadarEntry, patch: EntryPatch) {
    entry.title = patch.title;
    entry.quadrant = patch.quadrant;
    entry.timeline = patch.timeline;
    patch.description.apply(&mut entry.description);
    patch.key.apply(&mut entry.key);
    patch.url.apply(&mut entry.url);
    patch.links.apply(&mut entry.links);
    entry.extra.extend(patch.extra);
}

fn new_entry(patch: EntryPatch) -> RadarEntry {
    RadarEntry {
        id: patch.id,
        title: patch.title,
        quadrant: patch.quadrant,
        description: patch.description.into_option(),
        key: patch.key.into_option(),
        url: patch.url.into_option(),
        links: patch.links.into_option(),
        timeline: patch.timeline,
        extra: patch.extra,
    }
}

/// Sort by numeric quadrant, then title; ties fall back to raw quadrant and id
pub fn sort_entries(entries: &mut [RadarEntry]) {
    entries.sort_by(entry_order);
}

fn entry_order(a: &RadarEntry, b: &RadarEntry) -> Ordering {
    compare_quadrants(&a.quadrant, &b.quadrant)
        .then_with(|| compare_titles(&a.title, &b.title))
        .then_with(|| a.quadrant.cmp(&b.quadrant))
        .then_with(|| a.id.cmp(&b.id))
}

/// Leading integer of a quadrant id, the way `"3"`, `" 3"` and `"3a"` all read as 3
pub fn quadrant_number(quadrant: &str) -> Option<i64> {
    let s = quadrant.trim_start();
    let (sign, digits) = match s.as_bytes().first() {
        Some(b'-') => (-1, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (1, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

/// Numeric quadrants ascending; non-numeric quadrants after them
fn compare_quadrants(a: &str, b: &str) -> Ordering {
    match (quadrant_number(a), quadrant_number(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Title collation in three levels: base letters ignoring accents and case,
/// then accents, then case with lowercase first
pub fn compare_titles(a: &str, b: &str) -> Ordering {
    base_letters(a)
        .cmp(base_letters(b))
        .then_with(|| accented_letters(a).cmp(accented_letters(b)))
        .then_with(|| {
            a.nfd()
                .filter(|c| !is_combining_mark(*c))
                .map(char::is_uppercase)
                .cmp(b.nfd().filter(|c| !is_combining_mark(*c)).map(char::is_uppercase))
        })
}

fn base_letters(s: &str) -> impl Iterator<Item = char> + '_ {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
}

fn accented_letters(s: &str) -> impl Iterator<Item = char> + '_ {
    s.nfd().flat_map(char::to_lowercase)
}
