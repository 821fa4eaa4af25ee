//! Technology lists maintained by admins
//!
//! `array_data.json` holds the category -> technology lists offered by the
//! tech audit tool. Renaming a technology rewrites every project in
//! `new_project_data.json` that mentions it.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use super::projects::{is_truthy, PROJECTS_KEY};
use crate::storage::{BucketAlias, DocumentGateway};
use crate::types::{LandscapeError, Result};

pub const ARRAY_DATA_KEY: &str = "array_data.json";

/// List-valued technology fields, as paths from the project root
const TECHNOLOGY_LISTS: [&[&str]; 19] = [
    &["architecture", "languages", "main"],
    &["architecture", "languages", "others"],
    &["architecture", "frameworks", "others"],
    &["architecture", "infrastructure", "others"],
    &["architecture", "cicd", "others"],
    &["architecture", "database", "main"],
    &["architecture", "database", "others"],
    &["supporting_tools", "code_editors", "main"],
    &["supporting_tools", "code_editors", "others"],
    &["supporting_tools", "user_interface", "main"],
    &["supporting_tools", "user_interface", "others"],
    &["supporting_tools", "diagrams", "main"],
    &["supporting_tools", "diagrams", "others"],
    &["supporting_tools", "documentation", "main"],
    &["supporting_tools", "documentation", "others"],
    &["supporting_tools", "communication", "main"],
    &["supporting_tools", "communication", "others"],
    &["supporting_tools", "collaboration", "main"],
    &["supporting_tools", "collaboration", "others"],
];

/// Single-valued technology fields
const TECHNOLOGY_FIELDS: [&[&str]; 2] = [
    &["supporting_tools", "project_tracking"],
    &["supporting_tools", "incident_management"],
];

/// How an array data update is scoped
#[derive(Debug, Clone)]
pub enum ArrayDataUpdate {
    /// Replace the whole document
    AllCategories(Map<String, Value>),
    /// Replace one existing category
    Category { category: String, items: Vec<Value> },
}

impl ArrayDataUpdate {
    /// Interpret an `{allCategories, category, items}` request body
    pub fn from_request(body: &Value) -> Result<Self> {
        let all = body.get("allCategories").is_some_and(is_truthy);
        let items = body.get("items");
        if all {
            return match items {
                Some(Value::Object(map)) => Ok(Self::AllCategories(map.clone())),
                _ => Err(LandscapeError::Validation(
                    "Invalid data format. Complete items object is required for all categories update."
                        .into(),
                )),
            };
        }
        match (body.get("category").and_then(Value::as_str), items) {
            (Some(category), Some(Value::Array(items))) if !category.is_empty() => Ok(Self::Category {
                category: category.to_string(),
                items: items.clone(),
            }),
            _ => Err(LandscapeError::Validation(
                "Invalid data format. Category and items array are required for single category update."
                    .into(),
            )),
        }
    }

    pub fn success_message(&self) -> String {
        match self {
            Self::AllCategories(_) => "All technology lists updated successfully".to_string(),
            Self::Category { category, .. } => {
                format!("Technology list for {} updated successfully", category)
            }
        }
    }
}

/// Result of a rename across the project inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormaliseOutcome {
    pub updated_projects: usize,
}

fn lookup_mut<'a>(root: &'a mut Value, path: &[&str]) -> Option<&'a mut Value> {
    path.iter().try_fold(root, |node, key| node.get_mut(*key))
}

/// Replace the first `from` in a list, or a string equal to `from`
fn replace_in(value: &mut Value, from: &str, to: &str) -> bool {
    match value {
        Value::Array(items) => match items.iter_mut().find(|v| v.as_str() == Some(from)) {
            Some(slot) => {
                *slot = Value::String(to.to_string());
                true
            }
            None => false,
        },
        Value::String(s) if s == from => {
            *s = to.to_string();
            true
        }
        _ => false,
    }
}

/// Rename `from` to `to` in one project; true when anything changed
pub fn rename_in_project(project: &mut Value, from: &str, to: &str) -> bool {
    let mut updated = false;
    for path in TECHNOLOGY_LISTS.iter().chain(TECHNOLOGY_FIELDS.iter()) {
        if let Some(slot) = lookup_mut(project, path) {
            updated |= replace_in(slot, from, to);
        }
    }
    updated
}

#[derive(Clone)]
pub struct TechnologyService {
    documents: DocumentGateway,
}

impl TechnologyService {
    pub fn new(documents: DocumentGateway) -> Self {
        Self { documents }
    }

    pub async fn array_data(&self) -> Result<Value> {
        self.documents.get_json(BucketAlias::Tat, ARRAY_DATA_KEY).await
    }

    /// Apply `update`, returning the written size
    pub async fn update_array_data(&self, update: &ArrayDataUpdate) -> Result<usize> {
        let current: Value = self.array_data().await?;
        let next = match update {
            ArrayDataUpdate::AllCategories(items) => Value::Object(items.clone()),
            ArrayDataUpdate::Category { category, items } => {
                let Value::Object(mut categories) = current else {
                    return Err(LandscapeError::Storage(format!(
                        "{} is not an object",
                        ARRAY_DATA_KEY
                    )));
                };
                let Some(slot) = categories.get_mut(category) else {
                    return Err(LandscapeError::Validation(
                        "Invalid category. The specified category does not exist.".into(),
                    ));
                };
                *slot = Value::Array(items.clone());
                Value::Object(categories)
            }
        };
        self.documents
            .put_json(BucketAlias::Tat, ARRAY_DATA_KEY, &next)
            .await
    }

    /// Rename a technology across every project
    pub async fn normalise(&self, from: &str, to: &str) -> Result<NormaliseOutcome> {
        if from.is_empty() || to.is_empty() {
            return Err(LandscapeError::Validation(
                "Both 'from' and 'to' values are required".into(),
            ));
        }

        let versioned = self
            .documents
            .get_json_versioned::<Value>(BucketAlias::Tat, PROJECTS_KEY)
            .await?;
        let mut doc = versioned.value;

        let Some(projects) = doc.get_mut("projects").and_then(Value::as_array_mut) else {
            return Err(LandscapeError::Storage(format!(
                "{} has no projects list",
                PROJECTS_KEY
            )));
        };
        let updated_projects = projects
            .iter_mut()
            .map(|p| rename_in_project(p, from, to))
            .filter(|changed| *changed)
            .count();

        if updated_projects > 0 {
            self.documents
                .put_json_if_match(BucketAlias::Tat, PROJECTS_KEY, &doc, &versioned.etag)
                .await?;
        }
        info!(from, to, updated_projects, "Technology normalised");
        Ok(NormaliseOutcome { updated_projects })
    }
}
