//! Project inventory from the tech audit tool
//!
//! `new_project_data.json` holds one nested record per project. The public
//! CSV view flattens each record into spreadsheet columns and lists, for
//! every project, the other projects that declare it as a dependency.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::storage::{BucketAlias, DocumentGateway};
use crate::types::Result;

pub const PROJECTS_KEY: &str = "new_project_data.json";

const LIST_SEPARATOR: &str = "; ";
const ONS_DOMAINS: [&str; 2] = ["@ons.gov.uk", "@ext.ons.gov.uk"];

/// Known environments in display order
const ENVIRONMENT_LABELS: [(&str, &str); 6] = [
    ("dev", "DEV"),
    ("int", "INT"),
    ("uat", "UAT"),
    ("preprod", "PRE-PROD (STAGING)"),
    ("prod", "PROD"),
    ("postprod", "POST-PROD"),
];

/// Accepts a list, a single string or null
fn string_list<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Value::String(s) if !s.is_empty() => vec![s],
        _ => Vec::new(),
    })
}

/// Accepts a string, treating anything else as absent
fn loose_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) if !s.is_empty() => Some(s),
        _ => None,
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectDocument {
    #[serde(default)]
    pub projects: Vec<Project>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Project {
    pub user: Vec<ProjectUser>,
    pub details: Vec<ProjectDetails>,
    #[serde(deserialize_with = "string_list")]
    pub developed: Vec<String>,
    #[serde(deserialize_with = "loose_string")]
    pub stage: Option<String>,
    pub source_control: Vec<SourceControl>,
    pub architecture: Architecture,
    pub supporting_tools: SupportingTools,
}

impl Project {
    fn details(&self) -> Option<&ProjectDetails> {
        self.details.first()
    }

    /// Name other projects refer to this one by
    fn reference_name(&self) -> String {
        self.details()
            .and_then(|d| d.name.clone().or_else(|| d.short_name.clone()))
            .unwrap_or_default()
    }

    fn contact_with_role(&self, role: &str) -> String {
        self.user
            .iter()
            .find(|u| {
                u.roles.iter().any(|r| r == role)
                    && u.email
                        .as_deref()
                        .is_some_and(|e| ONS_DOMAINS.iter().any(|d| e.contains(d)))
            })
            .map(|u| {
                format!(
                    "{} ({})",
                    u.email.as_deref().unwrap_or_default(),
                    u.grade.as_deref().unwrap_or_default()
                )
            })
            .unwrap_or_default()
    }

    fn developed_label(&self) -> String {
        let Some((who, partners)) = self.developed.split_first() else {
            return String::new();
        };
        let partners: Vec<&str> = partners
            .iter()
            .map(String::as_str)
            .filter(|p| !p.is_empty())
            .collect();
        if partners.is_empty() {
            who.clone()
        } else {
            format!("{} with {}", who, partners.join(", "))
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProjectUser {
    #[serde(deserialize_with = "loose_string")]
    pub email: Option<String>,
    #[serde(deserialize_with = "string_list")]
    pub roles: Vec<String>,
    #[serde(deserialize_with = "loose_string")]
    pub grade: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProjectDetails {
    #[serde(deserialize_with = "loose_string")]
    pub name: Option<String>,
    #[serde(deserialize_with = "loose_string")]
    pub short_name: Option<String>,
    #[serde(deserialize_with = "loose_string")]
    pub programme_name: Option<String>,
    #[serde(deserialize_with = "loose_string")]
    pub programme_short_name: Option<String>,
    #[serde(deserialize_with = "loose_string")]
    pub project_description: Option<String>,
    pub project_dependencies: Vec<ProjectDependency>,
    #[serde(deserialize_with = "string_list")]
    pub documentation_link: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectDependency {
    #[serde(default, deserialize_with = "loose_string", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "loose_string", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourceControl {
    #[serde(rename = "type", deserialize_with = "loose_string")]
    pub kind: Option<String>,
    pub links: Vec<RepoLink>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RepoLink {
    #[serde(deserialize_with = "loose_string")]
    pub url: Option<String>,
}

/// A `{main, others}` technology group
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TechGroup {
    #[serde(deserialize_with = "string_list")]
    pub main: Vec<String>,
    #[serde(deserialize_with = "string_list")]
    pub others: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Hosting {
    #[serde(rename = "type", deserialize_with = "string_list")]
    pub kind: Vec<String>,
    #[serde(deserialize_with = "string_list")]
    pub details: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Architecture {
    pub languages: TechGroup,
    pub frameworks: TechGroup,
    pub hosting: Hosting,
    pub environments: Map<String, Value>,
    pub cicd: TechGroup,
    pub database: TechGroup,
    pub infrastructure: TechGroup,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SupportingTools {
    pub code_editors: TechGroup,
    pub user_interface: TechGroup,
    pub diagrams: TechGroup,
    pub documentation: TechGroup,
    pub communication: TechGroup,
    pub collaboration: TechGroup,
    #[serde(deserialize_with = "loose_string")]
    pub project_tracking: Option<String>,
    #[serde(deserialize_with = "loose_string")]
    pub incident_management: Option<String>,
    pub miscellaneous: Vec<MiscTool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MiscTool {
    #[serde(deserialize_with = "loose_string")]
    pub name: Option<String>,
    #[serde(deserialize_with = "loose_string")]
    pub description: Option<String>,
}

/// A project that lists another as a dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependent {
    pub name: String,
    pub description: String,
}

/// One flattened project
#[derive(Debug, Clone, Serialize)]
pub struct ProjectRow {
    #[serde(rename = "Project")]
    pub project: String,
    #[serde(rename = "Project_Short")]
    pub project_short: String,
    #[serde(rename = "Programme")]
    pub programme: String,
    #[serde(rename = "Programme_Short")]
    pub programme_short: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Stage")]
    pub stage: String,
    #[serde(rename = "Project_Dependencies")]
    pub project_dependencies: Vec<ProjectDependency>,
    #[serde(rename = "Listed_As_Project_Dependency")]
    pub listed_as_project_dependency: Vec<Dependent>,
    #[serde(rename = "Developed")]
    pub developed: String,
    #[serde(rename = "Technical_Contact")]
    pub technical_contact: String,
    #[serde(rename = "Delivery_Manager")]
    pub delivery_manager: String,
    #[serde(rename = "Language_Main")]
    pub language_main: String,
    #[serde(rename = "Language_Others")]
    pub language_others: String,
    #[serde(rename = "Language_Frameworks")]
    pub language_frameworks: String,
    #[serde(rename = "Hosted")]
    pub hosted: String,
    #[serde(rename = "Architectures")]
    pub architectures: String,
    #[serde(rename = "Environments")]
    pub environments: String,
    #[serde(rename = "Source_Control")]
    pub source_control: String,
    #[serde(rename = "Repo")]
    pub repo: String,
    #[serde(rename = "CICD")]
    pub cicd: String,
    #[serde(rename = "Datastores")]
    pub datastores: String,
    #[serde(rename = "Database_Technologies")]
    pub database_technologies: String,
    #[serde(rename = "Project_Tools")]
    pub project_tools: String,
    #[serde(rename = "Documentation")]
    pub documentation: String,
    #[serde(rename = "Infrastructure")]
    pub infrastructure: String,
    #[serde(rename = "Code_Editors")]
    pub code_editors: String,
    #[serde(rename = "Communication")]
    pub communication: String,
    #[serde(rename = "Collaboration")]
    pub collaboration: String,
    #[serde(rename = "Incident_Management")]
    pub incident_management: String,
    #[serde(rename = "Documentation_Tools")]
    pub documentation_tools: String,
    #[serde(rename = "UI_Tools")]
    pub ui_tools: String,
    #[serde(rename = "Diagram_Tools")]
    pub diagram_tools: String,
    #[serde(rename = "Miscellaneous")]
    pub miscellaneous: String,
}

fn joined(items: &[String]) -> String {
    items.join(LIST_SEPARATOR)
}

fn environment_label(key: &str) -> String {
    ENVIRONMENT_LABELS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, label)| label.to_string())
        .unwrap_or_else(|| key.to_uppercase())
}

/// JSON truthiness as the frontends apply it
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Enabled environments, known ones first in lifecycle order
fn environments_label(environments: &Map<String, Value>) -> String {
    let mut keys: Vec<&String> = environments
        .iter()
        .filter(|(_, v)| is_truthy(v))
        .map(|(k, _)| k)
        .collect();
    keys.sort_by_key(|k| {
        ENVIRONMENT_LABELS
            .iter()
            .position(|(known, _)| known == k)
            .unwrap_or(ENVIRONMENT_LABELS.len())
    });
    keys.into_iter()
        .map(|k| environment_label(k))
        .collect::<Vec<_>>()
        .join(LIST_SEPARATOR)
}

/// Project name -> projects that depend on it
pub fn reverse_dependencies(projects: &[Project]) -> HashMap<String, Vec<Dependent>> {
    let mut map: HashMap<String, Vec<Dependent>> = HashMap::new();
    for project in projects {
        let dependent = project.reference_name();
        let Some(details) = project.details() else {
            continue;
        };
        for dependency in &details.project_dependencies {
            if let Some(name) = dependency.name.as_deref() {
                map.entry(name.to_string()).or_default().push(Dependent {
                    name: dependent.clone(),
                    description: dependency.description.clone().unwrap_or_default(),
                });
            }
        }
    }
    map
}

pub fn to_row(project: &Project, dependents: &HashMap<String, Vec<Dependent>>) -> ProjectRow {
    let details = project.details().cloned().unwrap_or_default();
    let arch = &project.architecture;
    let tools = &project.supporting_tools;
    let source = project.source_control.first();

    ProjectRow {
        project: details.name.clone().unwrap_or_default(),
        project_short: details.short_name.clone().unwrap_or_default(),
        programme: details.programme_name.unwrap_or_default(),
        programme_short: details.programme_short_name.unwrap_or_default(),
        description: details.project_description.unwrap_or_default(),
        stage: project.stage.clone().unwrap_or_default(),
        project_dependencies: details.project_dependencies,
        listed_as_project_dependency: dependents
            .get(&project.reference_name())
            .cloned()
            .unwrap_or_default(),
        developed: project.developed_label(),
        technical_contact: project.contact_with_role("Technical Contact"),
        delivery_manager: project.contact_with_role("Delivery Manager"),
        language_main: joined(&arch.languages.main),
        language_others: joined(&arch.languages.others),
        language_frameworks: joined(&arch.frameworks.others),
        hosted: joined(&arch.hosting.kind),
        architectures: joined(&arch.hosting.details),
        environments: environments_label(&arch.environments),
        source_control: source.and_then(|s| s.kind.clone()).unwrap_or_default(),
        repo: source
            .map(|s| {
                s.links
                    .iter()
                    .filter_map(|l| l.url.clone())
                    .collect::<Vec<_>>()
                    .join(LIST_SEPARATOR)
            })
            .unwrap_or_default(),
        cicd: joined(&arch.cicd.others),
        datastores: joined(&arch.database.others),
        database_technologies: joined(&arch.database.main),
        project_tools: tools.project_tracking.clone().unwrap_or_default(),
        documentation: joined(&details.documentation_link),
        infrastructure: joined(&arch.infrastructure.others),
        code_editors: joined(&tools.code_editors.others),
        communication: joined(&tools.communication.others),
        collaboration: joined(&tools.collaboration.others),
        incident_management: tools.incident_management.clone().unwrap_or_default(),
        documentation_tools: joined(&tools.documentation.others),
        ui_tools: joined(&tools.user_interface.others),
        diagram_tools: joined(&tools.diagrams.others),
        miscellaneous: tools
            .miscellaneous
            .iter()
            .map(|m| {
                format!(
                    "{}: {}",
                    m.name.as_deref().unwrap_or_default(),
                    m.description.as_deref().unwrap_or_default()
                )
            })
            .collect::<Vec<_>>()
            .join(LIST_SEPARATOR),
    }
}

/// Flatten every project, resolving reverse dependencies across the set
pub fn to_rows(projects: &[Project]) -> Vec<ProjectRow> {
    let dependents = reverse_dependencies(projects);
    projects.iter().map(|p| to_row(p, &dependents)).collect()
}

#[derive(Clone)]
pub struct ProjectService {
    documents: DocumentGateway,
}

impl ProjectService {
    pub fn new(documents: DocumentGateway) -> Self {
        Self { documents }
    }

    pub async fn rows(&self) -> Result<Vec<ProjectRow>> {
        let doc: ProjectDocument = self.documents.get_json(BucketAlias::Tat, PROJECTS_KEY).await?;
        Ok(to_rows(&doc.projects))
    }
}
