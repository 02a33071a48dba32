//! # Structure: Incoming CRF Payloads and Validation
//!
//! Raw payloads are deserialized leniently (every key optional, `id` may be a
//! string or a number) so that missing keys can be reported per field instead of
//! failing wholesale. [`validate_study_structure`], [`validate_form`] and
//! [`validate_section_order`] turn them into trees of validated nodes carrying a
//! resolved [`NodeIdentity`], normalized field columns and typed settings.
//!
//! Validation happens before any transaction opens; a payload that fails here
//! never touches storage.
//!
//! The `order` key is accepted on every node and ignored: sibling order is
//! always the node's position in its array.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::differ::Identified;
use crate::error::{Collector, SyncError};
use crate::identity::{self, NodeIdentity};
use crate::normalize;
use crate::settings::{FieldSettings, FieldType};

// ── Raw payloads ────────────────────────────────────────────────

/// Body of `POST /studies/{protocol_code}/crf-builder/structure`.
#[derive(Debug, Default, Deserialize)]
pub struct StructurePayload {
    pub visits: Option<Vec<VisitPayload>>,
    pub revision: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VisitPayload {
    pub id: Option<Value>,
    #[serde(alias = "isNew")]
    pub is_new: Option<bool>,
    pub title: Option<String>,
    pub order: Option<f64>,
    #[serde(alias = "isHidden")]
    pub is_hidden: Option<bool>,
    pub subsections: Option<Vec<SectionPayload>>,
}

/// A section as sent by any of the three structural endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct SectionPayload {
    pub id: Option<Value>,
    #[serde(alias = "isNew")]
    pub is_new: Option<bool>,
    pub title: Option<String>,
    pub order: Option<f64>,
    #[serde(alias = "isHidden")]
    pub is_hidden: Option<bool>,
    pub fields: Option<Vec<FieldPayload>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FieldPayload {
    pub id: Option<Value>,
    #[serde(alias = "isNew")]
    pub is_new: Option<bool>,
    pub label: Option<String>,
    pub name: Option<String>,
    #[serde(alias = "fieldType", alias = "type")]
    pub field_type: Option<String>,
    pub settings: Option<Value>,
    #[serde(alias = "isRequired")]
    pub is_required: Option<bool>,
    pub order: Option<f64>,
}

/// Body of `PUT /forms/{form_id}`.
#[derive(Debug, Default, Deserialize)]
pub struct FormPayload {
    pub title: Option<String>,
    pub sections: Option<Vec<SectionPayload>>,
    pub revision: Option<i64>,
}

/// Body of `POST /forms/{form_id}/sections/reorder-simple`.
#[derive(Debug, Default, Deserialize)]
pub struct SectionOrderPayload {
    pub sections: Option<Vec<SectionPayload>>,
    pub revision: Option<i64>,
}

// ── Validated trees ─────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StudyTree {
    pub revision: Option<i64>,
    pub visits: Vec<VisitNode>,
}

#[derive(Debug, Clone)]
pub struct VisitNode {
    pub identity: NodeIdentity,
    pub title: String,
    pub hidden: bool,
    pub subsections: Vec<SectionNode>,
}

#[derive(Debug, Clone)]
pub struct SectionNode {
    pub identity: NodeIdentity,
    pub title: String,
    pub hidden: bool,
    /// `None` leaves the persisted fields of this section untouched.
    pub fields: Option<Vec<FieldNode>>,
}

#[derive(Debug, Clone)]
pub struct FieldNode {
    pub identity: NodeIdentity,
    pub name: String,
    pub label: String,
    pub field_type: FieldType,
    pub placeholder: Option<String>,
    pub help_text: Option<String>,
    pub help_image: Option<String>,
    pub required: bool,
    pub settings: FieldSettings,
}

#[derive(Debug, Clone)]
pub struct FormTree {
    pub revision: Option<i64>,
    pub title: String,
    pub sections: Vec<SectionNode>,
}

#[derive(Debug, Clone)]
pub struct SectionOrder {
    pub revision: Option<i64>,
    pub sections: Vec<SectionNode>,
}

impl Identified for VisitNode {
    fn node_identity(&self) -> NodeIdentity {
        self.identity
    }
}

impl Identified for SectionNode {
    fn node_identity(&self) -> NodeIdentity {
        self.identity
    }
}

impl Identified for FieldNode {
    fn node_identity(&self) -> NodeIdentity {
        self.identity
    }
}

// ── Validation ──────────────────────────────────────────────────

/// Client ids arrive as strings or numbers; anything else carries no identity.
fn id_text(id: &Option<Value>) -> Option<String> {
    match id {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn node_identity(
    c: &mut Collector,
    path: &str,
    id: &Option<Value>,
    is_new: Option<bool>,
) -> NodeIdentity {
    match identity::resolve(id_text(id).as_deref(), is_new) {
        Ok(resolved) => resolved,
        Err(msg) => {
            c.push(format!("{}.id", path), msg);
            NodeIdentity::new_node()
        }
    }
}

fn required_text(c: &mut Collector, path: &str, value: &Option<String>) -> String {
    match value.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => {
            c.push(path, "is required");
            String::new()
        }
    }
}

fn check_revision(c: &mut Collector, revision: Option<i64>, require_revision: bool) {
    if require_revision && revision.is_none() {
        c.push("revision", "is required");
    }
}

pub fn validate_study_structure(
    payload: &StructurePayload,
    require_revision: bool,
) -> Result<StudyTree, SyncError> {
    let mut c = Collector::default();
    check_revision(&mut c, payload.revision, require_revision);
    let visits = match &payload.visits {
        Some(visits) => visits
            .iter()
            .enumerate()
            .map(|(i, v)| validate_visit(&mut c, &format!("visits.{}", i), v))
            .collect(),
        None => {
            c.push("visits", "is required");
            Vec::new()
        }
    };
    c.finish(StudyTree {
        revision: payload.revision,
        visits,
    })
}

fn validate_visit(c: &mut Collector, path: &str, visit: &VisitPayload) -> VisitNode {
    let identity = node_identity(c, path, &visit.id, visit.is_new);
    let title = required_text(c, &format!("{}.title", path), &visit.title);
    let subsections = visit
        .subsections
        .as_deref()
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(i, s)| validate_section(c, &format!("{}.subsections.{}", path, i), s, false))
        .collect();
    VisitNode {
        identity,
        title,
        hidden: visit.is_hidden.unwrap_or(false),
        subsections,
    }
}

fn validate_section(
    c: &mut Collector,
    path: &str,
    section: &SectionPayload,
    with_fields: bool,
) -> SectionNode {
    let identity = node_identity(c, path, &section.id, section.is_new);
    let title = required_text(c, &format!("{}.title", path), &section.title);
    let fields = with_fields.then(|| {
        section
            .fields
            .as_deref()
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(i, f)| validate_field(c, &format!("{}.fields.{}", path, i), f))
            .collect()
    });
    SectionNode {
        identity,
        title,
        hidden: section.is_hidden.unwrap_or(false),
        fields,
    }
}

fn validate_field(c: &mut Collector, path: &str, field: &FieldPayload) -> FieldNode {
    let identity = node_identity(c, path, &field.id, field.is_new);
    let label = required_text(c, &format!("{}.label", path), &field.label);

    let field_type = match field.field_type.as_deref().map(str::parse::<FieldType>) {
        Some(Ok(t)) => t,
        Some(Err(msg)) => {
            c.push(format!("{}.field_type", path), msg);
            FieldType::Text
        }
        None => {
            c.push(format!("{}.field_type", path), "is required");
            FieldType::Text
        }
    };

    let source = match field.name.as_deref() {
        Some(name) if !name.trim().is_empty() => name,
        _ => label.as_str(),
    };
    let name = normalize::machine_name(source);

    let doc = match &field.settings {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => {
            c.push(format!("{}.settings", path), "must be an object");
            Map::new()
        }
    };
    let flat = match normalize::flatten_settings(&field_type, doc) {
        Ok(flat) => flat,
        Err(msg) => {
            c.push(format!("{}.settings", path), msg);
            normalize::FlattenedSettings::default()
        }
    };

    FieldNode {
        identity,
        name,
        label,
        field_type,
        placeholder: flat.placeholder,
        help_text: flat.help_text,
        help_image: flat.help_image,
        required: field.is_required.unwrap_or(false),
        settings: flat.settings,
    }
}

pub fn validate_form(payload: &FormPayload, require_revision: bool) -> Result<FormTree, SyncError> {
    let mut c = Collector::default();
    check_revision(&mut c, payload.revision, require_revision);
    let title = required_text(&mut c, "title", &payload.title);
    let sections = match &payload.sections {
        Some(sections) => sections
            .iter()
            .enumerate()
            .map(|(i, s)| validate_section(&mut c, &format!("sections.{}", i), s, true))
            .collect(),
        None => {
            c.push("sections", "is required");
            Vec::new()
        }
    };
    c.finish(FormTree {
        revision: payload.revision,
        title,
        sections,
    })
}

pub fn validate_section_order(
    payload: &SectionOrderPayload,
    require_revision: bool,
) -> Result<SectionOrder, SyncError> {
    let mut c = Collector::default();
    check_revision(&mut c, payload.revision, require_revision);
    let sections = match &payload.sections {
        Some(sections) => sections
            .iter()
            .enumerate()
            .map(|(i, s)| validate_section(&mut c, &format!("sections.{}", i), s, false))
            .collect(),
        None => {
            c.push("sections", "is required");
            Vec::new()
        }
    };
    c.finish(SectionOrder {
        revision: payload.revision,
        sections,
    })
}

/// Validate a single field created outside a structure sync.
/// Errors are reported under `field.*`.
pub fn validate_new_field(payload: &FieldPayload) -> Result<FieldNode, SyncError> {
    let mut c = Collector::default();
    let field = validate_field(&mut c, "field", payload);
    c.finish(field)
}
