//! Submission normalisation.
//!
//! Turns the three accepted input shapes (a MISP record, freeform text, or a
//! single MISP object) into one canonical `MispEvent` plus the action to take.
//! Nothing in here performs I/O: tokens are resolved and templates loaded by
//! the caller.

use std::fmt;

use misp_client::{Attribute, EventReport, MispEvent, MispObject};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::templates::{is_valid_template_name, ObjectTemplate};

pub const DEFAULT_INFO: &str = "Draugnet report";
pub const TITLE_PREFIX: &str = "Draugnet report: ";
pub const SOURCE_TAG: &str = "source:draugnet";
pub const FREETEXT_REPORT_NAME: &str = "Draugnet Report submission";
pub const DESCRIPTION_REPORT_NAME: &str = "Additional report description";
pub const SUBMITTER_TAG_PREFIX: &str = "submitter:";

pub const TLP_VALUES: &[&str] = &[
    "tlp:amber",
    "tlp:green",
    "tlp:red",
    "tlp:clear",
    "tlp:amber+strict",
    "tlp:unclear",
];
pub const PAP_VALUES: &[&str] = &["PAP:CLEAR", "PAP:GREEN", "PAP:AMBER", "PAP:RED"];

/// Distribution level scoped to a sharing group.
const SHARING_GROUP_DISTRIBUTION: u8 = 4;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("Missing '{0}' field in request body.")]
    MissingField(&'static str),

    #[error("Empty report body.")]
    EmptyText,

    #[error("Invalid template name.")]
    InvalidTemplateName,

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Invalid optional field '{field}': {reason}")]
    InvalidOptional { field: &'static str, reason: String },

    #[error("{stage} - {reason}")]
    ObjectBuild { stage: String, reason: String },
}

// ---------------------------------------------------------------------------
// Context and action
// ---------------------------------------------------------------------------

/// Shape of the submission. Modules use it to decide how to render content
/// for their target system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionContext {
    Misp,
    Freetext,
    Objects,
}

impl SubmissionContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionContext::Misp => "misp",
            SubmissionContext::Freetext => "freetext",
            SubmissionContext::Objects => "objects",
        }
    }
}

impl fmt::Display for SubmissionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update(Uuid),
}

impl Action {
    /// `Create` when no token was supplied, `Update` when one resolved.
    pub fn for_target(target: Option<Uuid>) -> Self {
        match target {
            Some(id) => Action::Update(id),
            None => Action::Create,
        }
    }
}

/// Canonical form of any submission.
#[derive(Debug, Clone)]
pub struct Submission {
    pub context: SubmissionContext,
    pub action: Action,
    pub event: MispEvent,
    /// Freeform reports attached after the record is persisted.
    pub reports: Vec<EventReport>,
    /// Augmentation still to apply when updating an existing record.
    pub optional: OptionalFields,
}

// ---------------------------------------------------------------------------
// Field filtering
// ---------------------------------------------------------------------------

/// Values that form submitters send for "nothing entered".
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty() || s == "undefined",
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

pub fn filter_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .filter(|(_, v)| !is_blank(v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Optional block
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionalFields {
    pub title: Option<String>,
    pub distribution: Option<u8>,
    pub sharing_group_id: Option<String>,
    pub tlp: Option<String>,
    pub pap: Option<String>,
    pub description: Option<String>,
    pub submitter: Option<String>,
}

impl OptionalFields {
    /// Parse the `optional` block of a request. Blank values are dropped
    /// before anything else looks at them.
    pub fn from_value(value: Option<&Value>) -> Result<Self, NormalizeError> {
        let fields = match value {
            None | Some(Value::Null) => return Ok(Self::default()),
            Some(Value::Object(map)) => filter_fields(map),
            Some(_) => {
                return Err(NormalizeError::MalformedRecord(
                    "'optional' must be an object".into(),
                ))
            }
        };

        let distribution = match fields.get("distribution") {
            None => None,
            Some(v) => Some(parse_distribution(v)?),
        };

        Ok(Self {
            title: fields.get("title").and_then(scalar_string),
            distribution,
            sharing_group_id: fields.get("sharing_group_id").and_then(scalar_string),
            tlp: fields.get("tlp").and_then(scalar_string),
            pap: fields.get("pap").and_then(scalar_string),
            description: fields.get("description").and_then(scalar_string),
            submitter: fields.get("submitter").and_then(scalar_string),
        })
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the augmentation rules to a record.
    pub fn apply(&self, event: &mut MispEvent) {
        if let Some(title) = &self.title {
            event.info = format!("{TITLE_PREFIX}{title}");
        }

        if let Some(distribution) = self.distribution {
            match (&self.sharing_group_id, distribution) {
                (None, SHARING_GROUP_DISTRIBUTION) => event.distribution = Some(0),
                (Some(group), SHARING_GROUP_DISTRIBUTION) => {
                    event.distribution = Some(distribution);
                    event.sharing_group_id = Some(group.clone());
                }
                _ => event.distribution = Some(distribution),
            }
        }

        if let Some(tlp) = self.tlp.as_deref().filter(|t| TLP_VALUES.contains(t)) {
            event.add_tag(tlp);
        }

        if let Some(pap) = self.pap.as_deref().filter(|p| PAP_VALUES.contains(p)) {
            event.add_tag(pap);
        }

        if let Some(description) = self.description.as_deref().filter(|d| !d.trim().is_empty()) {
            event.add_event_report(DESCRIPTION_REPORT_NAME, description);
        }

        if let Some(submitter) = self.submitter.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            event.add_tag(format!("{SUBMITTER_TAG_PREFIX}{submitter}"));
        }
    }
}

fn parse_distribution(value: &Value) -> Result<u8, NormalizeError> {
    let parsed = match value {
        Value::Number(n) => n.as_u64().and_then(|n| u8::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<u8>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| NormalizeError::InvalidOptional {
        field: "distribution",
        reason: format!("expected an integer level, got {value}"),
    })
}

// ---------------------------------------------------------------------------
// Input modes
// ---------------------------------------------------------------------------

/// The record every non-structured submission starts from.
pub fn default_event() -> MispEvent {
    let mut event = MispEvent {
        info: DEFAULT_INFO.to_string(),
        distribution: Some(0),
        analysis: Some(0),
        threat_level_id: Some(4),
        ..Default::default()
    };
    event.add_tag(SOURCE_TAG);
    event
}

/// Structured-record mode. The record may be wrapped in up to two envelope
/// keys (`event` and/or `Event`).
pub fn structured_record(body: &Value, target: Option<Uuid>) -> Result<Submission, NormalizeError> {
    let optional = OptionalFields::from_value(body.get("optional"))?;
    let record = unwrap_record(body)?;
    let mut event: MispEvent = serde_json::from_value(record)
        .map_err(|e| NormalizeError::MalformedRecord(e.to_string()))?;

    optional.apply(&mut event);
    let action = Action::for_target(target);
    if let Action::Update(id) = action {
        event.uuid = Some(id);
    }

    Ok(Submission {
        context: SubmissionContext::Misp,
        action,
        event,
        reports: Vec::new(),
        optional,
    })
}

fn unwrap_record(body: &Value) -> Result<Value, NormalizeError> {
    let mut current = body;
    for _ in 0..2 {
        match current.get("event").or_else(|| current.get("Event")) {
            Some(inner) if inner.is_object() => current = inner,
            _ => break,
        }
    }

    let mut record = current.clone();
    let Some(fields) = record.as_object_mut() else {
        return Err(NormalizeError::MalformedRecord("record must be an object".into()));
    };
    fields.remove("optional");
    Ok(record)
}

/// Freetext mode. The text becomes one freeform report; on create it is
/// attached to a fresh default record.
pub fn freetext(
    text: &str,
    optional: OptionalFields,
    target: Option<Uuid>,
) -> Result<Submission, NormalizeError> {
    if text.trim().is_empty() {
        return Err(NormalizeError::EmptyText);
    }

    let action = Action::for_target(target);
    let event = match action {
        Action::Create => {
            let mut event = default_event();
            optional.apply(&mut event);
            event
        }
        Action::Update(id) => MispEvent {
            uuid: Some(id),
            ..Default::default()
        },
    };

    Ok(Submission {
        context: SubmissionContext::Freetext,
        action,
        event,
        reports: vec![EventReport::new(FREETEXT_REPORT_NAME, text)],
        optional,
    })
}

/// Body of a freetext submission: `{text, optional?}`.
#[derive(Debug, Clone)]
pub struct FreetextRequest {
    pub text: String,
    pub optional: OptionalFields,
}

impl FreetextRequest {
    pub fn from_value(body: &Value) -> Result<Self, NormalizeError> {
        let text = match body.get("text") {
            None => return Err(NormalizeError::MissingField("text")),
            Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                return Err(NormalizeError::MalformedRecord(format!(
                    "'text' must be a string, got {other}"
                )))
            }
        };
        Ok(Self {
            text,
            optional: OptionalFields::from_value(body.get("optional"))?,
        })
    }
}

/// Body of an object submission: `{template_name, data, optional?}`.
#[derive(Debug, Clone)]
pub struct ObjectRequest {
    pub template_name: String,
    pub data: Map<String, Value>,
    pub optional: OptionalFields,
}

impl ObjectRequest {
    /// A `data` key inside `optional` is ignored.
    pub fn from_value(body: &Value) -> Result<Self, NormalizeError> {
        let template_name = body
            .get("template_name")
            .and_then(Value::as_str)
            .ok_or(NormalizeError::MissingField("template_name"))?
            .to_string();
        let data = body
            .get("data")
            .and_then(Value::as_object)
            .cloned()
            .ok_or(NormalizeError::MissingField("data"))?;

        Ok(Self {
            template_name,
            data,
            optional: OptionalFields::from_value(body.get("optional"))?,
        })
    }
}

pub fn validate_template_name(name: &str) -> Result<(), NormalizeError> {
    if is_valid_template_name(name) {
        Ok(())
    } else {
        Err(NormalizeError::InvalidTemplateName)
    }
}

/// Structured-object mode. On create the object is embedded in a fresh
/// default record; on update the record carries only the object.
pub fn structured_object(
    template: &ObjectTemplate,
    data: &Map<String, Value>,
    optional: OptionalFields,
    target: Option<Uuid>,
) -> Result<Submission, NormalizeError> {
    let object = build_object(template, data)?;

    let action = Action::for_target(target);
    let mut event = match action {
        Action::Create => {
            let mut event = default_event();
            optional.apply(&mut event);
            event
        }
        Action::Update(id) => MispEvent {
            uuid: Some(id),
            ..Default::default()
        },
    };
    event.add_object(object);

    Ok(Submission {
        context: SubmissionContext::Objects,
        action,
        event,
        reports: Vec::new(),
        optional,
    })
}

/// Build one object from a relation -> value(s) map. Lists expand to one
/// attribute per element.
pub fn build_object(
    template: &ObjectTemplate,
    data: &Map<String, Value>,
) -> Result<MispObject, NormalizeError> {
    let mut attributes = Vec::new();

    for (relation, value) in filter_fields(data) {
        let stage = format!("Adding attribute {relation}");
        let Some(definition) = template.attributes.get(&relation) else {
            return Err(NormalizeError::ObjectBuild {
                stage,
                reason: format!("'{relation}' is not a relation of template {}", template.name),
            });
        };

        let values = match &value {
            Value::Array(items) => items.iter().filter(|v| !is_blank(v)).collect::<Vec<_>>(),
            other => vec![other],
        };

        for value in values {
            let Some(value) = scalar_string(value) else {
                return Err(NormalizeError::ObjectBuild {
                    stage,
                    reason: "nested values are not supported".into(),
                });
            };
            attributes.push(Attribute {
                attribute_type: definition.misp_attribute.clone(),
                category: definition.categories.first().cloned(),
                object_relation: Some(relation.clone()),
                value,
                ..Default::default()
            });
        }
    }

    if attributes.is_empty() {
        return Err(NormalizeError::ObjectBuild {
            stage: "Creating MISP object".into(),
            reason: "no attribute values supplied".into(),
        });
    }
    check_requirements(template, &attributes)?;

    Ok(MispObject {
        name: template.name.clone(),
        meta_category: Some(template.meta_category.clone()),
        description: template.description.clone(),
        template_uuid: Some(template.uuid.clone()),
        template_version: template.version_string(),
        attributes,
        ..Default::default()
    })
}

/// The template's `required` and `requiredOneOf` rules, which MISP
/// enforces when the object is added.
fn check_requirements(template: &ObjectTemplate, attributes: &[Attribute]) -> Result<(), NormalizeError> {
    let present = |relation: &str| {
        attributes
            .iter()
            .any(|a| a.object_relation.as_deref() == Some(relation))
    };

    let missing: Vec<&str> = template
        .required
        .iter()
        .map(String::as_str)
        .filter(|r| !present(*r))
        .collect();
    if !missing.is_empty() {
        return Err(NormalizeError::ObjectBuild {
            stage: "Creating MISP object".into(),
            reason: format!("missing required relations: {}", missing.join(", ")),
        });
    }

    if !template.required_one_of.is_empty()
        && !template.required_one_of.iter().any(|r| present(r.as_str()))
    {
        return Err(NormalizeError::ObjectBuild {
            stage: "Creating MISP object".into(),
            reason: format!(
                "at least one of these relations is required: {}",
                template.required_one_of.join(", ")
            ),
        });
    }
    Ok(())
}
