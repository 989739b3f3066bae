use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// --- Event model ---

/// A MISP event. Fields this crate does not model (galaxies, org data,
/// timestamps...) are carried through untouched in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MispEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    #[serde(default)]
    pub info: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_u8"
    )]
    pub distribution: Option<u8>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_u8"
    )]
    pub analysis: Option<u8>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_u8"
    )]
    pub threat_level_id: Option<u8>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub sharing_group_id: Option<String>,
    #[serde(rename = "Tag", default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    #[serde(rename = "EventReport", default, skip_serializing_if = "Vec::is_empty")]
    pub event_reports: Vec<EventReport>,
    #[serde(rename = "Object", default, skip_serializing_if = "Vec::is_empty")]
    pub objects: Vec<MispObject>,
    #[serde(rename = "Attribute", default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Attribute>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MispEvent {
    /// Add a tag unless one with the same name is already present.
    pub fn add_tag(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.tags.iter().any(|t| t.name == name) {
            self.tags.push(Tag::new(name));
        }
    }

    pub fn add_event_report(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.event_reports.push(EventReport::new(name, content));
    }

    pub fn add_object(&mut self, object: MispObject) {
        self.objects.push(object);
    }

    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(|t| t.name.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    /// `local`, `colour` and the rest of MISP's tag fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// A freeform markdown report attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_uuid: Option<Uuid>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub content: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_u8"
    )]
    pub distribution: Option<u8>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventReport {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            ..Default::default()
        }
    }
}

/// An attribute, either standalone on the event or inside an object
/// (in which case `object_relation` is set).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    #[serde(rename = "type")]
    pub attribute_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_relation: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// `to_ids`, `distribution`, `first_seen` and other attribute fields
    /// passed through to MISP as submitted.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A structured MISP object built from an object template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MispObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    pub name: String,
    #[serde(rename = "meta-category", default, skip_serializing_if = "Option::is_none")]
    pub meta_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_uuid: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub template_version: Option<String>,
    #[serde(rename = "Attribute", default)]
    pub attributes: Vec<Attribute>,
    /// `ObjectReference`, `distribution`, `comment` and the like.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// --- Export formats ---

/// Output formats supported by `restSearch`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
    Suricata,
    Text,
    Stix,
    Stix2,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Suricata => "suricata",
            ExportFormat::Text => "text",
            ExportFormat::Stix => "stix",
            ExportFormat::Stix2 => "stix2",
        }
    }

    /// Formats that MISP answers with a JSON document.
    pub fn is_json(&self) -> bool {
        matches!(self, ExportFormat::Json | ExportFormat::Stix2)
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "suricata" => Ok(ExportFormat::Suricata),
            "text" => Ok(ExportFormat::Text),
            "stix" => Ok(ExportFormat::Stix),
            "stix2" => Ok(ExportFormat::Stix2),
            other => Err(format!("unsupported export format: {other}")),
        }
    }
}

/// Body of a `restSearch` export, passed through as-is.
#[derive(Debug, Clone, PartialEq)]
pub enum Exported {
    Json(Value),
    Text(String),
}

// --- Wire envelopes ---

#[derive(Serialize)]
pub(crate) struct SearchRequest<'a> {
    #[serde(rename = "returnFormat")]
    pub return_format: &'a str,
    pub eventid: String,
    #[serde(rename = "includeAnalystData")]
    pub include_analyst_data: bool,
    pub published: [bool; 2],
    #[serde(rename = "includeServerCorrelations")]
    pub include_server_correlations: bool,
    #[serde(rename = "includeFeedCorrelations")]
    pub include_feed_correlations: bool,
    #[serde(rename = "includeEventCorrelations")]
    pub include_event_correlations: bool,
    #[serde(rename = "includeGranularCorrelations")]
    pub include_granular_correlations: bool,
}

/// MISP returns numbers as strings in most payloads.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn opt_u8<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|n| u8::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("out of range: {n}"))),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => s
                .trim()
                .parse::<u8>()
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("not a small integer: {s}"))),
            Some(other) => Err(serde::de::Error::custom(format!(
                "expected integer, got {other}"
            ))),
        }
    }

    pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(other) => Err(serde::de::Error::custom(format!(
                "expected string or number, got {other}"
            ))),
        }
    }

    pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(serde::de::Error::custom(format!(
                "expected scalar value, got {other}"
            ))),
        }
    }
}
