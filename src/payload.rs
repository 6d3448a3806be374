//! Annotation data model
//!
//! Validated representations of the JSON artifacts consumed by the viewer:
//! span payloads (one per document and side), coreference cluster lists and
//! surface-form maps. Validation happens once at load time so that every
//! later lookup works on typed data.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, VizError};

/// Identifier of an event mention: the first element of an event record.
///
/// Identifiers compare by JSON value, so `"1"` and `1` are distinct events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventId {
    Number(i64),
    Text(String),
}

impl EventId {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(EventId::Text(s.clone())),
            Value::Number(n) => n.as_i64().map(EventId::Number),
            _ => None,
        }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventId::Number(n) => write!(f, "{}", n),
            EventId::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        EventId::Text(s.to_string())
    }
}

impl From<i64> for EventId {
    fn from(n: i64) -> Self {
        EventId::Number(n)
    }
}

/// One entry of a payload's event sequence.
///
/// The record keeps its raw fields untouched; only the leading identifier is
/// interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct EventRecord {
    id: EventId,
    fields: Vec<Value>,
}

impl EventRecord {
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Array(fields) = value else {
            return Err(VizError::MalformedPayload(
                "event record is not an array".to_string(),
            ));
        };
        let id = fields
            .first()
            .and_then(EventId::from_json)
            .ok_or_else(|| {
                VizError::MalformedPayload(
                    "event record must start with a string or integer identifier".to_string(),
                )
            })?;
        Ok(Self { id, fields })
    }

    pub fn id(&self) -> &EventId {
        &self.id
    }

    /// All fields, identifier included
    pub fn fields(&self) -> &[Value] {
        &self.fields
    }
}

impl TryFrom<Value> for EventRecord {
    type Error = VizError;

    fn try_from(value: Value) -> Result<Self> {
        EventRecord::from_value(value)
    }
}

impl From<EventRecord> for Value {
    fn from(record: EventRecord) -> Self {
        Value::Array(record.fields)
    }
}

/// A document's display data for one side (gold or system).
///
/// Only `events` is interpreted; every other field (text, triggers,
/// attributes, ...) passes through as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct DocumentPayload {
    pub events: Vec<EventRecord>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl DocumentPayload {
    /// Validate a raw JSON payload
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut rest) = value else {
            return Err(VizError::MalformedPayload(
                "payload is not a JSON object".to_string(),
            ));
        };
        let events = rest
            .remove("events")
            .ok_or_else(|| VizError::MalformedPayload("missing 'events' field".to_string()))?;
        let Value::Array(items) = events else {
            return Err(VizError::MalformedPayload(
                "'events' is not an array".to_string(),
            ));
        };

        let events = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                EventRecord::from_value(item).map_err(|e| match e {
                    VizError::MalformedPayload(msg) => {
                        VizError::MalformedPayload(format!("event {}: {}", i, msg))
                    }
                    other => other,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { events, rest })
    }

    pub fn to_value(&self) -> Value {
        let mut object = Map::with_capacity(self.rest.len() + 1);
        object.insert(
            "events".to_string(),
            Value::Array(self.events.iter().cloned().map(Value::from).collect()),
        );
        for (key, value) in &self.rest {
            object.insert(key.clone(), value.clone());
        }
        Value::Object(object)
    }

    pub fn event_ids(&self) -> impl Iterator<Item = &EventId> {
        self.events.iter().map(EventRecord::id)
    }
}

impl TryFrom<Value> for DocumentPayload {
    type Error = VizError;

    fn try_from(value: Value) -> Result<Self> {
        DocumentPayload::from_value(value)
    }
}

/// A group of event mentions judged to refer to the same event
pub type Cluster = Vec<EventId>;

/// Ordered list of coreference clusters for one document side
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterList {
    clusters: Vec<Cluster>,
}

impl ClusterList {
    pub fn new(clusters: Vec<Cluster>) -> Self {
        Self { clusters }
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Cluster> {
        self.clusters.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Cluster> {
        self.clusters.iter()
    }
}

impl From<Vec<Cluster>> for ClusterList {
    fn from(clusters: Vec<Cluster>) -> Self {
        Self::new(clusters)
    }
}

/// Event identifier -> human-readable mention text.
///
/// Keys are identifiers rendered as strings, the way they appear as JSON
/// object keys on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceForms {
    forms: BTreeMap<String, String>,
}

impl SurfaceForms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, text: impl Into<String>) {
        self.forms.insert(id.into(), text.into());
    }

    pub fn get(&self, id: &EventId) -> Option<&str> {
        self.forms.get(&id.to_string()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.forms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SurfaceForms {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut forms = SurfaceForms::new();
        for (k, v) in iter {
            forms.insert(k, v);
        }
        forms
    }
}

/// Which annotation a payload comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Human-annotated reference data
    Gold,
    /// Automatically produced annotation under evaluation
    System,
}

impl Side {
    /// Suffix used in artifact file names
    pub fn file_suffix(&self) -> &'static str {
        match self {
            Side::Gold => "gold",
            Side::System => "sys",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Gold => write!(f, "gold"),
            Side::System => write!(f, "system"),
        }
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gold" => Ok(Side::Gold),
            "system" | "sys" => Ok(Side::System),
            other => Err(format!("unknown side '{}', expected gold or system", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_keeps_extra_fields() {
        let raw = json!({
            "text": "John attacked. He fled.",
            "triggers": [["T1", "Attack", [[5, 13]]]],
            "events": [["E1", "T1", []], [7, "T2", []]]
        });
        let payload = DocumentPayload::from_value(raw.clone()).unwrap();

        assert_eq!(payload.events.len(), 2);
        assert_eq!(payload.events[0].id(), &EventId::from("E1"));
        assert_eq!(payload.events[1].id(), &EventId::Number(7));
        assert_eq!(payload.rest["text"], raw["text"]);
        assert_eq!(payload.to_value(), raw);
    }

    #[test]
    fn test_payload_without_events_is_malformed() {
        let err = DocumentPayload::from_value(json!({"text": "x"})).unwrap_err();
        assert!(matches!(err, VizError::MalformedPayload(_)));

        let err = DocumentPayload::from_value(json!({"events": {"E1": 1}})).unwrap_err();
        assert!(matches!(err, VizError::MalformedPayload(_)));

        let err = DocumentPayload::from_value(json!([1, 2])).unwrap_err();
        assert!(matches!(err, VizError::MalformedPayload(_)));
    }

    #[test]
    fn test_event_record_needs_identifier() {
        let err = DocumentPayload::from_value(json!({"events": [[]]})).unwrap_err();
        assert!(err.to_string().contains("event 0"));

        let err = DocumentPayload::from_value(json!({"events": [[null, "T1"]]})).unwrap_err();
        assert!(matches!(err, VizError::MalformedPayload(_)));
    }

    #[test]
    fn test_deserialize_goes_through_validation() {
        let payload: DocumentPayload =
            serde_json::from_str(r#"{"events": [["E2", "T1", []]], "text": "abc"}"#).unwrap();
        assert_eq!(payload.events[0].id().to_string(), "E2");

        let err = serde_json::from_str::<DocumentPayload>(r#"{"text": "abc"}"#).unwrap_err();
        assert!(err.to_string().contains("events"));
    }

    #[test]
    fn test_cluster_list_mixed_identifiers() {
        let clusters: ClusterList = serde_json::from_str(r#"[["E1", "E2"], [3]]"#).unwrap();
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters.get(1).unwrap()[0], EventId::Number(3));
    }

    #[test]
    fn test_surface_lookup_uses_string_keys() {
        let forms: SurfaceForms = serde_json::from_str(r#"{"E1": "attack", "3": "fled"}"#).unwrap();
        assert_eq!(forms.get(&EventId::from("E1")), Some("attack"));
        assert_eq!(forms.get(&EventId::Number(3)), Some("fled"));
        assert_eq!(forms.get(&EventId::from("E9")), None);
    }

    #[test]
    fn test_side_parsing() {
        assert_eq!("gold".parse::<Side>().unwrap(), Side::Gold);
        assert_eq!("sys".parse::<Side>().unwrap(), Side::System);
        assert_eq!("System".parse::<Side>().unwrap(), Side::System);
        assert!("both".parse::<Side>().is_err());
        assert_eq!(Side::System.file_suffix(), "sys");
    }
}
