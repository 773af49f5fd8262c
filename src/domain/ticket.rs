use crate::error::{BoardError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Backend identifier of a ticket. Numeric ids are kept in their decimal form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(String);

impl TicketId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reads an identifier-like value: strings as-is, numbers in decimal form
pub(crate) fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A ticket on the board.
///
/// The board never interprets business fields. It only needs the identifier
/// and the owning project; everything else stays in the raw record for the
/// ticket renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    id: TicketId,
    project_id: Option<String>,
    record: Map<String, Value>,
}

impl Ticket {
    /// Builds a ticket from a raw backend record. The id is read from `_id`
    /// or `id`, the project from `projectId`, `project_id` or `project`.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(record) = value else {
            return Err(BoardError::InvalidResponse(
                "ticket is not a JSON object".to_string(),
            ));
        };

        let id = ["_id", "id"]
            .iter()
            .find_map(|field| record.get(*field).and_then(id_from_value))
            .ok_or(BoardError::MissingTicketId)?;

        let project_id = ["projectId", "project_id", "project"]
            .iter()
            .find_map(|field| match record.get(*field) {
                Some(Value::Object(project)) => project
                    .get("_id")
                    .or_else(|| project.get("id"))
                    .and_then(id_from_value),
                Some(other) => id_from_value(other),
                None => None,
            });

        Ok(Self {
            id: TicketId(id),
            project_id,
            record,
        })
    }

    pub fn id(&self) -> &TicketId {
        &self.id
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    /// Raw field lookup
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.record.get(name)
    }

    /// Display title: `title`, then `name`, then the id
    pub fn title(&self) -> &str {
        ["title", "name"]
            .iter()
            .find_map(|field| self.record.get(*field).and_then(Value::as_str))
            .unwrap_or_else(|| self.id.as_str())
    }

    /// Sets a raw field, e.g. the status after a move
    pub fn set_field(&mut self, name: impl Into<String>, value: Value) {
        self.record.insert(name.into(), value);
    }

    pub fn record(&self) -> &Map<String, Value> {
        &self.record
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.record)
    }
}

impl Serialize for Ticket {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.record.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Ticket {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ticket::from_value(value).map_err(serde::de::Error::custom)
    }
}

/// A project the board can be scoped to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub id: String,
    pub name: String,
}

impl Project {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Builds a project from a raw record. The id is read from `_id` or `id`
    /// and the name from `name` or `title`; records may carry both keys.
    pub fn from_value(value: &Value) -> Result<Self> {
        let Value::Object(record) = value else {
            return Err(BoardError::InvalidResponse(
                "project is not a JSON object".to_string(),
            ));
        };

        let id = ["_id", "id"]
            .iter()
            .find_map(|field| record.get(*field).and_then(id_from_value))
            .ok_or_else(|| BoardError::InvalidResponse("project has no id".to_string()))?;

        let name = ["name", "title"]
            .iter()
            .find_map(|field| record.get(*field).and_then(Value::as_str))
            .unwrap_or_default()
            .to_string();

        Ok(Self { id, name })
    }
}

impl<'de> Deserialize<'de> for Project {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Project::from_value(&value).map_err(serde::de::Error::custom)
    }
}
