//! Turns the board payloads returned by backends into a [`Board`].
//!
//! Backends disagree on two things: the envelope around the board
//! (`{data: {board}}`, `{data}`, `{board}` or the bare board) and the shape of
//! its `columns` field. Column shapes form a closed set, see [`ColumnsShape`].

use crate::{
    domain::{
        board::{Board, Lane},
        column::ColumnKey,
        ticket::{id_from_value, Project, Ticket},
    },
    error::{BoardError, Result},
};
use serde_json::{Map, Value};
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, warn};

/// Caller override for column normalization: receives the raw `columns`
/// value and returns ticket lists by column label. Labels are resolved with
/// [`ColumnKey::from_label`]; unknown labels are dropped.
pub type NormalizeFn = Arc<dyn Fn(&Value) -> BTreeMap<String, Vec<Value>> + Send + Sync>;

/// A column entry as found in array-shaped or wrapped payloads
#[derive(Debug, Clone, PartialEq)]
pub struct RawLane {
    pub id: Option<String>,
    pub labels: Vec<String>,
    pub tickets: Vec<Value>,
}

impl RawLane {
    fn from_map(map: &Map<String, Value>) -> Self {
        let id = ["_id", "id"]
            .iter()
            .find_map(|field| map.get(*field).and_then(id_from_value));

        let labels = ["key", "status", "name", "title"]
            .iter()
            .filter_map(|field| map.get(*field).and_then(Value::as_str))
            .map(str::to_string)
            .collect();

        let tickets = map
            .get("tickets")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Self {
            id,
            labels,
            tickets,
        }
    }

    /// Reads one value of a keyed `columns` object: either a wrapped lane or
    /// a bare ticket array
    fn from_entry(value: &Value) -> Option<Self> {
        match value {
            Value::Object(lane) => Some(Self::from_map(lane)),
            Value::Array(tickets) => Some(Self {
                id: None,
                labels: Vec::new(),
                tickets: tickets.clone(),
            }),
            _ => None,
        }
    }

    /// First label that names a known lane
    fn resolve_key(&self) -> Option<ColumnKey> {
        self.labels.iter().find_map(|label| ColumnKey::from_label(label))
    }
}

/// The column layouts backends are known to send
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnsShape {
    /// `[{name: "To Do", tickets: [...]}, ...]`
    Lanes(Vec<RawLane>),
    /// `{todo: [...], inProgress: [...]}`
    Arrays(Vec<(String, Vec<Value>)>),
    /// `{todo: {tickets: [...]}, ...}`; bare arrays may sit alongside
    Wrapped(Vec<(String, RawLane)>),
}

impl ColumnsShape {
    /// Classifies a raw `columns` value. Returns `None` for scalars and null.
    pub fn classify(columns: &Value) -> Option<Self> {
        match columns {
            Value::Array(items) => Some(Self::Lanes(
                items
                    .iter()
                    .filter_map(Value::as_object)
                    .map(RawLane::from_map)
                    .collect(),
            )),
            Value::Object(map) if map.values().any(is_wrapped_lane) => Some(Self::Wrapped(
                map.iter()
                    .filter_map(|(label, value)| match RawLane::from_entry(value) {
                        Some(lane) => Some((label.clone(), lane)),
                        None => {
                            debug!(%label, "dropping column that is neither a lane nor a list");
                            None
                        }
                    })
                    .collect(),
            )),
            Value::Object(map) => Some(Self::Arrays(
                map.iter()
                    .filter_map(|(label, value)| {
                        value.as_array().map(|tickets| (label.clone(), tickets.clone()))
                    })
                    .collect(),
            )),
            _ => None,
        }
    }

    /// Normalizes into lanes keyed by [`ColumnKey`]
    pub fn into_lanes(self) -> BTreeMap<ColumnKey, Lane> {
        match self {
            Self::Lanes(lanes) => normalize_lane_list(lanes),
            Self::Arrays(entries) => normalize_arrays(entries),
            Self::Wrapped(entries) => normalize_wrapped(entries),
        }
    }
}

fn is_wrapped_lane(value: &Value) -> bool {
    value
        .as_object()
        .map(|lane| lane.contains_key("tickets"))
        .unwrap_or(false)
}

fn normalize_lane_list(lanes: Vec<RawLane>) -> BTreeMap<ColumnKey, Lane> {
    let mut out = BTreeMap::new();
    for raw in lanes {
        let Some(key) = raw.resolve_key() else {
            debug!(labels = ?raw.labels, "dropping unknown column");
            continue;
        };
        push_lane(&mut out, key, raw.id, raw.tickets);
    }
    out
}

fn normalize_arrays(entries: Vec<(String, Vec<Value>)>) -> BTreeMap<ColumnKey, Lane> {
    let mut out = BTreeMap::new();
    for (label, tickets) in entries {
        match ColumnKey::from_label(&label) {
            Some(key) => push_lane(&mut out, key, None, tickets),
            None => debug!(%label, "dropping unknown column"),
        }
    }
    out
}

fn normalize_wrapped(entries: Vec<(String, RawLane)>) -> BTreeMap<ColumnKey, Lane> {
    let mut out = BTreeMap::new();
    for (label, raw) in entries {
        let key = ColumnKey::from_label(&label).or_else(|| raw.resolve_key());
        match key {
            Some(key) => push_lane(&mut out, key, raw.id, raw.tickets),
            None => debug!(%label, "dropping unknown column"),
        }
    }
    out
}

/// Appends tickets to a lane. Two backend columns mapping to the same key are
/// merged in payload order; the first id seen wins.
fn push_lane(
    out: &mut BTreeMap<ColumnKey, Lane>,
    key: ColumnKey,
    id: Option<String>,
    tickets: Vec<Value>,
) {
    let lane = out.entry(key).or_default();
    if lane.id.is_none() {
        lane.id = id;
    }
    lane.tickets.extend(tickets.into_iter().filter_map(|raw| {
        Ticket::from_value(raw)
            .map_err(|e| warn!(column = %key, error = %e, "skipping ticket"))
            .ok()
    }));
}

/// Unwraps the board object from the response envelope
pub fn board_payload(response: &Value) -> &Value {
    if let Some(board) = response.pointer("/data/board").filter(|v| v.is_object()) {
        return board;
    }
    if let Some(data) = response.get("data").filter(|v| v.is_object()) {
        return data;
    }
    if let Some(board) = response.get("board").filter(|v| v.is_object()) {
        return board;
    }
    response
}

/// Looks a field up on the board object first, then on the outer envelope
fn envelope_field<'a>(response: &'a Value, payload: &'a Value, field: &str) -> Option<&'a Value> {
    payload
        .get(field)
        .or_else(|| response.get("data").and_then(|data| data.get(field)))
        .or_else(|| response.get(field))
}

fn available_projects(value: Option<&Value>) -> Vec<Project> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    serde_json::from_value::<Project>(item.clone())
                        .map_err(|e| warn!(error = %e, "skipping malformed project"))
                        .ok()
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Normalizes a raw board response.
///
/// The result always carries all five lanes. Unknown columns are dropped and
/// tickets without an id are skipped.
pub fn normalize_board(response: &Value, override_fn: Option<&NormalizeFn>) -> Result<Board> {
    if !response.is_object() {
        return Err(BoardError::InvalidResponse(format!(
            "expected a JSON object, got {}",
            kind_of(response)
        )));
    }

    let payload = board_payload(response);
    let columns = payload.get("columns").unwrap_or(payload);

    let lanes = match override_fn {
        Some(normalize) => normalize_arrays((**normalize)(columns).into_iter().collect()),
        None => ColumnsShape::classify(columns)
            .map(ColumnsShape::into_lanes)
            .unwrap_or_default(),
    };

    let project_id = envelope_field(response, payload, "projectId").and_then(id_from_value);
    let projects = available_projects(envelope_field(response, payload, "availableProjects"));

    Ok(Board::from_lanes(lanes)
        .with_project(project_id)
        .with_available_projects(projects))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
