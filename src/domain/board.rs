use crate::domain::{
    column::ColumnKey,
    ticket::{Project, Ticket, TicketId},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One lane of the board: the backend column id (when known) and its tickets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lane {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub tickets: Vec<Ticket>,
}

impl Lane {
    pub fn new(id: Option<String>, tickets: Vec<Ticket>) -> Self {
        Self { id, tickets }
    }
}

/// Kanban board contents for a single project.
///
/// Every [`ColumnKey`] is always present, possibly with an empty lane.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    columns: BTreeMap<ColumnKey, Lane>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub available_projects: Vec<Project>,
}

impl Board {
    /// Creates a board with all lanes empty
    pub fn empty() -> Self {
        Self::from_lanes(BTreeMap::new())
    }

    /// Creates a board from normalized lanes, filling in missing keys
    pub fn from_lanes(mut lanes: BTreeMap<ColumnKey, Lane>) -> Self {
        for key in ColumnKey::ALL {
            lanes.entry(key).or_default();
        }
        Self {
            columns: lanes,
            project_id: None,
            available_projects: Vec::new(),
        }
    }

    pub fn with_project(mut self, project_id: Option<String>) -> Self {
        self.project_id = project_id;
        self
    }

    pub fn with_available_projects(mut self, projects: Vec<Project>) -> Self {
        self.available_projects = projects;
        self
    }

    pub fn lane(&self, key: ColumnKey) -> &Lane {
        // from_lanes guarantees every key is present
        &self.columns[&key]
    }

    pub fn tickets(&self, key: ColumnKey) -> &[Ticket] {
        &self.lane(key).tickets
    }

    pub fn column_id(&self, key: ColumnKey) -> Option<&str> {
        self.lane(key).id.as_deref()
    }

    /// Lanes in workflow order
    pub fn lanes(&self) -> impl Iterator<Item = (ColumnKey, &Lane)> {
        self.columns.iter().map(|(key, lane)| (*key, lane))
    }

    pub fn total_tickets(&self) -> usize {
        self.columns.values().map(|lane| lane.tickets.len()).sum()
    }

    /// Finds the lane currently holding a ticket
    pub fn find_ticket(&self, id: &TicketId) -> Option<(ColumnKey, &Ticket)> {
        self.lanes().find_map(|(key, lane)| {
            lane.tickets
                .iter()
                .find(|ticket| ticket.id() == id)
                .map(|ticket| (key, ticket))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.total_tickets() == 0
    }

    /// Removes a ticket from a lane, returning it if it was there
    pub fn take_ticket(&mut self, key: ColumnKey, id: &TicketId) -> Option<Ticket> {
        let lane = self.columns.get_mut(&key)?;
        let pos = lane.tickets.iter().position(|ticket| ticket.id() == id)?;
        Some(lane.tickets.remove(pos))
    }

    /// Appends a ticket to the end of a lane
    pub fn push_ticket(&mut self, key: ColumnKey, ticket: Ticket) {
        self.columns.entry(key).or_default().tickets.push(ticket);
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::empty()
    }
}
