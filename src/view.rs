//! Framework-neutral view model of the board.
//!
//! A UI layer draws a [`BoardView`]; when the user picks up a card it asks the
//! [`ColumnView`] for a [`DragPayload`], and when the card lands it hands the
//! column's [`DropTarget`] back to the controller.

use crate::domain::{
    column::ColumnKey,
    drag::{DragPayload, DropTarget},
    ticket::{Project, Ticket},
};
use std::fmt;

/// Turns a ticket into whatever the host UI displays for it
pub trait TicketRenderer: Send + Sync {
    fn render(&self, ticket: &Ticket) -> String;
}

/// `#<id> <title>` plus priority when the record has one
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTicketCard;

impl TicketRenderer for DefaultTicketCard {
    fn render(&self, ticket: &Ticket) -> String {
        match ticket.field("priority").and_then(|p| p.as_str()) {
            Some(priority) => format!("#{} {} [{}]", ticket.id(), ticket.title(), priority),
            None => format!("#{} {}", ticket.id(), ticket.title()),
        }
    }
}

impl<F> TicketRenderer for F
where
    F: Fn(&Ticket) -> String + Send + Sync,
{
    fn render(&self, ticket: &Ticket) -> String {
        self(ticket)
    }
}

/// A rendered card and the ticket behind it
#[derive(Debug, Clone, PartialEq)]
pub struct TicketCard {
    pub ticket: Ticket,
    pub content: String,
}

/// One lane as the UI sees it. Holds no state of its own.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnView {
    pub key: ColumnKey,
    pub id: Option<String>,
    pub title: String,
    pub cards: Vec<TicketCard>,
    pub draggable: bool,
}

impl ColumnView {
    /// Payload for picking up the card at `index`. `None` when dragging is
    /// disabled or the index is out of range.
    pub fn drag_payload(&self, index: usize) -> Option<DragPayload> {
        if !self.draggable {
            return None;
        }
        self.cards.get(index).map(|card| DragPayload {
            ticket: card.ticket.clone(),
            from: self.key,
            from_id: self.id.clone(),
        })
    }

    /// Target describing a drop onto this column
    pub fn drop_target(&self) -> DropTarget {
        DropTarget {
            key: self.key,
            id: self.id.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

/// Header buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolbarAction {
    CreateBoard,
    AddModule,
    AddTicket,
    ColumnSettings,
    Refresh,
}

impl ToolbarAction {
    pub fn label(self) -> &'static str {
        match self {
            Self::CreateBoard => "Create Board",
            Self::AddModule => "Add Module",
            Self::AddTicket => "Add Ticket",
            Self::ColumnSettings => "Column Settings",
            Self::Refresh => "Refresh",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectSelector {
    pub options: Vec<Project>,
    pub selected: Option<String>,
}

/// Snapshot of everything the board displays
#[derive(Debug, Clone, PartialEq)]
pub struct BoardView {
    pub title: String,
    pub description: Option<String>,
    pub project_selector: Option<ProjectSelector>,
    pub actions: Vec<ToolbarAction>,
    pub loading: bool,
    pub error: Option<String>,
    pub columns: Vec<ColumnView>,
}

impl BoardView {
    pub fn column(&self, key: ColumnKey) -> Option<&ColumnView> {
        self.columns.iter().find(|column| column.key == key)
    }

    pub fn column_keys(&self) -> Vec<ColumnKey> {
        self.columns.iter().map(|column| column.key).collect()
    }
}

impl fmt::Display for BoardView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        if let Some(description) = &self.description {
            writeln!(f, "{}", description)?;
        }
        if let Some(selector) = &self.project_selector {
            let current = selector
                .selected
                .as_deref()
                .and_then(|id| selector.options.iter().find(|p| p.id == id))
                .map(|p| p.name.as_str())
                .unwrap_or("-");
            writeln!(f, "Project: {}", current)?;
        }
        if !self.actions.is_empty() {
            let labels: Vec<String> = self
                .actions
                .iter()
                .map(|action| format!("[{}]", action.label()))
                .collect();
            writeln!(f, "{}", labels.join(" "))?;
        }
        if self.loading {
            writeln!(f, "Loading...")?;
        }
        if let Some(error) = &self.error {
            writeln!(f, "Error: {}", error)?;
        }
        for column in &self.columns {
            writeln!(f, "== {} ({})", column.title, column.len())?;
            for card in &column.cards {
                writeln!(f, "  {}", card.content)?;
            }
        }
        Ok(())
    }
}
