use crate::{
    domain::{column::ColumnKey, ticket::Ticket},
    error::{BoardError, Result},
};
use serde::Serialize;

/// What a column hands out when a ticket card is picked up
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DragPayload {
    pub ticket: Ticket,
    pub from: ColumnKey,
    pub from_id: Option<String>,
}

/// In-flight drag. Lives only between drag-start and drop.
pub type DragContext = DragPayload;

/// Where a ticket was dropped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DropTarget {
    pub key: ColumnKey,
    pub id: Option<String>,
}

impl DropTarget {
    pub fn new(key: ColumnKey) -> Self {
        Self { key, id: None }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Why a drop did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NoActiveDrag,
    SameColumn,
    ReadOnly,
}

/// Result of handling a drop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome {
    /// Nothing happened and no error was raised
    Ignored(IgnoreReason),
    /// The move broke the forward-only rule; the adapter was not called
    Rejected(String),
    /// The adapter failed
    Failed(String),
    /// The ticket moved and the board was reloaded
    Moved { from: ColumnKey, to: ColumnKey },
}

/// Validates a lane transition: only strictly forward moves are allowed
pub fn check_forward_move(from: ColumnKey, to: ColumnKey) -> Result<()> {
    if from.is_forward_to(to) {
        Ok(())
    } else {
        Err(BoardError::BackwardMove {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
