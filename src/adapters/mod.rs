use crate::{
    domain::{
        column::{ColumnKey, StatusMap},
        drag::DragContext,
        ticket::{Project, Ticket},
    },
    events::{Subscription, SubscriptionParams},
};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

#[cfg(feature = "file-adapter")]
pub mod file_adapter;

#[cfg(feature = "rest-adapter")]
pub mod rest_adapter;

/// Everything a ticket mover needs to persist a lane change
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub ticket: Ticket,
    pub from_key: ColumnKey,
    pub to_key: ColumnKey,
    pub project_id: Option<String>,
    /// The drag that produced this move
    pub context: DragContext,
    /// Backend column id of the drop target, when known
    pub to_id: Option<String>,
    pub status_map: StatusMap,
}

impl MoveRequest {
    /// Status string the ticket should carry after the move
    pub fn target_status(&self) -> &str {
        self.status_map.status_for(self.to_key)
    }
}

/// Loads the raw board payload for a project (or the user's default board)
#[async_trait]
pub trait BoardSource: Send + Sync {
    async fn fetch_board(&self, project_id: Option<&str>) -> anyhow::Result<Value>;
}

/// Persists a ticket's move to another lane
#[async_trait]
pub trait TicketMover: Send + Sync {
    async fn move_ticket(&self, request: &MoveRequest) -> anyhow::Result<()>;
}

/// Lists the projects the board can be scoped to
#[async_trait]
pub trait ProjectLoader: Send + Sync {
    async fn load_projects(&self) -> anyhow::Result<Vec<Project>>;
}

/// Opens a push-event stream for the given parameters
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    async fn subscribe(&self, params: &SubscriptionParams) -> anyhow::Result<Subscription>;
}
