//! # Kanban Board
//!
//! Headless controller for a five-lane kanban board.
//!
//! The crate owns board state, normalizes the board payloads different
//! backends return, enforces forward-only lane moves and reloads on push
//! events. Persistence is delegated to caller-supplied adapters, and the UI
//! layer draws the framework-neutral [`view::BoardView`].

pub mod adapters;
pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod events;
pub mod normalize;
pub mod permissions;
pub mod view;

// Re-export commonly used types
pub use adapters::{BoardSource, EventSubscriber, MoveRequest, ProjectLoader, TicketMover};
pub use config::{BoardConfig, ToolbarConfig};
pub use controller::{BoardCallbacks, BoardState, KanbanBoard, KanbanBoardBuilder, NoCallbacks};
pub use domain::{
    board::{Board, Lane},
    column::{ColumnKey, StatusMap},
    drag::{DragContext, DragPayload, DropOutcome, DropTarget, IgnoreReason},
    ticket::{Project, Ticket, TicketId},
};
pub use error::{BoardError, Result};
pub use events::{BoardEvent, LocalEventHub, SseParams, Subscription, SubscriptionParams};
pub use permissions::{AllowAll, Permissions, Role};
pub use view::{BoardView, ColumnView, DefaultTicketCard, TicketRenderer, ToolbarAction};
