pub mod board;
pub mod column;
pub mod drag;
pub mod ticket;

pub use board::{Board, Lane};
pub use column::{ColumnKey, StatusMap};
pub use drag::{check_forward_move, DragContext, DragPayload, DropOutcome, DropTarget, IgnoreReason};
pub use ticket::{Project, Ticket, TicketId};
