use thiserror::Error;

pub type Result<T> = std::result::Result<T, BoardError>;

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Tickets can only move forward")]
    BackwardMove { from: String, to: String },

    #[error("Ticket is missing an identifier")]
    MissingTicketId,

    #[error("Invalid board response: {0}")]
    InvalidResponse(String),

    #[error("Invalid project id: {0:?}")]
    InvalidProjectId(String),

    #[error("Board not found for project {0}")]
    BoardNotFound(String),

    #[error("Ticket not found: {0}")]
    TicketNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[cfg(feature = "rest-adapter")]
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}
