//! Error types for the attendance bridge

use thiserror::Error;

use crate::types::EntityKind;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Main error type for the attendance bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Source store error: {0}")]
    Store(String),

    #[error("Remote service error: {0}")]
    Remote(String),

    #[error("HTTP request error: {0}")]
    #[cfg(feature = "rpc")]
    Http(#[from] reqwest::Error),

    #[error("Unresolved {kind} reference: {key}")]
    UnresolvedReference { kind: EntityKind, key: String },

    #[error("Time zone not found in remote catalog: {0}")]
    TimeZoneNotFound(String),

    #[error("Pagination stalled at cursor {cursor}")]
    PaginationStalled { cursor: i64 },

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether the failure came from talking to the workforce service
    pub fn is_remote(&self) -> bool {
        #[cfg(feature = "rpc")]
        if matches!(self, BridgeError::Http(_)) {
            return true;
        }
        matches!(self, BridgeError::Remote(_))
    }

    /// Process exit code for the CLI
    pub fn code(&self) -> i32 {
        match self {
            BridgeError::Config(_) | BridgeError::Settings(_) => 2,
            BridgeError::Database(_)
            | BridgeError::Store(_)
            | BridgeError::PaginationStalled { .. } => 3,
            BridgeError::UnresolvedReference { .. } | BridgeError::TimeZoneNotFound(_) => 4,
            _ if self.is_remote() => 5,
            _ => 1,
        }
    }
}
