//! Error types for the Scout engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A shared error type for the entire Scout engine.
///
/// This provides typed, structured error variants with automatic conversion
/// from common error types via the `From` trait.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum ScoutError {
    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound { entity_type: String, id: String },

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Feedback/storage access error (event log or config storage)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization {
        format: String, // "TOML", "JSON", etc.
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The nearest-neighbor index (or the embedding call feeding it) is unreachable
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// An external tool call exceeded its deadline
    #[error("Tool '{tool}' timed out after {elapsed_ms}ms")]
    ToolTimeout { tool: String, elapsed_ms: u64 },

    /// An external tool call failed outright
    #[error("Tool '{tool}' failed: {message}")]
    ToolFailed { tool: String, message: String },

    /// A second query arrived for a session that already has one in flight
    #[error("Session '{0}' is busy with another query")]
    SessionBusy(String),

    /// The text-generation tool returned something outside the closed action set
    #[error("Malformed action from generator: {0}")]
    MalformedAction(String),

    /// The caller cancelled the query before it completed
    #[error("Query cancelled for session '{0}'")]
    Cancelled(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScoutError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a NotFound error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a Storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a RetrievalUnavailable error
    pub fn retrieval_unavailable(message: impl Into<String>) -> Self {
        Self::RetrievalUnavailable(message.into())
    }

    /// Creates a ToolTimeout error
    pub fn tool_timeout(tool: impl Into<String>, elapsed_ms: u64) -> Self {
        Self::ToolTimeout {
            tool: tool.into(),
            elapsed_ms,
        }
    }

    /// Creates a ToolFailed error
    pub fn tool_failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a Storage error
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Check if this is a SessionBusy error
    pub fn is_session_busy(&self) -> bool {
        matches!(self, Self::SessionBusy(_))
    }

    /// Check if this error should be surfaced to the reasoning step as a
    /// failed observation rather than aborting the request.
    ///
    /// Covers index unavailability, tool timeouts and plain tool failures;
    /// storage and protocol errors stay request-level.
    pub fn is_tool_level(&self) -> bool {
        matches!(
            self,
            Self::RetrievalUnavailable(_) | Self::ToolTimeout { .. } | Self::ToolFailed { .. }
        )
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for ScoutError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for ScoutError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for ScoutError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for ScoutError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// Conversion from anyhow::Error (transitional, should be removed eventually)
impl From<anyhow::Error> for ScoutError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Conversion from String (for error messages)
impl From<String> for ScoutError {
    fn from(err: String) -> Self {
        Self::Internal(err)
    }
}

/// A type alias for `Result<T, ScoutError>`.
pub type Result<T> = std::result::Result<T, ScoutError>;
