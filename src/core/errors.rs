use thiserror::Error;

/// Unified error type for the rollcall library
#[derive(Debug, Error)]
pub enum RollcallError {
    /// A coordination tracker already exists for this execution instance
    #[error("Duplicate execution instance: {execution_id}")]
    DuplicateInstance { execution_id: String },

    /// No coordination tracker exists for this execution instance
    #[error("Unknown execution instance: {execution_id}")]
    UnknownInstance { execution_id: String },

    /// The notification id is not part of the instance roster
    #[error("Unknown notification: {notification_id}")]
    UnknownNotification { notification_id: String },

    /// No sync operation exists with this id
    #[error("Unknown sync operation: {sync_id}")]
    UnknownSync { sync_id: String },

    /// A state machine transition was rejected
    #[error("Invalid transition for {entity_id}: {from} -> {to}")]
    InvalidTransition {
        entity_id: String,
        from: String,
        to: String,
    },

    /// The execution instance is terminal and cannot be mutated
    #[error("Execution instance {execution_id} is closed ({status})")]
    InstanceClosed {
        execution_id: String,
        status: String,
    },

    /// Resource exhaustion errors
    #[error("Resource exhausted: {resource} (current: {current}, limit: {limit})")]
    ResourceExhausted {
        resource: String,
        current: u64,
        limit: u64,
    },

    /// Validation errors (bad roster, bad payload, bad arguments)
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Persistence seam errors
    #[error("Store operation failed: {operation} - {message}")]
    Store {
        operation: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization errors
    #[error("Serialization failed: {format}")]
    Serialization {
        format: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Timeout errors
    #[error("Operation timed out: {operation} (timeout: {timeout_ms}ms)")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl RollcallError {
    pub fn duplicate_instance<S: Into<String>>(execution_id: S) -> Self {
        Self::DuplicateInstance {
            execution_id: execution_id.into(),
        }
    }

    pub fn unknown_instance<S: Into<String>>(execution_id: S) -> Self {
        Self::UnknownInstance {
            execution_id: execution_id.into(),
        }
    }

    pub fn unknown_notification<S: Into<String>>(notification_id: S) -> Self {
        Self::UnknownNotification {
            notification_id: notification_id.into(),
        }
    }

    pub fn unknown_sync<S: Into<String>>(sync_id: S) -> Self {
        Self::UnknownSync {
            sync_id: sync_id.into(),
        }
    }

    pub fn invalid_transition<S: Into<String>, F: Into<String>, T: Into<String>>(
        entity_id: S,
        from: F,
        to: T,
    ) -> Self {
        Self::InvalidTransition {
            entity_id: entity_id.into(),
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn instance_closed<S: Into<String>, T: Into<String>>(execution_id: S, status: T) -> Self {
        Self::InstanceClosed {
            execution_id: execution_id.into(),
            status: status.into(),
        }
    }

    pub fn resource_exhausted<S: Into<String>>(resource: S, current: u64, limit: u64) -> Self {
        Self::ResourceExhausted {
            resource: resource.into(),
            current,
            limit,
        }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            field: None,
        }
    }

    pub fn store<S: Into<String>, M: Into<String>>(operation: S, message: M) -> Self {
        Self::Store {
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn store_with_source<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        operation: S,
        source: E,
    ) -> Self {
        Self::Store {
            operation: operation.into(),
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    pub fn timeout<S: Into<String>>(operation: S, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Whether a fresh attempt at the failed operation is sensible.
    ///
    /// Validation and transition rejections are the caller's bug and are
    /// never retried automatically.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Store { .. } => true,
            // May be recoverable after cleanup
            Self::ResourceExhausted { .. } => true,
            Self::DuplicateInstance { .. }
            | Self::UnknownInstance { .. }
            | Self::UnknownNotification { .. }
            | Self::UnknownSync { .. }
            | Self::InvalidTransition { .. }
            | Self::InstanceClosed { .. }
            | Self::Validation { .. }
            | Self::Configuration { .. } => false,
            _ => false,
        }
    }

    /// Get error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::DuplicateInstance { .. }
            | Self::UnknownInstance { .. }
            | Self::UnknownNotification { .. }
            | Self::UnknownSync { .. }
            | Self::Validation { .. } => "validation",
            Self::InvalidTransition { .. } | Self::InstanceClosed { .. } => "transition",
            Self::ResourceExhausted { .. } => "resource",
            Self::Configuration { .. } => "configuration",
            Self::Store { .. } => "store",
            Self::Serialization { .. } => "serialization",
            Self::Timeout { .. } => "timeout",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, RollcallError>;

impl From<serde_json::Error> for RollcallError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "json".to_string(),
            source: Box::new(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = RollcallError::unknown_instance("exec_1");
        assert!(matches!(err, RollcallError::UnknownInstance { .. }));
        assert_eq!(err.category(), "validation");
    }

    #[test]
    fn test_retryability() {
        assert!(RollcallError::timeout("send", 5000).is_retryable());
        assert!(!RollcallError::duplicate_instance("exec_1").is_retryable());
        assert!(!RollcallError::invalid_transition("sync_1", "synced", "syncing").is_retryable());
    }

    #[test]
    fn test_transition_display() {
        let err = RollcallError::invalid_transition("sync_9", "failed", "syncing");
        assert_eq!(
            err.to_string(),
            "Invalid transition for sync_9: failed -> syncing"
        );
    }
}
