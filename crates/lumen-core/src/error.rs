use thiserror::Error;

/// Core error types for Lumen operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid resource type: {0}")]
    InvalidResourceType(String),

    #[error("Invalid resource id: {0}")]
    InvalidId(String),

    #[error("Invalid instant: {0}")]
    InvalidInstant(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Resource not found: {resource_type}/{id}")]
    ResourceNotFound { resource_type: String, id: String },

    #[error("Resource conflict: {resource_type}/{id} already exists")]
    ResourceConflict { resource_type: String, id: String },

    #[error("Resource type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Invalid resource data: {message}")]
    InvalidResource { message: String },

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Invalid path expression '{expression}': {message}")]
    Expression { expression: String, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    /// Create a new InvalidResourceType error
    pub fn invalid_resource_type(resource_type: impl Into<String>) -> Self {
        Self::InvalidResourceType(resource_type.into())
    }

    /// Create a new InvalidId error
    pub fn invalid_id(id: impl Into<String>) -> Self {
        Self::InvalidId(id.into())
    }

    /// Create a new InvalidInstant error
    pub fn invalid_instant(instant: impl Into<String>) -> Self {
        Self::InvalidInstant(instant.into())
    }

    /// Create a new ResourceNotFound error
    pub fn resource_not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::ResourceNotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Create a new ResourceConflict error
    pub fn resource_conflict(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::ResourceConflict {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Create a new TypeMismatch error
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create a new InvalidResource error
    pub fn invalid_resource(message: impl Into<String>) -> Self {
        Self::InvalidResource {
            message: message.into(),
        }
    }

    /// Create a new UnsupportedMediaType error
    pub fn unsupported_media_type(content_type: impl Into<String>) -> Self {
        Self::UnsupportedMediaType(content_type.into())
    }

    /// Create a new Expression error
    pub fn expression(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Expression {
            expression: expression.into(),
            message: message.into(),
        }
    }

    /// Create a new Configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Check if this error is a client error (4xx category)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidResourceType(_)
                | Self::InvalidId(_)
                | Self::InvalidInstant(_)
                | Self::InvalidResource { .. }
                | Self::ResourceNotFound { .. }
                | Self::ResourceConflict { .. }
                | Self::TypeMismatch { .. }
                | Self::UnsupportedMediaType(_)
                | Self::JsonError(_)
        )
    }

    /// Check if this error is a server error (5xx category)
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Get error category for logging/monitoring
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidResourceType(_)
            | Self::InvalidId(_)
            | Self::InvalidInstant(_)
            | Self::InvalidResource { .. }
            | Self::TypeMismatch { .. } => ErrorCategory::Validation,
            Self::ResourceNotFound { .. } => ErrorCategory::NotFound,
            Self::ResourceConflict { .. } => ErrorCategory::Conflict,
            Self::UnsupportedMediaType(_) | Self::JsonError(_) => ErrorCategory::Serialization,
            Self::Expression { .. } => ErrorCategory::Unsupported,
            Self::Configuration(_) => ErrorCategory::Configuration,
        }
    }
}

/// Error categories for monitoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Conflict,
    Serialization,
    Unsupported,
    Configuration,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Serialization => write!(f, "serialization"),
            Self::Unsupported => write!(f, "unsupported"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
