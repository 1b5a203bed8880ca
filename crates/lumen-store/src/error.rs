use http::StatusCode;
use thiserror::Error;

/// Store operation errors. These carry the data-shape outcome of an
/// operation; the facade maps them onto response envelopes. Host-level
/// failures are the only thing treated as internal.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Resource not found: {resource_type}/{id}")]
    NotFound { resource_type: String, id: String },

    #[error("Resource already exists: {resource_type}/{id}")]
    Conflict { resource_type: String, id: String },

    #[error("Resource type mismatch: endpoint {expected}, payload {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Resource id is required")]
    MissingId,

    #[error("Invalid resource id: {0}")]
    InvalidId(String),

    #[error("Multiple matches for conditional operation")]
    MultipleMatches,

    #[error(transparent)]
    Core(#[from] lumen_core::CoreError),
}

impl StoreError {
    pub fn not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    pub fn conflict(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Conflict {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// HTTP status this error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::TypeMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::MissingId | Self::InvalidId(_) => StatusCode::BAD_REQUEST,
            Self::MultipleMatches => StatusCode::PRECONDITION_FAILED,
            Self::Core(core) => match core {
                lumen_core::CoreError::UnsupportedMediaType(_) => {
                    StatusCode::UNSUPPORTED_MEDIA_TYPE
                }
                e if e.is_client_error() => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Outcome issue code for the response body.
    pub fn outcome_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not-found",
            Self::Conflict { .. } => "duplicate",
            Self::TypeMismatch { .. } => "invalid",
            Self::MissingId | Self::InvalidId(_) => "invalid",
            Self::MultipleMatches => "multiple-matches",
            Self::Core(e) if e.is_client_error() => "invalid",
            Self::Core(_) => "exception",
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            StoreError::not_found("Patient", "x").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            StoreError::conflict("Patient", "x").status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            StoreError::type_mismatch("Patient", "Observation").status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(StoreError::MissingId.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            StoreError::MultipleMatches.status_code(),
            StatusCode::PRECONDITION_FAILED
        );
        assert_eq!(
            StoreError::Core(lumen_core::CoreError::unsupported_media_type("x")).status_code(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            StoreError::Core(lumen_core::CoreError::configuration("x")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn outcome_codes() {
        assert_eq!(StoreError::not_found("Patient", "x").outcome_code(), "not-found");
        assert_eq!(StoreError::MultipleMatches.outcome_code(), "multiple-matches");
    }
}
