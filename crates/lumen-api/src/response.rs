use crate::outcome::OperationOutcome;
use http::StatusCode;
use lumen_core::FhirInstant;

/// Response envelope produced by store dispatch: status, serialized bodies,
/// and the version headers.
#[derive(Debug, Clone)]
pub struct FhirResponse {
    pub success: bool,
    pub status: StatusCode,
    /// Serialized resource or bundle body.
    pub resource: Option<String>,
    /// Serialized operation outcome.
    pub outcome: Option<String>,
    /// Weak validator, `W/"<version>"`.
    pub etag: Option<String>,
    /// HTTP date of the last write.
    pub last_modified: Option<String>,
    /// `Type/id` of the affected resource.
    pub location: Option<String>,
}

impl FhirResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            success: status.is_success() || status == StatusCode::NOT_MODIFIED,
            status,
            resource: None,
            outcome: None,
            etag: None,
            last_modified: None,
            location: None,
        }
    }

    /// A failure response with a populated outcome body; failures never ship
    /// an empty body.
    pub fn failure(status: StatusCode, outcome: OperationOutcome) -> Self {
        Self::new(status).with_outcome(outcome)
    }

    #[must_use]
    pub fn with_resource(mut self, body: impl Into<String>) -> Self {
        self.resource = Some(body.into());
        self
    }

    #[must_use]
    pub fn with_outcome(mut self, outcome: OperationOutcome) -> Self {
        self.outcome = Some(outcome.to_json_string());
        self
    }

    #[must_use]
    pub fn with_etag_weak(mut self, version: impl Into<String>) -> Self {
        self.etag = Some(format!("W/\"{}\"", version.into()));
        self
    }

    #[must_use]
    pub fn with_last_modified(mut self, instant: &FhirInstant) -> Self {
        self.last_modified = Some(instant.to_http_date());
        self
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}
