use thiserror::Error;

/// Error type for search parameter registration and parsing.
///
/// Note that predicate *evaluation* never returns these: per the fail-closed
/// contract, an unknown parameter or unsupported modifier combination simply
/// evaluates false.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Unknown search parameter {param} on {resource_type}")]
    UnknownParameter {
        param: String,
        resource_type: String,
    },

    #[error("Invalid _has parameter: {0}")]
    InvalidHas(String),

    #[error("Parameter {0} is not a reference type")]
    NotReferenceType(String),

    #[error("Composite component '{component}' of {param} is not registered")]
    UnknownComponent { param: String, component: String },

    #[error("Invalid search parameter definition: {0}")]
    InvalidDefinition(String),

    #[error(transparent)]
    Core(#[from] lumen_core::CoreError),
}

impl SearchError {
    pub fn unknown_parameter(param: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self::UnknownParameter {
            param: param.into(),
            resource_type: resource_type.into(),
        }
    }

    pub fn unknown_component(param: impl Into<String>, component: impl Into<String>) -> Self {
        Self::UnknownComponent {
            param: param.into(),
            component: component.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
