use thiserror::Error;

/// Conversion and registration errors. Malformed topic/subscription
/// resources fail conversion without registering anything; evaluation-time
/// problems are recorded on the owning subscription instead of surfacing
/// here.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("Malformed subscription topic: {0}")]
    MalformedTopic(String),

    #[error("Malformed subscription: {0}")]
    MalformedSubscription(String),

    #[error("Unknown subscription: {0}")]
    UnknownSubscription(String),

    #[error("Unknown topic url: {0}")]
    UnknownTopic(String),

    #[error(transparent)]
    Core(#[from] lumen_core::CoreError),
}

impl SubscriptionError {
    pub fn malformed_topic(message: impl Into<String>) -> Self {
        Self::MalformedTopic(message.into())
    }

    pub fn malformed_subscription(message: impl Into<String>) -> Self {
        Self::MalformedSubscription(message.into())
    }
}

pub type Result<T> = std::result::Result<T, SubscriptionError>;
