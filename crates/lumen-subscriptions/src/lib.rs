pub mod bundle;
pub mod engine;
pub mod error;
pub mod subscription;
pub mod topic;

pub use bundle::NotificationType;
pub use engine::{MutationKind, SubscriptionEngine};
pub use error::{Result, SubscriptionError};
pub use subscription::{
    ContentLevel, ParsedSubscription, SubscriptionEvent, SubscriptionFilter, SubscriptionStatusCode,
};
pub use topic::{ParsedTopic, ResourceTrigger};
