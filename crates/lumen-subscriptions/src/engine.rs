//! The subscription engine.
//!
//! Holds compiled topics and subscriptions and evaluates every store
//! mutation against them: build a `%current`/`%previous` context, fire the
//! applicable triggers, test each subscriber's filters, and append exactly
//! one event per interested subscriber per mutation. Evaluation problems
//! are recorded on the owning subscription and never fail the write.

use crate::error::Result;
use crate::subscription::{ParsedSubscription, SubscriptionEvent};
use crate::topic::ParsedTopic;
use dashmap::DashMap;
use lumen_core::{EvalContext, Resource, now_utc};
use lumen_search::parser::ClauseKind;
use lumen_search::{
    ReferenceResolver, SearchParameterRegistry, SearchPredicateEngine, UnitConversionTable,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// The kind of store mutation being evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

pub struct SubscriptionEngine {
    registry: Arc<SearchParameterRegistry>,
    units: Arc<UnitConversionTable>,
    /// Compiled topics by canonical url.
    topics: DashMap<String, Arc<ParsedTopic>>,
    /// Topic url by defining resource id, for lock-step removal.
    topic_urls_by_id: DashMap<String, String>,
    /// Subscriptions by id.
    subscriptions: DashMap<String, ParsedSubscription>,
}

impl SubscriptionEngine {
    pub fn new(registry: Arc<SearchParameterRegistry>, units: Arc<UnitConversionTable>) -> Self {
        Self {
            registry,
            units,
            topics: DashMap::new(),
            topic_urls_by_id: DashMap::new(),
            subscriptions: DashMap::new(),
        }
    }

    /// Compile and register a SubscriptionTopic resource. Malformed topics
    /// fail without registering anything.
    pub fn register_topic(&self, resource: &Resource) -> Result<()> {
        let topic = ParsedTopic::from_resource(resource).inspect_err(|e| {
            warn!(id = %resource.id, error = %e, "rejected subscription topic");
        })?;
        debug!(url = %topic.url, triggers = topic.triggers.len(), "registered topic");
        self.topic_urls_by_id
            .insert(topic.id.clone(), topic.url.clone());
        self.topics.insert(topic.url.clone(), Arc::new(topic));
        Ok(())
    }

    /// Remove the topic registered by a given resource id.
    pub fn remove_topic(&self, resource_id: &str) -> bool {
        match self.topic_urls_by_id.remove(resource_id) {
            Some((_, url)) => self.topics.remove(&url).is_some(),
            None => false,
        }
    }

    /// Compile and register a Subscription resource. A re-registration
    /// (update) keeps the existing event ledger so event numbers never
    /// restart.
    pub fn register_subscription(&self, resource: &Resource) -> Result<()> {
        let mut subscription = ParsedSubscription::from_resource(resource, &self.registry)
            .inspect_err(|e| {
                warn!(id = %resource.id, error = %e, "rejected subscription");
            })?;
        if let Some((_, previous)) = self.subscriptions.remove(&subscription.id) {
            let count = previous.event_count();
            subscription.events = previous.events;
            subscription.errors = previous.errors;
            while subscription.event_count() < count {
                subscription.next_event_number();
            }
        }
        debug!(id = %subscription.id, topic = %subscription.topic_url, "registered subscription");
        self.subscriptions
            .insert(subscription.id.clone(), subscription);
        Ok(())
    }

    pub fn remove_subscription(&self, id: &str) -> bool {
        self.subscriptions.remove(id).is_some()
    }

    pub fn subscription(&self, id: &str) -> Option<ParsedSubscription> {
        self.subscriptions.get(id).map(|s| s.clone())
    }

    pub fn has_topic(&self, url: &str) -> bool {
        self.topics.contains_key(url)
    }

    /// Build a notification bundle for a subscription. Event-number
    /// defaulting follows `bundle::build`.
    pub fn build_notification(
        &self,
        subscription_id: &str,
        event_numbers: &[u64],
        notification_type: crate::bundle::NotificationType,
        base_url: &str,
        content_override: Option<crate::subscription::ContentLevel>,
    ) -> Result<serde_json::Value> {
        let subscription = self.subscription(subscription_id).ok_or_else(|| {
            crate::error::SubscriptionError::UnknownSubscription(subscription_id.to_string())
        })?;
        Ok(crate::bundle::build(
            &subscription,
            event_numbers,
            notification_type,
            base_url,
            content_override,
        ))
    }

    /// Record an evaluation error against one subscription.
    pub fn record_error(&self, subscription_id: &str, message: impl Into<String>) {
        if let Some(mut subscription) = self.subscriptions.get_mut(subscription_id) {
            let message = message.into();
            warn!(id = %subscription_id, error = %message, "subscription error");
            subscription.record_error(message);
        }
    }

    /// Evaluate a create against all topics.
    pub fn on_create(&self, current: &Resource, resolver: &dyn ReferenceResolver) {
        self.evaluate(MutationKind::Create, current, Some(current), None, resolver);
    }

    /// Evaluate an update. Without a previous snapshot the mutation counts
    /// as a create for trigger purposes.
    pub fn on_update(
        &self,
        current: &Resource,
        previous: Option<&Resource>,
        resolver: &dyn ReferenceResolver,
    ) {
        match previous {
            Some(previous) => self.evaluate(
                MutationKind::Update,
                current,
                Some(current),
                Some(previous),
                resolver,
            ),
            None => self.on_create(current, resolver),
        }
    }

    /// Evaluate a delete against the removed snapshot.
    pub fn on_delete(&self, previous: &Resource, resolver: &dyn ReferenceResolver) {
        self.evaluate(MutationKind::Delete, previous, None, Some(previous), resolver);
    }

    fn evaluate(
        &self,
        kind: MutationKind,
        focus: &Resource,
        current: Option<&Resource>,
        previous: Option<&Resource>,
        resolver: &dyn ReferenceResolver,
    ) {
        if self.topics.is_empty() {
            return;
        }

        let focus_json = focus.as_json();
        let current_json = current.map(Resource::as_json);
        let previous_json = previous.map(Resource::as_json);
        let ctx = EvalContext::new()
            .with_var("current", current_json.as_ref())
            .with_var("previous", previous_json.as_ref());

        let topics: Vec<Arc<ParsedTopic>> =
            self.topics.iter().map(|entry| entry.value().clone()).collect();
        let engine = SearchPredicateEngine::new(&self.registry, &self.units);
        // At most one notification per subscription per mutation, no matter
        // how many triggers fire.
        let mut notified: HashSet<String> = HashSet::new();

        for topic in &topics {
            for trigger in topic.triggers_for(focus.type_name(), kind) {
                let fired = match &trigger.criteria {
                    Some(criteria) => criteria.evaluate_bool(&focus_json, &ctx),
                    None => trigger.auto_pass && !trigger.auto_fail,
                };
                if !fired {
                    continue;
                }

                let subscriber_ids: Vec<String> = self
                    .subscriptions
                    .iter()
                    .filter(|s| s.topic_url == topic.url && s.status.is_live())
                    .map(|s| s.id.clone())
                    .collect();

                for id in subscriber_ids {
                    if notified.contains(&id) {
                        continue;
                    }
                    let Some(filters) = self
                        .subscriptions
                        .get(&id)
                        .map(|s| s.filters_for(focus.type_name()))
                    else {
                        continue;
                    };

                    if filters
                        .iter()
                        .any(|f| matches!(f.kind, ClauseKind::Unknown))
                    {
                        self.record_error(&id, format!("unsupported filter on {}", focus.type_name()));
                        continue;
                    }

                    // An empty filter list matches unconditionally.
                    let matched = filters.is_empty()
                        || engine.test_for_match(focus, &filters, resolver).matched;
                    if !matched {
                        continue;
                    }

                    notified.insert(id.clone());
                    if let Some(mut subscription) = self.subscriptions.get_mut(&id) {
                        let event_number = subscription.next_event_number();
                        debug!(
                            subscription = %id,
                            topic = %topic.url,
                            event_number,
                            focus = %focus.reference(),
                            "subscription event"
                        );
                        subscription.register_event(SubscriptionEvent {
                            subscription_id: id.clone(),
                            topic_url: topic.url.clone(),
                            event_number,
                            focus: focus.clone(),
                            additional_context: Vec::new(),
                            timestamp: now_utc(),
                        });
                    }
                }
            }
        }
    }
}
