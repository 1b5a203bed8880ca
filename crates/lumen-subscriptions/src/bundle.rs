//! Notification bundle construction.
//!
//! One status payload per bundle (subscription reference, topic, status,
//! notification type, cumulative event count), then content determined by
//! the subscription's content level: `empty` ships event numbers and
//! timestamps only, `id-only` references focus resources by url, and
//! `full-resource` embeds each distinct referenced resource exactly once.

use crate::subscription::{ContentLevel, ParsedSubscription};
use lumen_core::now_utc;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationType {
    Handshake,
    Heartbeat,
    EventNotification,
    QueryStatus,
    QueryEvent,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Handshake => "handshake",
            Self::Heartbeat => "heartbeat",
            Self::EventNotification => "event-notification",
            Self::QueryStatus => "query-status",
            Self::QueryEvent => "query-event",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build a notification bundle for a set of event numbers.
///
/// With no event numbers given, `query-event` covers every generated event
/// and any other notification type covers only the most recent one.
pub fn build(
    subscription: &ParsedSubscription,
    event_numbers: &[u64],
    notification_type: NotificationType,
    base_url: &str,
    content_override: Option<ContentLevel>,
) -> Value {
    let content_level = content_override.unwrap_or(subscription.content_level);

    let selected: Vec<u64> = if !event_numbers.is_empty() {
        event_numbers.to_vec()
    } else if notification_type == NotificationType::QueryEvent {
        subscription.events.keys().copied().collect()
    } else {
        subscription.events.keys().next_back().copied().into_iter().collect()
    };

    let mut notification_events = Vec::new();
    let mut resource_entries = Vec::new();
    let mut embedded: HashSet<String> = HashSet::new();

    for number in selected {
        let Some(event) = subscription.events.get(&number) else {
            continue;
        };

        let mut entry = json!({
            "eventNumber": number.to_string(),
            "timestamp": event.timestamp.to_string(),
        });

        if content_level != ContentLevel::Empty {
            let focus_url = format!("{base_url}/{}", event.focus.reference());
            entry["focus"] = json!({"reference": focus_url});

            let context_refs: Vec<Value> = event
                .additional_context
                .iter()
                .map(|r| json!({"reference": format!("{base_url}/{}", r.reference())}))
                .collect();
            if !context_refs.is_empty() {
                entry["additionalContext"] = Value::Array(context_refs);
            }

            if content_level == ContentLevel::FullResource {
                for resource in
                    std::iter::once(&event.focus).chain(event.additional_context.iter())
                {
                    if embedded.insert(resource.reference()) {
                        resource_entries.push(json!({
                            "fullUrl": format!("{base_url}/{}", resource.reference()),
                            "resource": resource.as_json(),
                        }));
                    }
                }
            }
        }

        notification_events.push(entry);
    }

    let status = json!({
        "resourceType": "SubscriptionStatus",
        "id": uuid::Uuid::new_v4().to_string(),
        "status": subscription.status.to_string(),
        "type": notification_type.as_str(),
        "eventsSinceSubscriptionStart": subscription.event_count().to_string(),
        "subscription": {"reference": format!("{base_url}/Subscription/{}", subscription.id)},
        "topic": subscription.topic_url,
        "notificationEvent": notification_events,
    });

    let mut entries = vec![json!({
        "fullUrl": format!("urn:uuid:{}", status["id"].as_str().unwrap_or_default()),
        "resource": status,
    })];
    entries.extend(resource_entries);

    json!({
        "resourceType": "Bundle",
        "id": uuid::Uuid::new_v4().to_string(),
        "type": "subscription-notification",
        "timestamp": now_utc().to_string(),
        "entry": entries,
    })
}
