//! Subscription compilation and per-subscription state.

use crate::error::{Result, SubscriptionError};
use lumen_core::{FhirInstant, Resource};
use lumen_search::{ParsedSearchParameter, SearchParameterRegistry};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Amount of resource detail embedded in a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentLevel {
    /// Event numbers and timestamps only; no resource content.
    #[default]
    Empty,
    /// Focus resources referenced by url, not embedded.
    IdOnly,
    /// Each distinct referenced resource embedded exactly once.
    FullResource,
}

impl ContentLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "empty" => Some(Self::Empty),
            "id-only" => Some(Self::IdOnly),
            "full-resource" => Some(Self::FullResource),
            _ => None,
        }
    }
}

impl fmt::Display for ContentLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Empty => "empty",
            Self::IdOnly => "id-only",
            Self::FullResource => "full-resource",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscriptionStatusCode {
    #[default]
    Requested,
    Active,
    Error,
    Off,
}

impl SubscriptionStatusCode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "requested" => Some(Self::Requested),
            "active" => Some(Self::Active),
            "error" => Some(Self::Error),
            "off" => Some(Self::Off),
            _ => None,
        }
    }

    /// Whether this subscription should still receive events.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Requested | Self::Active)
    }
}

impl fmt::Display for SubscriptionStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Requested => "requested",
            Self::Active => "active",
            Self::Error => "error",
            Self::Off => "off",
        };
        f.write_str(s)
    }
}

/// One compiled subscriber filter, optionally scoped to a resource type.
#[derive(Debug, Clone)]
pub struct SubscriptionFilter {
    pub resource_type: Option<String>,
    pub clause: ParsedSearchParameter,
}

/// A generated notification event.
#[derive(Debug, Clone)]
pub struct SubscriptionEvent {
    pub subscription_id: String,
    pub topic_url: String,
    pub event_number: u64,
    pub focus: Resource,
    pub additional_context: Vec<Resource>,
    pub timestamp: FhirInstant,
}

/// A subscriber's registration against a topic: channel, content level,
/// compiled filters, and the ordered event ledger.
#[derive(Debug, Clone)]
pub struct ParsedSubscription {
    pub id: String,
    pub topic_url: String,
    pub channel_type: String,
    pub endpoint: String,
    pub content_type: String,
    pub content_level: ContentLevel,
    pub status: SubscriptionStatusCode,
    pub filters: Vec<SubscriptionFilter>,
    /// Generated events keyed by strictly increasing event number.
    pub events: BTreeMap<u64, SubscriptionEvent>,
    /// Recorded evaluation errors; never abort the triggering write.
    pub errors: Vec<String>,
    next_event_number: u64,
}

impl ParsedSubscription {
    /// Convert a stored Subscription resource, compiling its `filterBy`
    /// entries through the search parser.
    pub fn from_resource(
        resource: &Resource,
        registry: &SearchParameterRegistry,
    ) -> Result<Self> {
        if resource.id.is_empty() {
            return Err(SubscriptionError::malformed_subscription("missing id"));
        }
        let topic_url = resource
            .field("topic")
            .and_then(Value::as_str)
            .ok_or_else(|| SubscriptionError::malformed_subscription("missing topic"))?
            .to_string();

        let status = resource
            .field("status")
            .and_then(Value::as_str)
            .and_then(SubscriptionStatusCode::parse)
            .unwrap_or_default();

        let channel_type = resource
            .field("channelType")
            .map(|c| match c {
                Value::String(s) => s.clone(),
                other => other
                    .get("code")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
            .unwrap_or_default();

        let endpoint = resource
            .field("endpoint")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let content_type = resource
            .field("contentType")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let content_level = match resource.field("content").and_then(Value::as_str) {
            Some(code) => ContentLevel::parse(code).ok_or_else(|| {
                SubscriptionError::malformed_subscription(format!("unknown content level '{code}'"))
            })?,
            None => ContentLevel::default(),
        };

        let mut filters = Vec::new();
        if let Some(Value::Array(filter_by)) = resource.field("filterBy") {
            for raw in filter_by {
                filters.push(parse_filter(raw, registry)?);
            }
        }

        Ok(Self {
            id: resource.id.clone(),
            topic_url,
            channel_type,
            endpoint,
            content_type,
            content_level,
            status,
            filters,
            events: BTreeMap::new(),
            errors: Vec::new(),
            next_event_number: 0,
        })
    }

    /// Filters applicable to one resource type.
    pub fn filters_for(&self, resource_type: &str) -> Vec<ParsedSearchParameter> {
        self.filters
            .iter()
            .filter(|f| {
                f.resource_type
                    .as_deref()
                    .is_none_or(|t| t == resource_type)
            })
            .map(|f| f.clause.clone())
            .collect()
    }

    /// Allocate the next event number. Strictly increasing, never reused.
    pub fn next_event_number(&mut self) -> u64 {
        self.next_event_number += 1;
        self.next_event_number
    }

    pub fn register_event(&mut self, event: SubscriptionEvent) {
        self.events.insert(event.event_number, event);
    }

    /// Total events generated since the subscription started.
    pub fn event_count(&self) -> u64 {
        self.next_event_number
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }
}

fn parse_filter(
    raw: &Value,
    registry: &SearchParameterRegistry,
) -> Result<SubscriptionFilter> {
    let parameter = raw
        .get("filterParameter")
        .and_then(Value::as_str)
        .ok_or_else(|| SubscriptionError::malformed_subscription("filterBy missing parameter"))?;
    let value = raw
        .get("value")
        .and_then(Value::as_str)
        .ok_or_else(|| SubscriptionError::malformed_subscription("filterBy missing value"))?;
    let resource_type = raw
        .get("resourceType")
        .and_then(Value::as_str)
        .map(str::to_string);

    let name = match raw.get("modifier").and_then(Value::as_str) {
        Some(modifier) => format!("{parameter}:{modifier}"),
        None => parameter.to_string(),
    };
    let value = match raw.get("comparator").and_then(Value::as_str) {
        Some(comparator) => format!("{comparator}{value}"),
        None => value.to_string(),
    };

    let scope = resource_type.as_deref().unwrap_or("Resource");
    let clause = ParsedSearchParameter::parse_single(scope, &name, &value, registry);

    Ok(SubscriptionFilter {
        resource_type,
        clause,
    })
}
