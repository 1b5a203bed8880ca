//! Topic compilation.
//!
//! A stored SubscriptionTopic resource converts into a `ParsedTopic`:
//! per-resource-type triggers with interaction flags and a compiled boolean
//! criteria expression. Conversion failures reject the whole topic —
//! nothing half-registers.

use crate::engine::MutationKind;
use crate::error::{Result, SubscriptionError};
use lumen_core::{CompiledPath, Resource};
use serde_json::Value;

/// One resource-type trigger of a topic.
#[derive(Debug, Clone)]
pub struct ResourceTrigger {
    pub resource_type: String,
    pub on_create: bool,
    pub on_update: bool,
    pub on_delete: bool,
    /// Compiled boolean criteria over `%current`/`%previous`. Absent means
    /// the auto flags decide.
    pub criteria: Option<CompiledPath>,
    /// Without a criteria result, does the trigger pass?
    pub auto_pass: bool,
    /// Explicit fail override (`resultForDelete = test-fails` and friends).
    pub auto_fail: bool,
}

impl ResourceTrigger {
    pub fn applies_to(&self, kind: MutationKind) -> bool {
        match kind {
            MutationKind::Create => self.on_create,
            MutationKind::Update => self.on_update,
            MutationKind::Delete => self.on_delete,
        }
    }
}

/// A compiled topic: reusable definition of interesting resource changes.
#[derive(Debug, Clone)]
pub struct ParsedTopic {
    pub id: String,
    pub url: String,
    pub triggers: Vec<ResourceTrigger>,
}

impl ParsedTopic {
    /// Convert a stored SubscriptionTopic resource.
    pub fn from_resource(resource: &Resource) -> Result<Self> {
        if resource.id.is_empty() {
            return Err(SubscriptionError::malformed_topic("missing id"));
        }
        let url = resource
            .field("url")
            .and_then(Value::as_str)
            .ok_or_else(|| SubscriptionError::malformed_topic("missing url"))?
            .to_string();

        let raw_triggers = match resource.field("resourceTrigger") {
            Some(Value::Array(items)) => items.as_slice(),
            Some(_) => {
                return Err(SubscriptionError::malformed_topic(
                    "resourceTrigger is not an array",
                ));
            }
            None => &[],
        };

        let mut triggers = Vec::with_capacity(raw_triggers.len());
        for raw in raw_triggers {
            triggers.push(parse_trigger(raw)?);
        }

        Ok(Self {
            id: resource.id.clone(),
            url,
            triggers,
        })
    }

    /// Triggers applicable to one resource type and mutation kind.
    pub fn triggers_for(
        &self,
        resource_type: &str,
        kind: MutationKind,
    ) -> impl Iterator<Item = &ResourceTrigger> {
        self.triggers
            .iter()
            .filter(move |t| t.resource_type == resource_type && t.applies_to(kind))
    }
}

fn parse_trigger(raw: &Value) -> Result<ResourceTrigger> {
    let resource_type = raw
        .get("resource")
        .and_then(Value::as_str)
        .ok_or_else(|| SubscriptionError::malformed_topic("trigger missing resource"))?
        .to_string();

    let interactions: Vec<&str> = match raw.get("supportedInteraction") {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        // Absent means the trigger covers every interaction.
        _ => vec!["create", "update", "delete"],
    };

    let criteria = match raw.get("fhirPathCriteria").and_then(Value::as_str) {
        Some(expr) => Some(
            CompiledPath::compile(expr)
                .map_err(|e| SubscriptionError::malformed_topic(e.to_string()))?,
        ),
        None => None,
    };

    let query = raw.get("queryCriteria");
    let auto_pass = query
        .and_then(|q| q.get("resultForCreate"))
        .and_then(Value::as_str)
        != Some("test-fails");
    let auto_fail = query
        .and_then(|q| q.get("resultForDelete"))
        .and_then(Value::as_str)
        == Some("test-fails");

    Ok(ResourceTrigger {
        resource_type,
        on_create: interactions.contains(&"create"),
        on_update: interactions.contains(&"update"),
        on_delete: interactions.contains(&"delete"),
        criteria,
        auto_pass,
        auto_fail,
    })
}
