//! Authorization narrowing.
//!
//! Consumed as pre-validated scope information: when present, search and
//! compartment results narrow to the permitted resource types and
//! compartments; absent means unrestricted. Token issuance and validation
//! live outside this core.

use lumen_core::Resource;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One permitted scope: a resource-type allowance, optionally confined to a
/// compartment (`Patient/example`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceScope {
    /// `None` allows every resource type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    /// `None` allows every instance of the permitted types.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compartment: Option<String>,
}

impl ResourceScope {
    pub fn permits(&self, resource: &Resource) -> bool {
        if let Some(required) = &self.resource_type
            && resource.type_name() != required
        {
            return false;
        }
        match &self.compartment {
            None => true,
            Some(compartment) => in_compartment(resource, compartment),
        }
    }
}

/// Pre-validated authorization context narrowing visible results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationInfo {
    pub scopes: Vec<ResourceScope>,
}

impl AuthorizationInfo {
    /// Full access to one compartment across all resource types.
    pub fn for_compartment(compartment: impl Into<String>) -> Self {
        Self {
            scopes: vec![ResourceScope {
                resource_type: None,
                compartment: Some(compartment.into()),
            }],
        }
    }

    pub fn permits(&self, resource: &Resource) -> bool {
        self.scopes.iter().any(|scope| scope.permits(resource))
    }
}

/// Compartment membership: the resource is the compartment instance itself,
/// or references it from any nested element.
pub fn in_compartment(resource: &Resource, compartment: &str) -> bool {
    if resource.reference() == compartment {
        return true;
    }
    let json = resource.as_json();
    let mut references = Vec::new();
    collect_references(&json, &mut references);
    references.iter().any(|r| {
        r == compartment || r.ends_with(&format!("/{compartment}"))
    })
}

fn collect_references(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(reference)) = map.get("reference") {
                out.push(reference.clone());
            }
            for v in map.values() {
                collect_references(v, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_references(item, out);
            }
        }
        _ => {}
    }
}
