use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Resource types stored by this server.
///
/// Types that the engine treats specially (SearchParameter, SubscriptionTopic,
/// Subscription) have dedicated variants; anything else that satisfies the
/// type-name grammar round-trips through `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Patient,
    Practitioner,
    Organization,
    Encounter,
    Observation,
    Condition,
    DiagnosticReport,
    Medication,
    MedicationRequest,
    Procedure,
    Specimen,
    DocumentReference,
    Device,
    Bundle,
    CapabilityStatement,
    SearchParameter,
    Subscription,
    SubscriptionTopic,
    OperationOutcome,
    #[serde(untagged)]
    Custom(String),
}

impl ResourceType {
    /// The type name as it appears in `resourceType` elements and request paths.
    pub fn as_str(&self) -> &str {
        match self {
            ResourceType::Patient => "Patient",
            ResourceType::Practitioner => "Practitioner",
            ResourceType::Organization => "Organization",
            ResourceType::Encounter => "Encounter",
            ResourceType::Observation => "Observation",
            ResourceType::Condition => "Condition",
            ResourceType::DiagnosticReport => "DiagnosticReport",
            ResourceType::Medication => "Medication",
            ResourceType::MedicationRequest => "MedicationRequest",
            ResourceType::Procedure => "Procedure",
            ResourceType::Specimen => "Specimen",
            ResourceType::DocumentReference => "DocumentReference",
            ResourceType::Device => "Device",
            ResourceType::Bundle => "Bundle",
            ResourceType::CapabilityStatement => "CapabilityStatement",
            ResourceType::SearchParameter => "SearchParameter",
            ResourceType::Subscription => "Subscription",
            ResourceType::SubscriptionTopic => "SubscriptionTopic",
            ResourceType::OperationOutcome => "OperationOutcome",
            ResourceType::Custom(name) => name,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Patient" => Ok(ResourceType::Patient),
            "Practitioner" => Ok(ResourceType::Practitioner),
            "Organization" => Ok(ResourceType::Organization),
            "Encounter" => Ok(ResourceType::Encounter),
            "Observation" => Ok(ResourceType::Observation),
            "Condition" => Ok(ResourceType::Condition),
            "DiagnosticReport" => Ok(ResourceType::DiagnosticReport),
            "Medication" => Ok(ResourceType::Medication),
            "MedicationRequest" => Ok(ResourceType::MedicationRequest),
            "Procedure" => Ok(ResourceType::Procedure),
            "Specimen" => Ok(ResourceType::Specimen),
            "DocumentReference" => Ok(ResourceType::DocumentReference),
            "Device" => Ok(ResourceType::Device),
            "Bundle" => Ok(ResourceType::Bundle),
            "CapabilityStatement" => Ok(ResourceType::CapabilityStatement),
            "SearchParameter" => Ok(ResourceType::SearchParameter),
            "Subscription" => Ok(ResourceType::Subscription),
            "SubscriptionTopic" => Ok(ResourceType::SubscriptionTopic),
            "OperationOutcome" => Ok(ResourceType::OperationOutcome),
            name => {
                if is_valid_resource_type_name(name) {
                    Ok(ResourceType::Custom(name.to_string()))
                } else {
                    Err(CoreError::invalid_resource_type(name.to_string()))
                }
            }
        }
    }
}

/// Validate that a string is a plausible resource type name:
/// leading uppercase letter, alphabetic throughout.
pub fn is_valid_resource_type_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .next()
            .map(|c| c.is_ascii_uppercase())
            .unwrap_or(false)
        && name.chars().all(|c| c.is_ascii_alphabetic())
}
