use lumen_search::SearchConfig;
use serde::{Deserialize, Serialize};

/// Tenant store configuration. The resource-type list is the explicit
/// factory table: one store per listed type, built at startup. Hosts hand
/// in a deserialized struct; the defaults cover the common clinical types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base url used in locations, bundles and notifications.
    pub base_url: String,
    /// Resource types this tenant stores.
    pub resource_types: Vec<String>,
    /// Whether create honors a client-supplied id.
    pub allow_existing_id: bool,
    pub search: SearchConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5826/fhir".to_string(),
            resource_types: default_resource_types(),
            allow_existing_id: true,
            search: SearchConfig::default(),
        }
    }
}

fn default_resource_types() -> Vec<String> {
    [
        "Patient",
        "Practitioner",
        "Organization",
        "Encounter",
        "Observation",
        "Condition",
        "DiagnosticReport",
        "Medication",
        "MedicationRequest",
        "Procedure",
        "Specimen",
        "DocumentReference",
        "Device",
        "SearchParameter",
        "Subscription",
        "SubscriptionTopic",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}
