use crate::error::Result;
use crate::time::FhirInstant;
use crate::types::ResourceType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Resource metadata: versioning, stamps and profiles.
///
/// `versionId` is a stringified positive integer maintained by the store;
/// `lastUpdated` is stamped on every successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ResourceMeta {
    #[serde(rename = "versionId", skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(rename = "lastUpdated", skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<FhirInstant>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub profile: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub security: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tag: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ResourceMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version_id(mut self, version_id: impl Into<String>) -> Self {
        self.version_id = Some(version_id.into());
        self
    }

    pub fn with_profile(mut self, profile: Vec<String>) -> Self {
        self.profile = profile;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.version_id.is_none()
            && self.last_updated.is_none()
            && self.profile.is_empty()
            && self.security.is_empty()
            && self.tag.is_empty()
            && self.source.is_none()
    }

    pub fn stamp(&mut self, version: u64) {
        self.version_id = Some(version.to_string());
        self.last_updated = Some(crate::time::now_utc());
    }
}

/// A typed, tree-shaped record instance.
///
/// The envelope carries the identity and metadata; every other element lives
/// in the flattened `data` map, so arbitrary nested content round-trips
/// without a compiled-in schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "resourceType")]
    pub resource_type: ResourceType,
    #[serde(default, skip_serializing_if = "ResourceMeta::is_empty")]
    pub meta: ResourceMeta,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Resource {
    pub fn new(resource_type: ResourceType) -> Self {
        Self {
            id: String::new(),
            resource_type,
            meta: ResourceMeta::new(),
            data: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_meta(mut self, meta: ResourceMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn set_field(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    pub fn remove_field(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn type_name(&self) -> &str {
        self.resource_type.as_str()
    }

    /// Relative reference in `Type/id` form.
    pub fn reference(&self) -> String {
        format!("{}/{}", self.resource_type, self.id)
    }

    /// Current version as an integer. Absent or unparsable versions read
    /// as 1, matching the update fallback.
    pub fn version(&self) -> u64 {
        self.meta
            .version_id
            .as_deref()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(1)
    }

    /// Full JSON view of the resource (envelope fields included) for path
    /// expression evaluation.
    pub fn as_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn from_json(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}
