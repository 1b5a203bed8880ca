use crate::error::{CoreError, Result};
use crate::resource::Resource;
use serde_json::{Map, Value};

/// How much of a resource to serialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SummaryMode {
    /// The full resource.
    #[default]
    Full,
    /// Envelope only: id, resourceType, meta.
    Summary,
    /// Envelope plus the narrative `text` element.
    Text,
}

impl SummaryMode {
    pub fn parse(s: &str) -> Self {
        match s {
            "true" => Self::Summary,
            "text" => Self::Text,
            _ => Self::Full,
        }
    }
}

/// Wire-format conversion between bytes and resources.
///
/// The server core consumes this as an external collaborator: a parse
/// failure surfaces as `UnsupportedMediaType` (unknown format) or
/// `InvalidResource`/`JsonError` (bad payload), never as a panic.
pub trait Codec: Send + Sync {
    fn parse(&self, bytes: &[u8], content_type: &str) -> Result<Resource>;

    fn serialize(
        &self,
        resource: &Resource,
        content_type: &str,
        summary: SummaryMode,
    ) -> Result<Vec<u8>>;
}

/// JSON codec. Accepts the FHIR JSON media types and plain `application/json`.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        Self
    }

    fn is_json(content_type: &str) -> bool {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        matches!(
            mime.as_str(),
            "" | "json" | "fhir+json" | "application/json" | "application/fhir+json"
        )
    }
}

impl Codec for JsonCodec {
    fn parse(&self, bytes: &[u8], content_type: &str) -> Result<Resource> {
        if !Self::is_json(content_type) {
            return Err(CoreError::unsupported_media_type(content_type));
        }
        let value: Value = serde_json::from_slice(bytes)?;
        if !value.is_object() {
            return Err(CoreError::invalid_resource("payload is not a JSON object"));
        }
        Resource::from_json(value)
            .map_err(|_| CoreError::invalid_resource("payload is not a valid resource"))
    }

    fn serialize(
        &self,
        resource: &Resource,
        content_type: &str,
        summary: SummaryMode,
    ) -> Result<Vec<u8>> {
        if !Self::is_json(content_type) {
            return Err(CoreError::unsupported_media_type(content_type));
        }
        let value = match summary {
            SummaryMode::Full => resource.as_json(),
            SummaryMode::Summary | SummaryMode::Text => {
                let mut map = Map::new();
                map.insert(
                    "resourceType".to_string(),
                    Value::String(resource.type_name().to_string()),
                );
                if !resource.id.is_empty() {
                    map.insert("id".to_string(), Value::String(resource.id.clone()));
                }
                if !resource.meta.is_empty() {
                    map.insert("meta".to_string(), serde_json::to_value(&resource.meta)?);
                }
                if summary == SummaryMode::Text
                    && let Some(text) = resource.field("text")
                {
                    map.insert("text".to_string(), text.clone());
                }
                Value::Object(map)
            }
        };
        Ok(serde_json::to_vec(&value)?)
    }
}
