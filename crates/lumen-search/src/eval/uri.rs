//! Uri search: exact match, `:below` prefix containment, `:above` reverse
//! containment.

use crate::parameters::SearchModifier;
use crate::parser::SearchValue;
use serde_json::Value;

pub fn matches(
    extracted: &[Value],
    values: &[SearchValue],
    modifier: Option<&SearchModifier>,
) -> bool {
    let uris: Vec<&str> = extracted.iter().filter_map(Value::as_str).collect();
    values.iter().any(|sv| {
        uris.iter().any(|uri| match modifier {
            None => *uri == sv.raw,
            Some(SearchModifier::Below) => uri.starts_with(&sv.raw),
            Some(SearchModifier::Above) => sv.raw.starts_with(uri),
            _ => false,
        })
    })
}
