//! String search: default case-insensitive starts-with, `:contains`
//! substring, `:exact` case-sensitive equality. Against name-like complex
//! values the match ORs across the family/given/text members.

use crate::parameters::SearchModifier;
use crate::parser::SearchValue;
use serde_json::Value;

pub fn matches(
    extracted: &[Value],
    values: &[SearchValue],
    modifier: Option<&SearchModifier>,
) -> bool {
    let candidates = collect_strings(extracted);
    if candidates.is_empty() {
        return false;
    }

    values.iter().any(|sv| {
        candidates.iter().any(|candidate| match modifier {
            None => candidate
                .to_lowercase()
                .starts_with(&sv.raw.to_lowercase()),
            Some(SearchModifier::Contains) => {
                candidate.to_lowercase().contains(&sv.raw.to_lowercase())
            }
            Some(SearchModifier::Exact) => candidate == &sv.raw,
            _ => false,
        })
    })
}

/// Pull matchable strings out of extracted values. Plain strings match as
/// themselves; object values contribute their family/given/text members.
fn collect_strings(extracted: &[Value]) -> Vec<String> {
    let mut out = Vec::new();
    for value in extracted {
        match value {
            Value::String(s) => out.push(s.clone()),
            Value::Object(map) => {
                if let Some(Value::String(family)) = map.get("family") {
                    out.push(family.clone());
                }
                if let Some(Value::Array(given)) = map.get("given") {
                    out.extend(
                        given
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string),
                    );
                }
                if let Some(Value::String(text)) = map.get("text") {
                    out.push(text.clone());
                }
            }
            _ => {}
        }
    }
    out
}
