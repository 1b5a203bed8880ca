//! Token search: exact `system|code` or code-only matching over codes,
//! Codings, CodeableConcepts, Identifiers and ContactPoints, plus `:not`,
//! `:text` and `:of-type`. An empty side of `system|code` is a wildcard.
//! `:in`/`:not-in` need terminology expansion and evaluate fail-closed.

use crate::parameters::SearchModifier;
use crate::parser::SearchValue;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct TokenAtom {
    pub system: Option<String>,
    pub code: String,
}

pub fn matches(
    extracted: &[Value],
    values: &[SearchValue],
    modifier: Option<&SearchModifier>,
) -> bool {
    match modifier {
        None => any_match(extracted, values),
        Some(SearchModifier::Not) => !any_match(extracted, values),
        Some(SearchModifier::Text) => text_match(extracted, values),
        Some(SearchModifier::OfType) => of_type_match(extracted, values),
        // :in / :not-in require a terminology service; fail closed.
        _ => false,
    }
}

fn any_match(extracted: &[Value], values: &[SearchValue]) -> bool {
    let atoms: Vec<TokenAtom> = extracted.iter().flat_map(collect_atoms).collect();
    values
        .iter()
        .any(|sv| atoms.iter().any(|atom| atom_matches(atom, sv)))
}

fn atom_matches(atom: &TokenAtom, sv: &SearchValue) -> bool {
    if let Some(system) = &sv.system
        && atom.system.as_deref() != Some(system.as_str())
    {
        return false;
    }
    sv.raw.is_empty() || atom.code == sv.raw
}

/// Flatten one extracted value into system/code atoms.
pub fn collect_atoms(value: &Value) -> Vec<TokenAtom> {
    let mut out = Vec::new();
    collect_into(value, &mut out);
    out
}

fn collect_into(value: &Value, out: &mut Vec<TokenAtom>) {
    match value {
        Value::String(s) => out.push(TokenAtom {
            system: None,
            code: s.clone(),
        }),
        Value::Bool(b) => out.push(TokenAtom {
            system: None,
            code: b.to_string(),
        }),
        Value::Number(n) => out.push(TokenAtom {
            system: None,
            code: n.to_string(),
        }),
        Value::Array(items) => {
            for item in items {
                collect_into(item, out);
            }
        }
        Value::Object(map) => {
            if let Some(Value::Array(codings)) = map.get("coding") {
                for coding in codings {
                    collect_into(coding, out);
                }
            }
            let system = map
                .get("system")
                .and_then(Value::as_str)
                .map(str::to_string);
            if let Some(code) = map.get("code").and_then(Value::as_str) {
                out.push(TokenAtom {
                    system: system.clone(),
                    code: code.to_string(),
                });
            } else if let Some(code) = map.get("value").and_then(Value::as_str) {
                // Identifier / ContactPoint: value with a system discriminator.
                out.push(TokenAtom {
                    system,
                    code: code.to_string(),
                });
            }
        }
        Value::Null => {}
    }
}

fn text_match(extracted: &[Value], values: &[SearchValue]) -> bool {
    let texts = collect_texts(extracted);
    values.iter().any(|sv| {
        let needle = sv.raw.to_lowercase();
        texts.iter().any(|t| t.to_lowercase().contains(&needle))
    })
}

fn collect_texts(extracted: &[Value]) -> Vec<String> {
    let mut out = Vec::new();
    for value in extracted {
        match value {
            Value::Object(map) => {
                for key in ["text", "display"] {
                    if let Some(Value::String(s)) = map.get(key) {
                        out.push(s.clone());
                    }
                }
                if let Some(Value::Array(codings)) = map.get("coding") {
                    for coding in codings {
                        if let Some(display) = coding.get("display").and_then(Value::as_str) {
                            out.push(display.to_string());
                        }
                    }
                }
            }
            Value::Array(items) => out.extend(collect_texts(items)),
            _ => {}
        }
    }
    out
}

/// `:of-type` — `type-system|type-code|value` against Identifier elements.
fn of_type_match(extracted: &[Value], values: &[SearchValue]) -> bool {
    values.iter().any(|sv| {
        // The parser split off the first segment as the system; the rest is
        // `type-code|value`.
        let Some((type_code, ident_value)) = sv.raw.split_once('|') else {
            return false;
        };
        let type_system = sv.system.as_deref();
        extracted.iter().any(|value| {
            identifier_of_type(value, type_system, type_code, ident_value)
        })
    })
}

fn identifier_of_type(
    value: &Value,
    type_system: Option<&str>,
    type_code: &str,
    ident_value: &str,
) -> bool {
    match value {
        Value::Array(items) => items
            .iter()
            .any(|item| identifier_of_type(item, type_system, type_code, ident_value)),
        Value::Object(map) => {
            if map.get("value").and_then(Value::as_str) != Some(ident_value) {
                return false;
            }
            let Some(Value::Array(codings)) = map.get("type").and_then(|t| t.get("coding")) else {
                return false;
            };
            codings.iter().any(|coding| {
                let system_ok = match type_system {
                    Some(system) => {
                        coding.get("system").and_then(Value::as_str) == Some(system)
                    }
                    None => true,
                };
                system_ok && coding.get("code").and_then(Value::as_str) == Some(type_code)
            })
        }
        _ => false,
    }
}
