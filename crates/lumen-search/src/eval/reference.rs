//! Reference search: `Type/id`, bare id, or absolute url forms, with
//! `:Type` target restriction and `:identifier` matching.

use crate::parameters::SearchModifier;
use crate::parser::SearchValue;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceAtom {
    /// The literal reference string, e.g. `Patient/example`.
    pub reference: Option<String>,
    /// Logical identifier carried instead of (or beside) the literal.
    pub identifier: Option<(Option<String>, String)>,
}

pub fn matches(
    extracted: &[Value],
    values: &[SearchValue],
    modifier: Option<&SearchModifier>,
    targets: &[String],
) -> bool {
    let atoms: Vec<ReferenceAtom> = extracted.iter().flat_map(collect_atoms).collect();

    match modifier {
        Some(SearchModifier::Identifier) => values.iter().any(|sv| {
            atoms.iter().any(|atom| {
                let Some((system, value)) = &atom.identifier else {
                    return false;
                };
                let system_ok = match &sv.system {
                    Some(s) => system.as_deref() == Some(s.as_str()),
                    None => true,
                };
                system_ok && (sv.raw.is_empty() || value == &sv.raw)
            })
        }),
        Some(SearchModifier::Type(target)) => {
            reference_match(&atoms, values, Some(target), targets)
        }
        None => reference_match(&atoms, values, None, targets),
        _ => false,
    }
}

fn reference_match(
    atoms: &[ReferenceAtom],
    values: &[SearchValue],
    type_restriction: Option<&str>,
    targets: &[String],
) -> bool {
    values.iter().any(|sv| {
        atoms.iter().any(|atom| {
            let Some(reference) = &atom.reference else {
                return false;
            };
            matches_one(reference, &sv.raw, type_restriction, targets)
        })
    })
}

fn matches_one(
    reference: &str,
    search: &str,
    type_restriction: Option<&str>,
    targets: &[String],
) -> bool {
    if search.is_empty() {
        return false;
    }

    let (ref_type, ref_id) = split_type_id(reference);

    if let Some(required) = type_restriction
        && ref_type != Some(required)
    {
        return false;
    }

    if search.contains("://") {
        // Absolute url: exact, or a base-relative suffix of the search.
        return reference == search || search.ends_with(&format!("/{reference}"));
    }

    if search.contains('/') {
        // Type/id: the restriction must agree with the searched type too.
        if let Some(required) = type_restriction
            && !search.starts_with(&format!("{required}/"))
        {
            return false;
        }
        return reference == search || reference.ends_with(&format!("/{search}"));
    }

    // Bare id: constrain to the restriction type or the declared targets.
    if ref_id != Some(search) {
        return false;
    }
    match (type_restriction, ref_type) {
        (Some(_), _) => true, // already checked above
        (None, Some(t)) => targets.is_empty() || targets.iter().any(|target| target == t),
        (None, None) => true,
    }
}

/// Split `[base/]Type/id` into its trailing type and id.
fn split_type_id(reference: &str) -> (Option<&str>, Option<&str>) {
    let mut segments = reference.rsplit('/');
    let id = segments.next();
    let resource_type = segments.next();
    (resource_type, id)
}

/// Flatten one extracted value into reference atoms.
pub fn collect_atoms(value: &Value) -> Vec<ReferenceAtom> {
    let mut out = Vec::new();
    collect_into(value, &mut out);
    out
}

fn collect_into(value: &Value, out: &mut Vec<ReferenceAtom>) {
    match value {
        Value::String(s) => out.push(ReferenceAtom {
            reference: Some(s.clone()),
            identifier: None,
        }),
        Value::Array(items) => {
            for item in items {
                collect_into(item, out);
            }
        }
        Value::Object(map) => {
            let reference = map
                .get("reference")
                .and_then(Value::as_str)
                .map(str::to_string);
            let identifier = map.get("identifier").and_then(|ident| {
                let value = ident.get("value").and_then(Value::as_str)?;
                let system = ident
                    .get("system")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Some((system, value.to_string()))
            });
            if reference.is_some() || identifier.is_some() {
                out.push(ReferenceAtom {
                    reference,
                    identifier,
                });
            }
        }
        _ => {}
    }
}

/// All literal reference strings in the extracted values; used by chaining
/// and include collection.
pub fn raw_references(extracted: &[Value]) -> Vec<String> {
    extracted
        .iter()
        .flat_map(collect_atoms)
        .filter_map(|atom| atom.reference)
        .collect()
}

/// Whether a literal reference points at `Type/id`, in relative or absolute
/// form.
pub fn points_to(reference: &str, type_id: &str, id: &str) -> bool {
    reference == type_id
        || reference.ends_with(&format!("/{type_id}"))
        || (!reference.contains('/') && reference == id)
}
