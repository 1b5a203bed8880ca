//! Quantity search: numeric comparison with unit canonicalization.
//!
//! A search value is `[prefix]number[|system[|unit]]`; empty system/unit
//! segments are wildcards. Alternate unit spellings canonicalize through the
//! conversion table before comparison; when the units still differ, a known
//! conversion factor rewrites the search value into the resource's unit and
//! an unknown factor is a non-match, not an error.

use crate::parameters::SearchPrefix;
use crate::parser::SearchValue;
use crate::units::UnitConversionTable;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct QuantityAtom {
    pub value: f64,
    pub system: Option<String>,
    pub unit: Option<String>,
}

pub fn matches(extracted: &[Value], values: &[SearchValue], units: &UnitConversionTable) -> bool {
    let atoms: Vec<QuantityAtom> = extracted.iter().flat_map(collect_atoms).collect();
    values
        .iter()
        .any(|sv| atoms.iter().any(|atom| atom_matches(atom, sv, units)))
}

fn atom_matches(atom: &QuantityAtom, sv: &SearchValue, units: &UnitConversionTable) -> bool {
    let Ok(search_value) = sv.raw.parse::<f64>() else {
        return false;
    };
    let prefix = sv.prefix.unwrap_or(SearchPrefix::Eq);

    if let Some(system) = &sv.system
        && atom.system.as_deref() != Some(system.as_str())
    {
        return false;
    }

    let comparable = match &sv.unit {
        // No unit in the query: value-only comparison.
        None => search_value,
        Some(search_unit) => {
            let Some(atom_unit) = &atom.unit else {
                return false;
            };
            if units.same_unit(search_unit, atom_unit) {
                search_value
            } else {
                match units.convert(search_value, search_unit, atom_unit) {
                    Some(converted) => converted,
                    None => return false,
                }
            }
        }
    };

    prefix.compare_f64(atom.value, comparable)
}

/// Flatten one extracted value into quantity atoms. Bare numbers carry no
/// unit; Quantity objects contribute their coded unit (falling back to the
/// display unit).
pub fn collect_atoms(value: &Value) -> Vec<QuantityAtom> {
    let mut out = Vec::new();
    match value {
        Value::Number(n) => {
            if let Some(v) = n.as_f64() {
                out.push(QuantityAtom {
                    value: v,
                    system: None,
                    unit: None,
                });
            }
        }
        Value::Array(items) => {
            for item in items {
                out.extend(collect_atoms(item));
            }
        }
        Value::Object(map) => {
            if let Some(v) = map.get("value").and_then(Value::as_f64) {
                let system = map
                    .get("system")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let unit = map
                    .get("code")
                    .or_else(|| map.get("unit"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                out.push(QuantityAtom {
                    value: v,
                    system,
                    unit,
                });
            }
        }
        _ => {}
    }
    out
}
