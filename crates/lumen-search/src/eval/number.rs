//! Number search: comparator prefix against numeric values.

use crate::parameters::SearchPrefix;
use crate::parser::SearchValue;
use serde_json::Value;

pub fn matches(extracted: &[Value], values: &[SearchValue]) -> bool {
    let numbers = collect_numbers(extracted);
    values.iter().any(|sv| {
        let Ok(target) = sv.raw.parse::<f64>() else {
            return false;
        };
        let prefix = sv.prefix.unwrap_or(SearchPrefix::Eq);
        numbers.iter().any(|n| prefix.compare_f64(*n, target))
    })
}

fn collect_numbers(extracted: &[Value]) -> Vec<f64> {
    extracted
        .iter()
        .filter_map(|value| match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        })
        .collect()
}
