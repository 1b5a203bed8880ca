//! Date search: prefix comparison at the precision of the search value.
//!
//! ISO 8601 date and instant strings compare correctly lexicographically,
//! so both sides are truncated to their common precision before comparing.
//! `birthdate=1982` matches any date within 1982.

use crate::parameters::SearchPrefix;
use crate::parser::SearchValue;
use serde_json::Value;

pub fn matches(extracted: &[Value], values: &[SearchValue]) -> bool {
    let dates = collect_dates(extracted);
    values.iter().any(|sv| {
        let prefix = sv.prefix.unwrap_or(SearchPrefix::Eq);
        dates.iter().any(|d| compare(d, &sv.raw, prefix))
    })
}

fn collect_dates(extracted: &[Value]) -> Vec<String> {
    let mut out = Vec::new();
    for value in extracted {
        match value {
            Value::String(s) => out.push(s.clone()),
            // Period: both bounds participate.
            Value::Object(map) => {
                for key in ["start", "end"] {
                    if let Some(Value::String(s)) = map.get(key) {
                        out.push(s.clone());
                    }
                }
            }
            _ => {}
        }
    }
    out
}

fn compare(resource_date: &str, search_date: &str, prefix: SearchPrefix) -> bool {
    if search_date.is_empty() {
        return false;
    }
    let len = resource_date.len().min(search_date.len());
    let (Some(r), Some(s)) = (resource_date.get(..len), search_date.get(..len)) else {
        return false;
    };
    match prefix {
        SearchPrefix::Eq => r == s,
        SearchPrefix::Ne => r != s,
        SearchPrefix::Gt => r > s,
        SearchPrefix::Lt => r < s,
        SearchPrefix::Ge => r >= s,
        SearchPrefix::Le => r <= s,
    }
}
