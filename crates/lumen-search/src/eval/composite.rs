//! Composite search: `$`-joined component values, AND'd, with
//! comma-separated alternatives pairing positionally across components.
//!
//! `code-value-quantity=a,b$x,y` matches when (a AND x) or (b AND y) match.
//! A component with a single alternative broadcasts across all pairings.

use crate::eval::{date, number, quantity, string, token, uri};
use crate::parameters::{SearchParamDefinition, SearchParamType};
use crate::parser::SearchValue;
use crate::units::UnitConversionTable;
use serde_json::Value;
use std::sync::Arc;

pub fn matches(
    resource: &Value,
    component_definitions: &[Arc<SearchParamDefinition>],
    components: &[Vec<SearchValue>],
    units: &UnitConversionTable,
) -> bool {
    let pairings = components.iter().map(|alts| alts.len()).max().unwrap_or(0);
    (0..pairings).any(|index| {
        component_definitions
            .iter()
            .zip(components.iter())
            .all(|(definition, alternatives)| {
                let value = if alternatives.len() == 1 {
                    &alternatives[0]
                } else {
                    match alternatives.get(index) {
                        Some(v) => v,
                        None => return false,
                    }
                };
                component_matches(definition, value, resource, units)
            })
    })
}

fn component_matches(
    definition: &SearchParamDefinition,
    value: &SearchValue,
    resource: &Value,
    units: &UnitConversionTable,
) -> bool {
    let extracted = definition.extract(resource);
    let values = std::slice::from_ref(value);
    match definition.param_type {
        SearchParamType::Token => token::matches(&extracted, values, None),
        SearchParamType::Quantity => quantity::matches(&extracted, values, units),
        SearchParamType::String => string::matches(&extracted, values, None),
        SearchParamType::Number => number::matches(&extracted, values),
        SearchParamType::Date => date::matches(&extracted, values),
        SearchParamType::Uri => uri::matches(&extracted, values, None),
        // Nested composites and references do not compose.
        SearchParamType::Composite | SearchParamType::Reference => false,
    }
}
