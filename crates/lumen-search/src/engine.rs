//! Predicate evaluation engine.
//!
//! `test_for_match` evaluates one resource against a parsed clause list:
//! AND across clauses, OR across each clause's values. Result-control
//! parameters and include directives never filter; they come back
//! unconsumed for the caller to apply. Unknown parameters and unsupported
//! modifier combinations evaluate false — fail closed, never an error.

use crate::eval::{composite, date, number, quantity, reference, string, token, uri};
use crate::parameters::{SearchModifier, SearchParamType};
use crate::parser::{ClauseKind, IncludeDirective, ParsedSearchParameter};
use crate::registry::SearchParameterRegistry;
use crate::units::UnitConversionTable;
use lumen_core::Resource;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Search paging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_count: usize,
    pub max_count: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_count: 50,
            max_count: 1000,
        }
    }
}

/// Cross-type resource access, injected by the store façade. Chaining
/// resolves references through it; reverse chaining and `_revinclude` scan
/// candidate instances through it.
pub trait ReferenceResolver: Send + Sync {
    /// Resolve a `Type/id` (or absolute) reference to a live resource.
    fn resolve(&self, reference: &str) -> Option<Resource>;

    /// All live instances of one type.
    fn instances_of(&self, resource_type: &str) -> Vec<Resource>;
}

/// Outcome of evaluating one resource against a clause list.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub matched: bool,
    pub consumed: Vec<ParsedSearchParameter>,
    pub unconsumed: Vec<ParsedSearchParameter>,
}

pub struct SearchPredicateEngine<'a> {
    registry: &'a SearchParameterRegistry,
    units: &'a UnitConversionTable,
}

impl<'a> SearchPredicateEngine<'a> {
    pub fn new(registry: &'a SearchParameterRegistry, units: &'a UnitConversionTable) -> Self {
        Self { registry, units }
    }

    /// Evaluate `resource` against all clauses. Filtering clauses AND
    /// together and are returned consumed; includes and control parameters
    /// are returned unconsumed for the caller.
    pub fn test_for_match(
        &self,
        resource: &Resource,
        params: &[ParsedSearchParameter],
        resolver: &dyn ReferenceResolver,
    ) -> MatchOutcome {
        let json = resource.as_json();
        let mut matched = true;
        let mut consumed = Vec::new();
        let mut unconsumed = Vec::new();

        for param in params {
            match &param.kind {
                ClauseKind::Control | ClauseKind::Include(_) => unconsumed.push(param.clone()),
                _ => {
                    if matched {
                        matched = self.clause_matches(resource, &json, param, resolver);
                    }
                    consumed.push(param.clone());
                }
            }
        }

        MatchOutcome {
            matched,
            consumed,
            unconsumed,
        }
    }

    fn clause_matches(
        &self,
        resource: &Resource,
        json: &Value,
        param: &ParsedSearchParameter,
        resolver: &dyn ReferenceResolver,
    ) -> bool {
        match &param.kind {
            ClauseKind::Standard {
                definition,
                modifier,
                values,
            } => {
                if let Some(m) = modifier
                    && !m.applicable_to(definition.param_type)
                {
                    return false;
                }

                let extracted = definition.extract(json);

                if matches!(modifier, Some(SearchModifier::Missing)) {
                    return match values.first().map(|v| v.raw.as_str()) {
                        Some("true") => extracted.is_empty(),
                        Some("false") => !extracted.is_empty(),
                        _ => false,
                    };
                }
                if values.is_empty() {
                    // An empty value list constrains nothing.
                    return true;
                }

                match definition.param_type {
                    SearchParamType::String => {
                        string::matches(&extracted, values, modifier.as_ref())
                    }
                    SearchParamType::Token => token::matches(&extracted, values, modifier.as_ref()),
                    SearchParamType::Reference => {
                        reference::matches(&extracted, values, modifier.as_ref(), &definition.target)
                    }
                    SearchParamType::Quantity => quantity::matches(&extracted, values, self.units),
                    SearchParamType::Number => number::matches(&extracted, values),
                    SearchParamType::Date => date::matches(&extracted, values),
                    SearchParamType::Uri => uri::matches(&extracted, values, modifier.as_ref()),
                    SearchParamType::Composite => false,
                }
            }
            ClauseKind::Composite {
                component_definitions,
                components,
                ..
            } => composite::matches(json, component_definitions, components, self.units),
            ClauseKind::Chained {
                definition,
                target_type,
                sub,
                value,
            } => self.chained_matches(json, definition, target_type.as_deref(), sub, value, resolver),
            ClauseKind::ReverseChain {
                source_type,
                reference_param,
                sub,
                value,
            } => self.reverse_chain_matches(resource, source_type, reference_param, sub, value, resolver),
            ClauseKind::Unknown => false,
            ClauseKind::Control | ClauseKind::Include(_) => true,
        }
    }

    fn chained_matches(
        &self,
        json: &Value,
        definition: &crate::parameters::SearchParamDefinition,
        target_type: Option<&str>,
        sub: &str,
        value: &str,
        resolver: &dyn ReferenceResolver,
    ) -> bool {
        for raw in reference::raw_references(&definition.extract(json)) {
            let Some((ref_type, _)) = split_reference(&raw) else {
                continue;
            };
            if let Some(required) = target_type
                && ref_type != required
            {
                continue;
            }
            if target_type.is_none()
                && !definition.target.is_empty()
                && !definition.target.iter().any(|t| t == ref_type)
            {
                continue;
            }

            let Some(resolved) = resolver.resolve(&raw) else {
                continue;
            };
            let sub_clause =
                ParsedSearchParameter::parse_single(resolved.type_name(), sub, value, self.registry);
            if self
                .test_for_match(&resolved, std::slice::from_ref(&sub_clause), resolver)
                .matched
            {
                return true;
            }
        }
        false
    }

    fn reverse_chain_matches(
        &self,
        candidate: &Resource,
        source_type: &str,
        reference_param: &crate::parameters::SearchParamDefinition,
        sub: &str,
        value: &str,
        resolver: &dyn ReferenceResolver,
    ) -> bool {
        // Single-level only: a nested `_has` in sub position fails closed.
        if sub.starts_with("_has:") {
            return false;
        }
        let sub_clause = ParsedSearchParameter::parse_single(source_type, sub, value, self.registry);

        for source in resolver.instances_of(source_type) {
            let source_json = source.as_json();
            let refs = reference::raw_references(&reference_param.extract(&source_json));
            let pointing = refs
                .iter()
                .any(|r| reference::points_to(r, &candidate.reference(), &candidate.id));
            if !pointing {
                continue;
            }
            if self
                .test_for_match(&source, std::slice::from_ref(&sub_clause), resolver)
                .matched
            {
                return true;
            }
        }
        false
    }

    /// Apply include directives to a match set, returning the extra
    /// resources to append. Each resource appears at most once and never
    /// duplicates a match.
    pub fn collect_includes(
        &self,
        matches: &[Resource],
        directives: &[&IncludeDirective],
        resolver: &dyn ReferenceResolver,
    ) -> Vec<Resource> {
        let mut seen: HashSet<String> = matches.iter().map(Resource::reference).collect();
        let mut included = Vec::new();

        for directive in directives {
            let Some(definition) = self
                .registry
                .get(&directive.source_type, &directive.parameter)
            else {
                continue;
            };
            if definition.param_type != SearchParamType::Reference {
                continue;
            }

            if directive.reverse {
                for source in resolver.instances_of(&directive.source_type) {
                    let refs = reference::raw_references(&definition.extract(&source.as_json()));
                    let points_at_match = matches.iter().any(|m| {
                        refs.iter()
                            .any(|r| reference::points_to(r, &m.reference(), &m.id))
                    });
                    if points_at_match && seen.insert(source.reference()) {
                        included.push(source);
                    }
                }
            } else {
                for resource in matches
                    .iter()
                    .filter(|m| m.type_name() == directive.source_type)
                {
                    for raw in reference::raw_references(&definition.extract(&resource.as_json())) {
                        let Some(resolved) = resolver.resolve(&raw) else {
                            continue;
                        };
                        if let Some(target) = &directive.target_type
                            && resolved.type_name() != target
                        {
                            continue;
                        }
                        if seen.insert(resolved.reference()) {
                            included.push(resolved);
                        }
                    }
                }
            }
        }
        included
    }
}

fn split_reference(reference: &str) -> Option<(&str, &str)> {
    let mut segments = reference.rsplit('/');
    let id = segments.next()?;
    let resource_type = segments.next()?;
    Some((resource_type, id))
}
