//! Query string parsing into typed predicate clauses.
//!
//! `name[:modifier]=v1,v2&...` parses into one clause per query pair:
//! AND across clauses, OR across the comma-separated values inside one
//! clause. Clause shapes beyond plain parameters: chained (`param.sub`,
//! `param:Type.sub`), reverse-chained (`_has:Type:refParam:subParam`),
//! include directives (`_include`/`_revinclude`), result-control parameters
//! (`_count`, `_sort`, ...) and — per the fail-closed contract — unknown
//! parameters, which parse successfully and evaluate false.

use crate::parameters::{SearchModifier, SearchParamDefinition, SearchParamType, SearchPrefix};
use crate::registry::SearchParameterRegistry;
use std::sync::Arc;
use tracing::debug;
use url::form_urlencoded;

/// Result-control parameters: parsed, never filtering, returned unconsumed.
const CONTROL_PARAMETERS: &[&str] = &[
    "_count",
    "_offset",
    "_sort",
    "_total",
    "_summary",
    "_format",
    "_elements",
    "_contained",
    "_containedType",
];

/// One OR'd value component of a clause.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchValue {
    pub prefix: Option<SearchPrefix>,
    pub raw: String,
    /// Token system / quantity system. `None` means unspecified (wildcard).
    pub system: Option<String>,
    /// Quantity unit or code. `None` means unspecified (wildcard).
    pub unit: Option<String>,
}

impl SearchValue {
    pub fn plain(raw: impl Into<String>) -> Self {
        Self {
            prefix: None,
            raw: raw.into(),
            system: None,
            unit: None,
        }
    }
}

/// `_include` / `_revinclude` directive: marks extra resources to append to
/// the result set after filtering. Never filters.
#[derive(Debug, Clone, PartialEq)]
pub struct IncludeDirective {
    pub reverse: bool,
    pub source_type: String,
    pub parameter: String,
    pub target_type: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ClauseKind {
    /// A plain typed parameter on the searched resource.
    Standard {
        definition: Arc<SearchParamDefinition>,
        modifier: Option<SearchModifier>,
        values: Vec<SearchValue>,
    },
    /// `$`-joined component values; components AND, with positional pairing
    /// of comma alternatives across components.
    Composite {
        definition: Arc<SearchParamDefinition>,
        component_definitions: Vec<Arc<SearchParamDefinition>>,
        components: Vec<Vec<SearchValue>>,
    },
    /// `param.sub` / `param:Type.sub`: filters on an attribute of the
    /// referenced resource.
    Chained {
        definition: Arc<SearchParamDefinition>,
        target_type: Option<String>,
        sub: String,
        value: String,
    },
    /// `_has:Type:refParam:subParam`: matches when some Type resource
    /// references the candidate via refParam and itself matches subParam.
    ReverseChain {
        source_type: String,
        reference_param: Arc<SearchParamDefinition>,
        sub: String,
        value: String,
    },
    Include(IncludeDirective),
    /// Result-control parameter; never filters.
    Control,
    /// Unknown parameter or malformed shape; evaluates false, never errors.
    Unknown,
}

/// A parsed search clause scoped to one resource type.
#[derive(Debug, Clone)]
pub struct ParsedSearchParameter {
    pub resource_type: String,
    pub name: String,
    pub value: String,
    pub kind: ClauseKind,
}

impl ParsedSearchParameter {
    /// Parse an `application/x-www-form-urlencoded` query string.
    pub fn parse_query(
        resource_type: &str,
        query: &str,
        registry: &SearchParameterRegistry,
    ) -> Vec<ParsedSearchParameter> {
        form_urlencoded::parse(query.as_bytes())
            .map(|(name, value)| Self::parse_single(resource_type, &name, &value, registry))
            .collect()
    }

    /// Parse a single name/value pair (already url-decoded).
    pub fn parse_single(
        resource_type: &str,
        name: &str,
        value: &str,
        registry: &SearchParameterRegistry,
    ) -> ParsedSearchParameter {
        let kind = classify(resource_type, name, value, registry);
        if matches!(kind, ClauseKind::Unknown) {
            debug!(resource_type, name, "unknown search parameter, clause will not match");
        }
        ParsedSearchParameter {
            resource_type: resource_type.to_string(),
            name: name.to_string(),
            value: value.to_string(),
            kind,
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self.kind, ClauseKind::Control)
    }

    pub fn is_include(&self) -> bool {
        matches!(self.kind, ClauseKind::Include(_))
    }

    /// Effective `_count` over a clause list, clamped to `[1, max]`.
    pub fn parse_count(params: &[ParsedSearchParameter], default: usize, max: usize) -> usize {
        params
            .iter()
            .find(|p| p.name == "_count")
            .and_then(|p| p.value.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .map(|n| n.min(max))
            .unwrap_or(default)
    }

    /// Effective `_offset` over a clause list.
    pub fn parse_offset(params: &[ParsedSearchParameter], default: usize) -> usize {
        params
            .iter()
            .find(|p| p.name == "_offset")
            .and_then(|p| p.value.parse::<usize>().ok())
            .unwrap_or(default)
    }

    /// All include directives in a clause list.
    pub fn include_directives(params: &[ParsedSearchParameter]) -> Vec<&IncludeDirective> {
        params
            .iter()
            .filter_map(|p| match &p.kind {
                ClauseKind::Include(directive) => Some(directive),
                _ => None,
            })
            .collect()
    }
}

fn classify(
    resource_type: &str,
    name: &str,
    value: &str,
    registry: &SearchParameterRegistry,
) -> ClauseKind {
    let base_name = name.split(':').next().unwrap_or(name);

    if base_name == "_include" || base_name == "_revinclude" {
        return match parse_include(base_name == "_revinclude", value) {
            Some(directive) => ClauseKind::Include(directive),
            None => ClauseKind::Unknown,
        };
    }

    if let Some(rest) = name.strip_prefix("_has:") {
        return parse_reverse_chain(rest, value, registry);
    }

    if CONTROL_PARAMETERS.contains(&base_name) {
        return ClauseKind::Control;
    }

    if let Some((head, sub)) = name.split_once('.') {
        return parse_chained(resource_type, head, sub, value, registry);
    }

    let (param_name, modifier) = split_modifier(name);
    let Some(definition) = registry.get(resource_type, param_name) else {
        return ClauseKind::Unknown;
    };

    if definition.param_type == SearchParamType::Composite {
        return parse_composite(&definition, value, registry);
    }

    let values = split_values(value)
        .map(|v| parse_value(v, definition.param_type, modifier.as_ref()))
        .collect();

    ClauseKind::Standard {
        definition,
        modifier,
        values,
    }
}

fn split_modifier(name: &str) -> (&str, Option<SearchModifier>) {
    match name.split_once(':') {
        Some((base, modifier)) => (base, SearchModifier::parse(modifier)),
        None => (name, None),
    }
}

fn split_values(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|v| !v.is_empty())
}

fn parse_include(reverse: bool, value: &str) -> Option<IncludeDirective> {
    let mut parts = value.split(':');
    let source_type = parts.next().filter(|s| !s.is_empty())?;
    let parameter = parts.next().filter(|s| !s.is_empty())?;
    let target_type = parts.next().map(str::to_string);
    Some(IncludeDirective {
        reverse,
        source_type: source_type.to_string(),
        parameter: parameter.to_string(),
        target_type,
    })
}

fn parse_reverse_chain(
    rest: &str,
    value: &str,
    registry: &SearchParameterRegistry,
) -> ClauseKind {
    // _has:Type:refParam:subParam — subParam may carry its own modifier.
    let mut parts = rest.splitn(3, ':');
    let (Some(source_type), Some(ref_name), Some(sub)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return ClauseKind::Unknown;
    };
    if source_type.is_empty() || ref_name.is_empty() || sub.is_empty() {
        return ClauseKind::Unknown;
    }

    let Some(reference_param) = registry.get(source_type, ref_name) else {
        return ClauseKind::Unknown;
    };
    if reference_param.param_type != SearchParamType::Reference {
        return ClauseKind::Unknown;
    }

    ClauseKind::ReverseChain {
        source_type: source_type.to_string(),
        reference_param,
        sub: sub.to_string(),
        value: value.to_string(),
    }
}

fn parse_chained(
    resource_type: &str,
    head: &str,
    sub: &str,
    value: &str,
    registry: &SearchParameterRegistry,
) -> ClauseKind {
    let (param_name, modifier) = split_modifier(head);
    let Some(definition) = registry.get(resource_type, param_name) else {
        return ClauseKind::Unknown;
    };
    if definition.param_type != SearchParamType::Reference {
        return ClauseKind::Unknown;
    }
    let target_type = match modifier {
        Some(SearchModifier::Type(t)) => Some(t),
        Some(_) => return ClauseKind::Unknown,
        None => None,
    };

    ClauseKind::Chained {
        definition,
        target_type,
        sub: sub.to_string(),
        value: value.to_string(),
    }
}

fn parse_composite(
    definition: &Arc<SearchParamDefinition>,
    value: &str,
    registry: &SearchParameterRegistry,
) -> ClauseKind {
    let mut component_definitions = Vec::new();
    for component in &definition.components {
        let resolved = registry.get_by_url(component).or_else(|| {
            definition
                .base
                .iter()
                .find_map(|base| registry.get(base, component))
        });
        match resolved {
            Some(def) => component_definitions.push(def),
            // Invariant: composites only register against live siblings, but
            // a sibling may have been removed since.
            None => return ClauseKind::Unknown,
        }
    }

    let raw_components: Vec<&str> = value.split('$').collect();
    if raw_components.len() != component_definitions.len() {
        return ClauseKind::Unknown;
    }

    let component_values: Vec<Vec<SearchValue>> = raw_components
        .iter()
        .zip(component_definitions.iter())
        .map(|(component, def)| {
            split_values(component)
                .map(|v| parse_value(v, def.param_type, None))
                .collect()
        })
        .collect();

    if component_values.iter().any(|alts| alts.is_empty()) {
        return ClauseKind::Unknown;
    }

    ClauseKind::Composite {
        definition: definition.clone(),
        component_definitions,
        components: component_values,
    }
}

fn parse_value(
    raw: &str,
    param_type: SearchParamType,
    modifier: Option<&SearchModifier>,
) -> SearchValue {
    let (prefix, rest) = match param_type {
        SearchParamType::Number | SearchParamType::Date | SearchParamType::Quantity => {
            extract_prefix(raw)
        }
        _ => (None, raw),
    };

    match param_type {
        SearchParamType::Token => split_token(prefix, rest),
        SearchParamType::Reference if matches!(modifier, Some(SearchModifier::Identifier)) => {
            split_token(prefix, rest)
        }
        SearchParamType::Quantity => {
            // value[|system[|unit]] — empty segments are wildcards.
            let mut parts = rest.splitn(3, '|');
            let value_part = parts.next().unwrap_or_default();
            let system = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
            let unit = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
            SearchValue {
                prefix,
                raw: value_part.to_string(),
                system,
                unit,
            }
        }
        _ => SearchValue {
            prefix,
            raw: rest.to_string(),
            system: None,
            unit: None,
        },
    }
}

fn split_token(prefix: Option<SearchPrefix>, rest: &str) -> SearchValue {
    match rest.split_once('|') {
        Some((system, code)) => SearchValue {
            prefix,
            raw: code.to_string(),
            system: Some(system.to_string()).filter(|s| !s.is_empty()),
            unit: None,
        },
        None => SearchValue {
            prefix,
            raw: rest.to_string(),
            system: None,
            unit: None,
        },
    }
}

fn extract_prefix(value: &str) -> (Option<SearchPrefix>, &str) {
    if value.len() >= 2
        && let Some(prefix) = SearchPrefix::parse(&value[..2])
        && !value[2..].is_empty()
    {
        return (Some(prefix), &value[2..]);
    }
    (None, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SearchParameterRegistry;

    fn test_registry() -> SearchParameterRegistry {
        let registry = SearchParameterRegistry::with_common_parameters();
        registry
            .register(
                SearchParamDefinition::new(
                    "name",
                    "http://hl7.org/fhir/SearchParameter/Patient-name",
                    SearchParamType::String,
                    vec!["Patient".to_string()],
                )
                .with_expression("Patient.name")
                .unwrap(),
            )
            .unwrap();
        registry
            .register(
                SearchParamDefinition::new(
                    "subject",
                    "http://hl7.org/fhir/SearchParameter/Observation-subject",
                    SearchParamType::Reference,
                    vec!["Observation".to_string()],
                )
                .with_expression("Observation.subject")
                .unwrap()
                .with_targets(vec!["Patient".to_string(), "Device".to_string()]),
            )
            .unwrap();
        registry
            .register(
                SearchParamDefinition::new(
                    "patient",
                    "http://hl7.org/fhir/SearchParameter/Observation-patient",
                    SearchParamType::Reference,
                    vec!["Observation".to_string()],
                )
                .with_expression("Observation.subject")
                .unwrap()
                .with_targets(vec!["Patient".to_string()]),
            )
            .unwrap();
        registry
            .register(
                SearchParamDefinition::new(
                    "code",
                    "http://hl7.org/fhir/SearchParameter/Observation-code",
                    SearchParamType::Token,
                    vec!["Observation".to_string()],
                )
                .with_expression("Observation.code")
                .unwrap(),
            )
            .unwrap();
        registry
            .register(
                SearchParamDefinition::new(
                    "value-quantity",
                    "http://hl7.org/fhir/SearchParameter/Observation-value-quantity",
                    SearchParamType::Quantity,
                    vec!["Observation".to_string()],
                )
                .with_expression("Observation.valueQuantity")
                .unwrap(),
            )
            .unwrap();
        registry
            .register(
                SearchParamDefinition::new(
                    "code-value-quantity",
                    "http://hl7.org/fhir/SearchParameter/Observation-code-value-quantity",
                    SearchParamType::Composite,
                    vec!["Observation".to_string()],
                )
                .with_components(vec!["code".to_string(), "value-quantity".to_string()]),
            )
            .unwrap();
        registry
    }

    fn parse_one(resource_type: &str, name: &str, value: &str) -> ParsedSearchParameter {
        ParsedSearchParameter::parse_single(resource_type, name, value, &test_registry())
    }

    #[test]
    fn parses_standard_string_param() {
        let clause = parse_one("Patient", "name", "peter,not-present");
        match &clause.kind {
            ClauseKind::Standard {
                modifier, values, ..
            } => {
                assert!(modifier.is_none());
                assert_eq!(values.len(), 2);
                assert_eq!(values[0].raw, "peter");
                assert_eq!(values[1].raw, "not-present");
            }
            other => panic!("unexpected clause: {other:?}"),
        }
    }

    #[test]
    fn parses_modifier() {
        let clause = parse_one("Patient", "name:exact", "Peter");
        match &clause.kind {
            ClauseKind::Standard { modifier, .. } => {
                assert_eq!(modifier, &Some(SearchModifier::Exact));
            }
            other => panic!("unexpected clause: {other:?}"),
        }
    }

    #[test]
    fn parses_token_system_and_code() {
        let clause = parse_one("Observation", "code", "http://loinc.org|9272-6");
        match &clause.kind {
            ClauseKind::Standard { values, .. } => {
                assert_eq!(values[0].system.as_deref(), Some("http://loinc.org"));
                assert_eq!(values[0].raw, "9272-6");
            }
            other => panic!("unexpected clause: {other:?}"),
        }
    }

    #[test]
    fn token_empty_system_is_wildcard() {
        let clause = parse_one("Patient", "_id", "|12345");
        match &clause.kind {
            ClauseKind::Standard { values, .. } => {
                assert!(values[0].system.is_none());
                assert_eq!(values[0].raw, "12345");
            }
            other => panic!("unexpected clause: {other:?}"),
        }
    }

    #[test]
    fn parses_quantity_value_system_unit() {
        let clause = parse_one(
            "Observation",
            "value-quantity",
            "ge185|http://unitsofmeasure.org|[lb_av]",
        );
        match &clause.kind {
            ClauseKind::Standard { values, .. } => {
                let v = &values[0];
                assert_eq!(v.prefix, Some(SearchPrefix::Ge));
                assert_eq!(v.raw, "185");
                assert_eq!(v.system.as_deref(), Some("http://unitsofmeasure.org"));
                assert_eq!(v.unit.as_deref(), Some("[lb_av]"));
            }
            other => panic!("unexpected clause: {other:?}"),
        }
    }

    #[test]
    fn parses_quantity_with_empty_system() {
        let clause = parse_one("Observation", "value-quantity", "185||lbs");
        match &clause.kind {
            ClauseKind::Standard { values, .. } => {
                let v = &values[0];
                assert!(v.prefix.is_none());
                assert_eq!(v.raw, "185");
                assert!(v.system.is_none());
                assert_eq!(v.unit.as_deref(), Some("lbs"));
            }
            other => panic!("unexpected clause: {other:?}"),
        }
    }

    #[test]
    fn parses_chained_param() {
        let clause = parse_one("Observation", "subject.name", "peter");
        match &clause.kind {
            ClauseKind::Chained {
                target_type, sub, value, ..
            } => {
                assert!(target_type.is_none());
                assert_eq!(sub, "name");
                assert_eq!(value, "peter");
            }
            other => panic!("unexpected clause: {other:?}"),
        }
    }

    #[test]
    fn parses_typed_chained_param() {
        let clause = parse_one("Observation", "subject:Patient._id", "example");
        match &clause.kind {
            ClauseKind::Chained {
                target_type, sub, ..
            } => {
                assert_eq!(target_type.as_deref(), Some("Patient"));
                assert_eq!(sub, "_id");
            }
            other => panic!("unexpected clause: {other:?}"),
        }
    }

    #[test]
    fn parses_reverse_chain() {
        let clause = parse_one("Patient", "_has:Observation:patient:_id", "blood-pressure");
        match &clause.kind {
            ClauseKind::ReverseChain {
                source_type,
                reference_param,
                sub,
                value,
            } => {
                assert_eq!(source_type, "Observation");
                assert_eq!(reference_param.code, "patient");
                assert_eq!(sub, "_id");
                assert_eq!(value, "blood-pressure");
            }
            other => panic!("unexpected clause: {other:?}"),
        }
    }

    #[test]
    fn reverse_chain_requires_reference_param() {
        let clause = parse_one("Patient", "_has:Observation:code:_id", "x");
        assert!(matches!(clause.kind, ClauseKind::Unknown));

        let clause = parse_one("Patient", "_has:Observation:patient", "x");
        assert!(matches!(clause.kind, ClauseKind::Unknown));
    }

    #[test]
    fn parses_include_directives() {
        let clause = parse_one("Observation", "_include", "Observation:patient");
        match &clause.kind {
            ClauseKind::Include(directive) => {
                assert!(!directive.reverse);
                assert_eq!(directive.source_type, "Observation");
                assert_eq!(directive.parameter, "patient");
                assert!(directive.target_type.is_none());
            }
            other => panic!("unexpected clause: {other:?}"),
        }

        let clause = parse_one("Patient", "_revinclude", "Observation:patient:Patient");
        match &clause.kind {
            ClauseKind::Include(directive) => {
                assert!(directive.reverse);
                assert_eq!(directive.target_type.as_deref(), Some("Patient"));
            }
            other => panic!("unexpected clause: {other:?}"),
        }
    }

    #[test]
    fn parses_composite_with_positional_alternatives() {
        let clause = parse_one(
            "Observation",
            "code-value-quantity",
            "http://loinc.org|29463-7,urn:x|152584$185||[lb_av],820||265201",
        );
        match &clause.kind {
            ClauseKind::Composite {
                component_definitions,
                components,
                ..
            } => {
                assert_eq!(component_definitions.len(), 2);
                assert_eq!(components.len(), 2);
                assert_eq!(components[0].len(), 2);
                assert_eq!(components[1].len(), 2);
                assert_eq!(components[0][0].raw, "29463-7");
                assert_eq!(components[1][1].raw, "820");
                assert_eq!(components[1][1].unit.as_deref(), Some("265201"));
            }
            other => panic!("unexpected clause: {other:?}"),
        }
    }

    #[test]
    fn composite_with_wrong_component_count_is_unknown() {
        let clause = parse_one("Observation", "code-value-quantity", "1234-5");
        assert!(matches!(clause.kind, ClauseKind::Unknown));
    }

    #[test]
    fn unknown_param_is_fail_closed() {
        let clause = parse_one("Patient", "favorite-color", "blue");
        assert!(matches!(clause.kind, ClauseKind::Unknown));
    }

    #[test]
    fn control_params_are_not_filters() {
        let params = ParsedSearchParameter::parse_query(
            "Patient",
            "_count=10&_sort=-_lastUpdated&name=peter",
            &test_registry(),
        );
        assert_eq!(params.len(), 3);
        assert!(params[0].is_control());
        assert!(params[1].is_control());
        assert!(!params[2].is_control());

        assert_eq!(ParsedSearchParameter::parse_count(&params, 20, 100), 10);
        assert_eq!(ParsedSearchParameter::parse_offset(&params, 0), 0);
    }

    #[test]
    fn count_is_clamped_and_validated() {
        let registry = test_registry();
        let params = ParsedSearchParameter::parse_query("Patient", "_count=500", &registry);
        assert_eq!(ParsedSearchParameter::parse_count(&params, 20, 100), 100);

        let params = ParsedSearchParameter::parse_query("Patient", "_count=abc", &registry);
        assert_eq!(ParsedSearchParameter::parse_count(&params, 20, 100), 20);

        let params = ParsedSearchParameter::parse_query("Patient", "_count=0", &registry);
        assert_eq!(ParsedSearchParameter::parse_count(&params, 20, 100), 20);
    }

    #[test]
    fn url_decoding_applies() {
        let params = ParsedSearchParameter::parse_query(
            "Patient",
            "name=John%20Doe&name=Jane+Doe",
            &test_registry(),
        );
        match &params[0].kind {
            ClauseKind::Standard { values, .. } => assert_eq!(values[0].raw, "John Doe"),
            other => panic!("unexpected clause: {other:?}"),
        }
        match &params[1].kind {
            ClauseKind::Standard { values, .. } => assert_eq!(values[0].raw, "Jane Doe"),
            other => panic!("unexpected clause: {other:?}"),
        }
    }

    #[test]
    fn prefix_extraction_only_for_ordered_types() {
        // "le" is a value prefix for numbers/dates/quantities, but part of
        // the text for strings.
        let clause = parse_one("Patient", "name", "legolas");
        match &clause.kind {
            ClauseKind::Standard { values, .. } => {
                assert!(values[0].prefix.is_none());
                assert_eq!(values[0].raw, "legolas");
            }
            other => panic!("unexpected clause: {other:?}"),
        }

        let clause = parse_one("Patient", "_lastUpdated", "ge2020-01-01T00:00:00Z");
        match &clause.kind {
            ClauseKind::Standard { values, .. } => {
                assert_eq!(values[0].prefix, Some(SearchPrefix::Ge));
                assert_eq!(values[0].raw, "2020-01-01T00:00:00Z");
            }
            other => panic!("unexpected clause: {other:?}"),
        }
    }

    #[test]
    fn missing_modifier_keeps_boolean_value() {
        let clause = parse_one("Patient", "_profile:missing", "true");
        match &clause.kind {
            ClauseKind::Standard {
                modifier, values, ..
            } => {
                assert_eq!(modifier, &Some(SearchModifier::Missing));
                assert_eq!(values[0].raw, "true");
            }
            other => panic!("unexpected clause: {other:?}"),
        }
    }
}
