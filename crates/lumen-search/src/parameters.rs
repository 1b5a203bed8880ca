use lumen_core::{CompiledPath, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Search parameter type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchParamType {
    Number,
    Date,
    String,
    Token,
    Reference,
    Composite,
    Quantity,
    Uri,
}

impl SearchParamType {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "number" => Some(Self::Number),
            "date" => Some(Self::Date),
            "string" => Some(Self::String),
            "token" => Some(Self::Token),
            "reference" => Some(Self::Reference),
            "composite" => Some(Self::Composite),
            "quantity" => Some(Self::Quantity),
            "uri" => Some(Self::Uri),
            _ => None,
        }
    }
}

impl fmt::Display for SearchParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Number => "number",
            Self::Date => "date",
            Self::String => "string",
            Self::Token => "token",
            Self::Reference => "reference",
            Self::Composite => "composite",
            Self::Quantity => "quantity",
            Self::Uri => "uri",
        };
        f.write_str(s)
    }
}

/// Search modifiers, applied as a suffix to the parameter name
/// (`name:modifier`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchModifier {
    Exact,
    Contains,
    Text,
    In,
    NotIn,
    Below,
    Above,
    Not,
    Identifier,
    OfType,
    Missing,
    /// e.g. `subject:Patient` — restricts a reference to one target type.
    Type(String),
}

impl SearchModifier {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "exact" => Some(Self::Exact),
            "contains" => Some(Self::Contains),
            "text" => Some(Self::Text),
            "in" => Some(Self::In),
            "not-in" => Some(Self::NotIn),
            "below" => Some(Self::Below),
            "above" => Some(Self::Above),
            "not" => Some(Self::Not),
            "identifier" => Some(Self::Identifier),
            "of-type" | "ofType" => Some(Self::OfType),
            "missing" => Some(Self::Missing),
            other if !other.is_empty() => Some(Self::Type(other.to_string())),
            _ => None,
        }
    }

    /// Whether this modifier can apply to the given parameter type.
    /// Inapplicable combinations evaluate fail-closed false.
    pub fn applicable_to(&self, param_type: SearchParamType) -> bool {
        match self {
            Self::Missing => true,
            Self::Exact | Self::Contains => matches!(param_type, SearchParamType::String),
            Self::Not | Self::Text | Self::In | Self::NotIn | Self::OfType => {
                matches!(param_type, SearchParamType::Token)
            }
            Self::Below | Self::Above => {
                matches!(param_type, SearchParamType::Token | SearchParamType::Uri)
            }
            Self::Identifier | Self::Type(_) => {
                matches!(param_type, SearchParamType::Reference)
            }
        }
    }
}

/// Prefixes for number/date/quantity search values, e.g. `ge2020-01-01`,
/// `lt5.0`. Absent means `eq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchPrefix {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl SearchPrefix {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            "gt" => Some(Self::Gt),
            "lt" => Some(Self::Lt),
            "ge" => Some(Self::Ge),
            "le" => Some(Self::Le),
            _ => None,
        }
    }

    /// Apply this comparator to a resource value against a search value.
    pub fn compare_f64(&self, resource_value: f64, search_value: f64) -> bool {
        match self {
            Self::Eq => resource_value == search_value,
            Self::Ne => resource_value != search_value,
            Self::Gt => resource_value > search_value,
            Self::Lt => resource_value < search_value,
            Self::Ge => resource_value >= search_value,
            Self::Le => resource_value <= search_value,
        }
    }
}

impl fmt::Display for SearchPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Ge => "ge",
            Self::Le => "le",
        };
        f.write_str(s)
    }
}

/// A search parameter definition, either compiled in (common parameters) or
/// registered at runtime from a stored SearchParameter resource.
#[derive(Debug, Clone)]
pub struct SearchParamDefinition {
    /// The code used in queries (e.g. "name", "value-quantity").
    pub code: String,
    /// Canonical url of the definition.
    pub url: String,
    pub param_type: SearchParamType,
    /// Path expression extracting matchable values.
    pub expression: Option<String>,
    /// Compiled form of `expression`, built at registration.
    pub compiled: Option<CompiledPath>,
    /// Resource types this parameter applies to.
    pub base: Vec<String>,
    /// Target resource types for reference parameters.
    pub target: Vec<String>,
    /// Component definitions (urls or sibling codes) for composite parameters.
    pub components: Vec<String>,
    pub description: String,
}

impl SearchParamDefinition {
    pub fn new(
        code: impl Into<String>,
        url: impl Into<String>,
        param_type: SearchParamType,
        base: Vec<String>,
    ) -> Self {
        Self {
            code: code.into(),
            url: url.into(),
            param_type,
            expression: None,
            compiled: None,
            base,
            target: Vec::new(),
            components: Vec::new(),
            description: String::new(),
        }
    }

    /// Set the extraction expression and compile it. An uncompilable
    /// expression is an error at registration time, not at query time.
    pub fn with_expression(mut self, expr: impl Into<String>) -> Result<Self> {
        let expr = expr.into();
        self.compiled = Some(CompiledPath::compile(&expr)?);
        self.expression = Some(expr);
        Ok(self)
    }

    #[must_use]
    pub fn with_targets(mut self, targets: Vec<String>) -> Self {
        self.target = targets;
        self
    }

    #[must_use]
    pub fn with_components(mut self, components: Vec<String>) -> Self {
        self.components = components;
        self
    }

    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Check if this parameter applies to a given resource type.
    pub fn applies_to(&self, resource_type: &str) -> bool {
        self.base
            .iter()
            .any(|b| b == resource_type || b == "Resource" || b == "DomainResource")
    }

    /// Check if this is a common parameter (applies to all resources).
    pub fn is_common(&self) -> bool {
        self.base
            .iter()
            .any(|b| b == "Resource" || b == "DomainResource")
    }

    /// Extract matchable values from a resource JSON tree.
    pub fn extract(&self, resource: &serde_json::Value) -> Vec<serde_json::Value> {
        match &self.compiled {
            Some(path) => path.select(resource),
            None => Vec::new(),
        }
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}
