//! Search parameter registry.
//!
//! Parameters are indexed by (resource type, code) and by canonical url.
//! Common parameters (base `Resource`/`DomainResource`) apply to every type.
//! Uses DashMap so runtime registration of SearchParameter resources never
//! blocks concurrent searches.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::{Result, SearchError};
use crate::parameters::{SearchParamDefinition, SearchParamType};

#[derive(Debug, Default)]
pub struct SearchParameterRegistry {
    /// Parameters indexed by (resource_type, code).
    by_resource: DashMap<(String, String), Arc<SearchParamDefinition>>,
    /// All parameters by canonical url.
    by_url: DashMap<String, Arc<SearchParamDefinition>>,
    /// Common parameters, applicable to every resource type.
    common: DashMap<String, Arc<SearchParamDefinition>>,
}

impl SearchParameterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-loaded with the common parameters every store
    /// supports: `_id`, `_lastUpdated` and `_profile`.
    pub fn with_common_parameters() -> Self {
        let registry = Self::new();
        for def in builtin_common_parameters() {
            // Built-ins carry known-good expressions.
            let _ = registry.register(def);
        }
        registry
    }

    /// Register (or replace) a parameter definition.
    ///
    /// Composite parameters may only reference already-registered sibling
    /// definitions; a dangling component rejects the whole registration.
    pub fn register(&self, param: SearchParamDefinition) -> Result<()> {
        if param.param_type == SearchParamType::Composite {
            for component in &param.components {
                let resolved = self.get_by_url(component).is_some()
                    || param
                        .base
                        .iter()
                        .any(|base| self.get(base, component).is_some());
                if !resolved {
                    return Err(SearchError::unknown_component(&param.code, component));
                }
            }
        }

        let param = Arc::new(param);
        self.by_url.insert(param.url.clone(), param.clone());

        if param.is_common() {
            self.common.insert(param.code.clone(), param.clone());
        }
        for base in &param.base {
            self.by_resource
                .insert((base.clone(), param.code.clone()), param.clone());
        }
        debug!(code = %param.code, url = %param.url, "registered search parameter");
        Ok(())
    }

    /// Remove a parameter by canonical url. Returns true if found.
    pub fn remove_by_url(&self, url: &str) -> bool {
        if let Some((_, param)) = self.by_url.remove(url) {
            for base in &param.base {
                if base == "Resource" || base == "DomainResource" {
                    self.common.remove(&param.code);
                } else {
                    self.by_resource.remove(&(base.clone(), param.code.clone()));
                }
            }
            debug!(code = %param.code, url = %url, "removed search parameter");
            true
        } else {
            false
        }
    }

    /// Remove a parameter by (resource type, code). Returns true if found.
    pub fn remove(&self, resource_type: &str, code: &str) -> bool {
        match self
            .by_resource
            .remove(&(resource_type.to_string(), code.to_string()))
        {
            Some((_, param)) => {
                self.by_url.remove(&param.url);
                true
            }
            None => false,
        }
    }

    /// Look up a parameter for a resource type, falling back to common
    /// parameters.
    pub fn get(&self, resource_type: &str, code: &str) -> Option<Arc<SearchParamDefinition>> {
        let key = (resource_type.to_string(), code.to_string());
        if let Some(param) = self.by_resource.get(&key) {
            return Some(param.clone());
        }
        self.common.get(code).map(|p| p.clone())
    }

    pub fn get_by_url(&self, url: &str) -> Option<Arc<SearchParamDefinition>> {
        self.by_url.get(url).map(|entry| entry.value().clone())
    }

    /// All parameters applicable to a resource type (specific + common).
    pub fn get_all_for_type(&self, resource_type: &str) -> Vec<Arc<SearchParamDefinition>> {
        let mut params: Vec<_> = self.common.iter().map(|e| e.value().clone()).collect();
        params.extend(
            self.by_resource
                .iter()
                .filter(|e| e.key().0 == resource_type && !e.value().is_common())
                .map(|e| e.value().clone()),
        );
        params
    }

    pub fn len(&self) -> usize {
        self.by_url.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_url.is_empty()
    }
}

fn builtin_common_parameters() -> Vec<SearchParamDefinition> {
    let id = SearchParamDefinition::new(
        "_id",
        "http://hl7.org/fhir/SearchParameter/Resource-id",
        SearchParamType::Token,
        vec!["Resource".to_string()],
    )
    .with_description("Logical id of this artifact");

    let last_updated = SearchParamDefinition::new(
        "_lastUpdated",
        "http://hl7.org/fhir/SearchParameter/Resource-lastUpdated",
        SearchParamType::Date,
        vec!["Resource".to_string()],
    )
    .with_description("When the resource version last changed");

    let profile = SearchParamDefinition::new(
        "_profile",
        "http://hl7.org/fhir/SearchParameter/Resource-profile",
        SearchParamType::Uri,
        vec!["Resource".to_string()],
    )
    .with_description("Profiles this resource claims to conform to");

    // Envelope fields live at the tree root, so expressions skip the type
    // segment.
    vec![
        id.with_expression("id").expect("builtin expression"),
        last_updated
            .with_expression("meta.lastUpdated")
            .expect("builtin expression"),
        profile
            .with_expression("meta.profile")
            .expect("builtin expression"),
    ]
}
