//! The store facade.
//!
//! One `FhirStore` per tenant owns the type→store map, the search parameter
//! registry, the unit table and the subscription engine, and dispatches
//! routed interactions into store operations. Ownership is one-directional:
//! stores and the engine see only the narrow `ReferenceResolver` and
//! `MutationHook` interfaces, never the facade.

use crate::auth::{AuthorizationInfo, in_compartment};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::store::{ResourceStore, SearchResult};
use http::StatusCode;
use lumen_api::{FhirResponse, Interaction, OperationOutcome, Verb, classify};
use lumen_core::{Codec, CoreError, JsonCodec, Resource, ResourceType, SummaryMode, generate_id};
use lumen_search::{
    ParsedSearchParameter, ReferenceResolver, SearchParamDefinition, SearchParamType,
    SearchParameterRegistry, UnitConversionTable,
};
use lumen_subscriptions::SubscriptionEngine;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

/// Cross-type resolver handed to stores and the engine. Holds the shared
/// store map, not the facade.
#[derive(Clone)]
pub struct StoreResolver {
    stores: Arc<HashMap<String, Arc<ResourceStore>>>,
}

impl ReferenceResolver for StoreResolver {
    fn resolve(&self, reference: &str) -> Option<Resource> {
        let mut segments = reference.rsplit('/');
        let id = segments.next()?;
        let type_name = segments.next()?;
        self.stores.get(type_name)?.get(id)
    }

    fn instances_of(&self, resource_type: &str) -> Vec<Resource> {
        self.stores
            .get(resource_type)
            .map(|store| store.all())
            .unwrap_or_default()
    }
}

/// A classified request plus everything dispatch needs.
#[derive(Debug, Clone)]
pub struct RoutedRequest {
    pub interaction: Interaction,
    /// Query string (GET) or form-encoded body (POST `_search`) — the
    /// grammar is identical either way.
    pub query: String,
    pub body: Vec<u8>,
    pub content_type: String,
    pub if_none_match: Option<String>,
    pub authorization: Option<AuthorizationInfo>,
}

impl RoutedRequest {
    pub fn new(interaction: Interaction) -> Self {
        Self {
            interaction,
            query: String::new(),
            body: Vec::new(),
            content_type: "application/fhir+json".to_string(),
            if_none_match: None,
            authorization: None,
        }
    }

    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    #[must_use]
    pub fn with_if_none_match(mut self, etag: impl Into<String>) -> Self {
        self.if_none_match = Some(etag.into());
        self
    }

    #[must_use]
    pub fn with_authorization(mut self, authorization: AuthorizationInfo) -> Self {
        self.authorization = Some(authorization);
        self
    }
}

pub struct FhirStore {
    config: StoreConfig,
    stores: Arc<HashMap<String, Arc<ResourceStore>>>,
    registry: Arc<SearchParameterRegistry>,
    units: Arc<UnitConversionTable>,
    engine: Arc<SubscriptionEngine>,
    codec: Arc<dyn Codec>,
}

impl FhirStore {
    pub fn new(config: StoreConfig) -> Self {
        Self::with_codec(config, Arc::new(JsonCodec::new()))
    }

    /// Build the tenant from its config: one store per listed type — an
    /// explicit factory table, no reflection.
    pub fn with_codec(config: StoreConfig, codec: Arc<dyn Codec>) -> Self {
        let registry = Arc::new(SearchParameterRegistry::with_common_parameters());
        let units = Arc::new(UnitConversionTable::new());

        let mut stores = HashMap::new();
        for type_name in &config.resource_types {
            match ResourceType::from_str(type_name) {
                Ok(resource_type) => {
                    stores.insert(
                        type_name.clone(),
                        Arc::new(ResourceStore::new(
                            resource_type,
                            registry.clone(),
                            units.clone(),
                        )),
                    );
                }
                Err(e) => warn!(type_name, error = %e, "skipping unsupported resource type"),
            }
        }

        let engine = Arc::new(SubscriptionEngine::new(registry.clone(), units.clone()));

        Self {
            config,
            stores: Arc::new(stores),
            registry,
            units,
            engine,
            codec,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn registry(&self) -> &SearchParameterRegistry {
        &self.registry
    }

    pub fn units(&self) -> &UnitConversionTable {
        &self.units
    }

    pub fn subscription_engine(&self) -> &SubscriptionEngine {
        &self.engine
    }

    pub fn store(&self, type_name: &str) -> Option<&Arc<ResourceStore>> {
        self.stores.get(type_name)
    }

    pub fn supported_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.stores.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn is_known_type(&self, type_name: &str) -> bool {
        self.stores.contains_key(type_name)
    }

    pub fn resolver(&self) -> StoreResolver {
        StoreResolver {
            stores: self.stores.clone(),
        }
    }

    /// Classify a request path against this tenant's known types.
    pub fn route(
        &self,
        verb: Verb,
        segments: &[&str],
        query_present: bool,
    ) -> Option<Interaction> {
        classify(verb, segments, query_present, &|name| {
            self.is_known_type(name)
        })
    }

    /// Dispatch a routed interaction into a store operation and produce the
    /// response envelope.
    pub async fn dispatch(&self, request: RoutedRequest) -> FhirResponse {
        match request.interaction.clone() {
            Interaction::TypeCreate(type_name) => self.instance_create(&type_name, &request).await,
            Interaction::TypeCreateConditional(type_name) => {
                self.conditional_create(&type_name, &request).await
            }
            Interaction::InstanceRead(type_name, id) => {
                self.instance_read(&type_name, &id, &request)
            }
            Interaction::InstanceUpdate(type_name, id) => {
                self.instance_update(&type_name, &id, &request).await
            }
            Interaction::InstanceDelete(type_name, id) => {
                self.instance_delete(&type_name, &id, &request).await
            }
            Interaction::TypeSearch(type_name) => self.type_search(&type_name, &request).await,
            Interaction::SystemSearch => self.system_search(&request).await,
            Interaction::SystemCapabilities => self.capabilities(&request),
            Interaction::CompartmentSearch(type_name, id) => {
                self.compartment_search(&type_name, &id, None, &request).await
            }
            Interaction::CompartmentTypeSearch(type_name, id, target) => {
                self.compartment_search(&type_name, &id, Some(target), &request)
                    .await
            }
            other => FhirResponse::failure(
                StatusCode::NOT_IMPLEMENTED,
                OperationOutcome::error(
                    "not-supported",
                    format!("Interaction {other:?} is not supported by this server"),
                ),
            ),
        }
    }

    async fn instance_create(&self, type_name: &str, request: &RoutedRequest) -> FhirResponse {
        let Some(store) = self.store(type_name) else {
            return unsupported_type(type_name);
        };
        let resource = match self.parse_body(request) {
            Ok(resource) => resource,
            Err(response) => return *response,
        };
        if resource.type_name() != type_name {
            let error = StoreError::type_mismatch(type_name, resource.type_name());
            return store_failure(&error);
        }

        match store
            .create(
                resource,
                self.config.allow_existing_id,
                self.engine.as_ref(),
                &self.resolver(),
            )
            .await
        {
            Ok(created) => {
                self.apply_registration(&created);
                self.resource_response(StatusCode::CREATED, &created, request)
                    .with_location(created.reference())
                    .with_outcome(OperationOutcome::success(format!(
                        "Created {}",
                        created.reference()
                    )))
            }
            Err(error) => store_failure(&error),
        }
    }

    async fn conditional_create(&self, type_name: &str, request: &RoutedRequest) -> FhirResponse {
        let Some(store) = self.store(type_name) else {
            return unsupported_type(type_name);
        };
        let params =
            ParsedSearchParameter::parse_query(type_name, &request.query, &self.registry);
        let result = store
            .search(&params, &self.resolver(), request.authorization.as_ref())
            .await;

        match result.total() {
            0 => self.instance_create(type_name, request).await,
            1 => {
                let existing = &result.matches[0];
                self.resource_response(StatusCode::OK, existing, request)
                    .with_location(existing.reference())
                    .with_outcome(OperationOutcome::success(format!(
                        "Matched existing {}",
                        existing.reference()
                    )))
            }
            n => FhirResponse::failure(
                StatusCode::PRECONDITION_FAILED,
                OperationOutcome::error(
                    "multiple-matches",
                    format!("Conditional create matched {n} resources"),
                ),
            ),
        }
    }

    fn instance_read(&self, type_name: &str, id: &str, request: &RoutedRequest) -> FhirResponse {
        let Some(store) = self.store(type_name) else {
            return unsupported_type(type_name);
        };
        let Some(resource) = store.get(id) else {
            return store_failure(&StoreError::not_found(type_name, id));
        };

        let etag = format!("W/\"{}\"", resource.version());
        if request.if_none_match.as_deref() == Some(etag.as_str()) {
            let mut response = FhirResponse::new(StatusCode::NOT_MODIFIED);
            response.etag = Some(etag);
            return response;
        }

        self.resource_response(StatusCode::OK, &resource, request)
            .with_outcome(OperationOutcome::success(format!(
                "Read {}",
                resource.reference()
            )))
    }

    async fn instance_update(
        &self,
        type_name: &str,
        id: &str,
        request: &RoutedRequest,
    ) -> FhirResponse {
        let Some(store) = self.store(type_name) else {
            return unsupported_type(type_name);
        };
        let mut resource = match self.parse_body(request) {
            Ok(resource) => resource,
            Err(response) => return *response,
        };
        if resource.type_name() != type_name {
            return store_failure(&StoreError::type_mismatch(type_name, resource.type_name()));
        }
        if resource.id.is_empty() {
            resource.id = id.to_string();
        } else if resource.id != id {
            return FhirResponse::failure(
                StatusCode::BAD_REQUEST,
                OperationOutcome::error(
                    "invalid",
                    format!("Payload id '{}' does not match url id '{id}'", resource.id),
                ),
            );
        }

        match store
            .update(resource, true, self.engine.as_ref(), &self.resolver())
            .await
        {
            Ok((updated, _previous)) => {
                self.apply_registration(&updated);
                self.resource_response(StatusCode::OK, &updated, request)
                    .with_location(updated.reference())
                    .with_outcome(OperationOutcome::success(format!(
                        "Updated {}",
                        updated.reference()
                    )))
            }
            Err(error) => store_failure(&error),
        }
    }

    async fn instance_delete(
        &self,
        type_name: &str,
        id: &str,
        request: &RoutedRequest,
    ) -> FhirResponse {
        let Some(store) = self.store(type_name) else {
            return unsupported_type(type_name);
        };
        match store.delete(id, self.engine.as_ref(), &self.resolver()).await {
            Ok(removed) => {
                self.apply_deregistration(&removed);
                self.resource_response(StatusCode::OK, &removed, request)
                    .with_outcome(OperationOutcome::success(format!(
                        "Deleted {}",
                        removed.reference()
                    )))
            }
            Err(error) => store_failure(&error),
        }
    }

    async fn type_search(&self, type_name: &str, request: &RoutedRequest) -> FhirResponse {
        let Some(store) = self.store(type_name) else {
            return unsupported_type(type_name);
        };
        let params =
            ParsedSearchParameter::parse_query(type_name, &request.query, &self.registry);
        let result = store
            .search(&params, &self.resolver(), request.authorization.as_ref())
            .await;

        let bundle = self.searchset_bundle(&result, &params);
        self.bundle_response(bundle)
            .with_outcome(OperationOutcome::success(format!("Searched {type_name}")))
    }

    async fn system_search(&self, request: &RoutedRequest) -> FhirResponse {
        let mut combined = SearchResult::default();
        for type_name in self.supported_types() {
            let Some(store) = self.store(&type_name) else {
                continue;
            };
            let params =
                ParsedSearchParameter::parse_query(&type_name, &request.query, &self.registry);
            let result = store
                .search(&params, &self.resolver(), request.authorization.as_ref())
                .await;
            combined.matches.extend(result.matches);
            combined.included.extend(result.included);
        }

        let params = ParsedSearchParameter::parse_query("Resource", &request.query, &self.registry);
        let bundle = self.searchset_bundle(&combined, &params);
        self.bundle_response(bundle)
            .with_outcome(OperationOutcome::success("Searched all resource types"))
    }

    async fn compartment_search(
        &self,
        type_name: &str,
        id: &str,
        target: Option<String>,
        request: &RoutedRequest,
    ) -> FhirResponse {
        let Some(store) = self.store(type_name) else {
            return unsupported_type(type_name);
        };
        if store.get(id).is_none() {
            return store_failure(&StoreError::not_found(type_name, id));
        }
        let compartment = format!("{type_name}/{id}");

        let target_types: Vec<String> = match target {
            Some(t) => vec![t],
            None => self.supported_types(),
        };

        let mut combined = SearchResult::default();
        for target_type in target_types {
            let Some(target_store) = self.store(&target_type) else {
                continue;
            };
            let params =
                ParsedSearchParameter::parse_query(&target_type, &request.query, &self.registry);
            let result = target_store
                .search(&params, &self.resolver(), request.authorization.as_ref())
                .await;
            combined.matches.extend(
                result
                    .matches
                    .into_iter()
                    .filter(|r| in_compartment(r, &compartment)),
            );
        }

        let params = ParsedSearchParameter::parse_query("Resource", &request.query, &self.registry);
        let bundle = self.searchset_bundle(&combined, &params);
        self.bundle_response(bundle)
            .with_outcome(OperationOutcome::success(format!(
                "Searched compartment {compartment}"
            )))
    }

    fn capabilities(&self, _request: &RoutedRequest) -> FhirResponse {
        let resources: Vec<Value> = self
            .supported_types()
            .iter()
            .map(|type_name| {
                let search_params: Vec<Value> = self
                    .registry
                    .get_all_for_type(type_name)
                    .iter()
                    .map(|def| {
                        json!({
                            "name": def.code,
                            "definition": def.url,
                            "type": def.param_type.to_string(),
                        })
                    })
                    .collect();
                json!({
                    "type": type_name,
                    "interaction": [
                        {"code": "read"},
                        {"code": "create"},
                        {"code": "update"},
                        {"code": "delete"},
                        {"code": "search-type"}
                    ],
                    "searchParam": search_params,
                })
            })
            .collect();

        let statement = json!({
            "resourceType": "CapabilityStatement",
            "id": generate_id(),
            "status": "active",
            "date": lumen_core::now_utc().to_string(),
            "kind": "instance",
            "implementation": {"url": self.config.base_url, "description": "Lumen in-memory server"},
            "fhirVersion": "5.0.0",
            "format": ["application/fhir+json"],
            "rest": [{"mode": "server", "resource": resources}],
        });

        self.bundle_response(statement)
            .with_outcome(OperationOutcome::success("Capability statement generated"))
    }

    /// Register runtime definition resources in lock-step with storage.
    fn apply_registration(&self, resource: &Resource) {
        match resource.resource_type {
            ResourceType::SearchParameter => {
                if let Err(e) = self.register_search_parameter(resource) {
                    warn!(id = %resource.id, error = %e, "search parameter not registered");
                }
            }
            ResourceType::SubscriptionTopic => {
                let _ = self.engine.register_topic(resource);
            }
            ResourceType::Subscription => {
                let _ = self.engine.register_subscription(resource);
            }
            _ => {}
        }
    }

    /// Deregister in lock-step with deletion.
    fn apply_deregistration(&self, resource: &Resource) {
        match resource.resource_type {
            ResourceType::SearchParameter => {
                if let Some(url) = resource.field("url").and_then(Value::as_str) {
                    self.registry.remove_by_url(url);
                }
            }
            ResourceType::SubscriptionTopic => {
                self.engine.remove_topic(&resource.id);
            }
            ResourceType::Subscription => {
                self.engine.remove_subscription(&resource.id);
            }
            _ => {}
        }
    }

    fn register_search_parameter(&self, resource: &Resource) -> lumen_search::Result<()> {
        let code = resource
            .field("code")
            .or_else(|| resource.field("name"))
            .and_then(Value::as_str)
            .unwrap_or(&resource.id)
            .to_string();
        let url = resource
            .field("url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}/SearchParameter/{}", self.config.base_url, resource.id));
        let param_type = resource
            .field("type")
            .and_then(Value::as_str)
            .and_then(SearchParamType::parse)
            .ok_or_else(|| {
                lumen_search::SearchError::InvalidDefinition(format!(
                    "SearchParameter/{} has no usable type",
                    resource.id
                ))
            })?;
        let base = string_list(resource.field("base"));
        if base.is_empty() {
            return Err(lumen_search::SearchError::InvalidDefinition(format!(
                "SearchParameter/{} has no base types",
                resource.id
            )));
        }

        let mut definition = SearchParamDefinition::new(code, url, param_type, base)
            .with_targets(string_list(resource.field("target")));

        if let Some(Value::Array(components)) = resource.field("component") {
            let definitions = components
                .iter()
                .filter_map(|c| c.get("definition").and_then(Value::as_str))
                .map(str::to_string)
                .collect();
            definition = definition.with_components(definitions);
        }
        if let Some(expression) = resource.field("expression").and_then(Value::as_str) {
            definition = definition.with_expression(expression)?;
        }

        self.registry.register(definition)
    }

    fn parse_body(&self, request: &RoutedRequest) -> Result<Resource, Box<FhirResponse>> {
        self.codec
            .parse(&request.body, &request.content_type)
            .map_err(|e| {
                let status = match &e {
                    CoreError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    _ => StatusCode::BAD_REQUEST,
                };
                Box::new(FhirResponse::failure(
                    status,
                    OperationOutcome::error("invalid", e.to_string()),
                ))
            })
    }

    fn resource_response(
        &self,
        status: StatusCode,
        resource: &Resource,
        request: &RoutedRequest,
    ) -> FhirResponse {
        let mut response = FhirResponse::new(status);
        match self
            .codec
            .serialize(resource, &request.content_type, SummaryMode::Full)
        {
            Ok(bytes) => {
                response = response.with_resource(String::from_utf8_lossy(&bytes).into_owned());
            }
            Err(e) => {
                return FhirResponse::failure(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    OperationOutcome::error("exception", e.to_string()),
                );
            }
        }
        if let Some(version) = &resource.meta.version_id {
            response = response.with_etag_weak(version.clone());
        }
        if let Some(last_updated) = &resource.meta.last_updated {
            response = response.with_last_modified(last_updated);
        }
        response
    }

    fn bundle_response(&self, body: Value) -> FhirResponse {
        FhirResponse::new(StatusCode::OK).with_resource(body.to_string())
    }

    fn searchset_bundle(&self, result: &SearchResult, params: &[ParsedSearchParameter]) -> Value {
        let count = ParsedSearchParameter::parse_count(
            params,
            self.config.search.default_count,
            self.config.search.max_count,
        );
        let offset = ParsedSearchParameter::parse_offset(params, 0);

        let mut entries: Vec<Value> = result
            .matches
            .iter()
            .skip(offset)
            .take(count)
            .map(|r| self.bundle_entry(r, "match"))
            .collect();
        entries.extend(result.included.iter().map(|r| self.bundle_entry(r, "include")));

        json!({
            "resourceType": "Bundle",
            "id": generate_id(),
            "type": "searchset",
            "total": result.total(),
            "entry": entries,
        })
    }

    fn bundle_entry(&self, resource: &Resource, mode: &str) -> Value {
        json!({
            "fullUrl": format!("{}/{}", self.config.base_url, resource.reference()),
            "resource": resource.as_json(),
            "search": {"mode": mode},
        })
    }
}

fn unsupported_type(type_name: &str) -> FhirResponse {
    FhirResponse::failure(
        StatusCode::BAD_REQUEST,
        OperationOutcome::error(
            "not-supported",
            format!("Resource type {type_name} is not supported"),
        ),
    )
}

fn store_failure(error: &StoreError) -> FhirResponse {
    FhirResponse::failure(
        error.status_code(),
        OperationOutcome::error(error.outcome_code(), error.to_string()),
    )
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(single)) => vec![single.clone()],
        _ => Vec::new(),
    }
}
