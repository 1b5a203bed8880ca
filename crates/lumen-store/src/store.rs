//! Per-type versioned resource store.
//!
//! Each store exclusively owns the live instances of one resource type.
//! Reads go through the lock-free map; every mutation takes the store's
//! write mutex so the version read-modify-write and the map update form one
//! critical section. The mutation hook (the subscription engine in
//! production) runs synchronously inside that section, so a write returns
//! only after its notifications are queued.

use crate::auth::AuthorizationInfo;
use crate::error::{Result, StoreError};
use lumen_core::{Resource, ResourceType, generate_id, validate_id};
use lumen_search::{
    ParsedSearchParameter, ReferenceResolver, SearchParameterRegistry, SearchPredicateEngine,
    UnitConversionTable,
};
use lumen_subscriptions::SubscriptionEngine;
use papaya::HashMap as PapayaHashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Write hook invoked inside every successful mutation.
pub trait MutationHook: Send + Sync {
    fn on_create(&self, current: &Resource, resolver: &dyn ReferenceResolver);
    fn on_update(&self, current: &Resource, previous: Option<&Resource>, resolver: &dyn ReferenceResolver);
    fn on_delete(&self, previous: &Resource, resolver: &dyn ReferenceResolver);
}

impl MutationHook for SubscriptionEngine {
    fn on_create(&self, current: &Resource, resolver: &dyn ReferenceResolver) {
        SubscriptionEngine::on_create(self, current, resolver);
    }

    fn on_update(
        &self,
        current: &Resource,
        previous: Option<&Resource>,
        resolver: &dyn ReferenceResolver,
    ) {
        SubscriptionEngine::on_update(self, current, previous, resolver);
    }

    fn on_delete(&self, previous: &Resource, resolver: &dyn ReferenceResolver) {
        SubscriptionEngine::on_delete(self, previous, resolver);
    }
}

/// A hook that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHook;

impl MutationHook for NoopHook {
    fn on_create(&self, _current: &Resource, _resolver: &dyn ReferenceResolver) {}
    fn on_update(&self, _: &Resource, _: Option<&Resource>, _: &dyn ReferenceResolver) {}
    fn on_delete(&self, _previous: &Resource, _resolver: &dyn ReferenceResolver) {}
}

/// A type search outcome: matches (subject to authorization narrowing) and
/// the resources marked for inclusion by `_include`/`_revinclude`.
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    pub matches: Vec<Resource>,
    pub included: Vec<Resource>,
}

impl SearchResult {
    pub fn total(&self) -> usize {
        self.matches.len()
    }
}

pub struct ResourceStore {
    resource_type: ResourceType,
    data: PapayaHashMap<String, Resource>,
    write_lock: Mutex<()>,
    registry: Arc<SearchParameterRegistry>,
    units: Arc<UnitConversionTable>,
}

impl ResourceStore {
    pub fn new(
        resource_type: ResourceType,
        registry: Arc<SearchParameterRegistry>,
        units: Arc<UnitConversionTable>,
    ) -> Self {
        Self {
            resource_type,
            data: PapayaHashMap::new(),
            write_lock: Mutex::new(()),
            registry,
            units,
        }
    }

    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    /// Lock-free point read of a live instance.
    pub fn get(&self, id: &str) -> Option<Resource> {
        let guard = self.data.pin();
        guard.get(id).cloned()
    }

    /// All live instances.
    pub fn all(&self) -> Vec<Resource> {
        let guard = self.data.pin();
        guard.iter().map(|(_, resource)| resource.clone()).collect()
    }

    pub fn count(&self) -> usize {
        let guard = self.data.pin();
        guard.len()
    }

    pub async fn read(&self, id: &str) -> Option<Resource> {
        self.get(id)
    }

    /// Create an instance. A fresh id is generated unless existing ids are
    /// allowed and one is present; an id already live for this type is a
    /// conflict. On success the version starts at 1.
    pub async fn create(
        &self,
        mut resource: Resource,
        allow_existing_id: bool,
        hook: &dyn MutationHook,
        resolver: &dyn ReferenceResolver,
    ) -> Result<Resource> {
        if resource.resource_type != self.resource_type {
            return Err(StoreError::type_mismatch(
                self.resource_type.to_string(),
                resource.type_name(),
            ));
        }
        if !allow_existing_id || resource.id.is_empty() {
            resource.id = generate_id();
        }
        validate_id(&resource.id).map_err(|_| StoreError::InvalidId(resource.id.clone()))?;

        let _write = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        {
            let guard = self.data.pin();
            if guard.contains_key(&resource.id) {
                return Err(StoreError::conflict(
                    self.resource_type.to_string(),
                    &resource.id,
                ));
            }
        }
        resource.meta.stamp(1);
        {
            let guard = self.data.pin();
            guard.insert(resource.id.clone(), resource.clone());
        }
        debug!(reference = %resource.reference(), "created resource");

        hook.on_create(&resource, resolver);
        Ok(resource)
    }

    /// Update an instance. The new version is previous+1 (an unparsable
    /// previous version reads as 1). Without a previous instance the update
    /// is a create when allowed — and counts as a create for triggers.
    /// Returns the stored resource and the replaced snapshot.
    pub async fn update(
        &self,
        mut resource: Resource,
        allow_create: bool,
        hook: &dyn MutationHook,
        resolver: &dyn ReferenceResolver,
    ) -> Result<(Resource, Option<Resource>)> {
        if resource.resource_type != self.resource_type {
            return Err(StoreError::type_mismatch(
                self.resource_type.to_string(),
                resource.type_name(),
            ));
        }
        if resource.id.is_empty() {
            return Err(StoreError::MissingId);
        }
        validate_id(&resource.id).map_err(|_| StoreError::InvalidId(resource.id.clone()))?;

        let _write = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let previous = self.get(&resource.id);

        let version = match &previous {
            Some(previous) => previous.version() + 1,
            None if allow_create => 1,
            None => {
                return Err(StoreError::not_found(
                    self.resource_type.to_string(),
                    &resource.id,
                ));
            }
        };
        resource.meta.stamp(version);
        {
            let guard = self.data.pin();
            guard.insert(resource.id.clone(), resource.clone());
        }
        debug!(reference = %resource.reference(), version, "updated resource");

        hook.on_update(&resource, previous.as_ref(), resolver);
        Ok((resource, previous))
    }

    /// Remove an instance from the live set. No tombstone is retained.
    pub async fn delete(
        &self,
        id: &str,
        hook: &dyn MutationHook,
        resolver: &dyn ReferenceResolver,
    ) -> Result<Resource> {
        let _write = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let removed = {
            let guard = self.data.pin();
            guard.remove(id).cloned()
        };
        let Some(previous) = removed else {
            return Err(StoreError::not_found(self.resource_type.to_string(), id));
        };
        debug!(reference = %previous.reference(), "deleted resource");

        hook.on_delete(&previous, resolver);
        Ok(previous)
    }

    /// Type search: every live instance satisfying all parsed clauses, plus
    /// include-marked resources appended post-filter. Authorization, when
    /// present, narrows both sets.
    pub async fn search(
        &self,
        params: &[ParsedSearchParameter],
        resolver: &dyn ReferenceResolver,
        auth: Option<&AuthorizationInfo>,
    ) -> SearchResult {
        let engine = SearchPredicateEngine::new(&self.registry, &self.units);

        let mut matches = Vec::new();
        for (index, resource) in self.all().into_iter().enumerate() {
            // Chained and `_has` clauses can scan the whole store; yield
            // periodically so long traversals stay cancellable.
            if index % 256 == 255 {
                tokio::task::yield_now().await;
            }
            let outcome = engine.test_for_match(&resource, params, resolver);
            if outcome.matched && auth.is_none_or(|a| a.permits(&resource)) {
                matches.push(resource);
            }
        }

        let directives: Vec<_> = ParsedSearchParameter::include_directives(params);
        let included = if directives.is_empty() {
            Vec::new()
        } else {
            engine
                .collect_includes(&matches, &directives, resolver)
                .into_iter()
                .filter(|r| auth.is_none_or(|a| a.permits(r)))
                .collect()
        };

        SearchResult { matches, included }
    }
}
