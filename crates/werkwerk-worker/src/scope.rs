//! Per-iteration dependency scopes.
//!
//! A [`DependencyProvider`] lives as long as the worker and hands out one
//! [`DependencyScope`] per iteration. The scope's release hook runs when it is
//! dropped, so resources are torn down on every exit path.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::WorkError;

type Service = Arc<dyn Any + Send + Sync>;
type ScopedFactory = Box<dyn Fn(&mut Resolver) + Send + Sync>;
type ReleaseHook = Arc<dyn Fn() + Send + Sync>;

/// Type-keyed lookup of services.
#[derive(Clone, Default)]
pub struct Resolver {
    services: HashMap<TypeId, Service>,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service, replacing any previous one of the same type.
    pub fn insert<S: Any + Send + Sync>(&mut self, service: Arc<S>) {
        self.services.insert(TypeId::of::<S>(), service);
    }

    pub fn get<S: Any + Send + Sync>(&self) -> Option<Arc<S>> {
        self.services
            .get(&TypeId::of::<S>())
            .cloned()
            .and_then(|service| service.downcast::<S>().ok())
    }

    /// Like [`Resolver::get`], failing with [`WorkError::MissingDependency`].
    pub fn require<S: Any + Send + Sync>(&self) -> Result<Arc<S>, WorkError> {
        self.get::<S>()
            .ok_or_else(|| WorkError::MissingDependency(type_name::<S>()))
    }

    pub fn contains<S: Any + Send + Sync>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<S>())
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("services", &self.services.len())
            .finish()
    }
}

/// Dependencies for a single iteration.
pub struct DependencyScope {
    resolver: Arc<Resolver>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl DependencyScope {
    pub fn new(resolver: Resolver) -> Self {
        Self {
            resolver: Arc::new(resolver),
            release: None,
        }
    }

    /// Run `release` exactly once when the scope is dropped.
    pub fn with_release(mut self, release: impl FnOnce() + Send + 'static) -> Self {
        self.release = Some(Box::new(release));
        self
    }

    pub fn resolver(&self) -> Arc<Resolver> {
        self.resolver.clone()
    }
}

impl Drop for DependencyScope {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// Creates a fresh [`DependencyScope`] for every iteration.
pub trait DependencyProvider: Send + Sync {
    fn create_scope(&self) -> Result<DependencyScope, WorkError>;
}

/// Builder-style [`DependencyProvider`].
///
/// Singletons are shared by every scope. Scoped factories run once per scope,
/// in registration order, and can resolve anything registered before them.
#[derive(Default)]
pub struct ServiceProvider {
    singletons: Resolver,
    scoped: Vec<ScopedFactory>,
    on_release: Option<ReleaseHook>,
}

impl ServiceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share one instance across all scopes.
    pub fn singleton<S: Any + Send + Sync>(mut self, service: Arc<S>) -> Self {
        self.singletons.insert(service);
        self
    }

    /// Build a new instance for each scope.
    pub fn scoped<S, F>(mut self, factory: F) -> Self
    where
        S: Any + Send + Sync,
        F: Fn(&Resolver) -> S + Send + Sync + 'static,
    {
        self.scoped.push(Box::new(move |resolver: &mut Resolver| {
            let service = factory(&*resolver);
            resolver.insert(Arc::new(service));
        }));
        self
    }

    /// Called every time a scope is released.
    pub fn on_release<F: Fn() + Send + Sync + 'static>(mut self, hook: F) -> Self {
        self.on_release = Some(Arc::new(hook));
        self
    }
}

impl DependencyProvider for ServiceProvider {
    fn create_scope(&self) -> Result<DependencyScope, WorkError> {
        let mut resolver = self.singletons.clone();
        for factory in &self.scoped {
            factory(&mut resolver);
        }

        let scope = DependencyScope::new(resolver);
        Ok(match &self.on_release {
            Some(hook) => {
                let hook = hook.clone();
                scope.with_release(move || hook())
            }
            None => scope,
        })
    }
}
