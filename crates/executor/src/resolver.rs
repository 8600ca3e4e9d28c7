//! Provider-based executor resolution
//!
//! An [`ExecutorRegistry`] maps executor service names
//! (`"{provider}PersistenceExecutor"`) to factories. The [`ExecutorResolver`]
//! lazily creates one executor per provider and caches it for its own
//! lifetime; there is no eviction.
//!
//! Sessions use the resolver as their [`ExecutorSource`]: each `execute()`
//! gets a fresh [`DynamicPersistenceExecutor`] that routes the whole batch to
//! the provider named by the first action.

use std::collections::HashMap;
use std::sync::Arc;

use actionflow_core::{ActionNode, ExecutionType};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use tracing::debug;

use crate::config::ResolverConfig;
use crate::executor::{ActionsExecution, ExecutorSource, PersistenceExecutor, ResultPostProcessor};
use crate::{Error, Result};

/// Service name under which a provider's executor is registered
pub fn executor_service_name(provider: &str) -> String {
    format!("{}PersistenceExecutor", provider)
}

/// Creates the executor for one provider
pub trait ExecutorFactory: Send + Sync {
    /// Build a new executor
    fn create(&self) -> Result<Arc<dyn PersistenceExecutor>>;
}

impl<F> ExecutorFactory for F
where
    F: Fn() -> Result<Arc<dyn PersistenceExecutor>> + Send + Sync,
{
    fn create(&self) -> Result<Arc<dyn PersistenceExecutor>> {
        self()
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Explicit map from executor service name to factory
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    factories: HashMap<String, Arc<dyn ExecutorFactory>>,
}

impl ExecutorRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the factory for a provider
    pub fn register(&mut self, provider: &str, factory: impl ExecutorFactory + 'static) -> &mut Self {
        self.register_named(executor_service_name(provider), factory)
    }

    /// Register a factory under an explicit service name
    pub fn register_named(
        &mut self,
        service_name: impl Into<String>,
        factory: impl ExecutorFactory + 'static,
    ) -> &mut Self {
        self.factories.insert(service_name.into(), Arc::new(factory));
        self
    }

    /// Register an already-built executor for a provider
    pub fn register_instance(
        &mut self,
        provider: &str,
        executor: Arc<dyn PersistenceExecutor>,
    ) -> &mut Self {
        self.register(provider, move || -> Result<Arc<dyn PersistenceExecutor>> {
            Ok(Arc::clone(&executor))
        })
    }

    fn factory(&self, service_name: &str) -> Option<&Arc<dyn ExecutorFactory>> {
        self.factories.get(service_name)
    }

    /// Number of registered factories
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether no factory is registered
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

// =============================================================================
// Resolver
// =============================================================================

struct ResolverInner {
    registry: ExecutorRegistry,
    config: ResolverConfig,
    cache: RwLock<HashMap<String, Arc<dyn PersistenceExecutor>>>,
}

/// Caching provider-to-executor resolver.
///
/// Cheap to clone; clones share the cache.
#[derive(Clone)]
pub struct ExecutorResolver {
    inner: Arc<ResolverInner>,
}

impl ExecutorResolver {
    /// Resolver with default config
    pub fn new(registry: ExecutorRegistry) -> Self {
        Self::with_config(registry, ResolverConfig::default())
    }

    /// Resolver with explicit config
    pub fn with_config(registry: ExecutorRegistry, config: ResolverConfig) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                registry,
                config,
                cache: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Executor for a provider, created and cached on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when no factory is registered for the
    /// provider, or whatever the factory returns.
    pub fn resolve(&self, provider: &str) -> Result<Arc<dyn PersistenceExecutor>> {
        if let Some(executor) = self.inner.cache.read().get(provider) {
            return Ok(Arc::clone(executor));
        }

        let mut cache = self.inner.cache.write();
        // Another thread may have filled the slot between the two locks.
        if let Some(executor) = cache.get(provider) {
            return Ok(Arc::clone(executor));
        }

        let service_name = executor_service_name(provider);
        let factory = self
            .inner
            .registry
            .factory(&service_name)
            .ok_or_else(|| Error::Configuration {
                reason: format!("no executor registered as '{}'", service_name),
            })?;
        debug!(target: "actionflow::resolver", provider, service = %service_name, "Creating executor");
        let executor = factory.create()?;
        cache.insert(provider.to_string(), Arc::clone(&executor));
        Ok(executor)
    }

    /// Provider a batch routes to: the first action's, or the configured
    /// default when the first action names none.
    ///
    /// Later actions are not inspected, so a mixed-provider batch routes
    /// entirely to the first action's provider.
    pub fn provider_for(&self, actions: &[ActionNode]) -> Result<String> {
        let first = actions
            .first()
            .ok_or_else(|| Error::invalid_argument("cannot route an empty action batch"))?;
        if !first.provider_name.is_empty() {
            return Ok(first.provider_name.clone());
        }
        self.inner
            .config
            .default_provider
            .clone()
            .ok_or_else(|| Error::Configuration {
                reason: format!(
                    "action {} on '{}' names no provider and no default is configured",
                    first.action_id, first.entity_full_name
                ),
            })
    }

    /// Number of cached executors
    pub fn cached_len(&self) -> usize {
        self.inner.cache.read().len()
    }
}

impl ExecutorSource for ExecutorResolver {
    fn create_executor(&self) -> Result<Box<dyn PersistenceExecutor>> {
        Ok(Box::new(DynamicPersistenceExecutor::new(self.clone())))
    }
}

// =============================================================================
// Dynamic executor
// =============================================================================

/// Per-call executor that resolves the real executor from the batch's
/// provider and delegates to it.
pub struct DynamicPersistenceExecutor {
    resolver: ExecutorResolver,
    resolved: OnceCell<Arc<dyn PersistenceExecutor>>,
}

impl DynamicPersistenceExecutor {
    /// Wrap a resolver
    pub fn new(resolver: ExecutorResolver) -> Self {
        Self {
            resolver,
            resolved: OnceCell::new(),
        }
    }
}

impl PersistenceExecutor for DynamicPersistenceExecutor {
    fn execute(
        &self,
        actions: &[ActionNode],
        execution_type: ExecutionType,
    ) -> Result<ActionsExecution> {
        let executor = self.resolved.get_or_try_init(|| {
            let provider = self.resolver.provider_for(actions)?;
            self.resolver.resolve(&provider)
        })?;
        executor.execute(actions, execution_type)
    }

    fn as_post_processor(&self) -> Option<&dyn ResultPostProcessor> {
        self.resolved.get().and_then(|e| e.as_post_processor())
    }
}
