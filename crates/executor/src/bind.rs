//! Bind strategies: writing backend-returned values onto live instances

use std::collections::HashMap;
use std::sync::Arc;

use actionflow_core::ResultNode;
use parking_lot::RwLock;
use tracing::debug;

use crate::entity::Entity;
use crate::Result;

/// Which kind of write produced the record being bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    /// The record answers an Insert; the scalar result is the new identity
    Insert,
    /// The record answers any other action
    Update,
}

/// Reconciles one backend-returned record onto one live object.
pub trait BindStrategy: Send + Sync {
    /// Copy values from `record` onto `instance`, returning the names of the
    /// properties whose value changed.
    fn bind(&self, record: &ResultNode, mode: BindMode, instance: &mut dyn Entity)
        -> Result<Vec<String>>;
}

/// Descriptor-driven binder used when no type-specific strategy is registered.
///
/// Every returned parameter whose name matches a descriptor property and whose
/// value differs from the instance's current value is written. On insert the
/// record's scalar result, when present, is written to the identity property.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReflectiveBinder;

impl BindStrategy for ReflectiveBinder {
    fn bind(
        &self,
        record: &ResultNode,
        mode: BindMode,
        instance: &mut dyn Entity,
    ) -> Result<Vec<String>> {
        let descriptor = instance.descriptor();
        let mut changed: Vec<String> = Vec::new();

        for parameter in &record.parameters {
            if descriptor.property(&parameter.name).is_none() {
                continue;
            }
            if instance.get_value(&parameter.name).as_ref() == Some(&parameter.value) {
                continue;
            }
            instance.set_value(&parameter.name, parameter.value.clone())?;
            if !changed.contains(&parameter.name) {
                changed.push(parameter.name.clone());
            }
        }

        if mode == BindMode::Insert {
            if let (Some(identity), Some(value)) = (descriptor.identity_property(), &record.result)
            {
                if !value.is_null() && instance.get_value(&identity.name).as_ref() != Some(value) {
                    instance.set_value(&identity.name, value.clone())?;
                    if !changed.contains(&identity.name) {
                        changed.push(identity.name.clone());
                    }
                }
            }
        }

        Ok(changed)
    }
}

/// Per-entity-type cache of bind strategies.
///
/// Lookups for a type without an explicit registration resolve to the
/// default strategy once and are cached under the type's full name.
pub struct BindStrategyRegistry {
    strategies: RwLock<HashMap<String, Arc<dyn BindStrategy>>>,
    default: Arc<dyn BindStrategy>,
}

impl BindStrategyRegistry {
    /// Registry falling back to [`ReflectiveBinder`]
    pub fn new() -> Self {
        Self::with_default(Arc::new(ReflectiveBinder))
    }

    /// Registry falling back to `default`
    pub fn with_default(default: Arc<dyn BindStrategy>) -> Self {
        Self {
            strategies: RwLock::new(HashMap::new()),
            default,
        }
    }

    /// Use `strategy` for every instance of `entity_full_name`
    pub fn register(&self, entity_full_name: impl Into<String>, strategy: Arc<dyn BindStrategy>) {
        self.strategies
            .write()
            .insert(entity_full_name.into(), strategy);
    }

    /// Strategy for an entity type
    pub fn get(&self, entity_full_name: &str) -> Arc<dyn BindStrategy> {
        if let Some(strategy) = self.strategies.read().get(entity_full_name) {
            return Arc::clone(strategy);
        }
        let mut strategies = self.strategies.write();
        let strategy = strategies
            .entry(entity_full_name.to_string())
            .or_insert_with(|| {
                debug!(target: "actionflow::bind", entity = entity_full_name, "Caching default bind strategy");
                Arc::clone(&self.default)
            });
        Arc::clone(strategy)
    }

    /// Number of cached entity types
    pub fn len(&self) -> usize {
        self.strategies.read().len()
    }

    /// Whether nothing has been cached yet
    pub fn is_empty(&self) -> bool {
        self.strategies.read().is_empty()
    }
}

impl Default for BindStrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
