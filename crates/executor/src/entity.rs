//! Entity capabilities
//!
//! Persistable types describe themselves through a static [`EntityDescriptor`]
//! (built once per type) and expose their properties by name through
//! [`Entity`]. Types that take part in optimistic concurrency also implement
//! [`VersionedModel`].
//!
//! Instances are registered with a session as [`InstanceRef`]s so the session
//! can write backend-produced values (identities, row versions) back onto the
//! caller's object after execution.

use std::sync::Arc;

use actionflow_core::{Value, ValueKind};
use parking_lot::RwLock;

use crate::Result;

/// Shared, lockable handle to a registered instance
///
/// Callers keep a typed `Arc<RwLock<T>>` and pass a clone; it coerces to this
/// type at the call site.
pub type InstanceRef = Arc<RwLock<dyn Entity>>;

/// Wrap a value into a shareable instance handle
pub fn instance<T: Entity + 'static>(value: T) -> Arc<RwLock<T>> {
    Arc::new(RwLock::new(value))
}

// =============================================================================
// Descriptors
// =============================================================================

/// One persistable property of an entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescriptor {
    /// Property name, used as parameter and record field name
    pub name: String,
    /// Declared value kind
    pub kind: ValueKind,
    /// Part of the entity key
    pub is_key: bool,
    /// Generated by the backend on insert
    pub is_identity: bool,
}

impl PropertyDescriptor {
    /// A plain (non-key) property
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            is_key: false,
            is_identity: false,
        }
    }

    /// A key property
    pub fn key(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            is_key: true,
            ..Self::new(name, kind)
        }
    }

    /// Mark the property as backend-generated
    pub fn identity(mut self) -> Self {
        self.is_identity = true;
        self
    }
}

/// Static description of an entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// Fully qualified entity name, used for routing and binder lookup
    pub full_name: String,
    /// Storage provider owning the entity
    pub provider_name: String,
    /// Properties in declaration order
    pub properties: Vec<PropertyDescriptor>,
}

impl EntityDescriptor {
    /// Create a descriptor with no properties
    pub fn new(full_name: impl Into<String>, provider_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            provider_name: provider_name.into(),
            properties: Vec::new(),
        }
    }

    /// Append a property
    pub fn with_property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    /// Look up a property by name
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Key properties in declaration order
    pub fn key_properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.iter().filter(|p| p.is_key)
    }

    /// Names of the key properties in declaration order
    pub fn key_names(&self) -> Vec<&str> {
        self.key_properties().map(|p| p.name.as_str()).collect()
    }

    /// The backend-generated property, if any
    pub fn identity_property(&self) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.is_identity)
    }
}

// =============================================================================
// Capabilities
// =============================================================================

/// A persistable object.
///
/// Object safe, so a session can hold instances of many types side by side.
pub trait Entity: Send + Sync {
    /// The static descriptor of this instance's type
    fn descriptor(&self) -> &'static EntityDescriptor;

    /// Current value of a property, `None` when the name is unknown
    fn get_value(&self, property: &str) -> Option<Value>;

    /// Overwrite a property.
    ///
    /// # Errors
    ///
    /// Implementations return [`Error::Bind`](crate::Error::Bind) when the
    /// name is unknown or the value kind does not fit.
    fn set_value(&mut self, property: &str, value: Value) -> Result<()>;

    /// Optimistic-concurrency view, when the type supports it
    fn as_versioned(&self) -> Option<&dyn VersionedModel> {
        None
    }

    /// Mutable optimistic-concurrency view
    fn as_versioned_mut(&mut self) -> Option<&mut dyn VersionedModel> {
        None
    }

    /// Business-rule violations of the current state, checked by
    /// [`EntityRulesValidator`](crate::EntityRulesValidator)
    fn validation_errors(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Type-level access to the descriptor, for registrations that carry no
/// instance (conditional deletes, query updates)
pub trait EntityType: Entity + Sized {
    /// The descriptor of this type
    fn entity_descriptor() -> &'static EntityDescriptor;
}

/// Optimistic-concurrency capability
pub trait VersionedModel {
    /// Token read at load time; `None` for an instance never persisted
    fn row_version(&self) -> Option<u64>;

    /// Store the token reported by the backend after a write
    fn set_row_version(&mut self, row_version: u64);
}
