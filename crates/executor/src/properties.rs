//! Persistence-property resolution and record building
//!
//! Before an instance-based registration builds its parameters, the session
//! asks a [`PersistencePropertiesResolver`] which properties take part and in
//! which direction. [`RecordFactory`] then reads those properties off the
//! instance, in order.

use std::collections::HashSet;

use actionflow_core::{ActionType, Parameter, ParameterDirection};

use crate::entity::{Entity, EntityDescriptor};
use crate::{Error, Result};

/// Explicit property-name selection supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PropertySelection {
    /// Every property the action type would normally persist
    #[default]
    All,
    /// Only the named properties
    Only(Vec<String>),
    /// Everything except the named properties
    Except(Vec<String>),
}

impl PropertySelection {
    /// Select only the given names
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PropertySelection::Only(names.into_iter().map(Into::into).collect())
    }

    /// Select everything but the given names
    pub fn except<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PropertySelection::Except(names.into_iter().map(Into::into).collect())
    }

    fn names(&self) -> &[String] {
        match self {
            PropertySelection::All => &[],
            PropertySelection::Only(names) | PropertySelection::Except(names) => names,
        }
    }
}

/// A property chosen for persistence, with its parameter direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProperty {
    /// Property name
    pub name: String,
    /// Direction of the generated parameter
    pub direction: ParameterDirection,
}

impl ResolvedProperty {
    fn input(name: &str) -> Self {
        Self {
            name: name.to_string(),
            direction: ParameterDirection::Input,
        }
    }
}

/// Decides which properties of an entity a registration persists
pub trait PersistencePropertiesResolver: Send + Sync {
    /// Resolve the ordered property list.
    ///
    /// `conditional` is true when the action is filtered by a conditional
    /// instead of by its key.
    fn resolve(
        &self,
        descriptor: &EntityDescriptor,
        action_type: ActionType,
        conditional: bool,
        selection: &PropertySelection,
    ) -> Result<Vec<ResolvedProperty>>;
}

/// Resolution rules used unless a session is built with its own resolver.
///
/// - Insert: all properties; identity properties become `Output`
/// - Update: the selection (all non-key properties by default), then the
///   key properties appended as `Input` unless filtered by a conditional
/// - Delete: key properties, or every property when no key is declared;
///   nothing when filtered by a conditional
/// - ExecuteProcedure: all properties
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPropertiesResolver;

impl PersistencePropertiesResolver for DefaultPropertiesResolver {
    fn resolve(
        &self,
        descriptor: &EntityDescriptor,
        action_type: ActionType,
        conditional: bool,
        selection: &PropertySelection,
    ) -> Result<Vec<ResolvedProperty>> {
        for name in selection.names() {
            if descriptor.property(name).is_none() {
                return Err(Error::invalid_argument(format!(
                    "{} has no property '{}'",
                    descriptor.full_name, name
                )));
            }
        }

        let resolved = match action_type {
            ActionType::Insert => descriptor
                .properties
                .iter()
                .filter(|p| selected(selection, &p.name))
                .map(|p| ResolvedProperty {
                    name: p.name.clone(),
                    direction: if p.is_identity {
                        ParameterDirection::Output
                    } else {
                        ParameterDirection::Input
                    },
                })
                .collect(),
            ActionType::Update => {
                let mut out: Vec<ResolvedProperty> = descriptor
                    .properties
                    .iter()
                    .filter(|p| match selection {
                        PropertySelection::Only(_) => selected(selection, &p.name),
                        _ => !p.is_key && selected(selection, &p.name),
                    })
                    .map(|p| ResolvedProperty::input(&p.name))
                    .collect();
                if !conditional {
                    for key in descriptor.key_properties() {
                        if !out.iter().any(|r| r.name == key.name) {
                            out.push(ResolvedProperty::input(&key.name));
                        }
                    }
                }
                out
            }
            ActionType::Delete => {
                if conditional {
                    Vec::new()
                } else if descriptor.key_properties().next().is_some() {
                    descriptor
                        .key_properties()
                        .map(|p| ResolvedProperty::input(&p.name))
                        .collect()
                } else {
                    descriptor
                        .properties
                        .iter()
                        .map(|p| ResolvedProperty::input(&p.name))
                        .collect()
                }
            }
            ActionType::ExecuteProcedure => descriptor
                .properties
                .iter()
                .filter(|p| selected(selection, &p.name))
                .map(|p| ResolvedProperty::input(&p.name))
                .collect(),
        };
        Ok(resolved)
    }
}

fn selected(selection: &PropertySelection, name: &str) -> bool {
    match selection {
        PropertySelection::All => true,
        PropertySelection::Only(names) => names.iter().any(|n| n == name),
        PropertySelection::Except(names) => !names.iter().any(|n| n == name),
    }
}

/// Whether an Update over `resolved` would write nothing beyond the key.
///
/// True when the set is empty or equals the key-property set exactly.
pub fn is_key_only_update(descriptor: &EntityDescriptor, resolved: &[ResolvedProperty]) -> bool {
    if resolved.is_empty() {
        return true;
    }
    let names: HashSet<&str> = resolved.iter().map(|r| r.name.as_str()).collect();
    let keys: HashSet<&str> = descriptor.key_names().into_iter().collect();
    names == keys
}

/// Builds ordered parameter lists from live instances
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordFactory;

impl RecordFactory {
    /// Read every resolved property off `instance`.
    ///
    /// Unknown names read as `Null`; output parameters carry the instance's
    /// current value as their placeholder.
    pub fn record(&self, instance: &dyn Entity, properties: &[ResolvedProperty]) -> Vec<Parameter> {
        properties
            .iter()
            .map(|p| {
                Parameter::new(
                    p.name.clone(),
                    instance.get_value(&p.name).unwrap_or_default(),
                    p.direction,
                )
            })
            .collect()
    }
}
