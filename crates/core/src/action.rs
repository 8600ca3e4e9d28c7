//! Action tree data model
//!
//! An [`ActionNode`] describes one persistence operation (insert, update,
//! delete or stored-procedure execution) plus the nested actions that run
//! around it:
//!
//! - `before_actions`: dependencies executed before the parent
//! - `after_actions`: dependencies executed after the parent
//! - `alternative_actions`: a fallback path, tried only when the backend
//!   reports the parent's normal path as unavailable
//!
//! Action nodes are pure data: no closures, no live object references. The
//! originating instance and the completion callback are tracked by the
//! session that registered the node, keyed by [`ActionId`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value::Value;

/// Default per-action command timeout, in seconds
pub const DEFAULT_COMMAND_TIMEOUT: u32 = 30;

// =============================================================================
// Identifiers
// =============================================================================

/// Identifier of an action, unique within the session that allocated it.
///
/// Sessions allocate ids from 1 upward with no gaps.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ActionId(pub u32);

impl ActionId {
    /// Get the numeric value
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl From<u32> for ActionId {
    fn from(v: u32) -> Self {
        ActionId(v)
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Enumerations
// =============================================================================

/// Kind of persistence operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    /// Insert a new record
    Insert,
    /// Update an existing record or set of records
    Update,
    /// Delete a record or set of records
    Delete,
    /// Execute a stored procedure
    ExecuteProcedure,
}

impl ActionType {
    /// Stable name used by the XML codec
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Insert => "Insert",
            ActionType::Update => "Update",
            ActionType::Delete => "Delete",
            ActionType::ExecuteProcedure => "ExecuteProcedure",
        }
    }

    /// Parse a name produced by [`ActionType::as_str`]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Insert" => Some(ActionType::Insert),
            "Update" => Some(ActionType::Update),
            "Delete" => Some(ActionType::Delete),
            "ExecuteProcedure" => Some(ActionType::ExecuteProcedure),
            _ => None,
        }
    }

    pub(crate) fn tag(&self) -> u8 {
        match self {
            ActionType::Insert => 0,
            ActionType::Update => 1,
            ActionType::Delete => 2,
            ActionType::ExecuteProcedure => 3,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ActionType::Insert),
            1 => Some(ActionType::Update),
            2 => Some(ActionType::Delete),
            3 => Some(ActionType::ExecuteProcedure),
            _ => None,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a parameter relative to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ParameterDirection {
    /// Value flows to the backend only
    #[default]
    Input,
    /// Value is produced by the backend
    Output,
    /// Value flows both ways
    InputOutput,
}

impl ParameterDirection {
    /// Stable name used by the XML codec
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterDirection::Input => "Input",
            ParameterDirection::Output => "Output",
            ParameterDirection::InputOutput => "InputOutput",
        }
    }

    /// Parse a name produced by [`ParameterDirection::as_str`]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Input" => Some(ParameterDirection::Input),
            "Output" => Some(ParameterDirection::Output),
            "InputOutput" => Some(ParameterDirection::InputOutput),
            _ => None,
        }
    }

    /// Whether the backend is expected to write this parameter back
    pub fn is_output(&self) -> bool {
        matches!(
            self,
            ParameterDirection::Output | ParameterDirection::InputOutput
        )
    }

    pub(crate) fn tag(&self) -> u8 {
        match self {
            ParameterDirection::Input => 0,
            ParameterDirection::Output => 1,
            ParameterDirection::InputOutput => 2,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ParameterDirection::Input),
            1 => Some(ParameterDirection::Output),
            2 => Some(ParameterDirection::InputOutput),
            _ => None,
        }
    }
}

// =============================================================================
// Parameters
// =============================================================================

/// A named value passed to (or returned from) the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name, usually a property name
    pub name: String,
    /// Current value
    pub value: Value,
    /// Direction relative to the backend
    #[serde(default)]
    pub direction: ParameterDirection,
}

impl Parameter {
    /// Create an input parameter
    pub fn input(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            direction: ParameterDirection::Input,
        }
    }

    /// Create an output parameter with a null placeholder value
    pub fn output(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Value::Null,
            direction: ParameterDirection::Output,
        }
    }

    /// Create a parameter with an explicit direction
    pub fn new(
        name: impl Into<String>,
        value: impl Into<Value>,
        direction: ParameterDirection,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            direction,
        }
    }
}

/// Find a parameter by name in an ordered parameter list
pub fn find_parameter<'a>(parameters: &'a [Parameter], name: &str) -> Option<&'a Parameter> {
    parameters.iter().find(|p| p.name == name)
}

// =============================================================================
// Conditional
// =============================================================================

/// Comparison used by a single condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOperator {
    /// `property = value`
    Equal,
    /// `property <> value`
    NotEqual,
    /// `property > value`
    GreaterThan,
    /// `property >= value`
    GreaterThanOrEqual,
    /// `property < value`
    LessThan,
    /// `property <= value`
    LessThanOrEqual,
    /// `property LIKE value`
    Like,
    /// `property IS NULL` (value ignored)
    IsNull,
}

impl ComparisonOperator {
    /// Stable name used by the XML codec
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOperator::Equal => "Equal",
            ComparisonOperator::NotEqual => "NotEqual",
            ComparisonOperator::GreaterThan => "GreaterThan",
            ComparisonOperator::GreaterThanOrEqual => "GreaterThanOrEqual",
            ComparisonOperator::LessThan => "LessThan",
            ComparisonOperator::LessThanOrEqual => "LessThanOrEqual",
            ComparisonOperator::Like => "Like",
            ComparisonOperator::IsNull => "IsNull",
        }
    }

    /// Parse a name produced by [`ComparisonOperator::as_str`]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Equal" => Some(ComparisonOperator::Equal),
            "NotEqual" => Some(ComparisonOperator::NotEqual),
            "GreaterThan" => Some(ComparisonOperator::GreaterThan),
            "GreaterThanOrEqual" => Some(ComparisonOperator::GreaterThanOrEqual),
            "LessThan" => Some(ComparisonOperator::LessThan),
            "LessThanOrEqual" => Some(ComparisonOperator::LessThanOrEqual),
            "Like" => Some(ComparisonOperator::Like),
            "IsNull" => Some(ComparisonOperator::IsNull),
            _ => None,
        }
    }

    pub(crate) fn tag(&self) -> u8 {
        match self {
            ComparisonOperator::Equal => 0,
            ComparisonOperator::NotEqual => 1,
            ComparisonOperator::GreaterThan => 2,
            ComparisonOperator::GreaterThanOrEqual => 3,
            ComparisonOperator::LessThan => 4,
            ComparisonOperator::LessThanOrEqual => 5,
            ComparisonOperator::Like => 6,
            ComparisonOperator::IsNull => 7,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ComparisonOperator::Equal),
            1 => Some(ComparisonOperator::NotEqual),
            2 => Some(ComparisonOperator::GreaterThan),
            3 => Some(ComparisonOperator::GreaterThanOrEqual),
            4 => Some(ComparisonOperator::LessThan),
            5 => Some(ComparisonOperator::LessThanOrEqual),
            6 => Some(ComparisonOperator::Like),
            7 => Some(ComparisonOperator::IsNull),
            _ => None,
        }
    }
}

/// How the terms of a group are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOperator {
    /// All terms must hold
    And,
    /// At least one term must hold
    Or,
}

impl LogicalOperator {
    /// Stable name used by the XML codec
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOperator::And => "And",
            LogicalOperator::Or => "Or",
        }
    }

    /// Parse a name produced by [`LogicalOperator::as_str`]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "And" => Some(LogicalOperator::And),
            "Or" => Some(LogicalOperator::Or),
            _ => None,
        }
    }
}

/// Predicate tree used to filter Update/Delete actions
///
/// The engine never evaluates conditionals; it only carries them to the
/// executor, which translates them into backend filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Conditional {
    /// A single comparison against a property
    Condition {
        /// Property the comparison applies to
        property: String,
        /// Comparison operator
        operator: ComparisonOperator,
        /// Right-hand value
        value: Value,
    },
    /// A group of terms joined by one logical operator
    Group {
        /// How the terms are combined
        operator: LogicalOperator,
        /// Grouped terms, in order
        terms: Vec<Conditional>,
    },
    /// Negation of a term
    Not(Box<Conditional>),
}

impl Conditional {
    /// `property = value`
    pub fn equals(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Conditional::Condition {
            property: property.into(),
            operator: ComparisonOperator::Equal,
            value: value.into(),
        }
    }

    /// Comparison with an explicit operator
    pub fn compare(
        property: impl Into<String>,
        operator: ComparisonOperator,
        value: impl Into<Value>,
    ) -> Self {
        Conditional::Condition {
            property: property.into(),
            operator,
            value: value.into(),
        }
    }

    /// All of `terms`
    pub fn and(terms: Vec<Conditional>) -> Self {
        Conditional::Group {
            operator: LogicalOperator::And,
            terms,
        }
    }

    /// Any of `terms`
    pub fn or(terms: Vec<Conditional>) -> Self {
        Conditional::Group {
            operator: LogicalOperator::Or,
            terms,
        }
    }

    /// Negate a term
    pub fn negate(term: Conditional) -> Self {
        Conditional::Not(Box::new(term))
    }

    /// Names of every property referenced by the tree, in document order
    pub fn properties(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_properties(&mut out);
        out
    }

    fn collect_properties<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Conditional::Condition { property, .. } => out.push(property),
            Conditional::Group { terms, .. } => {
                for term in terms {
                    term.collect_properties(out);
                }
            }
            Conditional::Not(inner) => inner.collect_properties(out),
        }
    }
}

// =============================================================================
// Query
// =============================================================================

/// Set-based target of an update or delete that is not tied to one instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryInfo {
    /// Entity the query selects from
    pub entity_full_name: String,
    /// Optional filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Conditional>,
    /// Optional row limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take: Option<u32>,
}

impl QueryInfo {
    /// Query every row of an entity
    pub fn new(entity_full_name: impl Into<String>) -> Self {
        Self {
            entity_full_name: entity_full_name.into(),
            filter: None,
            take: None,
        }
    }

    /// Restrict the query with a filter
    pub fn with_filter(mut self, filter: Conditional) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Limit the number of rows
    pub fn with_take(mut self, take: u32) -> Self {
        self.take = Some(take);
        self
    }
}

// =============================================================================
// Action Node
// =============================================================================

/// One persistence operation plus its nested before/after/alternative actions.
///
/// Field order matches the wire order of both codecs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionNode {
    /// Session-unique identifier
    pub action_id: ActionId,
    /// Kind of operation
    pub action_type: ActionType,
    /// Routing key: the entity the action targets
    pub entity_full_name: String,
    /// Routing key: the storage provider that owns the entity
    pub provider_name: String,
    /// Ordered parameters
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Optional filter for Update/Delete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditional: Option<Conditional>,
    /// Optional set-based query
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<QueryInfo>,
    /// Procedure name, only for `ExecuteProcedure`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_procedure_name: Option<String>,
    /// Optimistic-concurrency token of the source instance at registration time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_version: Option<u64>,
    /// Command timeout hint in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout: u32,
    /// Actions executed before this one
    #[serde(default)]
    pub before_actions: Vec<ActionNode>,
    /// Actions executed after this one
    #[serde(default)]
    pub after_actions: Vec<ActionNode>,
    /// Fallback actions
    #[serde(default)]
    pub alternative_actions: Vec<ActionNode>,
}

fn default_command_timeout() -> u32 {
    DEFAULT_COMMAND_TIMEOUT
}

impl ActionNode {
    /// Create a node with no parameters and no children
    pub fn new(
        action_id: ActionId,
        action_type: ActionType,
        entity_full_name: impl Into<String>,
        provider_name: impl Into<String>,
    ) -> Self {
        Self {
            action_id,
            action_type,
            entity_full_name: entity_full_name.into(),
            provider_name: provider_name.into(),
            parameters: Vec::new(),
            conditional: None,
            query: None,
            stored_procedure_name: None,
            row_version: None,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            before_actions: Vec::new(),
            after_actions: Vec::new(),
            alternative_actions: Vec::new(),
        }
    }

    /// Look up a parameter by name
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        find_parameter(&self.parameters, name)
    }

    /// Whether any child collection is non-empty
    pub fn has_children(&self) -> bool {
        !self.before_actions.is_empty()
            || !self.after_actions.is_empty()
            || !self.alternative_actions.is_empty()
    }

    /// Find a node by id in this subtree (self, before, after, alternatives)
    pub fn find(&self, id: ActionId) -> Option<&ActionNode> {
        if self.action_id == id {
            return Some(self);
        }
        find_action(&self.before_actions, id)
            .or_else(|| find_action(&self.after_actions, id))
            .or_else(|| find_action(&self.alternative_actions, id))
    }

    /// Mutable variant of [`ActionNode::find`]
    pub fn find_mut(&mut self, id: ActionId) -> Option<&mut ActionNode> {
        if self.action_id == id {
            return Some(self);
        }
        if let Some(found) = find_action_mut(&mut self.before_actions, id) {
            return Some(found);
        }
        if let Some(found) = find_action_mut(&mut self.after_actions, id) {
            return Some(found);
        }
        find_action_mut(&mut self.alternative_actions, id)
    }

    /// Number of nodes in this subtree, including self
    pub fn subtree_len(&self) -> usize {
        1 + self
            .before_actions
            .iter()
            .chain(self.after_actions.iter())
            .chain(self.alternative_actions.iter())
            .map(ActionNode::subtree_len)
            .sum::<usize>()
    }
}

/// Find an action by id anywhere in a forest
pub fn find_action(actions: &[ActionNode], id: ActionId) -> Option<&ActionNode> {
    actions.iter().find_map(|a| a.find(id))
}

/// Mutable variant of [`find_action`]
pub fn find_action_mut(actions: &mut [ActionNode], id: ActionId) -> Option<&mut ActionNode> {
    actions.iter_mut().find_map(|a| a.find_mut(id))
}
