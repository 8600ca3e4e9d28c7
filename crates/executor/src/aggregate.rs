//! Sub-sessions over one parent action's children
//!
//! An [`AggregateSession`] borrows the owning session's shared state and one
//! child list (before, after or alternative) of a registered action. It offers
//! the same registration API as the root session; ids, instance bindings,
//! executor and validator lookup and `Executed` subscriptions all go through
//! the owner. Its lifetime is bounded by the borrow of the owner.
//!
//! ```text
//! let order_id = session.insert(order.clone())?;
//! let mut lines = session.after(order_id)?;
//! lines.insert(line.clone())?;          // appended to order's after actions
//! ```

use std::fmt;

use actionflow_core::{ActionId, ActionNode};

use crate::context::{SessionCore, SessionId};
use crate::scope::PersistenceScope;

/// Which child list of the parent action a sub-session appends to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildList {
    /// Executed before the parent
    Before,
    /// Executed after the parent
    After,
    /// Fallback path
    Alternative,
}

impl fmt::Display for ChildList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChildList::Before => "before",
            ChildList::After => "after",
            ChildList::Alternative => "alternative",
        })
    }
}

/// Registration view over one child list of a parent action
pub struct AggregateSession<'a> {
    core: &'a mut SessionCore,
    actions: &'a mut Vec<ActionNode>,
    parent: ActionId,
    list: ChildList,
}

impl<'a> AggregateSession<'a> {
    pub(crate) fn new(
        core: &'a mut SessionCore,
        actions: &'a mut Vec<ActionNode>,
        parent: ActionId,
        list: ChildList,
    ) -> Self {
        Self {
            core,
            actions,
            parent,
            list,
        }
    }

    /// The action whose children this scope holds
    pub fn parent(&self) -> ActionId {
        self.parent
    }

    /// Which of the parent's child lists this scope holds
    pub fn list(&self) -> ChildList {
        self.list
    }

    /// Id of the owning session
    pub fn session_id(&self) -> SessionId {
        self.core.session_id()
    }
}

impl PersistenceScope for AggregateSession<'_> {
    fn parts(&self) -> (&SessionCore, &[ActionNode]) {
        (&*self.core, self.actions.as_slice())
    }

    fn parts_mut(&mut self) -> (&mut SessionCore, &mut Vec<ActionNode>) {
        (&mut *self.core, &mut *self.actions)
    }
}

impl fmt::Debug for AggregateSession<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateSession")
            .field("session_id", &self.core.session_id())
            .field("parent", &self.parent)
            .field("list", &self.list)
            .field("len", &self.actions.len())
            .finish()
    }
}
