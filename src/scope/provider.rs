use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;

use uuid::Uuid;

use super::scope::Scope;
use crate::core::{IsolationLevel, MigrationError, Result};
use crate::db::{DatabaseFactory, DatabaseTransaction};

/// Owns the ambient scope stack for one logical call context.
///
/// A provider is deliberately neither `Send` nor `Sync`: one instance drives
/// one call chain, so concurrent logical operations in the same process each
/// get their own provider and cannot cross-contaminate. Providers are cheap;
/// they share the database through an `Arc<dyn DatabaseFactory>`.
pub struct ScopeProvider {
    database: Arc<dyn DatabaseFactory>,
    stack: Rc<RefCell<ScopeStack>>,
}

pub(crate) struct ScopeStack {
    pub(crate) frames: Vec<Frame>,
    pub(crate) tx: Option<Box<dyn DatabaseTransaction>>,
    // lock ids already acquired somewhere in the scope chain; a lock is
    // requested from the database once per chain
    pub(crate) read_locks: HashSet<i32>,
    pub(crate) write_locks: HashSet<i32>,
}

pub(crate) struct Frame {
    pub(crate) instance_id: Uuid,
    pub(crate) completed: Option<bool>,
    pub(crate) auto_complete: bool,
}

impl ScopeProvider {
    pub fn new(database: Arc<dyn DatabaseFactory>) -> Self {
        Self {
            database,
            stack: Rc::new(RefCell::new(ScopeStack {
                frames: Vec::new(),
                tx: None,
                read_locks: HashSet::new(),
                write_locks: HashSet::new(),
            })),
        }
    }

    /// Opens a scope. The outermost scope begins a database transaction at
    /// the requested isolation level; a nested scope shares the ambient
    /// transaction, and may not require a stronger isolation level than the
    /// one already active.
    pub fn create_scope(&self, isolation: IsolationLevel) -> Result<Scope> {
        self.create_scope_inner(isolation, false)
    }

    /// Like [`create_scope`](Self::create_scope), but a scope that is still
    /// undecided at disposal completes instead of rolling back. Used for
    /// read-only work that must not force an enclosing scope to roll back.
    pub fn create_auto_complete_scope(&self, isolation: IsolationLevel) -> Result<Scope> {
        self.create_scope_inner(isolation, true)
    }

    fn create_scope_inner(&self, isolation: IsolationLevel, auto_complete: bool) -> Result<Scope> {
        let mut stack = self.stack.borrow_mut();

        if stack.frames.is_empty() {
            // a scope implies a transaction, always
            let tx = self.database.begin(isolation)?;
            stack.tx = Some(tx);
        } else {
            let ambient = stack
                .tx
                .as_ref()
                .ok_or(MigrationError::NoAmbientTransaction)?
                .isolation_level();
            if isolation > ambient {
                return Err(MigrationError::InsufficientIsolation {
                    required: isolation,
                    actual: ambient,
                });
            }
        }

        let instance_id = Uuid::new_v4();
        let depth = stack.frames.len();
        stack.frames.push(Frame {
            instance_id,
            completed: None,
            auto_complete,
        });
        tracing::debug!(scope = %instance_id, depth, "scope created");

        Ok(Scope::new(Rc::clone(&self.stack), depth, instance_id))
    }

    /// Whether a scope is currently active in this call context.
    pub fn has_ambient_scope(&self) -> bool {
        !self.stack.borrow().frames.is_empty()
    }

    /// Depth of the ambient scope chain.
    pub fn ambient_depth(&self) -> usize {
        self.stack.borrow().frames.len()
    }
}
