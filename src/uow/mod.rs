// ============================================================================
// Unit of Work
// ============================================================================
//
// An ordered queue of pending entity mutations flushed transactionally
// through repositories inside a scope. Operations are immutable snapshots
// owned by the unit of work alone, and they execute in strict enqueue order
// regardless of kind.
//
// ============================================================================

pub mod unit_of_work;

use std::sync::Arc;

use crate::core::Result;
use crate::scope::Scope;

pub use unit_of_work::UnitOfWork;

/// What a queued operation does to its entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
}

/// Persists entities of one type through the ambient scope's transaction.
pub trait Repository<E> {
    fn persist_new_item(&self, entity: &E, scope: &Scope) -> Result<()>;
    fn persist_updated_item(&self, entity: &E, scope: &Scope) -> Result<()>;
    fn persist_deleted_item(&self, entity: &E, scope: &Scope) -> Result<()>;
}

/// An entity snapshot paired with the repository that will persist it.
/// Created by the register methods, consumed by flush.
pub(crate) struct Operation<E> {
    pub(crate) entity: E,
    pub(crate) repository: Arc<dyn Repository<E>>,
    pub(crate) kind: OperationKind,
}
