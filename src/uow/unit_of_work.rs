use std::collections::VecDeque;
use std::sync::Arc;

use super::{Operation, OperationKind, Repository};
use crate::core::{IsolationLevel, MigrationError, Result};
use crate::scope::{Scope, ScopeProvider};

/// An ordered queue of create/update/delete operations that flushes through
/// repositories inside one owned scope.
///
/// The unit of work either completes — every queued operation persisted and
/// the scope marked for commit — or is disposed, which discards the queue
/// and rolls the scope back.
pub struct UnitOfWork<'p, E> {
    provider: &'p ScopeProvider,
    isolation: IsolationLevel,
    queue: VecDeque<Operation<E>>,
    scope: Option<Scope>,
    completed: bool,
}

impl<'p, E> UnitOfWork<'p, E> {
    pub fn new(provider: &'p ScopeProvider, isolation: IsolationLevel) -> Self {
        Self {
            provider,
            isolation,
            queue: VecDeque::new(),
            scope: None,
            completed: false,
        }
    }

    /// A unit of work for pure-read operations: it starts out completed, so
    /// it always ends up committed and never forces an enclosing scope to
    /// roll back. Registering work on it reopens it as an ordinary unit of
    /// work.
    pub fn new_read_only(provider: &'p ScopeProvider, isolation: IsolationLevel) -> Self {
        Self {
            provider,
            isolation,
            queue: VecDeque::new(),
            scope: None,
            completed: true,
        }
    }

    pub fn register_created(&mut self, entity: E, repository: Arc<dyn Repository<E>>) {
        self.register(entity, repository, OperationKind::Insert);
    }

    pub fn register_updated(&mut self, entity: E, repository: Arc<dyn Repository<E>>) {
        self.register(entity, repository, OperationKind::Update);
    }

    pub fn register_deleted(&mut self, entity: E, repository: Arc<dyn Repository<E>>) {
        self.register(entity, repository, OperationKind::Delete);
    }

    fn register(&mut self, entity: E, repository: Arc<dyn Repository<E>>, kind: OperationKind) {
        self.queue.push_back(Operation {
            entity,
            repository,
            kind,
        });
        // new work reopens an already-completed unit of work
        self.completed = false;
    }

    /// Number of operations still queued.
    pub fn pending_operations(&self) -> usize {
        self.queue.len()
    }

    /// Ensures an active scope exists. Idempotent.
    pub fn begin(&mut self) -> Result<()> {
        if self.scope.is_none() {
            self.scope = Some(self.provider.create_scope(self.isolation)?);
        }
        Ok(())
    }

    /// Dequeues and dispatches every operation to its repository in strict
    /// enqueue order. The queue is empty afterwards, but the scope is not
    /// yet marked for commit.
    pub fn flush(&mut self) -> Result<()> {
        self.begin()?;
        let scope = self
            .scope
            .as_ref()
            .ok_or(MigrationError::NoAmbientTransaction)?;
        while let Some(op) = self.queue.pop_front() {
            match op.kind {
                OperationKind::Insert => op.repository.persist_new_item(&op.entity, scope)?,
                OperationKind::Update => op.repository.persist_updated_item(&op.entity, scope)?,
                OperationKind::Delete => op.repository.persist_deleted_item(&op.entity, scope)?,
            }
        }
        Ok(())
    }

    /// Flushes and marks the unit of work completed.
    pub fn complete(&mut self) -> Result<()> {
        self.flush()?;
        self.completed = true;
        Ok(())
    }

    /// Disposes the unit of work. If never completed, queued operations are
    /// discarded without being flushed and the owned scope rolls back.
    pub fn dispose(mut self) -> Result<()> {
        self.queue.clear();
        match self.scope.take() {
            Some(mut scope) => {
                if self.completed {
                    scope.complete()?;
                }
                scope.dispose()
            }
            None => Ok(()),
        }
    }
}
