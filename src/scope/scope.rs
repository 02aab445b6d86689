use std::cell::RefCell;
use std::rc::Rc;

use uuid::Uuid;

use super::provider::ScopeStack;
use crate::core::{IsolationLevel, MigrationError, Result};
use crate::db::DatabaseTransaction;

enum LockMode {
    Read,
    Write,
}

/// A nested transactional boundary.
///
/// Work performed through a scope is committed only if every scope in the
/// chain completed before disposal; one uncompleted scope makes the
/// outermost disposal roll the whole transaction back. Dropping a scope
/// without calling [`dispose`](Scope::dispose) rolls back.
pub struct Scope {
    stack: Rc<RefCell<ScopeStack>>,
    depth: usize,
    instance_id: Uuid,
    disposed: bool,
}

impl Scope {
    pub(crate) fn new(stack: Rc<RefCell<ScopeStack>>, depth: usize, instance_id: Uuid) -> Self {
        Self {
            stack,
            depth,
            instance_id,
            disposed: false,
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Isolation level of the ambient transaction.
    pub fn isolation_level(&self) -> Result<IsolationLevel> {
        let stack = self.stack.borrow();
        let tx = stack.tx.as_ref().ok_or(MigrationError::NoAmbientTransaction)?;
        Ok(tx.isolation_level())
    }

    /// Marks the scope for commit. Idempotent; calling it again is harmless.
    /// A scope whose child disposed uncompleted stays uncompleted.
    pub fn complete(&mut self) -> Result<()> {
        if self.disposed {
            return Err(MigrationError::ScopeDisposed);
        }
        let mut stack = self.stack.borrow_mut();
        let frame = stack
            .frames
            .get_mut(self.depth)
            .ok_or(MigrationError::ScopeDisposed)?;
        if frame.completed.is_none() {
            frame.completed = Some(true);
        }
        Ok(())
    }

    /// Verifies a lock row exists for each id, in the caller-supplied order.
    /// Requires REPEATABLE READ or stronger.
    pub fn read_lock(&self, lock_ids: &[i32]) -> Result<()> {
        self.lock_inner(lock_ids, LockMode::Read)
    }

    /// Flips the sign of each lock row's value, in the caller-supplied
    /// order, forcing a write conflict with any concurrent transaction doing
    /// the same. Requires REPEATABLE READ or stronger.
    pub fn write_lock(&self, lock_ids: &[i32]) -> Result<()> {
        self.lock_inner(lock_ids, LockMode::Write)
    }

    // Lock ids are processed strictly in the order the caller supplied:
    // that order is the deadlock-avoidance contract across concurrent
    // processes and is never reordered here.
    fn lock_inner(&self, lock_ids: &[i32], mode: LockMode) -> Result<()> {
        if self.disposed {
            return Err(MigrationError::ScopeDisposed);
        }
        let mut stack = self.stack.borrow_mut();
        let ScopeStack {
            tx,
            read_locks,
            write_locks,
            ..
        } = &mut *stack;
        let tx = tx.as_mut().ok_or(MigrationError::NoAmbientTransaction)?;

        let actual = tx.isolation_level();
        if actual < IsolationLevel::RepeatableRead {
            return Err(MigrationError::InsufficientIsolation {
                required: IsolationLevel::RepeatableRead,
                actual,
            });
        }

        for &lock_id in lock_ids {
            match mode {
                LockMode::Read => {
                    if read_locks.contains(&lock_id) {
                        continue;
                    }
                    if tx.select_lock_row(lock_id)?.is_none() {
                        return Err(MigrationError::LockObjectMissing(lock_id));
                    }
                    read_locks.insert(lock_id);
                }
                LockMode::Write => {
                    if write_locks.contains(&lock_id) {
                        continue;
                    }
                    let value = tx
                        .select_lock_row(lock_id)?
                        .ok_or(MigrationError::LockObjectMissing(lock_id))?;
                    tx.update_lock_row(lock_id, -value)?;
                    write_locks.insert(lock_id);
                }
            }
        }
        Ok(())
    }

    /// Runs `f` against the ambient transaction. This is how repositories
    /// and migration steps reach the database.
    pub fn with_database<T>(
        &self,
        f: impl FnOnce(&mut dyn DatabaseTransaction) -> Result<T>,
    ) -> Result<T> {
        if self.disposed {
            return Err(MigrationError::ScopeDisposed);
        }
        let mut stack = self.stack.borrow_mut();
        let tx = stack.tx.as_mut().ok_or(MigrationError::NoAmbientTransaction)?;
        f(tx.as_mut())
    }

    /// Disposes the scope. Must be the ambient (innermost live) scope.
    ///
    /// A nested scope only pops the ambient stack and reports its completion
    /// to its parent. The outermost scope commits the transaction when every
    /// scope in the chain completed, and rolls it back otherwise.
    pub fn dispose(mut self) -> Result<()> {
        self.finish(true)
    }

    fn finish(&mut self, strict: bool) -> Result<()> {
        if self.disposed {
            return if strict {
                Err(MigrationError::ScopeDisposed)
            } else {
                Ok(())
            };
        }

        let mut stack = self.stack.borrow_mut();
        if stack.frames.len() != self.depth + 1 {
            if strict {
                return Err(MigrationError::NotAmbient);
            }
            if stack.frames.len() <= self.depth {
                // our frame was already discarded by an ancestor's disposal
                self.disposed = true;
                return Ok(());
            }
            // scopes dropped out of order: the leaked children never
            // completed, so this scope cannot complete either
            while stack.frames.len() > self.depth + 1 {
                stack.frames.pop();
            }
            if let Some(frame) = stack.frames.get_mut(self.depth) {
                frame.completed = Some(false);
            }
        }

        let frame = match stack.frames.pop() {
            Some(frame) => frame,
            None => {
                self.disposed = true;
                return Ok(());
            }
        };
        let completed = frame.completed.unwrap_or(frame.auto_complete);
        self.disposed = true;

        if !stack.frames.is_empty() {
            // nested: defer commit/rollback to the outermost scope
            if !completed {
                if let Some(parent) = stack.frames.last_mut() {
                    parent.completed = Some(false);
                }
                tracing::debug!(scope = %self.instance_id, "uncompleted child scope");
            }
            return Ok(());
        }

        let tx = stack.tx.take();
        stack.read_locks.clear();
        stack.write_locks.clear();
        drop(stack);

        match tx {
            Some(tx) if completed => {
                tracing::debug!(scope = %self.instance_id, "committing scope");
                tx.commit()
            }
            Some(tx) => {
                tracing::debug!(scope = %self.instance_id, "rolling back scope");
                tx.rollback()
            }
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("depth", &self.depth)
            .field("instance_id", &self.instance_id)
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        if self.disposed {
            return;
        }
        if let Err(e) = self.finish(false) {
            tracing::warn!(scope = %self.instance_id, error = %e, "scope rollback on drop failed");
        }
    }
}
