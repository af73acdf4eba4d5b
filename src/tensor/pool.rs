use std::collections::HashMap;

use tracing::trace;

use crate::{
    tensor::{TensorId, TensorState},
    utils::error::PoolError,
};

pub struct PoolEntry<H> {
    id: TensorId,
    handle: H,
    state: TensorState,
    // introduction order, so listings follow program order
    seq: u64,
}

impl<H> PoolEntry<H> {
    pub fn id(&self) -> TensorId {
        self.id
    }

    pub fn state(&self) -> TensorState {
        self.state
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }

    pub fn handle_mut(&mut self) -> &mut H {
        &mut self.handle
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Retirement {
    Freed,
    Consumed { successor: TensorId },
}

/// Exclusive owner of every live tensor handle during one program run.
///
/// Identifiers that leave the pool are remembered so they can never be
/// reintroduced, and so later references report why they are gone.
/// The pool never calls into a device; handing a removed handle to the
/// provider is the caller's job.
pub struct TensorPool<H> {
    entries: HashMap<TensorId, PoolEntry<H>>,
    retired: HashMap<TensorId, Retirement>,
    next_seq: u64,
}

impl<H> Default for TensorPool<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> TensorPool<H> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            retired: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: TensorId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Succeeds only if `id` has never been introduced into this pool.
    pub fn ensure_fresh(&self, id: TensorId) -> Result<(), PoolError> {
        if self.entries.contains_key(&id) || self.retired.contains_key(&id) {
            return Err(PoolError::DuplicateIdentifier(id));
        }
        Ok(())
    }

    pub fn insert(&mut self, id: TensorId, handle: H, state: TensorState) -> Result<(), PoolError> {
        self.ensure_fresh(id)?;
        if !state.is_allocated() {
            return Err(PoolError::IllegalStateTransition {
                id,
                from: TensorState::Freed,
                to: state,
            });
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            id,
            PoolEntry {
                id,
                handle,
                state,
                seq,
            },
        );
        trace!(id, %state, "pool insert");
        Ok(())
    }

    pub fn get(&self, id: TensorId) -> Result<&PoolEntry<H>, PoolError> {
        match self.entries.get(&id) {
            Some(entry) => Ok(entry),
            None => Err(self.missing(id)),
        }
    }

    /// Mutable access to the entry's handle. The residency state can only
    /// change through [`TensorPool::transition`].
    pub fn get_mut(&mut self, id: TensorId) -> Result<&mut PoolEntry<H>, PoolError> {
        if !self.entries.contains_key(&id) {
            return Err(self.missing(id));
        }
        self.entries
            .get_mut(&id)
            .ok_or(PoolError::UnknownIdentifier(id))
    }

    /// Validates that `id` may move to `to` without changing anything.
    /// A freed identifier reports an illegal transition out of `Freed`.
    pub fn check_transition(&self, id: TensorId, to: TensorState) -> Result<&PoolEntry<H>, PoolError> {
        let entry = match self.entries.get(&id) {
            Some(entry) => entry,
            None => {
                return Err(match self.missing(id) {
                    PoolError::UseAfterFree(id) => PoolError::IllegalStateTransition {
                        id,
                        from: TensorState::Freed,
                        to,
                    },
                    other => other,
                });
            }
        };

        if !entry.state.can_transition_to(to) {
            return Err(PoolError::IllegalStateTransition {
                id,
                from: entry.state,
                to,
            });
        }
        Ok(entry)
    }

    /// Changes the residency of a live entry, returning its previous state.
    /// `Freed` is reached only through [`TensorPool::remove`], which also
    /// hands back the handle.
    pub fn transition(&mut self, id: TensorId, to: TensorState) -> Result<TensorState, PoolError> {
        let from = self.check_transition(id, to)?.state;
        if !to.is_allocated() {
            return Err(PoolError::IllegalStateTransition { id, from, to });
        }

        let entry = self.get_mut(id)?;
        entry.state = to;
        trace!(id, %from, %to, "pool transition");
        Ok(from)
    }

    /// Frees `id`: the entry is deleted and its handle returned for release.
    pub fn remove(&mut self, id: TensorId) -> Result<H, PoolError> {
        self.check_transition(id, TensorState::Freed)?;
        self.retire(id, Retirement::Freed)
    }

    /// Moves the handle of `id` out of the pool on behalf of `successor`,
    /// which the caller is expected to insert next.
    pub fn consume(&mut self, id: TensorId, successor: TensorId) -> Result<H, PoolError> {
        self.get(id)?;
        self.retire(id, Retirement::Consumed { successor })
    }

    /// Live identifiers in introduction order.
    pub fn ids(&self) -> Vec<TensorId> {
        self.ordered().into_iter().map(|e| e.id).collect()
    }

    /// Live identifiers and their states in introduction order.
    pub fn snapshot(&self) -> Vec<(TensorId, TensorState)> {
        self.ordered().into_iter().map(|e| (e.id, e.state)).collect()
    }

    /// Removes every live entry, oldest first. Drained identifiers count as freed.
    pub fn drain(&mut self) -> Vec<(TensorId, H)> {
        let mut entries: Vec<PoolEntry<H>> = self.entries.drain().map(|(_, e)| e).collect();
        entries.sort_by_key(|e| e.seq);

        entries
            .into_iter()
            .map(|e| {
                self.retired.insert(e.id, Retirement::Freed);
                (e.id, e.handle)
            })
            .collect()
    }

    fn ordered(&self) -> Vec<&PoolEntry<H>> {
        let mut entries: Vec<&PoolEntry<H>> = self.entries.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries
    }

    fn retire(&mut self, id: TensorId, how: Retirement) -> Result<H, PoolError> {
        let entry = self
            .entries
            .remove(&id)
            .ok_or(PoolError::UnknownIdentifier(id))?;
        self.retired.insert(id, how);
        trace!(id, ?how, "pool retire");
        Ok(entry.handle)
    }

    fn missing(&self, id: TensorId) -> PoolError {
        match self.retired.get(&id) {
            Some(Retirement::Freed) => PoolError::UseAfterFree(id),
            Some(Retirement::Consumed { successor }) => PoolError::ConsumedIdentifier {
                id,
                successor: *successor,
            },
            None => PoolError::UnknownIdentifier(id),
        }
    }
}
