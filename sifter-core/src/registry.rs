//! In-memory sifter registry.
//!
//! The registry is the single source of truth for both the UI projection and
//! device sync. It is owned by one session and dropped with it; nothing here
//! touches the filesystem.
//!
//! # Mutation rules
//!
//! - `add` / `create` / `remove` come from the UI layer.
//! - `mark_synced` comes from transfer completion and only flips
//!   [`SyncState`]; it never reorders or deletes.
//!
//! Transfers never read the live registry. They take a [`Snapshot`], so
//! concurrent add/remove only affects the next transfer.

use std::ops::Deref;
use std::sync::Arc;

use crate::error::RegistryError;
use crate::types::{Sifter, SifterId, SifterName, SyncState};

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Immutable, cheaply clonable copy of the registry contents in registry order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot(Arc<[Sifter]>);

impl Default for Snapshot {
    fn default() -> Self {
        Self::from(Vec::new())
    }
}

impl Snapshot {
    pub fn ids(&self) -> Vec<SifterId> {
        self.0.iter().map(|s| s.id).collect()
    }
}

impl Deref for Snapshot {
    type Target = [Sifter];

    fn deref(&self) -> &[Sifter] {
        &self.0
    }
}

impl From<Vec<Sifter>> for Snapshot {
    fn from(sifters: Vec<Sifter>) -> Self {
        Self(sifters.into())
    }
}

// ---------------------------------------------------------------------------
// SifterRegistry
// ---------------------------------------------------------------------------

/// Ordered collection of sifters, insertion order preserved.
#[derive(Debug, Default)]
pub struct SifterRegistry {
    sifters: Vec<Sifter>,
    next_id: u64,
}

impl SifterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a fresh identifier. Identifiers are monotonic and never handed
    /// out twice, even after the sifter holding one is removed.
    ///
    /// Fails with [`RegistryError::IdentifiersExhausted`] once `u64::MAX` has
    /// been used; the allocator is left untouched.
    pub fn allocate_id(&mut self) -> Result<SifterId, RegistryError> {
        let next = self
            .next_id
            .checked_add(1)
            .ok_or(RegistryError::IdentifiersExhausted)?;
        self.next_id = next;
        Ok(SifterId(next))
    }

    /// Allocate an identifier and append a new pending sifter.
    pub fn create(
        &mut self,
        name: impl Into<SifterName>,
        rule: impl Into<String>,
    ) -> Result<SifterId, RegistryError> {
        let id = self.allocate_id()?;
        self.sifters.push(Sifter::new(id, name, rule));
        tracing::debug!(sifter_id = %id, "sifter created");
        Ok(id)
    }

    /// Append `entity` at the end of the registry.
    ///
    /// Returns [`RegistryError::DuplicateIdentifier`] (registry unchanged) if the
    /// identifier is already present.
    pub fn add(&mut self, entity: Sifter) -> Result<(), RegistryError> {
        if self.contains(entity.id) {
            return Err(RegistryError::DuplicateIdentifier { id: entity.id });
        }
        // Keep the allocator ahead of externally chosen identifiers.
        self.next_id = self.next_id.max(entity.id.0);
        tracing::debug!(sifter_id = %entity.id, "sifter added");
        self.sifters.push(entity);
        Ok(())
    }

    /// Remove by identifier, returning the removed sifter.
    pub fn remove(&mut self, id: SifterId) -> Result<Sifter, RegistryError> {
        let index = self
            .position(id)
            .ok_or(RegistryError::NotFound { id })?;
        tracing::debug!(sifter_id = %id, "sifter removed");
        Ok(self.sifters.remove(index))
    }

    /// Ordered, read-only view. Mutate only through the registry's methods.
    pub fn all(&self) -> &[Sifter] {
        &self.sifters
    }

    pub fn get(&self, id: SifterId) -> Option<&Sifter> {
        self.sifters.iter().find(|s| s.id == id)
    }

    pub fn contains(&self, id: SifterId) -> bool {
        self.position(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sifters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sifters.is_empty()
    }

    /// Capture the current contents for a transfer.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from(self.sifters.clone())
    }

    /// Transition one sifter's sync state.
    ///
    /// A sifter removed while its transfer was in flight is not an error: the
    /// miss is logged and `false` is returned.
    pub fn mark_synced(&mut self, id: SifterId, state: SyncState) -> bool {
        match self.sifters.iter_mut().find(|s| s.id == id) {
            Some(sifter) => {
                sifter.synced = state;
                true
            }
            None => {
                tracing::warn!(
                    sifter_id = %id,
                    state = %state,
                    error = %RegistryError::NotFound { id },
                    "sync state update for removed sifter ignored",
                );
                false
            }
        }
    }

    fn position(&self, id: SifterId) -> Option<usize> {
        self.sifters.iter().position(|s| s.id == id)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
