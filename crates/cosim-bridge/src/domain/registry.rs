//! # Group Registry
//!
//! Maps group ids to the variables bound to them. Groups are created on the
//! first bind, grow by append, and are never removed. The registry is
//! mutable only until it is sealed at the start of the run; afterwards it is
//! read-only and needs no synchronization.

use std::collections::HashMap;

use crate::domain::entities::{Binding, Group, GroupId, VarHandle, DEFAULT_WEIGHT};
use crate::error::ConfigurationError;

#[derive(Debug, Default, Clone)]
pub struct GroupRegistry {
    groups: Vec<Group>,
    index: HashMap<GroupId, usize>,
    owners: HashMap<VarHandle, GroupId>,
    sealed: bool,
}

impl GroupRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handle` to `group_id`, creating the group if needed.
    ///
    /// A handle belongs to one group at a time: binding it to a different
    /// group moves it there. Binding it again to its current group only
    /// updates the weight.
    pub fn add_ref_to_group(
        &mut self,
        group_id: GroupId,
        handle: VarHandle,
        weight: Option<f64>,
    ) -> Result<(), ConfigurationError> {
        if self.sealed {
            return Err(ConfigurationError::LateBinding { group: group_id });
        }
        let weight = weight.unwrap_or(DEFAULT_WEIGHT);
        if !weight.is_finite() {
            return Err(ConfigurationError::InvalidWeight {
                group: group_id,
                weight,
            });
        }

        if let Some(previous) = self.owners.get(&handle).copied() {
            if let Some(&slot) = self.index.get(&previous) {
                self.groups[slot].remove(handle);
            }
            if previous != group_id {
                tracing::debug!(%handle, from = previous, to = group_id, "Moving binding to new group");
            }
        }

        let slot = match self.index.get(&group_id) {
            Some(&slot) => slot,
            None => {
                self.groups.push(Group::new(group_id));
                self.index.insert(group_id, self.groups.len() - 1);
                self.groups.len() - 1
            }
        };
        self.groups[slot].push(Binding::new(handle, weight));
        self.owners.insert(handle, group_id);
        Ok(())
    }

    /// Bindings of `group_id`; empty for unknown groups.
    #[must_use]
    pub fn resolve(&self, group_id: GroupId) -> &[Binding] {
        self.index
            .get(&group_id)
            .map(|&slot| self.groups[slot].bindings())
            .unwrap_or(&[])
    }

    /// Group ids in first-bind order.
    #[must_use]
    pub fn all_groups(&self) -> Vec<GroupId> {
        self.groups.iter().map(Group::id).collect()
    }

    /// Groups in first-bind order.
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter()
    }

    /// Group currently owning `handle`.
    #[must_use]
    pub fn group_of(&self, handle: VarHandle) -> Option<GroupId> {
        self.owners.get(&handle).copied()
    }

    #[must_use]
    pub fn contains(&self, group_id: GroupId) -> bool {
        self.index.contains_key(&group_id)
    }

    /// Total number of bindings across all groups.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.owners.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Freeze the registry; later binds fail with `LateBinding`.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }
}
