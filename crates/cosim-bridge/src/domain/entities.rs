//! Core domain entities: groups, bindings and the three message kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical channel identifier, unique within a port.
pub type GroupId = u32;

/// Opaque locator of a scalar owned by the simulation engine.
///
/// A handle is resolved against a [`crate::ports::VariableStore`] on every
/// read or write; the bridge never holds a reference into engine memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarHandle(u32);

impl VarHandle {
    /// Wrap a raw arena index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Raw arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VarHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "var#{}", self.0)
    }
}

/// Weight applied to a binding when none is given.
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// One bound variable inside a group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Binding {
    pub handle: VarHandle,
    /// Scale applied to sampled values before they are published.
    pub weight: f64,
}

impl Binding {
    #[must_use]
    pub fn new(handle: VarHandle, weight: f64) -> Self {
        Self { handle, weight }
    }
}

/// Ordered set of bindings sharing a group id.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    id: GroupId,
    bindings: Vec<Binding>,
}

impl Group {
    pub(crate) fn new(id: GroupId) -> Self {
        Self {
            id,
            bindings: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> GroupId {
        self.id
    }

    #[must_use]
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub(crate) fn push(&mut self, binding: Binding) {
        self.bindings.push(binding);
    }

    pub(crate) fn remove(&mut self, handle: VarHandle) {
        self.bindings.retain(|b| b.handle != handle);
    }
}

/// A sampled value, produced at the sample cadence and buffered until flush.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub group_id: GroupId,
    /// Simulation time at which the value was read.
    pub timestamp: f64,
    pub value: f64,
}

/// A discrete event occurrence, published without buffering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub group_id: GroupId,
    /// Per-port event counter (wraps at `u32::MAX`).
    pub sequence: u32,
}

/// Inbound control value for every binding of `group_id`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    /// Group id carried as a double on the wire.
    pub group_id: f64,
    pub value: f64,
}

impl ControlMessage {
    #[must_use]
    pub fn new(group_id: GroupId, value: f64) -> Self {
        Self {
            group_id: f64::from(group_id),
            value,
        }
    }

    /// Integral group id, or `None` if the wire value is not a valid id.
    #[must_use]
    pub fn group(&self) -> Option<GroupId> {
        group_from_f64(self.group_id)
    }
}

/// Convert a wire double into a group id when it is an exact `u32`.
pub(crate) fn group_from_f64(raw: f64) -> Option<GroupId> {
    if raw.is_finite() && raw >= 0.0 && raw <= f64::from(u32::MAX) && raw.fract() == 0.0 {
        Some(raw as GroupId)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_from_f64() {
        assert_eq!(group_from_f64(1.0), Some(1));
        assert_eq!(group_from_f64(0.0), Some(0));
        assert_eq!(group_from_f64(f64::from(u32::MAX)), Some(u32::MAX));
        assert_eq!(group_from_f64(1.5), None);
        assert_eq!(group_from_f64(-1.0), None);
        assert_eq!(group_from_f64(f64::NAN), None);
        assert_eq!(group_from_f64(4_294_967_296.0), None);
    }

    #[test]
    fn test_group_remove_keeps_order() {
        let mut group = Group::new(7);
        for i in 0..4 {
            group.push(Binding::new(VarHandle::new(i), DEFAULT_WEIGHT));
        }
        group.remove(VarHandle::new(1));

        let handles: Vec<_> = group.bindings().iter().map(|b| b.handle.index()).collect();
        assert_eq!(handles, vec![0, 2, 3]);
    }

    #[test]
    fn test_handle_display() {
        assert_eq!(VarHandle::new(12).to_string(), "var#12");
    }
}
