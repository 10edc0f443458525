//! The seam between the emulation and a real sandbox host.
//!
//! At bind time the capability layer asks a [`HostLookup`] for each
//! capability by name. Anything the host provides is used as-is; everything
//! else falls back to the emulated implementation.

use crate::capability::{CapabilityFn, CapabilityName};
use std::collections::HashMap;
use std::rc::Rc;

/// Source of host-provided capability implementations.
pub trait HostLookup {
    /// The host's implementation of `name`, if it has one.
    fn lookup(&self, name: CapabilityName) -> Option<CapabilityFn>;
}

/// A host that provides nothing, so every capability is emulated.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHost;

impl HostLookup for NoHost {
    fn lookup(&self, _name: CapabilityName) -> Option<CapabilityFn> {
        None
    }
}

/// A host backed by an explicit table of implementations.
#[derive(Clone, Default)]
pub struct HostTable {
    entries: HashMap<CapabilityName, CapabilityFn>,
}

impl HostTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: CapabilityName, implementation: CapabilityFn) -> Self {
        self.insert(name, implementation);
        self
    }

    pub fn insert(&mut self, name: CapabilityName, implementation: CapabilityFn) {
        self.entries.insert(name, implementation);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl HostLookup for HostTable {
    fn lookup(&self, name: CapabilityName) -> Option<CapabilityFn> {
        self.entries.get(&name).map(Rc::clone)
    }
}

impl std::fmt::Debug for HostTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.entries.keys().map(|name| name.as_str()).collect();
        names.sort_unstable();
        f.debug_struct("HostTable").field("entries", &names).finish()
    }
}
