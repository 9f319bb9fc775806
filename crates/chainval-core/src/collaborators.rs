//! Contracts for the collaborators outside the validation core
//!
//! The live object registry, the reporting sink and handle formatting all
//! belong to the host. The core only calls through these traits.
use crate::severity::Severity;
use crate::value::{Handle, Record};
use std::collections::HashMap;

/// Creation-time parameters of a live object
pub type StateSnapshot = Record;

/// Read-only view of live object state
pub trait ObjectStateRegistry: Send + Sync {
    fn get(&self, handle: &Handle) -> Option<StateSnapshot>;
}

/// Sink that turns diagnostics into pass/fail policy
pub trait Reporter: Send + Sync {
    /// Report one diagnostic; returns `true` when the call must be skipped
    fn report(&self, objects: &[Handle], rule_id: &str, severity: Severity, message: &str) -> bool;
}

/// Formats opaque handles for messages
pub trait HandleFormatter: Send + Sync {
    fn format_handle(&self, handle: &Handle) -> String;
}

/// `VkSampler 0x2a` style formatting
#[derive(Debug, Default, Clone, Copy)]
pub struct HexHandleFormatter;

impl HandleFormatter for HexHandleFormatter {
    fn format_handle(&self, handle: &Handle) -> String {
        format!("{} 0x{:x}", handle.object_type, handle.raw)
    }
}

/// Object registry backed by a map, populated up front
#[derive(Debug, Default, Clone)]
pub struct InMemoryStateRegistry {
    objects: HashMap<Handle, StateSnapshot>,
}

impl InMemoryStateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(mut self, handle: Handle, state: StateSnapshot) -> Self {
        self.objects.insert(handle, state);
        self
    }

    pub fn insert(&mut self, handle: Handle, state: StateSnapshot) {
        self.objects.insert(handle, state);
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl ObjectStateRegistry for InMemoryStateRegistry {
    fn get(&self, handle: &Handle) -> Option<StateSnapshot> {
        self.objects.get(handle).cloned()
    }
}
