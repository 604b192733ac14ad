//! [`ReferenceRegistry`]: prefix and type dispatch over registered
//! serializers.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use arbor_types::NodeRef;

use crate::error::{RefError, RefResult};
use crate::reference::{NodeReference, SerializedNodeReference};
use crate::serializer::{ByIdSerializer, NodeRefSerializer, NodeReferenceSerializer};

/// Separates the prefix from the body in serialized text.
pub const SEPARATOR: &str = ":";

/// A registered serializer, shared between its prefix and type slots.
pub type SharedSerializer = Arc<dyn NodeReferenceSerializer>;

#[derive(Default)]
struct RegistryState {
    by_prefix: HashMap<String, SharedSerializer>,
    by_type: HashMap<TypeId, SharedSerializer>,
    legacy: Vec<SharedSerializer>,
}

impl RegistryState {
    fn remove(&mut self, serializer: &SharedSerializer) {
        if let Some(prefix) = serializer.prefix() {
            if self
                .by_prefix
                .get(prefix)
                .is_some_and(|existing| same(existing, serializer))
            {
                self.by_prefix.remove(prefix);
            }
            self.by_type.retain(|_, existing| !same(existing, serializer));
        } else {
            self.legacy.retain(|existing| !same(existing, serializer));
        }
    }
}

fn same(a: &SharedSerializer, b: &SharedSerializer) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Registry of node reference serializers.
///
/// Registration may happen at any time; lookups and registration are
/// synchronized, so one registry can be shared behind an `Arc`.
pub struct ReferenceRegistry {
    state: RwLock<RegistryState>,
}

impl ReferenceRegistry {
    /// A registry with no serializers at all.
    pub fn empty() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// A registry with the built-in `id:` and `pnode:` serializers.
    pub fn new() -> Self {
        let registry = Self::empty();
        {
            let mut state = registry.state.write().expect("lock poisoned");
            for builtin in [
                Arc::new(ByIdSerializer) as SharedSerializer,
                Arc::new(NodeRefSerializer) as SharedSerializer,
            ] {
                if let Some(prefix) = builtin.prefix() {
                    state.by_prefix.insert(prefix.to_string(), Arc::clone(&builtin));
                }
                for type_id in builtin.supported_types() {
                    state.by_type.insert(type_id, Arc::clone(&builtin));
                }
            }
        }
        registry
    }

    /// Register `serializer`.
    ///
    /// When its prefix or one of its types is already claimed, the previous
    /// owner is unregistered if `replace` is set; otherwise registration
    /// fails and nothing changes.
    pub fn register(&self, serializer: SharedSerializer, replace: bool) -> RefResult<()> {
        let mut state = self.state.write().expect("lock poisoned");

        let Some(prefix) = serializer.prefix().map(str::to_string) else {
            warn!(
                serializer = ?serializer,
                "registered serializer without prefix; migrate it to a prefixed serializer"
            );
            state.legacy.push(serializer);
            return Ok(());
        };
        let types = serializer.supported_types();

        let mut displaced: Vec<SharedSerializer> = Vec::new();
        if let Some(existing) = state.by_prefix.get(&prefix) {
            if !replace {
                return Err(RefError::RegistrationConflict {
                    what: format!("deserializer for '{prefix}{SEPARATOR}'"),
                    existing: format!("{existing:?}"),
                });
            }
            displaced.push(Arc::clone(existing));
        }
        for type_id in &types {
            if let Some(existing) = state.by_type.get(type_id) {
                if !replace {
                    return Err(RefError::RegistrationConflict {
                        what: format!("serializer for {type_id:?}"),
                        existing: format!("{existing:?}"),
                    });
                }
                displaced.push(Arc::clone(existing));
            }
        }

        for old in &displaced {
            state.remove(old);
        }
        state.by_prefix.insert(prefix.clone(), Arc::clone(&serializer));
        for type_id in types {
            state.by_type.insert(type_id, Arc::clone(&serializer));
        }
        debug!(prefix = %prefix, replaced = displaced.len(), "registered reference serializer");
        Ok(())
    }

    /// Remove `serializer` from every slot it still owns.
    pub fn unregister(&self, serializer: &SharedSerializer) {
        self.state.write().expect("lock poisoned").remove(serializer);
    }

    /// Text form of `reference`, prefix included.
    pub fn serialize(&self, reference: &dyn NodeReference) -> RefResult<String> {
        if let Some(serialized) = reference.downcast_ref::<SerializedNodeReference>() {
            return Ok(serialized.0.clone());
        }
        if let Some(NodeRef::Foreign(text)) = reference.downcast_ref::<NodeRef>() {
            return Ok(text.clone());
        }

        let state = self.state.read().expect("lock poisoned");
        let type_id = reference.as_any().type_id();
        if let Some(serializer) = state.by_type.get(&type_id) {
            if let (Some(prefix), Some(body)) = (serializer.prefix(), serializer.serialize(reference))
            {
                return Ok(format!("{prefix}{SEPARATOR}{body}"));
            }
        }
        state
            .legacy
            .iter()
            .find_map(|serializer| serializer.serialize(reference))
            .ok_or_else(|| RefError::MissingSerializer {
                reference: format!("{reference:?}"),
            })
    }

    /// Parse serialized text back into a reference.
    pub fn deserialize(&self, text: &str) -> RefResult<Box<dyn NodeReference>> {
        let state = self.state.read().expect("lock poisoned");
        if let Some((prefix, body)) = text.split_once(SEPARATOR) {
            if let Some(deserializer) = state.by_prefix.get(prefix) {
                return deserializer
                    .deserialize(body)
                    .ok_or_else(|| RefError::Malformed {
                        text: text.to_string(),
                        reason: format!("rejected by the '{prefix}' deserializer"),
                    });
            }
        }
        state
            .legacy
            .iter()
            .find_map(|serializer| serializer.deserialize(text))
            .ok_or_else(|| RefError::UnknownFormat {
                text: text.to_string(),
            })
    }

    /// Convert any reference into the form a tree stores.
    ///
    /// [`NodeRef`]s are kept as they are; every other reference is stored as
    /// its serialized text.
    pub fn to_node_ref(&self, reference: &dyn NodeReference) -> RefResult<NodeRef> {
        if let Some(node_ref) = reference.downcast_ref::<NodeRef>() {
            return Ok(node_ref.clone());
        }
        self.serialize(reference).map(NodeRef::Foreign)
    }

    /// Expand a stored reference back into a typed reference.
    pub fn from_node_ref(&self, node_ref: &NodeRef) -> RefResult<Box<dyn NodeReference>> {
        match node_ref {
            NodeRef::Foreign(text) => self.deserialize(text),
            other => Ok(Box::new(other.clone())),
        }
    }

    /// Registered prefixes, sorted.
    pub fn prefixes(&self) -> Vec<String> {
        let state = self.state.read().expect("lock poisoned");
        let mut prefixes: Vec<String> = state.by_prefix.keys().cloned().collect();
        prefixes.sort();
        prefixes
    }
}

impl Default for ReferenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReferenceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let legacy = self.state.read().map(|s| s.legacy.len()).unwrap_or(0);
        f.debug_struct("ReferenceRegistry")
            .field("prefixes", &self.prefixes())
            .field("legacy", &legacy)
            .finish()
    }
}
