//! Registry of handles minted by remote realms.

use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::error::{ScriptError, ScriptResult};
use crate::value::{Handle, HandleId, RealmId};

/// What a handle points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleDescriptor {
    pub realm: RealmId,
    /// Browsing context the realm belongs to, when known.
    pub context: Option<String>,
    /// Wire tag of the referenced object, e.g. `object`.
    pub kind: String,
}

/// Arena of live handles keyed by `(realm, handle id)`.
///
/// Entries are only ever added or removed in bulk when their realm goes away.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    entries: HashMap<(RealmId, HandleId), HandleDescriptor>,
    invalidated: HashSet<RealmId>,
    retired: HashMap<HandleId, RealmId>,
    realm_contexts: HashMap<RealmId, String>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a handle minted by `realm`. Registering a key twice returns the
    /// existing handle and leaves its descriptor untouched.
    pub fn register(
        &mut self,
        realm: RealmId,
        id: HandleId,
        descriptor: HandleDescriptor,
    ) -> ScriptResult<Handle> {
        if self.invalidated.contains(&realm) {
            return Err(ScriptError::stale_handle(id.as_str(), realm.as_str()));
        }

        let key = (realm.clone(), id.clone());
        if self.entries.contains_key(&key) {
            debug!("[Script] Handle {} already registered in realm {}", id, realm);
        } else {
            debug!("[Script] Registered handle {} ({}) in realm {}", id, descriptor.kind, realm);
            self.entries.insert(key, descriptor);
        }

        Ok(Handle::new(realm, id))
    }

    pub fn resolve(&self, handle: &Handle) -> ScriptResult<&HandleDescriptor> {
        if self.invalidated.contains(&handle.realm) {
            return Err(ScriptError::stale_handle(
                handle.id.as_str(),
                handle.realm.as_str(),
            ));
        }

        self.entries
            .get(&(handle.realm.clone(), handle.id.clone()))
            .ok_or_else(|| ScriptError::unknown_handle(handle.id.as_str()))
    }

    /// Records that `realm` lives in browsing `context`.
    pub fn bind_realm(&mut self, realm: RealmId, context: &str) {
        if self.realm_contexts.get(&realm).map(String::as_str) != Some(context) {
            debug!("[Script] Realm {} belongs to context {}", realm, context);
            self.realm_contexts.insert(realm, context.to_string());
        }
    }

    pub fn context_of(&self, realm: &RealmId) -> Option<&str> {
        self.realm_contexts.get(realm).map(String::as_str)
    }

    /// Finds a live handle by id alone.
    pub fn lookup(&self, id: &HandleId) -> ScriptResult<Handle> {
        if let Some(((realm, _), _)) = self.entries.iter().find(|((_, key), _)| key == id) {
            return Ok(Handle::new(realm.clone(), id.clone()));
        }

        match self.retired.get(id) {
            Some(realm) => Err(ScriptError::stale_handle(id.as_str(), realm.as_str())),
            None => Err(ScriptError::unknown_handle(id.as_str())),
        }
    }

    /// Drops every handle of `realm`. Returns how many were removed.
    pub fn invalidate_realm(&mut self, realm: &RealmId) -> usize {
        self.invalidated.insert(realm.clone());
        self.remove_where(|key_realm, _| key_realm == realm)
    }

    /// Drops every handle belonging to realms of `context`, as happens when the
    /// context navigates. Returns how many were removed.
    pub fn invalidate_context(&mut self, context: &str) -> usize {
        let bound = self
            .realm_contexts
            .iter()
            .filter(|(_, bound)| bound.as_str() == context)
            .map(|(realm, _)| realm.clone());
        let described = self
            .entries
            .values()
            .filter(|descriptor| descriptor.context.as_deref() == Some(context))
            .map(|descriptor| descriptor.realm.clone());
        let realms: HashSet<RealmId> = bound.chain(described).collect();

        self.invalidated.extend(realms.iter().cloned());
        self.realm_contexts.retain(|realm, _| !realms.contains(realm));
        let removed = self.remove_where(|realm, _| realms.contains(realm));
        info!(
            "[Script] Context {} torn down: {} realm(s), {} handle(s) invalidated",
            context,
            realms.len(),
            removed
        );
        removed
    }

    pub fn is_invalidated(&self, realm: &RealmId) -> bool {
        self.invalidated.contains(realm)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn remove_where<F>(&mut self, predicate: F) -> usize
    where
        F: Fn(&RealmId, &HandleId) -> bool,
    {
        let doomed: Vec<(RealmId, HandleId)> = self
            .entries
            .keys()
            .filter(|(realm, id)| predicate(realm, id))
            .cloned()
            .collect();

        for (realm, id) in &doomed {
            self.entries.remove(&(realm.clone(), id.clone()));
            self.retired.insert(id.clone(), realm.clone());
        }
        doomed.len()
    }
}
