//! Known servers and the active selection.
//!
//! The registry is a plain state container: the caller fetches from the API and
//! feeds resolved results in. Every operation is total; looking up an id that
//! isn't there is a no-op, not an error.
//!
//! Automatic selection always picks the first enabled record in list order. It
//! runs when `set_servers` finds nothing active and when the active record is
//! removed. A record chosen through `set_active_server` is trusted as-is.

use crate::models::{ServerPatch, ServerRecord};
use crate::storage::{ActiveServerStore, MemoryStore};

pub struct Registry {
    servers: Vec<ServerRecord>,
    active: Option<ServerRecord>,
    loading: bool,
    store: Box<dyn ActiveServerStore>,
}

impl Registry {
    /// Build a registry backed by `store`, rehydrating the active server from it.
    ///
    /// A stored record that can't be read back is dropped with a warning; the
    /// session just starts with nothing selected.
    pub fn new(store: impl ActiveServerStore + 'static) -> Self {
        let active = match store.load() {
            Ok(active) => active,
            Err(e) => {
                tracing::warn!(error = %e, "discarding stored active server");
                None
            }
        };
        if let Some(ref record) = active {
            tracing::debug!(server = %record.id, "rehydrated active server");
        }
        Self {
            servers: Vec::new(),
            active,
            loading: false,
            store: Box::new(store),
        }
    }

    /// Registry with a private in-memory store; nothing survives the process.
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    /// Replace the server list wholesale. Picks the first enabled server only
    /// when nothing is active yet; an existing selection is left untouched even
    /// if the new list no longer contains it.
    pub fn set_servers(&mut self, servers: Vec<ServerRecord>) {
        tracing::debug!(count = servers.len(), "replacing server list");
        self.servers = servers;
        if self.active.is_none() && !self.servers.is_empty() {
            if let Some(first) = self.first_enabled() {
                self.select(Some(first));
            }
        }
    }

    pub fn set_active_server(&mut self, record: ServerRecord) {
        self.select(Some(record));
    }

    pub fn clear_active_server(&mut self) {
        self.select(None);
    }

    pub fn active_server(&self) -> Option<&ServerRecord> {
        self.active.as_ref()
    }

    /// Whether the active record's id is in the current list. False when nothing
    /// is active, or when a rehydrated/manual selection has gone stale.
    pub fn active_is_listed(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| self.servers.iter().any(|s| s.id == active.id))
    }

    pub fn servers(&self) -> &[ServerRecord] {
        &self.servers
    }

    pub fn enabled_servers(&self) -> Vec<&ServerRecord> {
        self.servers.iter().filter(|s| s.enabled).collect()
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    /// Append a record. A record whose id is already known replaces the
    /// existing one at its position instead, keeping ids unique; if that was
    /// the active record, the active copy is refreshed too.
    pub fn add_server(&mut self, record: ServerRecord) {
        if let Some(existing) = self.servers.iter_mut().find(|s| s.id == record.id) {
            tracing::debug!(server = %record.id, "replacing server with duplicate id");
            *existing = record.clone();
            if self.active.as_ref().is_some_and(|a| a.id == record.id) {
                self.select(Some(record));
            }
            return;
        }
        self.servers.push(record);
    }

    /// Shallow-merge `patch` onto the server with `id`, in place. The active
    /// copy gets the same merge so both stay in step.
    pub fn update_server(&mut self, id: &str, patch: &ServerPatch) {
        let Some(record) = self.servers.iter_mut().find(|s| s.id == id) else {
            return;
        };
        record.merge(patch);

        if let Some(active) = self.active.as_ref().filter(|a| a.id == id) {
            let mut merged = active.clone();
            merged.merge(patch);
            self.select(Some(merged));
        }
    }

    /// Drop the server with `id`. Removing the active server re-runs automatic
    /// selection over what is left.
    pub fn remove_server(&mut self, id: &str) {
        self.servers.retain(|s| s.id != id);
        if self.active.as_ref().is_some_and(|a| a.id == id) {
            let next = self.first_enabled();
            self.select(next);
        }
    }

    pub fn server_by_id(&self, id: &str) -> Option<&ServerRecord> {
        self.servers.iter().find(|s| s.id == id)
    }

    fn first_enabled(&self) -> Option<ServerRecord> {
        self.servers.iter().find(|s| s.enabled).cloned()
    }

    /// Single write path for `active`; persists only when the value changes.
    fn select(&mut self, next: Option<ServerRecord>) {
        if self.active == next {
            return;
        }
        match next {
            Some(ref record) => tracing::info!(server = %record.id, enabled = record.enabled, "active server changed"),
            None => tracing::info!("active server cleared"),
        }
        self.active = next;
        if let Err(e) = self.store.save(self.active.as_ref()) {
            tracing::warn!(error = %e, "active server will not survive a restart");
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("servers", &self.servers)
            .field("active", &self.active)
            .field("loading", &self.loading)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patch(value: serde_json::Value) -> ServerPatch {
        value.as_object().cloned().unwrap()
    }

    fn ids(servers: &[&ServerRecord]) -> Vec<String> {
        servers.iter().map(|s| s.id.clone()).collect()
    }

    #[test]
    fn set_servers_selects_first_enabled() {
        let mut registry = Registry::in_memory();
        registry.set_servers(vec![
            ServerRecord::new("a", false),
            ServerRecord::new("b", true),
            ServerRecord::new("c", true),
        ]);
        assert_eq!(registry.active_server().map(|s| s.id.as_str()), Some("b"));
    }

    #[test]
    fn set_servers_without_enabled_leaves_nothing_active() {
        let mut registry = Registry::in_memory();
        registry.set_servers(vec![ServerRecord::new("a", false), ServerRecord::new("b", false)]);
        assert!(registry.active_server().is_none());

        registry.set_servers(Vec::new());
        assert!(registry.active_server().is_none());
    }

    #[test]
    fn set_servers_keeps_existing_selection() {
        let mut registry = Registry::in_memory();
        let manual = ServerRecord::new("gone", false);
        registry.set_active_server(manual.clone());

        registry.set_servers(vec![ServerRecord::new("a", true)]);
        assert_eq!(registry.active_server(), Some(&manual));
        assert!(!registry.active_is_listed());
    }

    #[test]
    fn set_servers_is_a_full_replace() {
        let mut registry = Registry::in_memory();
        registry.set_servers(vec![ServerRecord::new("a", true), ServerRecord::new("b", true)]);
        registry.set_servers(vec![ServerRecord::new("c", true)]);
        let listed: Vec<_> = registry.servers().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(listed, ["c"]);
    }

    #[test]
    fn manual_selection_skips_checks() {
        let mut registry = Registry::in_memory();
        registry.set_active_server(ServerRecord::new("nowhere", false));
        assert_eq!(registry.active_server().map(|s| s.enabled), Some(false));
        assert!(registry.servers().is_empty());

        registry.clear_active_server();
        assert!(registry.active_server().is_none());
    }

    #[test]
    fn enabled_servers_preserves_order() {
        let mut registry = Registry::in_memory();
        assert!(registry.enabled_servers().is_empty());

        registry.set_servers(vec![
            ServerRecord::new("a", true),
            ServerRecord::new("b", false),
            ServerRecord::new("c", true),
            ServerRecord::new("d", false),
        ]);
        assert_eq!(ids(&registry.enabled_servers()), ["a", "c"]);
    }

    #[test]
    fn loading_flag_is_plain_state() {
        let mut registry = Registry::in_memory();
        assert!(!registry.loading());
        registry.set_loading(true);
        assert!(registry.loading());
        registry.set_loading(false);
        assert!(!registry.loading());
    }

    #[test]
    fn add_server_appends_without_selecting() {
        let mut registry = Registry::in_memory();
        registry.add_server(ServerRecord::new("a", true));
        registry.add_server(ServerRecord::new("b", true));
        assert!(registry.active_server().is_none());
        let listed: Vec<_> = registry.servers().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(listed, ["a", "b"]);
    }

    #[test]
    fn add_server_replaces_duplicate_id_in_place() {
        let mut registry = Registry::in_memory();
        registry.set_servers(vec![ServerRecord::new("a", true), ServerRecord::new("b", true)]);
        assert_eq!(registry.active_server().map(|s| s.id.as_str()), Some("a"));

        registry.add_server(ServerRecord::new("a", false).with_field("name", "Renamed"));
        assert_eq!(registry.servers().len(), 2);
        assert_eq!(registry.servers()[0].name(), Some("Renamed"));
        assert_eq!(registry.active_server().and_then(|s| s.name()), Some("Renamed"));
    }

    #[test]
    fn update_server_merges_in_place_and_into_active() {
        let mut registry = Registry::in_memory();
        registry.set_servers(vec![
            ServerRecord::new("a", true).with_field("name", "A"),
            ServerRecord::new("b", true).with_field("name", "B"),
        ]);
        registry.update_server("a", &patch(json!({"name": "Alpha", "status": "online"})));

        assert_eq!(registry.servers()[0].name(), Some("Alpha"));
        assert_eq!(registry.servers()[0].fields["status"], "online");
        let active = registry.active_server().unwrap();
        assert_eq!(active.name(), Some("Alpha"));
        assert_eq!(active.fields["status"], "online");
    }

    #[test]
    fn update_other_server_leaves_active_alone() {
        let mut registry = Registry::in_memory();
        registry.set_servers(vec![ServerRecord::new("a", true), ServerRecord::new("b", true)]);
        let before = registry.active_server().cloned();

        registry.update_server("b", &patch(json!({"enabled": false})));
        assert_eq!(registry.active_server().cloned(), before);
        assert!(!registry.servers()[1].enabled);
    }

    #[test]
    fn update_unknown_id_is_a_no_op() {
        let mut registry = Registry::in_memory();
        registry.set_servers(vec![ServerRecord::new("a", true)]);
        let before = registry.servers().to_vec();
        registry.update_server("zzz", &patch(json!({"name": "x"})));
        assert_eq!(registry.servers(), before.as_slice());
    }

    #[test]
    fn removing_active_reselects_next_enabled() {
        let mut registry = Registry::in_memory();
        registry.set_servers(vec![ServerRecord::new("a", true), ServerRecord::new("b", true)]);
        registry.remove_server("a");
        assert_eq!(registry.active_server().map(|s| s.id.as_str()), Some("b"));
    }

    #[test]
    fn removing_active_with_no_candidate_clears() {
        let mut registry = Registry::in_memory();
        registry.set_servers(vec![ServerRecord::new("a", true), ServerRecord::new("b", false)]);
        registry.remove_server("a");
        assert!(registry.active_server().is_none());
    }

    #[test]
    fn removing_other_server_keeps_active() {
        let mut registry = Registry::in_memory();
        registry.set_servers(vec![ServerRecord::new("a", true), ServerRecord::new("b", true)]);
        registry.remove_server("b");
        registry.remove_server("missing");
        assert_eq!(registry.active_server().map(|s| s.id.as_str()), Some("a"));
        assert_eq!(registry.servers().len(), 1);
    }

    #[test]
    fn server_by_id_finds_first_match() {
        let mut registry = Registry::in_memory();
        registry.set_servers(vec![ServerRecord::new("a", true), ServerRecord::new("b", false)]);
        assert_eq!(registry.server_by_id("b").map(|s| s.enabled), Some(false));
        assert!(registry.server_by_id("c").is_none());
    }

    #[test]
    fn selection_is_saved_only_on_change() {
        let store = MemoryStore::new();
        let mut registry = Registry::new(store.clone());
        registry.set_servers(vec![ServerRecord::new("a", false)]);
        assert!(store.raw().is_none());

        registry.set_active_server(ServerRecord::new("a", false));
        let saved = store.raw().unwrap();
        registry.set_servers(vec![ServerRecord::new("a", true)]);
        assert_eq!(store.raw().unwrap(), saved);
    }

    #[test]
    fn corrupt_snapshot_starts_empty() {
        let store = MemoryStore::new();
        store.set_raw("not json");
        let registry = Registry::new(store);
        assert!(registry.active_server().is_none());
    }
}
