//! The Client Registry (component F, spec.md §4.F): owning storage for
//! every [`ProxyResourceSet`] plus the non-owning index maps that
//! route wire traffic and client-driven teardown back to the right
//! set — "client→proxy, local-id→proxy, seqno→proxy, resource-set→
//! proxy" (spec.md §1).
//!
//! Grounded on the teacher's `Router`'s `HashMap<MemberId, DialState>`
//! pattern (`examples/estuary-flow/crates/gazette/src/router.rs`) of
//! one owning map plus derived lookups, adapted to `fxhash`'s
//! `FxHashMap` (already the workspace's hash-map choice for small,
//! trusted-key, single-threaded tables — see `cson::symbol`).

use fxhash::{FxHashMap, FxHashSet};

use crate::error::{Error, Result};
use crate::proxy::ProxyResourceSet;

/// Opaque handle identifying one local "resource client" (spec.md §1:
/// "local resource clients"). Callers mint these however they like;
/// the registry only uses it as an index key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub u64);

/// The four intersecting index tables of spec.md §4.F, plus the
/// primary owning store keyed by `local_id` (spec.md §3 "the registry
/// uniquely owns proxy resource sets keyed by the client-facing
/// resource-set handle").
#[derive(Debug, Default)]
pub struct ClientRegistry {
    /// local_id -> proxy (owning).
    proxies: FxHashMap<u32, ProxyResourceSet>,
    /// client -> set of local_ids it owns (non-owning).
    by_client: FxHashMap<ClientId, FxHashSet<u32>>,
    /// local_id -> owning client (non-owning reverse of `by_client`,
    /// so a bare `local_id` is enough to find and clear its owner's
    /// entry without the caller threading a `ClientId` through every
    /// call site).
    owner_of: FxHashMap<u32, ClientId>,
    /// seqno of the currently in-flight request on a set -> local_id
    /// (non-owning; routes a reply back to its proxy set).
    by_seqno: FxHashMap<u32, u32>,
    /// server-assigned resource_set_id -> local_id (non-owning; routes
    /// unsolicited `RESOURCES_EVENT` messages, which carry only the
    /// server id, not a seqno).
    by_server_id: FxHashMap<u32, u32>,
    next_local_id: u32,
    /// Gates final teardown (spec.md §4.F: "The registry's overall
    /// refcount gates final teardown"); bumped per registered client,
    /// dropped on `destroy_client`.
    refcount: u32,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            next_local_id: 1,
            ..Default::default()
        }
    }

    pub fn refcount(&self) -> u32 {
        self.refcount
    }

    /// Registers a new, empty owner slot for `client`; idempotent for
    /// a client already known to the registry.
    pub fn register_client(&mut self, client: ClientId) {
        if let std::collections::hash_map::Entry::Vacant(e) = self.by_client.entry(client) {
            e.insert(FxHashSet::default());
            self.refcount += 1;
        }
    }

    /// Allocates a fresh `local_id` and takes ownership of `proxy`,
    /// indexed under `client`. `local_id` assignment is monotonic
    /// within this registry (spec.md §3: "a proxy set is created with
    /// local_id assigned monotonically").
    pub fn insert(&mut self, client: ClientId, proxy: ProxyResourceSet) -> u32 {
        let local_id = self.next_local_id;
        self.next_local_id += 1;
        self.by_client.entry(client).or_default().insert(local_id);
        self.owner_of.insert(local_id, client);
        self.proxies.insert(local_id, proxy);
        local_id
    }

    pub fn owner_of(&self, local_id: u32) -> Option<ClientId> {
        self.owner_of.get(&local_id).copied()
    }

    pub fn get(&self, local_id: u32) -> Option<&ProxyResourceSet> {
        self.proxies.get(&local_id)
    }

    pub fn get_mut(&mut self, local_id: u32) -> Option<&mut ProxyResourceSet> {
        self.proxies.get_mut(&local_id)
    }

    /// Records that `seqno` now identifies the in-flight request on
    /// `local_id`, so the eventual reply can be routed back.
    pub fn bind_seqno(&mut self, seqno: u32, local_id: u32) {
        self.by_seqno.insert(seqno, local_id);
    }

    /// Resolves and forgets a seqno binding (a reply correlates to at
    /// most one in-flight request).
    pub fn take_seqno(&mut self, seqno: u32) -> Option<u32> {
        self.by_seqno.remove(&seqno)
    }

    /// Records the server-assigned id for `local_id`, once known
    /// (either from a successful create reply or a wildcard-binding
    /// event — spec.md §4.E).
    pub fn bind_server_id(&mut self, server_id: u32, local_id: u32) {
        self.by_server_id.insert(server_id, local_id);
    }

    pub fn by_server_id(&self, server_id: u32) -> Option<u32> {
        self.by_server_id.get(&server_id).copied()
    }

    pub fn local_ids_of(&self, client: ClientId) -> Vec<u32> {
        self.by_client
            .get(&client)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every proxy set currently owned by the registry, regardless of
    /// client or lifecycle stage — used for sweeps that must reach
    /// sets not yet bound to a server_id (e.g. disconnect handling).
    pub fn all_local_ids(&self) -> Vec<u32> {
        self.proxies.keys().copied().collect()
    }

    /// Removes `local_id` from all four indexes and frees its proxy,
    /// including any still-queued operations (spec.md §3 lifecycle:
    /// "Destruction deletes the set from all four indexes... and
    /// frees queued operations"; §5: "Destroying a resource set while
    /// operations are queued frees the queue entries without invoking
    /// their callbacks").
    pub fn destroy_set(&mut self, client: ClientId, local_id: u32) -> Result<ProxyResourceSet> {
        let proxy = self
            .proxies
            .remove(&local_id)
            .ok_or_else(|| Error::NotFound(format!("resource set {local_id}")))?;

        if let Some(set) = self.by_client.get_mut(&client) {
            set.remove(&local_id);
        }
        self.owner_of.remove(&local_id);
        self.by_seqno.retain(|_, v| *v != local_id);
        if proxy.server_id != 0 {
            self.by_server_id.remove(&proxy.server_id);
        }
        Ok(proxy)
    }

    /// As [`ClientRegistry::destroy_set`], but resolves the owning
    /// client itself via `owner_of` — used where only a `local_id` is
    /// in hand (e.g. draining a queued `Destroy` op once a late
    /// `CREATE_RESP` arrives).
    pub fn destroy_set_by_local_id(&mut self, local_id: u32) -> Result<ProxyResourceSet> {
        let client = self
            .owner_of(local_id)
            .ok_or_else(|| Error::NotFound(format!("resource set {local_id}")))?;
        self.destroy_set(client, local_id)
    }

    /// Walks every resource set `client` owns, removing each from the
    /// three non-owning indexes and freeing its proxy (spec.md §4.F
    /// "`destroy_client` walks all resource sets the client owns,
    /// removes each from the three proxy indexes... and frees each
    /// proxy"). Server-side destroy messages are the caller's
    /// responsibility (it has the transport); this returns the
    /// `(local_id, server_id)` pairs that were initialized enough to
    /// need one.
    pub fn destroy_client(&mut self, client: ClientId) -> Vec<(u32, u32)> {
        let local_ids = self.by_client.remove(&client).unwrap_or_default();
        self.refcount = self.refcount.saturating_sub(1);

        let mut needs_server_destroy = Vec::new();
        for local_id in local_ids {
            if let Some(proxy) = self.proxies.remove(&local_id) {
                self.owner_of.remove(&local_id);
                self.by_seqno.retain(|_, v| *v != local_id);
                if proxy.server_id != 0 {
                    self.by_server_id.remove(&proxy.server_id);
                    if proxy.initialized && !proxy.dead {
                        needs_server_destroy.push((local_id, proxy.server_id));
                    }
                }
            }
        }
        needs_server_destroy
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::proxy::{ProxyResourceSet, ResourceFlags, ResourceRequest, ResourceSet, SetState};

    fn sample_rs(local_id: u32) -> ResourceSet {
        ResourceSet {
            local_id,
            state: SetState::NoRequest,
            auto_release: false,
            dont_wait: false,
            priority: 0,
            class: "player".into(),
            zone: "home".into(),
            resources: vec![ResourceRequest {
                resource_name: "speaker".into(),
                flags: ResourceFlags::MANDATORY,
                attrs: Vec::new(),
            }],
            granted: Vec::new(),
            grant_mask: 0,
            advice_mask: 0,
        }
    }

    #[test]
    fn test_insert_assigns_monotonic_local_ids() {
        let mut reg = ClientRegistry::new();
        let client = ClientId(1);
        reg.register_client(client);
        let a = reg.insert(client, ProxyResourceSet::new(sample_rs(0)));
        let b = reg.insert(client, ProxyResourceSet::new(sample_rs(0)));
        assert!(b > a);
        assert_eq!(reg.local_ids_of(client).len(), 2);
    }

    #[test]
    fn test_destroy_set_clears_all_indexes() {
        let mut reg = ClientRegistry::new();
        let client = ClientId(1);
        reg.register_client(client);
        let local_id = reg.insert(client, ProxyResourceSet::new(sample_rs(0)));
        reg.bind_seqno(5, local_id);
        reg.bind_server_id(42, local_id);

        reg.destroy_set(client, local_id).unwrap();

        assert!(reg.get(local_id).is_none());
        assert!(reg.local_ids_of(client).is_empty());
        assert!(reg.take_seqno(5).is_none());
        assert!(reg.by_server_id(42).is_none());
    }

    #[test]
    fn test_destroy_client_sweeps_all_its_sets() {
        let mut reg = ClientRegistry::new();
        let client = ClientId(7);
        reg.register_client(client);
        let mut proxy = ProxyResourceSet::new(sample_rs(0));
        proxy.server_id = 99;
        proxy.initialized = true;
        let local_id = reg.insert(client, proxy);
        reg.bind_server_id(99, local_id);

        let to_destroy = reg.destroy_client(client);
        assert_eq!(to_destroy, vec![(local_id, 99)]);
        assert!(reg.get(local_id).is_none());
        assert!(reg.by_server_id(99).is_none());
    }

    #[test]
    fn test_destroy_set_unknown_id_errors() {
        let mut reg = ClientRegistry::new();
        let err = reg.destroy_set(ClientId(1), 404).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
