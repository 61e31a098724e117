//! The proxy's event-loop driver: the glue Design Notes §9 calls for —
//! "the process-wide symbol table, default mode, and client-registry
//! context must be refactored into an explicit `Context` handle" —
//! realized here as [`ResourceProxyClient`], which owns the
//! [`ClientRegistry`] (F), the [`ResourceModel`] (D), a [`Transport`]
//! (§6), and drives the single-threaded cooperative scheduling model
//! of spec.md §5 one `recv()` at a time.
//!
//! Grounded on the teacher's pattern of a driver type owning a
//! `Router`/transport plus a receiver-side dispatch loop (compare
//! `examples/estuary-flow/crates/gazette/src/router.rs`); this crate
//! has no gRPC service stubs to implement, so the loop here is a flat
//! `match` over decoded [`RequestType`]s rather than a generated
//! server trait.

use std::collections::VecDeque;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{ApplicationClass, ResourceDef, ResourceModel};
use crate::protocol::{self, RequestType};
use crate::proxy::{
    GrantedResourceUpdate, OutboundRequest, ProxyEvent, ProxyResourceSet, RequestId, ResourceSet,
};
use crate::registry::{ClientId, ClientRegistry};
use crate::transport::Transport;

/// Notifications delivered to the owning application (spec.md §4.E
/// event callback, generalized to a channel rather than a C function
/// pointer + `user_data`).
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Both `QUERY_CLASSES` and `QUERY_RESOURCES` replies have
    /// arrived (spec.md §5 "Initial handshake"; §8 scenario 6).
    Ready,
    /// Transport closed (spec.md §5 "Cancellation/timeouts"). Proxy
    /// sets are left with their queues intact.
    Disconnected,
    /// One proxy set's state machine produced an event (spec.md §4.E).
    ResourceSet { local_id: u32, event: ProxyEvent },
}

#[derive(Debug, Default)]
struct Handshake {
    classes_seqno: Option<u32>,
    resources_seqno: Option<u32>,
    classes: Option<Vec<ApplicationClass>>,
    resources: Option<Vec<ResourceDef>>,
    fired: bool,
}

impl Handshake {
    fn ready(&self) -> bool {
        self.classes.is_some() && self.resources.is_some()
    }
}

/// The Resource Set Proxy client (components D, E, F combined behind
/// one transport). One instance per connection to a policy server.
pub struct ResourceProxyClient<T: Transport> {
    transport: T,
    config: Config,
    registry: ClientRegistry,
    model: ResourceModel,
    next_seqno: u32,
    handshake: Handshake,
    /// FIFO of local_ids with a `CREATE` request in flight and no
    /// `server_id` yet, consulted when an event's `RESOURCE_SET_ID`
    /// doesn't resolve through `registry.by_server_id` — the "Wildcard
    /// binding" race of spec.md §4.E. Binding to the front of this
    /// queue assumes replies and events for concurrently-pending
    /// creates arrive in send order, which holds for any transport
    /// that preserves message ordering (see `DESIGN.md`).
    pending_creates: VecDeque<u32>,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl<T: Transport> ResourceProxyClient<T> {
    pub fn new(transport: T, config: Config) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                transport,
                config,
                registry: ClientRegistry::new(),
                model: ResourceModel::new(),
                next_seqno: 1,
                handshake: Handshake::default(),
                pending_creates: VecDeque::new(),
                events: tx,
            },
            rx,
        )
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn model(&self) -> &ResourceModel {
        &self.model
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    fn assign_seqno(&mut self) -> u32 {
        let seqno = self.next_seqno;
        self.next_seqno += 1;
        seqno
    }

    /// Sends `QUERY_CLASSES` and `QUERY_RESOURCES` (spec.md §5 "on
    /// connect, two query requests are sent with unique sequence
    /// numbers"). Replies may arrive in either order; `run`/`run_once`
    /// fires [`ClientEvent::Ready`] only once both have.
    pub async fn start_handshake(&mut self) -> Result<()> {
        let classes_seqno = self.assign_seqno();
        let resources_seqno = self.assign_seqno();
        self.handshake.classes_seqno = Some(classes_seqno);
        self.handshake.resources_seqno = Some(resources_seqno);
        self.transport
            .send(protocol::encode_query_classes(classes_seqno))
            .await?;
        self.transport
            .send(protocol::encode_query_resources(resources_seqno))
            .await?;
        Ok(())
    }

    /// Registers a new resource client with the registry; idempotent.
    pub fn register_client(&mut self, client: ClientId) {
        self.registry.register_client(client);
    }

    /// `create` (spec.md §4.E): allocates a `local_id`, and either
    /// sends `CREATE_RESOURCE_SET` immediately or leaves it queued if
    /// a create is already in flight on a *different* set (per-set
    /// FIFO is orthogonal across sets, spec.md §5).
    pub async fn create_resource_set(
        &mut self,
        client: ClientId,
        rs: ResourceSet,
        request_id: RequestId,
    ) -> Result<u32> {
        self.registry.register_client(client);
        let mut proxy = ProxyResourceSet::new(rs);
        let outbound = proxy.request_create(request_id);
        let local_id = self.registry.insert(client, proxy);
        if let Some(req) = outbound {
            self.dispatch(local_id, req).await?;
        }
        Ok(local_id)
    }

    pub async fn acquire(&mut self, local_id: u32, request_id: RequestId) -> Result<()> {
        let outbound = {
            let proxy = self.get_mut(local_id)?;
            proxy.request_acquire(request_id)
        };
        if let Some(req) = outbound {
            self.dispatch(local_id, req).await?;
        }
        Ok(())
    }

    pub async fn release(&mut self, local_id: u32, request_id: RequestId) -> Result<()> {
        let outbound = {
            let proxy = self.get_mut(local_id)?;
            proxy.request_release(request_id)
        };
        if let Some(req) = outbound {
            self.dispatch(local_id, req).await?;
        }
        Ok(())
    }

    /// `destroy` (spec.md §4.E). If the set is already initialized and
    /// idle, the `DESTROY_RESOURCE_SET` message is sent and the set is
    /// removed from the registry's four indexes right away — there is
    /// no server-side destroy acknowledgment in this protocol (spec.md
    /// §6 lists no reply shape for it) to wait on. Otherwise the
    /// destroy is queued internally by `ProxyResourceSet` and the
    /// removal happens later, when that queued op finally drains (see
    /// `handle_incoming`'s `CreateResourceSet` arm).
    pub async fn destroy_resource_set(&mut self, local_id: u32, request_id: RequestId) -> Result<()> {
        let outbound = {
            let proxy = self.get_mut(local_id)?;
            proxy.request_destroy(request_id)
        };
        if let Some(req) = outbound {
            self.dispatch(local_id, req).await?;
            self.registry.destroy_set_by_local_id(local_id)?;
        }
        Ok(())
    }

    /// Bulk teardown (spec.md §4.F `destroy_client`): removes every
    /// set the client owns from the registry's indexes and sends a
    /// best-effort `DESTROY_RESOURCE_SET` for each that had reached
    /// the server.
    pub async fn destroy_client(&mut self, client: ClientId) -> Result<()> {
        for (local_id, server_id) in self.registry.destroy_client(client) {
            let seqno = self.assign_seqno();
            let bytes = protocol::encode_request(&OutboundRequest::Destroy { seqno, server_id });
            if let Err(err) = self.transport.send(bytes).await {
                tracing::warn!(local_id, %err, "destroy-on-teardown send failed, proxy already freed locally");
            }
        }
        Ok(())
    }

    fn get_mut(&mut self, local_id: u32) -> Result<&mut ProxyResourceSet> {
        self.registry
            .get_mut(local_id)
            .ok_or_else(|| Error::NotFound(format!("resource set {local_id}")))
    }

    async fn dispatch(&mut self, local_id: u32, req: OutboundRequest) -> Result<()> {
        if let OutboundRequest::Create { seqno, .. } = &req {
            self.registry.bind_seqno(*seqno, local_id);
            self.pending_creates.push_back(local_id);
        }
        let bytes = protocol::encode_request(&req);
        self.transport.send(bytes).await.map_err(Error::from)
    }

    fn emit(&self, event: ClientEvent) {
        // The receiver may have been dropped by a caller uninterested
        // in further notifications; that is not this driver's error.
        let _ = self.events.send(event);
    }

    /// Pumps one incoming message (or transport closure) through the
    /// state machine. Returns `false` once the transport has closed —
    /// `run` stops calling this once that happens.
    pub async fn run_once(&mut self) -> Result<bool> {
        match self.transport.recv().await? {
            Some(bytes) => {
                self.handle_incoming(bytes).await;
                Ok(true)
            }
            None => {
                self.handle_disconnect();
                Ok(false)
            }
        }
    }

    /// Runs [`ResourceProxyClient::run_once`] until the transport
    /// closes.
    pub async fn run(&mut self) -> Result<()> {
        while self.run_once().await? {}
        Ok(())
    }

    fn handle_disconnect(&mut self) {
        for local_id in self.registry.all_local_ids() {
            if let Some(proxy) = self.registry.get_mut(local_id) {
                proxy.on_disconnected();
            }
        }
        self.emit(ClientEvent::Disconnected);
    }

    /// Decodes and handles exactly one complete message from the
    /// server. Protocol errors are logged and the message dropped
    /// (spec.md §7: "Protocol errors during event decoding are logged
    /// and ignored... the state machine does not advance").
    async fn handle_incoming(&mut self, bytes: Bytes) {
        if let Err(err) = self.try_handle_incoming(bytes).await {
            tracing::warn!(%err, "dropping malformed or out-of-schema server message");
        }
    }

    async fn try_handle_incoming(&mut self, bytes: Bytes) -> Result<()> {
        match protocol::peek_request_type(&bytes)? {
            RequestType::QueryClasses => self.handle_query_classes_reply(bytes),
            RequestType::QueryResources => self.handle_query_resources_reply(bytes),
            RequestType::CreateResourceSet => self.handle_create_reply(bytes).await,
            RequestType::ResourcesEvent => self.handle_event(bytes).await,
            other => Err(Error::Protocol(format!(
                "unexpected top-level message type {other:?}"
            ))),
        }
    }

    fn handle_query_classes_reply(&mut self, bytes: Bytes) -> Result<()> {
        let reply = protocol::decode_query_classes_reply(bytes)?;
        if !reply.ok {
            return Err(Error::Protocol(format!(
                "QUERY_CLASSES failed with status {}",
                reply.error_code
            )));
        }
        self.handshake.classes = Some(reply.classes);
        self.maybe_fire_ready();
        Ok(())
    }

    fn handle_query_resources_reply(&mut self, bytes: Bytes) -> Result<()> {
        let reply = protocol::decode_query_resources_reply(bytes)?;
        self.handshake.resources = Some(reply.resources);
        self.maybe_fire_ready();
        Ok(())
    }

    fn maybe_fire_ready(&mut self) {
        if self.handshake.fired || !self.handshake.ready() {
            return;
        }
        let classes = self.handshake.classes.clone().unwrap_or_default();
        let resources = self.handshake.resources.clone().unwrap_or_default();
        if self
            .model
            .apply_query_reply(classes, vec![self.config.zone.clone()], resources)
            .is_ok()
        {
            self.handshake.fired = true;
            self.emit(ClientEvent::Ready);
        }
    }

    async fn handle_create_reply(&mut self, bytes: Bytes) -> Result<()> {
        let reply = protocol::decode_create_reply(bytes)?;
        let local_id = self
            .registry
            .take_seqno(reply.seqno)
            .ok_or_else(|| Error::Protocol(format!("CREATE_RESP for unknown seqno {}", reply.seqno)))?;
        if let Some(front) = self.pending_creates.front() {
            if *front == local_id {
                self.pending_creates.pop_front();
            } else {
                self.pending_creates.retain(|id| *id != local_id);
            }
        }

        let proxy = self.get_mut(local_id)?;
        let (proxy_events, next) = proxy.on_create_response(reply.ok, reply.resource_set_id, reply.error_code);
        if reply.ok {
            self.registry.bind_server_id(reply.resource_set_id, local_id);
        }
        for event in proxy_events {
            self.emit(ClientEvent::ResourceSet { local_id, event });
        }

        if let Some(req) = next {
            let is_destroy = matches!(req, OutboundRequest::Destroy { .. });
            // Best-effort: a send failure here surfaces as a future
            // `Disconnected` once the transport actually reports
            // closure via `recv`.
            let _ = self.dispatch(local_id, req).await;
            if is_destroy {
                self.registry.destroy_set_by_local_id(local_id).ok();
            }
        }
        Ok(())
    }

    async fn handle_event(&mut self, bytes: Bytes) -> Result<()> {
        let event = protocol::decode_event(bytes)?;
        let local_id = match self.registry.by_server_id(event.resource_set_id) {
            Some(id) => id,
            None => self
                .pending_creates
                .pop_front()
                .ok_or_else(|| Error::Protocol(format!(
                    "RESOURCES_EVENT for unknown resource_set_id {}",
                    event.resource_set_id
                )))?,
        };
        self.registry.bind_server_id(event.resource_set_id, local_id);

        let resources = self.resolve_event_resources(&event.resources);

        let proxy = self.get_mut(local_id)?;
        let (proxy_event, next) = proxy.on_event(
            event.resource_set_id,
            event.state,
            event.grant_mask,
            event.advice_mask,
            resources,
        );
        self.emit(ClientEvent::ResourceSet {
            local_id,
            event: proxy_event,
        });

        if let Some(req) = next {
            let _ = self.dispatch(local_id, req).await;
        }
        Ok(())
    }

    /// Resolves each event resource's attributes against the resource
    /// model (spec.md §4.D, §4.E "apply attrs"): a resource the model
    /// doesn't recognize passes its reported attributes through
    /// unchecked, since there is no schema to validate against;
    /// otherwise the full attribute set is resolved through
    /// `ResourceModel::resolve_attrs`, which applies only
    /// write-accessible, case-insensitively-matched values on top of
    /// the schema defaults.
    fn resolve_event_resources(
        &self,
        resources: &[protocol::EventResource],
    ) -> Vec<GrantedResourceUpdate> {
        resources
            .iter()
            .map(|r| {
                let attrs = match self.model.resolve_attrs(&r.name, &r.attrs) {
                    Ok(resolved) => resolved,
                    Err(err) => {
                        tracing::debug!(
                            resource = r.name.as_str(),
                            %err,
                            "resource not in model, applying event attributes unchecked"
                        );
                        r.attrs.clone()
                    }
                };
                GrantedResourceUpdate {
                    resource_name: r.name.clone(),
                    attrs,
                }
            })
            .collect()
    }
}
