//! The Resource Set Proxy state machine (component E, spec.md §4.E):
//! the client-side stand-in for a server-owned resource set, its
//! operation queue, and server-ID tracking.
//!
//! `ProxyResourceSet` is deliberately transport-agnostic: its methods
//! take the already-decoded shape of an incoming reply/event and
//! return the next [`OutboundRequest`] to send (if any) plus whatever
//! [`ProxyEvent`]s must reach the client's callback. `registry.rs`
//! owns the seqno→proxy and server-id→proxy indexes that route wire
//! messages to the right `ProxyResourceSet`; `client.rs` drives the
//! transport and turns `OutboundRequest` into bytes via `protocol.rs`.

use std::collections::VecDeque;

use crate::model::Attribute;

/// A caller-supplied correlation id, delivered back to the event
/// callback unchanged (spec.md §4.E: "The `request.id` delivered to
/// the client callback is the one supplied at *enqueue* time, not at
/// send time").
pub type RequestId = u64;

/// `{SHARED, MANDATORY}` (spec.md §6 `RESOURCE_FLAGS`).
bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ResourceFlags: u32 {
        const SHARED = 0b01;
        const MANDATORY = 0b10;
    }
}

/// A resource requested as part of a set, before the server has
/// granted it (spec.md §3 "Resource"). Referenced by name on the
/// wire (spec.md §6 create request shape: `RESOURCE_NAME,
/// RESOURCE_FLAGS`); the numeric `ResourceDef.id` only appears later,
/// in event sections once the server reports back which resource was
/// granted.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRequest {
    pub resource_name: String,
    pub flags: ResourceFlags,
    pub attrs: Vec<Attribute>,
}

/// `{AUTO_RELEASE, DONT_WAIT}`, the resource-*set*-level flags sent
/// once per create request (spec.md §6 "RESOURCE_FLAGS (rset)"),
/// distinct from the per-resource [`ResourceFlags`] sent inside each
/// resource section.
bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RsetFlags: u32 {
        const AUTO_RELEASE = 0b01;
        const DONT_WAIT = 0b10;
    }
}

/// `rs.state` (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetState {
    NoRequest,
    Acquire,
    Release,
}

/// Queued operation awaiting dispatch once the in-flight request
/// completes (spec.md §4.E "Ordering guarantee").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Create(RequestId),
    Acquire(RequestId),
    Release(RequestId),
    Destroy(RequestId),
}

impl Op {
    pub fn request_id(self) -> RequestId {
        match self {
            Op::Create(id) | Op::Acquire(id) | Op::Release(id) | Op::Destroy(id) => id,
        }
    }
}

/// A resource actually granted to a set by the server (spec.md §3
/// "Resource"), distinct from the request-side [`ResourceRequest`]
/// used to build the `CREATE` message. Holds no `&ResourceDef` back-
/// reference — its attributes are already fully resolved (schema
/// defaults overridden by writable, server-reported values) by the
/// caller via `ResourceModel::resolve_attrs` before reaching here.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub resource_name: String,
    pub rset_id: u32,
    pub shared: bool,
    pub attrs: Vec<Attribute>,
    /// `false` once this resource's attributes were last set from a
    /// server event (spec.md §4.E "Attribute writeback policy": values
    /// learned this way must never be sent back to the server as if
    /// the client had written them). Every path that currently
    /// populates a `Resource` is event-sourced, so this is always
    /// `false` today; it exists so a future client-initiated attribute
    /// write has somewhere to record that it *does* need to be sent.
    pub needs_writeback: bool,
}

/// One resource's attributes as resolved by the caller (`client.rs`,
/// via `ResourceModel::resolve_attrs`) from an incoming event, ready
/// to be stored. `on_event` has no access to `ResourceModel` and
/// trusts this shape as already-decoded state, per this module's
/// transport-agnostic contract.
#[derive(Debug, Clone, PartialEq)]
pub struct GrantedResourceUpdate {
    pub resource_name: String,
    pub attrs: Vec<Attribute>,
}

/// The client-visible resource set (spec.md §3 "Resource Set"). The
/// event callback itself lives outside this type; callers observe
/// state transitions through [`ProxyEvent`]s returned from
/// `ProxyResourceSet`'s methods.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSet {
    pub local_id: u32,
    pub state: SetState,
    pub auto_release: bool,
    pub dont_wait: bool,
    pub priority: u32,
    pub class: String,
    pub zone: String,
    pub resources: Vec<ResourceRequest>,
    /// Resources actually granted so far, keyed by name (spec.md §3
    /// "Resource"); populated and updated by `ProxyResourceSet::on_event`.
    pub granted: Vec<Resource>,
    pub grant_mask: u32,
    pub advice_mask: u32,
}

/// What must be sent on the wire next; `protocol.rs` turns this into
/// bytes, `seqno` is assigned by the proxy set itself (spec.md §3
/// "last_seqno").
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundRequest {
    Create {
        seqno: u32,
        rset_flags: RsetFlags,
        class: String,
        zone: String,
        priority: u32,
        resources: Vec<ResourceRequest>,
    },
    Acquire {
        seqno: u32,
        server_id: u32,
    },
    Release {
        seqno: u32,
        server_id: u32,
    },
    Destroy {
        seqno: u32,
        server_id: u32,
    },
}

/// A notification destined for the owning client's event callback
/// (spec.md §4.E, §7 "user-visible failure").
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyEvent {
    Granted {
        request_id: RequestId,
        grant_mask: u32,
        advice_mask: u32,
    },
    Released {
        request_id: RequestId,
        grant_mask: u32,
        advice_mask: u32,
    },
    /// Every op queued behind a failed `create` surfaces one of these,
    /// carrying the original error code (SPEC_FULL.md §4.E Open
    /// Question resolution #1 — synthesize, never discard silently).
    Failed {
        request_id: RequestId,
        error_code: i16,
    },
    Disconnected,
}

/// The internal, server-facing half of a resource set (spec.md §3
/// "Proxy Resource Set").
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyResourceSet {
    pub rs: ResourceSet,
    pub server_id: u32,
    pub last_seqno: u32,
    pub in_progress: bool,
    pub initialized: bool,
    pub dead: bool,
    pub op_queue: VecDeque<Op>,
    /// Cleared by [`ProxyResourceSet::on_disconnected`]; while unset,
    /// requests are queued rather than sent (spec.md §8 scenario 5),
    /// since there is no transport to carry them until a reconnect
    /// policy (layered on top, out of scope here) restores it.
    connected: bool,
    next_seqno: u32,
    /// The `request_id` supplied at enqueue time for whichever
    /// operation is currently in flight (spec.md §4.E: "The
    /// `request.id` delivered to the client callback is the one
    /// supplied at *enqueue* time, not at send time"). Set by
    /// `request_acquire`/`request_release` (and `request_create`,
    /// though create's own id is never delivered back — only queued
    /// ops behind a *failed* create surface a callback) whenever they
    /// actually dispatch, so `on_event` doesn't need the caller to
    /// re-thread an id it has no reliable way to still be holding.
    current_request_id: RequestId,
}

impl ProxyResourceSet {
    pub fn new(rs: ResourceSet) -> Self {
        Self {
            rs,
            server_id: 0,
            last_seqno: 0,
            in_progress: false,
            initialized: false,
            dead: false,
            op_queue: VecDeque::new(),
            connected: true,
            next_seqno: 1,
            current_request_id: 0,
        }
    }

    fn assign_seqno(&mut self) -> u32 {
        let seqno = self.next_seqno;
        self.next_seqno += 1;
        self.last_seqno = seqno;
        seqno
    }

    /// `Fresh -> Creating` (spec.md §4.E). Sends immediately if no
    /// request is in flight, otherwise enqueues.
    pub fn request_create(&mut self, request_id: RequestId) -> Option<OutboundRequest> {
        if self.in_progress || self.initialized || !self.connected {
            self.op_queue.push_back(Op::Create(request_id));
            return None;
        }
        self.in_progress = true;
        self.current_request_id = request_id;
        let seqno = self.assign_seqno();
        let mut rset_flags = RsetFlags::empty();
        if self.rs.auto_release {
            rset_flags |= RsetFlags::AUTO_RELEASE;
        }
        if self.rs.dont_wait {
            rset_flags |= RsetFlags::DONT_WAIT;
        }
        Some(OutboundRequest::Create {
            seqno,
            rset_flags,
            class: self.rs.class.clone(),
            zone: self.rs.zone.clone(),
            priority: self.rs.priority,
            resources: self.rs.resources.clone(),
        })
    }

    /// `Idle -> Acquiring` (spec.md §4.E).
    pub fn request_acquire(&mut self, request_id: RequestId) -> Option<OutboundRequest> {
        if self.in_progress || !self.initialized || !self.connected {
            self.op_queue.push_back(Op::Acquire(request_id));
            return None;
        }
        self.in_progress = true;
        self.current_request_id = request_id;
        let seqno = self.assign_seqno();
        Some(OutboundRequest::Acquire {
            seqno,
            server_id: self.server_id,
        })
    }

    /// `Idle -> Releasing` (spec.md §4.E).
    pub fn request_release(&mut self, request_id: RequestId) -> Option<OutboundRequest> {
        if self.in_progress || !self.initialized || !self.connected {
            self.op_queue.push_back(Op::Release(request_id));
            return None;
        }
        self.in_progress = true;
        self.current_request_id = request_id;
        let seqno = self.assign_seqno();
        Some(OutboundRequest::Release {
            seqno,
            server_id: self.server_id,
        })
    }

    /// `any -> Terminal` (spec.md §4.E). If not yet initialized, the
    /// destroy is queued to be sent once creation completes; the
    /// caller (registry) still removes the set from its
    /// client-visible handles immediately, since the spec treats
    /// `destroy` as the one operation that is allowed to race ahead
    /// of server confirmation from the caller's perspective.
    pub fn request_destroy(&mut self, request_id: RequestId) -> Option<OutboundRequest> {
        self.dead = true;
        if !self.initialized {
            self.op_queue.push_back(Op::Destroy(request_id));
            return None;
        }
        if self.in_progress || !self.connected {
            self.op_queue.push_back(Op::Destroy(request_id));
            return None;
        }
        let seqno = self.assign_seqno();
        Some(OutboundRequest::Destroy {
            seqno,
            server_id: self.server_id,
        })
    }

    /// Pops and dispatches the next queued op, if any, now that the
    /// in-flight request has completed.
    fn drain_one(&mut self) -> Option<OutboundRequest> {
        debug_assert!(!self.in_progress);
        match self.op_queue.pop_front()? {
            Op::Create(id) => self.request_create(id),
            Op::Acquire(id) => self.request_acquire(id),
            Op::Release(id) => self.request_release(id),
            Op::Destroy(id) => self.request_destroy(id),
        }
    }

    /// `Creating` + `CREATE_RESP` (spec.md §4.E). On success, records
    /// `server_id`, marks the set initialized, and drains the queue.
    /// On failure, every queued op fails with a synthesized event
    /// (SPEC_FULL.md §4.E resolution #1) and the set is marked dead.
    pub fn on_create_response(
        &mut self,
        ok: bool,
        server_id: u32,
        error_code: i16,
    ) -> (Vec<ProxyEvent>, Option<OutboundRequest>) {
        self.in_progress = false;

        if !ok {
            self.dead = true;
            let events = self
                .op_queue
                .drain(..)
                .map(|op| ProxyEvent::Failed {
                    request_id: op.request_id(),
                    error_code,
                })
                .collect();
            tracing::warn!(error_code, "resource set creation failed, set is dead");
            return (events, None);
        }

        self.server_id = server_id;
        self.initialized = true;
        let next = self.drain_one();
        (Vec::new(), next)
    }

    /// `Acquiring`/`Releasing` + `EVENT` (spec.md §4.E). Trusts the
    /// arriving `resource_set_id` to self-heal a race where the event
    /// beats the create-response handler to the proxy
    /// (SPEC_FULL.md/spec.md §4.E "Wildcard binding"). The `request_id`
    /// delivered to the callback is whichever one was in flight when
    /// this event arrived, not anything the caller re-threads — see
    /// `current_request_id`. `resources` carries each granted
    /// resource's already-resolved attributes (spec.md §4.E "update
    /// masks, apply attrs, set rs.state"; grounded on
    /// `mrp_resource_set_write_attributes` in the original
    /// implementation) and is written into `rs.granted`, matching
    /// existing entries by name or inserting a new one.
    pub fn on_event(
        &mut self,
        resource_set_id: u32,
        state: SetState,
        grant_mask: u32,
        advice_mask: u32,
        resources: Vec<GrantedResourceUpdate>,
    ) -> (ProxyEvent, Option<OutboundRequest>) {
        if self.server_id == 0 {
            self.server_id = resource_set_id;
            self.initialized = true;
            tracing::debug!(resource_set_id, "wildcard-bound proxy set from event");
        }

        let request_id = self.current_request_id;
        self.rs.grant_mask = grant_mask;
        self.rs.advice_mask = advice_mask;
        self.rs.state = state;
        self.in_progress = false;

        for update in resources {
            let shared = self
                .rs
                .resources
                .iter()
                .find(|r| r.resource_name.eq_ignore_ascii_case(&update.resource_name))
                .map(|r| r.flags.contains(ResourceFlags::SHARED))
                .unwrap_or(false);

            match self
                .rs
                .granted
                .iter_mut()
                .find(|g| g.resource_name.eq_ignore_ascii_case(&update.resource_name))
            {
                Some(existing) => {
                    existing.attrs = update.attrs;
                    existing.needs_writeback = false;
                }
                None => self.rs.granted.push(Resource {
                    resource_name: update.resource_name,
                    rset_id: self.server_id,
                    shared,
                    attrs: update.attrs,
                    needs_writeback: false,
                }),
            }
        }

        let event = match state {
            SetState::Acquire => ProxyEvent::Granted {
                request_id,
                grant_mask,
                advice_mask,
            },
            SetState::Release | SetState::NoRequest => ProxyEvent::Released {
                request_id,
                grant_mask,
                advice_mask,
            },
        };

        let next = self.drain_one();
        (event, next)
    }

    /// Transport closure (spec.md §5): queued operations are left in
    /// place, to be re-attempted only by a reconnect policy layered
    /// on top (out of scope here).
    pub fn on_disconnected(&mut self) -> ProxyEvent {
        self.in_progress = false;
        self.connected = false;
        ProxyEvent::Disconnected
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn fresh_set(local_id: u32) -> ProxyResourceSet {
        ProxyResourceSet::new(ResourceSet {
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
        })
    }

    #[test]
    fn test_create_then_acquire_queues_until_response() {
        let mut set = fresh_set(1);
        let create = set.request_create(7).expect("first create sends immediately");
        assert!(matches!(create, OutboundRequest::Create { .. }));
        assert!(set.in_progress);

        // Acquiring while create is in flight must enqueue, not send.
        assert!(set.request_acquire(8).is_none());
        assert_eq!(set.op_queue.len(), 1);

        let (events, next) = set.on_create_response(true, 42, 0);
        assert!(events.is_empty());
        assert_eq!(set.server_id, 42);
        assert!(set.initialized);
        match next {
            Some(OutboundRequest::Acquire { server_id, .. }) => assert_eq!(server_id, 42),
            other => panic!("expected queued acquire to dispatch, got {other:?}"),
        }

        let (event, next) = set.on_event(42, SetState::Acquire, 0b1, 0, Vec::new());
        assert_eq!(
            event,
            ProxyEvent::Granted {
                request_id: 8,
                grant_mask: 0b1,
                advice_mask: 0,
            }
        );
        assert!(next.is_none());
    }

    #[test]
    fn test_on_event_applies_granted_resource_attrs() {
        let mut set = fresh_set(6);
        set.request_create(1).unwrap();
        set.on_create_response(true, 55, 0);
        set.request_acquire(2).unwrap();

        let (_, _) = set.on_event(
            55,
            SetState::Acquire,
            0b1,
            0,
            vec![GrantedResourceUpdate {
                resource_name: "speaker".into(),
                attrs: vec![Attribute {
                    name: "volume".into(),
                    value: crate::model::AttrValue::Int(77),
                }],
            }],
        );

        assert_eq!(set.rs.granted.len(), 1);
        let speaker = &set.rs.granted[0];
        assert_eq!(speaker.resource_name, "speaker");
        assert_eq!(speaker.rset_id, 55);
        assert!(!speaker.shared);
        assert!(!speaker.needs_writeback);
        assert_eq!(
            speaker.attrs,
            vec![Attribute {
                name: "volume".into(),
                value: crate::model::AttrValue::Int(77),
            }]
        );

        // A second event for the same resource updates in place rather
        // than appending a duplicate entry.
        let (_, _) = set.on_event(
            55,
            SetState::Acquire,
            0b1,
            0,
            vec![GrantedResourceUpdate {
                resource_name: "Speaker".into(),
                attrs: vec![Attribute {
                    name: "volume".into(),
                    value: crate::model::AttrValue::Int(12),
                }],
            }],
        );
        assert_eq!(set.rs.granted.len(), 1);
        assert_eq!(set.rs.granted[0].attrs[0].value, crate::model::AttrValue::Int(12));
    }

    #[test]
    fn test_create_failure_fails_every_queued_op() {
        let mut set = fresh_set(2);
        set.request_create(1).unwrap();
        assert!(set.request_acquire(2).is_none());
        assert!(set.request_release(3).is_none());

        let (events, next) = set.on_create_response(false, 0, -5);
        assert!(next.is_none());
        assert!(set.dead);
        assert_eq!(
            events,
            vec![
                ProxyEvent::Failed {
                    request_id: 2,
                    error_code: -5
                },
                ProxyEvent::Failed {
                    request_id: 3,
                    error_code: -5
                },
            ]
        );
    }

    #[test]
    fn test_wildcard_binding_heals_early_event() {
        let mut set = fresh_set(3);
        set.request_create(1).unwrap();
        // Event arrives before on_create_response runs.
        let (event, next) = set.on_event(99, SetState::Acquire, 0b1, 0, Vec::new());
        assert_eq!(set.server_id, 99);
        assert!(set.initialized);
        assert!(next.is_none());
        assert_eq!(
            event,
            ProxyEvent::Granted {
                request_id: 1,
                grant_mask: 0b1,
                advice_mask: 0,
            }
        );
    }

    #[test]
    fn test_destroy_before_initialized_is_queued() {
        let mut set = fresh_set(4);
        assert!(set.request_destroy(1).is_none());
        assert!(set.dead);
        assert_eq!(set.op_queue.len(), 1);
    }

    #[test]
    fn test_disconnect_leaves_queue_intact() {
        let mut set = fresh_set(5);
        set.request_create(1).unwrap();
        set.on_create_response(true, 1, 0);
        set.request_acquire(2).unwrap();
        assert!(set.in_progress);

        let event = set.on_disconnected();
        assert_eq!(event, ProxyEvent::Disconnected);
        assert!(!set.in_progress);

        assert!(set.request_release(3).is_none());
        assert_eq!(set.op_queue.len(), 1);
    }
}
