//! Client-side mediator between local resource clients and a remote
//! policy server (spec.md §1): the state machine, wire protocol, and
//! client registry that together make up "the resource proxy."
//!
//! `model` holds the read-only application/zone/resource model learned
//! from the server's handshake replies (component D); `proxy` is the
//! per-set state machine (component E); `registry` is the owning,
//! multiply-indexed store of every live set (component F); `protocol`
//! encodes/decodes the six wire shapes on top of `wire_codec`;
//! `transport` is the seam a concrete connection plugs into; `client`
//! drives all of the above from one `Transport`.

mod client;
mod config;
mod error;
mod model;
mod protocol;
mod proxy;
mod registry;
mod transport;

pub use client::{ClientEvent, ResourceProxyClient};
pub use config::Config;
pub use error::{Error, Result};
pub use model::{
    Access, ApplicationClass, AttrDef, AttrDescriptor, AttrType, AttrValue, Attribute,
    ResourceDef, ResourceModel,
};
pub use protocol::RequestType;
pub use proxy::{
    GrantedResourceUpdate, Op, OutboundRequest, ProxyEvent, ProxyResourceSet, RequestId, Resource,
    ResourceFlags, ResourceRequest, ResourceSet, RsetFlags, SetState,
};
pub use registry::{ClientId, ClientRegistry};
pub use transport::{InMemoryTransport, Transport};
