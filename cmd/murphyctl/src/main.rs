//! Command-line driver for the resource proxy client. Has no real
//! transport to connect to — it wires a client up against an
//! in-process [`fake_master`] over `InMemoryTransport` and walks
//! through create/acquire/release/destroy, printing every event the
//! client emits. Useful for poking at the state machine by hand; not
//! a substitute for the crate's own test suite.

mod fake_master;

use clap::Parser;
use resource_proxy::{
    ClientEvent, ClientId, Config, InMemoryTransport, ResourceFlags, ResourceProxyClient,
    ResourceRequest, ResourceSet, SetState,
};
use tokio::sync::mpsc;

/// Drives a toy resource-set lifecycle against an in-memory fake
/// master, for manual smoke-testing of the proxy.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Transport URL of the policy server. Unused by `demo` today
    /// (there is no non-`InMemoryTransport` transport yet), but
    /// accepted so the CLI's surface matches a real deployment.
    #[arg(long, env = "MURPHY_MASTER_ADDR", default_value = "memory://demo")]
    master_addr: String,

    /// This client's declared zone.
    #[arg(long, env = "MURPHY_ZONE", default_value = "demo-zone")]
    zone: String,

    /// Application class to request the demo resource set under.
    #[arg(long, default_value = "player")]
    class: String,

    /// Resource name to request.
    #[arg(long, default_value = "speaker")]
    resource: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let local = tokio::task::LocalSet::new();
    local.run_until(run(args)).await;
}

async fn run(args: Args) {
    let config = Config::new(args.master_addr.clone(), args.zone.clone());
    let (client_side, server_side) = InMemoryTransport::pair();
    tokio::task::spawn_local(fake_master::run(server_side));

    let (mut client, mut events) = ResourceProxyClient::new(client_side, config);
    client.register_client(ClientId(1));

    if let Err(err) = client.start_handshake().await {
        tracing::error!(%err, "failed to send handshake requests");
        return;
    }
    while !client.model().is_initialized() {
        if pump(&mut client, &mut events).await.is_none() {
            tracing::error!("transport closed before handshake completed");
            return;
        }
    }
    tracing::info!(
        classes = ?client.model().class_names(),
        resources = ?client.model().resource_names(),
        "handshake complete"
    );

    let rs = ResourceSet {
        local_id: 0,
        state: SetState::NoRequest,
        auto_release: false,
        dont_wait: false,
        priority: 0,
        class: args.class,
        zone: args.zone,
        resources: vec![ResourceRequest {
            resource_name: args.resource,
            flags: ResourceFlags::MANDATORY,
            attrs: Vec::new(),
        }],
        granted: Vec::new(),
        grant_mask: 0,
        advice_mask: 0,
    };

    let local_id = match client.create_resource_set(ClientId(1), rs, 1).await {
        Ok(id) => id,
        Err(err) => {
            tracing::error!(%err, "create_resource_set failed");
            return;
        }
    };
    wait_for(&mut client, &mut events, local_id).await;

    if let Err(err) = client.acquire(local_id, 2).await {
        tracing::error!(%err, "acquire failed");
        return;
    }
    wait_for(&mut client, &mut events, local_id).await;

    if let Err(err) = client.release(local_id, 3).await {
        tracing::error!(%err, "release failed");
        return;
    }
    wait_for(&mut client, &mut events, local_id).await;

    if let Err(err) = client.destroy_resource_set(local_id, 4).await {
        tracing::error!(%err, "destroy_resource_set failed");
    }
}

/// Pumps the client one incoming message at a time until an event is
/// observed (returned) or the transport closes (`None`).
async fn pump(
    client: &mut ResourceProxyClient<InMemoryTransport>,
    events: &mut mpsc::UnboundedReceiver<ClientEvent>,
) -> Option<ClientEvent> {
    loop {
        if let Ok(event) = events.try_recv() {
            return Some(event);
        }
        match client.run_once().await {
            Ok(true) => continue,
            Ok(false) => return events.try_recv().ok(),
            Err(err) => {
                tracing::warn!(%err, "error processing incoming message, continuing");
                continue;
            }
        }
    }
}

/// Pumps until a [`ClientEvent::ResourceSet`] for `local_id` is seen,
/// logging it and any other event observed along the way.
async fn wait_for(
    client: &mut ResourceProxyClient<InMemoryTransport>,
    events: &mut mpsc::UnboundedReceiver<ClientEvent>,
    local_id: u32,
) {
    loop {
        match pump(client, events).await {
            Some(ClientEvent::ResourceSet { local_id: id, event }) if id == local_id => {
                tracing::info!(?event, local_id, "resource set event");
                return;
            }
            Some(other) => tracing::info!(?other, "event"),
            None => {
                tracing::warn!("transport closed while waiting for an event");
                return;
            }
        }
    }
}
