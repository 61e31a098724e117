//! End-to-end scenarios driving a [`ResourceProxyClient`] against a
//! hand-crafted peer over [`InMemoryTransport`], exercising the wire
//! decode paths in `client.rs` that the crate's unit tests (which stay
//! at the decoded-struct level) don't reach.

use resource_proxy::{
    AttrValue, Attribute, ClientEvent, ClientId, Config, InMemoryTransport, ProxyEvent,
    RequestType, ResourceFlags, ResourceProxyClient, ResourceRequest, ResourceSet, SetState,
    Transport,
};
use wire_codec::{Cursor, MessageBuilder, Tag};

fn sample_rs() -> ResourceSet {
    ResourceSet {
        local_id: 0,
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

fn peek(bytes: &bytes::Bytes) -> (u32, u16) {
    let mut cursor = Cursor::new(bytes.clone());
    let seqno = cursor.fetch_u32(Tag::SequenceNo).unwrap();
    let code = cursor.fetch_u16(Tag::RequestType).unwrap();
    (seqno, code)
}

#[tokio::test]
async fn test_initial_handshake_fires_ready() {
    let (client_side, mut peer) = InMemoryTransport::pair();
    let config = Config::new("memory://test", "home");
    let (mut client, mut events) = ResourceProxyClient::new(client_side, config);

    client.start_handshake().await.unwrap();

    let (classes_seqno, classes_code) = peek(&peer.recv().await.unwrap().unwrap());
    assert_eq!(classes_code, RequestType::QueryClasses.code());
    let (resources_seqno, resources_code) = peek(&peer.recv().await.unwrap().unwrap());
    assert_eq!(resources_code, RequestType::QueryResources.code());

    peer.send(
        MessageBuilder::new()
            .u32(Tag::SequenceNo, resources_seqno)
            .u16(Tag::RequestType, RequestType::QueryResources.code())
            .string(Tag::ResourceName, "speaker")
            .end(),
    )
    .await
    .unwrap();
    peer.send(
        MessageBuilder::new()
            .u32(Tag::SequenceNo, classes_seqno)
            .u16(Tag::RequestType, RequestType::QueryClasses.code())
            .s16(Tag::RequestStatus, 0)
            .array_of_string(Tag::ClassName, ["player"])
            .end(),
    )
    .await
    .unwrap();

    assert!(client.run_once().await.unwrap());
    assert!(client.run_once().await.unwrap());

    assert_eq!(events.recv().await.unwrap(), ClientEvent::Ready);
    assert!(client.model().is_initialized());
    assert_eq!(client.model().class_names(), vec!["player"]);
    assert_eq!(client.model().resource_names(), vec!["speaker"]);
}

#[tokio::test]
async fn test_create_then_acquire_grants_resource() {
    let (client_side, mut peer) = InMemoryTransport::pair();
    let config = Config::new("memory://test", "home");
    let (mut client, mut events) = ResourceProxyClient::new(client_side, config);

    let local_id = client
        .create_resource_set(ClientId(1), sample_rs(), 7)
        .await
        .unwrap();

    let (create_seqno, create_code) = peek(&peer.recv().await.unwrap().unwrap());
    assert_eq!(create_code, RequestType::CreateResourceSet.code());
    peer.send(
        MessageBuilder::new()
            .u32(Tag::SequenceNo, create_seqno)
            .u16(Tag::RequestType, RequestType::CreateResourceSet.code())
            .s16(Tag::RequestStatus, 0)
            .u32(Tag::ResourceSetId, 101)
            .end(),
    )
    .await
    .unwrap();
    assert!(client.run_once().await.unwrap());

    client.acquire(local_id, 8).await.unwrap();
    let (acquire_seqno, acquire_code) = peek(&peer.recv().await.unwrap().unwrap());
    assert_eq!(acquire_code, RequestType::AcquireResourceSet.code());
    peer.send(
        MessageBuilder::new()
            .u32(Tag::SequenceNo, acquire_seqno)
            .u16(Tag::RequestType, RequestType::ResourcesEvent.code())
            .u32(Tag::ResourceSetId, 101)
            .u16(Tag::ResourceState, 1)
            .u32(Tag::ResourceGrant, 0b1)
            .u32(Tag::ResourceAdvice, 0)
            .u32(Tag::ResourceId, 1)
            .string(Tag::ResourceName, "speaker")
            .end(),
    )
    .await
    .unwrap();
    assert!(client.run_once().await.unwrap());

    match events.recv().await.unwrap() {
        ClientEvent::ResourceSet { local_id: id, event } => {
            assert_eq!(id, local_id);
            assert_eq!(
                event,
                ProxyEvent::Granted {
                    request_id: 8,
                    grant_mask: 0b1,
                    advice_mask: 0,
                }
            );
        }
        other => panic!("expected a Granted resource set event, got {other:?}"),
    }
}

#[tokio::test]
async fn test_wildcard_binding_heals_event_ahead_of_create_resp() {
    let (client_side, mut peer) = InMemoryTransport::pair();
    let config = Config::new("memory://test", "home");
    let (mut client, mut events) = ResourceProxyClient::new(client_side, config);

    let local_id = client
        .create_resource_set(ClientId(1), sample_rs(), 1)
        .await
        .unwrap();
    let (create_seqno, _) = peek(&peer.recv().await.unwrap().unwrap());

    // The event beats the create-response to the client.
    peer.send(
        MessageBuilder::new()
            .u32(Tag::SequenceNo, create_seqno)
            .u16(Tag::RequestType, RequestType::ResourcesEvent.code())
            .u32(Tag::ResourceSetId, 202)
            .u16(Tag::ResourceState, 1)
            .u32(Tag::ResourceGrant, 0b1)
            .u32(Tag::ResourceAdvice, 0)
            .u32(Tag::ResourceId, 1)
            .string(Tag::ResourceName, "speaker")
            .end(),
    )
    .await
    .unwrap();
    assert!(client.run_once().await.unwrap());
    assert_eq!(
        events.recv().await.unwrap(),
        ClientEvent::ResourceSet {
            local_id,
            event: ProxyEvent::Granted {
                request_id: 1,
                grant_mask: 0b1,
                advice_mask: 0,
            },
        }
    );

    peer.send(
        MessageBuilder::new()
            .u32(Tag::SequenceNo, create_seqno)
            .u16(Tag::RequestType, RequestType::CreateResourceSet.code())
            .s16(Tag::RequestStatus, 0)
            .u32(Tag::ResourceSetId, 202)
            .end(),
    )
    .await
    .unwrap();
    assert!(client.run_once().await.unwrap());
    assert_eq!(client.registry().by_server_id(202), Some(local_id));
}

#[tokio::test]
async fn test_event_attributes_apply_to_granted_resource_and_skip_writeback() {
    let (client_side, mut peer) = InMemoryTransport::pair();
    let config = Config::new("memory://test", "home");
    let (mut client, mut events) = ResourceProxyClient::new(client_side, config);

    client.start_handshake().await.unwrap();
    let (classes_seqno, _) = peek(&peer.recv().await.unwrap().unwrap());
    let (resources_seqno, _) = peek(&peer.recv().await.unwrap().unwrap());

    peer.send(
        MessageBuilder::new()
            .u32(Tag::SequenceNo, resources_seqno)
            .u16(Tag::RequestType, RequestType::QueryResources.code())
            .string(Tag::ResourceName, "speaker")
            .string(Tag::AttributeName, "volume")
            .s32(Tag::AttributeValue, 50)
            .end(),
    )
    .await
    .unwrap();
    peer.send(
        MessageBuilder::new()
            .u32(Tag::SequenceNo, classes_seqno)
            .u16(Tag::RequestType, RequestType::QueryClasses.code())
            .s16(Tag::RequestStatus, 0)
            .array_of_string(Tag::ClassName, ["player"])
            .end(),
    )
    .await
    .unwrap();
    assert!(client.run_once().await.unwrap());
    assert!(client.run_once().await.unwrap());
    assert_eq!(events.recv().await.unwrap(), ClientEvent::Ready);

    let local_id = client
        .create_resource_set(ClientId(1), sample_rs(), 7)
        .await
        .unwrap();
    let (create_seqno, _) = peek(&peer.recv().await.unwrap().unwrap());
    peer.send(
        MessageBuilder::new()
            .u32(Tag::SequenceNo, create_seqno)
            .u16(Tag::RequestType, RequestType::CreateResourceSet.code())
            .s16(Tag::RequestStatus, 0)
            .u32(Tag::ResourceSetId, 303)
            .end(),
    )
    .await
    .unwrap();
    assert!(client.run_once().await.unwrap());

    client.acquire(local_id, 9).await.unwrap();
    let (acquire_seqno, _) = peek(&peer.recv().await.unwrap().unwrap());
    peer.send(
        MessageBuilder::new()
            .u32(Tag::SequenceNo, acquire_seqno)
            .u16(Tag::RequestType, RequestType::ResourcesEvent.code())
            .u32(Tag::ResourceSetId, 303)
            .u16(Tag::ResourceState, 1)
            .u32(Tag::ResourceGrant, 0b1)
            .u32(Tag::ResourceAdvice, 0)
            .u32(Tag::ResourceId, 1)
            .string(Tag::ResourceName, "speaker")
            .string(Tag::AttributeName, "Volume") // case-insensitive match against the def's "volume"
            .s32(Tag::AttributeValue, 77)
            .end(),
    )
    .await
    .unwrap();
    assert!(client.run_once().await.unwrap());
    match events.recv().await.unwrap() {
        ClientEvent::ResourceSet { event, .. } => {
            assert_eq!(
                event,
                ProxyEvent::Granted {
                    request_id: 9,
                    grant_mask: 0b1,
                    advice_mask: 0,
                }
            );
        }
        other => panic!("expected a Granted resource set event, got {other:?}"),
    }

    let proxy = client.registry().get(local_id).expect("proxy set still registered");
    assert_eq!(proxy.rs.granted.len(), 1);
    let speaker = &proxy.rs.granted[0];
    assert_eq!(speaker.resource_name, "speaker");
    assert!(!speaker.needs_writeback, "event-sourced attrs must not be re-sent to the server");
    assert_eq!(
        speaker.attrs,
        vec![Attribute {
            name: "volume".into(),
            value: AttrValue::Int(77),
        }]
    );
}

#[tokio::test]
async fn test_disconnect_mid_flight_emits_disconnected() {
    let (client_side, peer) = InMemoryTransport::pair();
    let config = Config::new("memory://test", "home");
    let (mut client, mut events) = ResourceProxyClient::new(client_side, config);

    client
        .create_resource_set(ClientId(1), sample_rs(), 1)
        .await
        .unwrap();
    drop(peer);

    assert!(!client.run_once().await.unwrap());
    assert_eq!(events.recv().await.unwrap(), ClientEvent::Disconnected);
}
