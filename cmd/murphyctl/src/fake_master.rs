//! A minimal in-process stand-in for the policy server, answering just
//! enough of the six wire shapes (spec.md §6) to let `murphyctl demo`
//! drive a [`resource_proxy::ResourceProxyClient`] end to end without a
//! real master to connect to. Not a conformance fixture — it always
//! grants, never queues, and exists purely so the CLI has something to
//! talk to over `InMemoryTransport`.

use resource_proxy::{InMemoryTransport, Transport};
use wire_codec::{Cursor, MessageBuilder, Tag};

pub async fn run(mut transport: InMemoryTransport) {
    loop {
        let bytes = match transport.recv().await {
            Ok(Some(bytes)) => bytes,
            Ok(None) | Err(_) => return,
        };
        let mut cursor = Cursor::new(bytes.clone());
        let seqno = match cursor.fetch_u32(Tag::SequenceNo) {
            Ok(v) => v,
            Err(_) => continue,
        };
        let code = match cursor.fetch_u16(Tag::RequestType) {
            Ok(v) => v,
            Err(_) => continue,
        };

        let reply = match code {
            1 => Some(
                MessageBuilder::new()
                    .u32(Tag::SequenceNo, seqno)
                    .u16(Tag::RequestType, code)
                    .s16(Tag::RequestStatus, 0)
                    .array_of_string(Tag::ClassName, ["player"])
                    .end(),
            ),
            2 => Some(
                MessageBuilder::new()
                    .u32(Tag::SequenceNo, seqno)
                    .u16(Tag::RequestType, code)
                    .string(Tag::ResourceName, "speaker")
                    .end(),
            ),
            3 => Some(
                MessageBuilder::new()
                    .u32(Tag::SequenceNo, seqno)
                    .u16(Tag::RequestType, code)
                    .s16(Tag::RequestStatus, 0)
                    .u32(Tag::ResourceSetId, 101)
                    .end(),
            ),
            5 => {
                let server_id = cursor.fetch_u32(Tag::ResourceSetId).unwrap_or(101);
                Some(
                    MessageBuilder::new()
                        .u32(Tag::SequenceNo, seqno)
                        .u16(Tag::RequestType, 7)
                        .u32(Tag::ResourceSetId, server_id)
                        .u16(Tag::ResourceState, 1)
                        .u32(Tag::ResourceGrant, 0b1)
                        .u32(Tag::ResourceAdvice, 0)
                        .u32(Tag::ResourceId, 1)
                        .string(Tag::ResourceName, "speaker")
                        .end(),
                )
            }
            6 => {
                let server_id = cursor.fetch_u32(Tag::ResourceSetId).unwrap_or(101);
                Some(
                    MessageBuilder::new()
                        .u32(Tag::SequenceNo, seqno)
                        .u16(Tag::RequestType, 7)
                        .u32(Tag::ResourceSetId, server_id)
                        .u16(Tag::ResourceState, 2)
                        .u32(Tag::ResourceGrant, 0)
                        .u32(Tag::ResourceAdvice, 0)
                        .u32(Tag::ResourceId, 1)
                        .string(Tag::ResourceName, "speaker")
                        .end(),
                )
            }
            // DESTROY_RESOURCE_SET has no reply shape on the wire.
            _ => None,
        };

        if let Some(bytes) = reply {
            if transport.send(bytes).await.is_err() {
                return;
            }
        }
    }
}
