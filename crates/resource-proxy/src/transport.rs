//! The transport collaborator (spec.md §1: "Murphy's surrounding
//! transport... facilities are out of scope; the core consumes these
//! as generic... collaborators"). [`Transport`] is the seam; this
//! crate ships exactly one concrete implementation,
//! [`InMemoryTransport`], for tests and `murphyctl`'s demo mode —
//! grounded on the teacher's small dial/`Router` abstraction
//! (`examples/estuary-flow/crates/gazette/src/router.rs`), generalized
//! here to a trait since the wire format is this spec's own TLV codec
//! rather than gRPC.

use bytes::Bytes;
use tokio::sync::mpsc;

/// A length-prefixed byte-stream connection to the policy server.
/// `send`/`recv` are the only suspension points in the core's
/// scheduling model (spec.md §5).
#[async_trait::async_trait(?Send)]
pub trait Transport {
    async fn send(&mut self, bytes: Bytes) -> std::io::Result<()>;

    /// Returns `Ok(None)` on clean transport closure (spec.md §5:
    /// "transport closure delivers `closed_evt`").
    async fn recv(&mut self) -> std::io::Result<Option<Bytes>>;
}

/// An in-process duplex channel pair standing in for a real socket.
/// `InMemoryTransport::pair()` returns the client half and the
/// server-side test double's half.
pub struct InMemoryTransport {
    tx: mpsc::UnboundedSender<Bytes>,
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl InMemoryTransport {
    /// Builds a connected pair: `(client_side, peer_side)`.
    pub fn pair() -> (InMemoryTransport, InMemoryTransport) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            InMemoryTransport { tx: a_tx, rx: b_rx },
            InMemoryTransport { tx: b_tx, rx: a_rx },
        )
    }

    /// Simulates the peer hanging up: subsequent `recv` calls on this
    /// half return `Ok(None)`.
    pub fn close(self) {
        drop(self);
    }
}

#[async_trait::async_trait(?Send)]
impl Transport for InMemoryTransport {
    async fn send(&mut self, bytes: Bytes) -> std::io::Result<()> {
        self.tx
            .send(bytes)
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "peer dropped"))
    }

    async fn recv(&mut self) -> std::io::Result<Option<Bytes>> {
        Ok(self.rx.recv().await)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_pair_roundtrips_bytes() {
        let (mut client, mut peer) = InMemoryTransport::pair();
        client.send(Bytes::from_static(b"hello")).await.unwrap();
        let got = peer.recv().await.unwrap().unwrap();
        assert_eq!(&got[..], b"hello");
    }

    #[tokio::test]
    async fn test_dropping_peer_yields_none() {
        let (mut client, peer) = InMemoryTransport::pair();
        drop(peer);
        assert!(client.recv().await.unwrap().is_none());
    }
}
