pub mod udp;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub use udp::UdpTransport;

/// The raw datagram layer underneath [crate::messaging::messaging::MessagingImpl]. It knows
///  nothing about envelopes or protocols.
#[async_trait::async_trait]
pub trait Transport : Sync + Send {
    async fn send(&self, to: SocketAddr, buf: &[u8]) -> anyhow::Result<()>;

    /// runs until `cancel` fires or the socket fails
    async fn recv_loop(&self, handler: Arc<dyn MessageHandler>, cancel: CancellationToken) -> anyhow::Result<()>;
}


/// This trait decouples the implementation of message transport (different strategies) from the
///  handling of a message once it is received (always the same, part of the messaging core).
///
/// It is passed around as an `Arc<dyn ...>` to minimize dependencies of [Transport] implementations.
#[async_trait::async_trait]
pub trait MessageHandler : Sync + Send {
    async fn handle_message(&self, buf: &[u8], sender: SocketAddr);
}
