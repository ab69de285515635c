use crate::consensus::peer_directory::PeerId;
use crate::messaging::node_addr::NodeAddr;

/// Failures of [crate::consensus::hotstuff_transport::HotStuffTransport] operations. Nothing is
///  retried internally: retry policy belongs to the consensus engine.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid peer ID {0}")]
    InvalidPeerId(PeerId),

    #[error("failed to send message to {to:?}")]
    SendFailed {
        to: NodeAddr,
        #[source]
        source: anyhow::Error,
    },

    /// The caller's cancellation token fired. This is never wrapped into another variant.
    #[error("operation was cancelled")]
    Cancelled,

    #[error("inbound queue is closed")]
    InboundQueueClosed,

    #[error("received invalid HotStuff consensus message")]
    InvalidMessage(#[source] anyhow::Error),
}

impl TransportError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled)
    }
}
