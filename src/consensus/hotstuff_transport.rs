use std::sync::Arc;

use anyhow::anyhow;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::consensus::hotstuff_messages::HotStuffMsg;
use crate::consensus::inbound_queue::{inbound_queue, InboundSender};
use crate::consensus::peer_directory::{Peer, PeerDirectory, PeerId};
use crate::consensus::transport_config::TransportConfig;
use crate::consensus::transport_error::TransportError;
use crate::messaging::envelope::Envelope;
use crate::messaging::message_module::{MessageModule, MessageModuleId};
use crate::messaging::messaging::MessageSender;

/// Moves HotStuff messages between the participants of one consensus instance.
///
/// Messages to the local participant never touch the network: they go straight into the inbound
///  queue. Everything else is encoded and handed to the network host. Messages from remote
///  participants arrive through [HotStuffTransport::message_module], which must be registered with
///  the network host.
pub struct HotStuffTransport {
    config: TransportConfig,
    sender: Arc<dyn MessageSender>,
    peers: PeerDirectory,
    inbound: InboundSender,
    recv: mpsc::Receiver<HotStuffMsg>,
}

impl HotStuffTransport {
    /// Fails if the configured inbound queue capacity is 0.
    pub fn new(config: TransportConfig, sender: Arc<dyn MessageSender>, peers: PeerDirectory) -> anyhow::Result<HotStuffTransport> {
        let (inbound, recv) = inbound_queue(config.recv_buffer_size)?;

        Ok(HotStuffTransport {
            config,
            sender,
            peers,
            inbound,
            recv,
        })
    }

    pub fn peers(&self) -> &PeerDirectory {
        &self.peers
    }

    /// `None` if the network host's address is not part of the peer directory
    pub fn local_id(&self) -> Option<PeerId> {
        self.peers.local_id(&self.sender.get_self_addr())
    }

    /// Sends `msg` to every participant including the local one, in peer directory order.
    ///
    /// The message is encoded at most once, on the first remote peer, and the encoding is shared by
    ///  all remote peers. The first failure (or cancellation) stops the fan-out, and peers after it
    ///  are not attempted.
    pub async fn broadcast(&self, cancel: &CancellationToken, msg: &HotStuffMsg) -> Result<(), TransportError> {
        trace!(view = msg.view, msg_type = ?msg.msg_type, "broadcasting message");

        let mut wire = None;
        for peer in self.peers.iter() {
            self.deliver_to_one(cancel, peer, msg, &mut wire).await?;
        }
        Ok(())
    }

    pub async fn send_to(&self, cancel: &CancellationToken, id: PeerId, msg: &HotStuffMsg) -> Result<(), TransportError> {
        let peer = self.peers.get(id)
            .ok_or(TransportError::InvalidPeerId(id))?;

        trace!(to = %id, view = msg.view, msg_type = ?msg.msg_type, "sending message");

        self.deliver_to_one(cancel, peer, msg, &mut None).await
    }

    /// The consensus engine's only source of incoming messages, both looped back and from remote
    ///  participants. Messages from one source arrive in the order they were accepted, there is no
    ///  ordering between sources.
    pub fn receive_ch(&mut self) -> &mut mpsc::Receiver<HotStuffMsg> {
        &mut self.recv
    }

    /// The inbound-delivery entry point for the network host.
    pub fn message_module(&self) -> Arc<HotStuffMessageModule> {
        Arc::new(HotStuffMessageModule {
            protocol_id: self.config.protocol_id,
            inbound: self.inbound.clone(),
        })
    }

    /// `wire` caches the encoded message across calls. It is only filled for remote peers.
    async fn deliver_to_one(&self, cancel: &CancellationToken, peer: &Peer, msg: &HotStuffMsg, wire: &mut Option<Bytes>) -> Result<(), TransportError> {
        let self_addr = self.sender.get_self_addr();

        if self.peers.is_local(peer, &self_addr) {
            trace!(to = %peer.id, "looping back message");
            return self.inbound.enqueue(msg.clone(), cancel).await;
        }

        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let wire = wire.get_or_insert_with(|| msg.ser()).clone();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            r = self.sender.send_async(cancel, self.config.protocol_id, peer.addr, wire) => {
                r.map_err(|source| {
                    debug!(to = %peer.id, "failed to send message: {}", source);
                    TransportError::SendFailed { to: peer.addr, source }
                })
            }
        }
    }
}


/// Decodes HotStuff messages received by the network host and feeds them into the transport's
///  inbound queue.
pub struct HotStuffMessageModule {
    protocol_id: MessageModuleId,
    inbound: InboundSender,
}

impl HotStuffMessageModule {
    /// Rejects frames of a different protocol and undecodable payloads without touching the queue.
    ///  A full queue blocks until there is room or `cancel` fires.
    pub async fn deliver(&self, envelope: &Envelope, buf: &[u8], cancel: &CancellationToken) -> Result<(), TransportError> {
        if envelope.message_module_id != self.protocol_id {
            return Err(TransportError::InvalidMessage(anyhow!("unexpected protocol {:?}", envelope.message_module_id)));
        }

        let msg = HotStuffMsg::deser(buf)
            .map_err(TransportError::InvalidMessage)?;

        trace!(from = ?envelope.from, view = msg.view, msg_type = ?msg.msg_type, "received message");
        self.inbound.enqueue(msg, cancel).await
    }

    /// number of messages waiting in the inbound queue
    pub fn queue_len(&self) -> usize {
        self.inbound.len()
    }
}

#[async_trait::async_trait]
impl MessageModule for HotStuffMessageModule {
    fn id(&self) -> MessageModuleId {
        self.protocol_id
    }

    async fn on_message(&self, envelope: &Envelope, buf: &[u8], cancel: &CancellationToken) -> anyhow::Result<()> {
        self.deliver(envelope, buf, cancel).await?;
        Ok(())
    }
}
