use std::collections::hash_map::Entry;
use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
#[cfg(test)] use mockall::automock;
use rustc_hash::FxHashMap;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::messaging::envelope::{Checksum, Envelope};
use crate::messaging::message_module::{MessageModule, MessageModuleId};
use crate::messaging::messaging_config::{MessagingConfig, MAX_DATAGRAM_SIZE};
use crate::messaging::node_addr::NodeAddr;
use crate::messaging::transport::{MessageHandler, Transport, UdpTransport};


/// The send primitive of the network host.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessageSender: Debug + Send + Sync + 'static {
    fn get_self_addr(&self) -> NodeAddr;

    /// Hands `msg` to the network host for delivery to `to`, tagged with `protocol`.
    ///
    /// This returns as soon as the host accepted the request, delivery happens in the background.
    ///  Implementations abandon a pending delivery when `cancel` fires.
    async fn send_async(&self, cancel: &CancellationToken, protocol: MessageModuleId, to: NodeAddr, msg: Bytes) -> anyhow::Result<()>;
}

#[async_trait]
pub trait Messaging: MessageSender {
    async fn register_module(&self, message_module: Arc<dyn MessageModule>) -> anyhow::Result<()>;
    async fn deregister_module(&self, id: MessageModuleId) -> anyhow::Result<()>;
    /// runs the receive loop until [Messaging::shut_down] is called
    async fn recv(&self) -> anyhow::Result<()>;
    fn shut_down(&self);
}

/// UDP implementation of [Messaging].
///
/// There is a single receive loop, and it awaits each message module's
///  [MessageModule::on_message] before reading the next datagram. A module that blocks (e.g. on a
///  full inbound queue) therefore stalls all inbound traffic of this node, and datagrams arriving
///  meanwhile pile up in the OS socket buffer and are dropped by the OS once it overflows. The
///  HotStuff inbound queue logs a warning whenever it is full.
pub struct MessagingImpl {
    myself: NodeAddr,
    shared_secret: Vec<u8>,
    max_msg_size: usize,
    message_modules: Arc<RwLock<FxHashMap<MessageModuleId, Arc<dyn MessageModule>>>>,
    transport: Arc<dyn Transport>,
    shutdown: CancellationToken,
}

impl Debug for MessagingImpl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MessagingImpl{{myself:{:?}}}", &self.myself)
    }
}

#[async_trait]
impl MessageSender for MessagingImpl {
    fn get_self_addr(&self) -> NodeAddr {
        self.myself
    }

    async fn send_async(&self, cancel: &CancellationToken, protocol: MessageModuleId, to: NodeAddr, msg: Bytes) -> anyhow::Result<()> {
        if msg.len() > self.max_msg_size {
            bail!("message of {} bytes exceeds max message size of {} bytes", msg.len(), self.max_msg_size);
        }

        trace!(from=?self.myself, ?to, ?protocol, "sending message");

        let checksum = Checksum::new(&self.shared_secret, self.myself, to, protocol, &msg);

        let mut buf = BytesMut::new();
        Envelope::write(self.myself, to, checksum, protocol, &mut buf);
        buf.extend_from_slice(&msg);
        let buf = buf.freeze();

        let transport = self.transport.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                r = transport.send(to.socket_addr, &buf) => {
                    if let Err(e) = r {
                        warn!(?to, "error sending message: {}", e);
                    }
                }
                _ = cancel.cancelled() => {
                    debug!(?to, "send was cancelled before the datagram was written");
                }
            }
        });
        Ok(())
    }
}

#[async_trait]
impl Messaging for MessagingImpl {
    async fn register_module(&self, message_module: Arc<dyn MessageModule>) -> anyhow::Result<()> {
        match self.message_modules.write().await
            .entry(message_module.id())
        {
            Entry::Occupied(_) => {
                Err(anyhow!("a message module for module id {:?} is already registered", message_module.id()))
            }
            Entry::Vacant(e) => {
                debug!("registering message module {:?}", message_module.id());
                e.insert(message_module);
                Ok(())
            },
        }
    }

    async fn deregister_module(&self, id: MessageModuleId) -> anyhow::Result<()> {
        let prev = self.message_modules.write().await
            .remove(&id);
        if prev.is_none() {
            return Err(anyhow!("deregistering a module that was not previously registered: {:?}", id));
        }
        Ok(())
    }

    #[tracing::instrument]
    async fn recv(&self) -> anyhow::Result<()> {
        let handler = ReceivedMessageHandler {
            myself: self.myself,
            shared_secret: self.shared_secret.clone(),
            max_msg_size: self.max_msg_size,
            message_modules: self.message_modules.clone(),
            shutdown: self.shutdown.clone(),
        };

        match self.transport.recv_loop(Arc::new(handler), self.shutdown.clone()).await {
            Ok(()) => {
                info!("shutting down receiver");
                Ok(())
            }
            Err(e) => {
                error!("error: {}", e);
                Err(e)
            }
        }
    }

    fn shut_down(&self) {
        self.shutdown.cancel();
    }
}

impl MessagingImpl {
    pub async fn new(config: MessagingConfig) -> anyhow::Result<MessagingImpl> {
        let transport = UdpTransport::new(config.self_addr, MAX_DATAGRAM_SIZE).await?;
        let myself = NodeAddr::from(transport.local_addr()?);

        Ok(MessagingImpl {
            myself,
            shared_secret: config.shared_secret,
            max_msg_size: config.max_msg_size,
            message_modules: Default::default(),
            transport: Arc::new(transport),
            shutdown: CancellationToken::new(),
        })
    }
}


struct ReceivedMessageHandler {
    myself: NodeAddr,
    shared_secret: Vec<u8>,
    max_msg_size: usize,
    message_modules: Arc<RwLock<FxHashMap<MessageModuleId, Arc<dyn MessageModule>>>>,
    shutdown: CancellationToken,
}

#[async_trait]
impl MessageHandler for ReceivedMessageHandler {
    async fn handle_message(&self, msg_buf: &[u8], sender: SocketAddr) {
        trace!(?sender, "received message {:?}", msg_buf);

        let mut msg_buf = msg_buf;
        let envelope = match Envelope::try_read(&mut msg_buf, self.myself.socket_addr) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("received a message without a valid envelope - discarding: {}", e);
                return;
            }
        };

        if envelope.to.unique != self.myself.unique {
            warn!("received a message for {:?}: wrong unique part - was this node restarted? Ignoring the message", envelope.to);
            return;
        }

        if !envelope.matches_payload(&self.shared_secret, msg_buf) {
            warn!("checksum error in message from {:?} - skipping", envelope.from);
            return;
        }

        if msg_buf.len() > self.max_msg_size {
            warn!("received a message exceeding max message size of {} bytes - skipping", self.max_msg_size);
            return;
        }

        let message_module = self.message_modules.read().await
            .get(&envelope.message_module_id)
            .cloned();

        match message_module {
            Some(message_module) => {
                if let Err(e) = message_module.on_message(&envelope, msg_buf, &self.shutdown).await {
                    warn!("message module {:?} rejected a message from {:?}: {}", envelope.message_module_id, envelope.from, e);
                }
            }
            None => {
                debug!("received message for module {:?} for which there is no handler (yet?) - ignoring.", envelope.message_module_id);
            }
        }
    }
}
