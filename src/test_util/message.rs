use async_trait::async_trait;
use anyhow::bail;
use bytes::Bytes;
use rustc_hash::FxHashSet;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::consensus::hotstuff_messages::{hash_value, HotStuffMsg, MsgType, QuorumCert};
use crate::consensus::peer_directory::PeerId;
use crate::messaging::message_module::MessageModuleId;
use crate::messaging::messaging::MessageSender;
use crate::messaging::node_addr::NodeAddr;

/// a message with a value derived from `view`, and a matching value hash
pub fn test_msg(msg_type: MsgType, sender: u32, view: u64) -> HotStuffMsg {
    let value = Bytes::from(format!("value-{}", view));
    HotStuffMsg {
        msg_type,
        sender: PeerId(sender),
        view,
        value_hash: hash_value(&value),
        value,
        signature: Bytes::from(format!("sig-{}-{}", sender, view)),
        justify: None,
    }
}

pub fn test_qc(msg_type: MsgType, view: u64, num_signatures: usize) -> QuorumCert {
    QuorumCert {
        msg_type,
        view,
        value_hash: hash_value(format!("value-{}", view).as_bytes()),
        signatures: (0..num_signatures)
            .map(|n| Bytes::from(format!("qc-sig-{}", n)))
            .collect(),
    }
}

/// A [MessageSender] that records every send attempt instead of sending it. Sends to addresses
///  registered with [TrackingMockMessageSender::fail_sends_to] are recorded and then fail.
#[derive(Debug)]
pub struct TrackingMockMessageSender {
    myself: NodeAddr,
    tracker: RwLock<Vec<(NodeAddr, MessageModuleId, Bytes)>>,
    failing: RwLock<FxHashSet<NodeAddr>>,
}
impl TrackingMockMessageSender {
    pub fn new(myself: NodeAddr) -> Self {
        TrackingMockMessageSender {
            myself,
            tracker: Default::default(),
            failing: Default::default(),
        }
    }

    pub async fn fail_sends_to(&self, to: NodeAddr) {
        self.failing.write().await
            .insert(to);
    }

    /// returns sent messages, clearing the internal buffer
    pub async fn sent_messages(&self) -> Vec<(NodeAddr, MessageModuleId, Bytes)> {
        let mut lock = self.tracker.write().await;
        std::mem::take(&mut *lock)
    }

    pub async fn assert_no_remaining_messages(&self) {
        assert!(
            self.tracker.read().await
                .is_empty()
        );
    }
}

#[async_trait]
impl MessageSender for TrackingMockMessageSender {
    fn get_self_addr(&self) -> NodeAddr {
        self.myself
    }

    async fn send_async(&self, _cancel: &CancellationToken, protocol: MessageModuleId, to: NodeAddr, msg: Bytes) -> anyhow::Result<()> {
        self.tracker.write().await.push((to, protocol, msg));
        if self.failing.read().await.contains(&to) {
            bail!("simulated send failure to {:?}", to);
        }
        Ok(())
    }
}
