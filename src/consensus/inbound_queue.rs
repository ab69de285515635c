use anyhow::bail;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::consensus::hotstuff_messages::HotStuffMsg;
use crate::consensus::transport_error::TransportError;

/// Creates the bounded queue through which all messages reach the consensus engine. The receiver
///  is the single consumer; [InboundSender] is cloned for every producer.
pub fn inbound_queue(capacity: usize) -> anyhow::Result<(InboundSender, mpsc::Receiver<HotStuffMsg>)> {
    if capacity == 0 {
        bail!("inbound queue capacity must be at least 1");
    }
    let (sender, receiver) = mpsc::channel(capacity);
    Ok((InboundSender { sender }, receiver))
}

#[derive(Debug, Clone)]
pub struct InboundSender {
    sender: mpsc::Sender<HotStuffMsg>,
}

impl InboundSender {
    /// Waits for a free slot, so a full queue blocks the producer rather than dropping the message.
    ///
    /// Cancellation takes precedence over a free slot, and a cancelled call leaves the queue
    ///  unchanged: the slot is reserved first and only then filled.
    pub async fn enqueue(&self, msg: HotStuffMsg, cancel: &CancellationToken) -> Result<(), TransportError> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let msg = match self.sender.try_send(msg) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Closed(_)) => return Err(TransportError::InboundQueueClosed),
            Err(TrySendError::Full(msg)) => msg,
        };

        // producers stall from here on, and a network host feeding this queue from its only
        //  receive loop stops reading from its socket
        warn!(capacity = self.sender.max_capacity(), "inbound queue is full - waiting for the consensus engine to catch up");

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            permit = self.sender.reserve() => permit.map_err(|_| TransportError::InboundQueueClosed)?,
        };
        permit.send(msg);
        Ok(())
    }

    /// number of messages waiting for the consumer
    pub fn len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.sender.capacity() == 0
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::consensus::hotstuff_messages::MsgType;
    use crate::test_util::message::test_msg;

    use super::*;

    #[tokio::test]
    async fn test_enqueue_preserves_order() {
        let (sender, mut receiver) = inbound_queue(4).unwrap();
        let cancel = CancellationToken::new();

        for view in 1..=3 {
            sender.enqueue(test_msg(MsgType::Prepare, 1, view), &cancel).await.unwrap();
        }
        assert_eq!(sender.len(), 3);

        for view in 1..=3 {
            assert_eq!(receiver.recv().await.unwrap().view, view);
        }
        assert!(sender.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_blocks_until_drained() {
        let (sender, mut receiver) = inbound_queue(1).unwrap();
        let cancel = CancellationToken::new();
        sender.enqueue(test_msg(MsgType::Prepare, 1, 1), &cancel).await.unwrap();

        let blocked = tokio::spawn({
            let sender = sender.clone();
            let cancel = cancel.clone();
            async move { sender.enqueue(test_msg(MsgType::Prepare, 1, 2), &cancel).await }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!blocked.is_finished());

        assert_eq!(receiver.recv().await.unwrap().view, 1);
        blocked.await.unwrap().unwrap();
        assert_eq!(receiver.recv().await.unwrap().view, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_blocked_enqueue() {
        let (sender, mut receiver) = inbound_queue(1).unwrap();
        sender.enqueue(test_msg(MsgType::Prepare, 1, 1), &CancellationToken::new()).await.unwrap();

        let cancel = CancellationToken::new();
        let blocked = tokio::spawn({
            let sender = sender.clone();
            let cancel = cancel.clone();
            async move { sender.enqueue(test_msg(MsgType::Prepare, 1, 2), &cancel).await }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        assert!(blocked.await.unwrap().unwrap_err().is_cancelled());
        assert_eq!(sender.len(), 1);
        assert_eq!(receiver.recv().await.unwrap().view, 1);
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cancelled_token_wins_over_free_slot() {
        let (sender, mut receiver) = inbound_queue(2).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = sender.enqueue(test_msg(MsgType::Prepare, 1, 1), &cancel).await;
        assert!(result.unwrap_err().is_cancelled());
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(inbound_queue(0).is_err());
    }

    #[tokio::test]
    async fn test_is_full() {
        let (sender, mut receiver) = inbound_queue(2).unwrap();
        let cancel = CancellationToken::new();

        sender.enqueue(test_msg(MsgType::Prepare, 1, 1), &cancel).await.unwrap();
        assert!(!sender.is_full());
        sender.enqueue(test_msg(MsgType::Prepare, 1, 2), &cancel).await.unwrap();
        assert!(sender.is_full());

        receiver.recv().await.unwrap();
        assert!(!sender.is_full());
    }

    #[tokio::test]
    async fn test_enqueue_to_closed_queue() {
        let (sender, receiver) = inbound_queue(2).unwrap();
        drop(receiver);

        let result = sender.enqueue(test_msg(MsgType::Prepare, 1, 1), &CancellationToken::new()).await;
        assert!(matches!(result, Err(TransportError::InboundQueueClosed)));
    }
}
