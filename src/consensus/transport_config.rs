use crate::messaging::message_module::MessageModuleId;

/// Distinguishes HotStuff traffic from other protocols sharing the same network host.
pub const HOTSTUFF_PROTOCOL_ID: MessageModuleId = MessageModuleId::new(b"hotstuff");

/// capacity of the inbound queue if not configured otherwise
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 16;

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub protocol_id: MessageModuleId,
    /// Producers block when this many messages are waiting for the consensus engine. A value of 0
    ///  makes [crate::consensus::hotstuff_transport::HotStuffTransport::new] fail.
    pub recv_buffer_size: usize,
}

impl TransportConfig {
    pub fn new() -> TransportConfig {
        TransportConfig {
            protocol_id: HOTSTUFF_PROTOCOL_ID,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::new()
    }
}
