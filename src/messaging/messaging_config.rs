use std::net::SocketAddr;

/// UDP payloads cannot exceed this size (IPv4, 65535 - 8 byte UDP header - 20 byte IP header)
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

#[derive(Debug, Clone)]
pub struct MessagingConfig {
    /// port 0 binds an ephemeral port, see [crate::messaging::messaging::MessagingImpl::get_self_addr]
    pub self_addr: SocketAddr,
    /// mixed into every frame's checksum: nodes with different secrets ignore each other
    pub shared_secret: Vec<u8>,
    /// upper bound for a protocol payload, excluding the envelope
    pub max_msg_size: usize,
}

impl MessagingConfig {
    pub fn new(self_addr: SocketAddr) -> MessagingConfig {
        MessagingConfig {
            self_addr,
            shared_secret: b"no secret".to_vec(),
            max_msg_size: 64 * 1024 - 1024,
        }
    }
}
