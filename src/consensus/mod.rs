pub mod peer_directory;
pub mod hotstuff_messages;
pub mod inbound_queue;
pub mod transport_config;
pub mod transport_error;
pub mod hotstuff_transport;
