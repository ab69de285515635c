pub mod node_addr;
pub mod message_module;
pub mod envelope;
pub mod messaging_config;
pub mod messaging;
pub mod transport;
