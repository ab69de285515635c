use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use bytes::Bytes;
use clap::Parser;
use clap_derive::Parser;
use hotstuff_transport::consensus::hotstuff_messages::{hash_value, HotStuffMsg, MsgType};
use hotstuff_transport::consensus::hotstuff_transport::HotStuffTransport;
use hotstuff_transport::consensus::peer_directory::PeerDirectory;
use hotstuff_transport::consensus::transport_config::TransportConfig;
use hotstuff_transport::messaging::messaging::{MessageSender, Messaging, MessagingImpl};
use hotstuff_transport::messaging::messaging_config::MessagingConfig;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};

/// Starts a number of nodes on localhost, lets every node broadcast a NEW-VIEW message, and waits
///  until every node received all of them.
#[derive(Parser)]
struct Args {
    #[clap(short, long, default_value_t = 4)]
    num_nodes: usize,

    #[clap(long, default_value_t = 9810)]
    base_port: u16,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::TRACE } else { Level::INFO })
        .with_thread_ids(true)
        .try_init()
        .ok();

    if args.num_nodes == 0 {
        return Err(anyhow!("at least one node is required"));
    }

    let mut messagings = Vec::new();
    for n in 0..args.num_nodes {
        let addr: SocketAddr = format!("127.0.0.1:{}", args.base_port as usize + n).parse()?;
        messagings.push(Arc::new(MessagingImpl::new(MessagingConfig::new(addr)).await?));
    }
    let peers = PeerDirectory::new(messagings.iter().map(|m| m.get_self_addr()).collect())?;

    let mut transports = Vec::new();
    for messaging in &messagings {
        let transport = HotStuffTransport::new(TransportConfig::new(), messaging.clone(), peers.clone())?;
        messaging.register_module(transport.message_module()).await?;

        let m = messaging.clone();
        tokio::spawn(async move { m.recv().await });

        transports.push(transport);
    }

    let cancel = CancellationToken::new();
    for transport in &transports {
        let sender = transport.local_id()
            .ok_or_else(|| anyhow!("node is not part of the peer directory"))?;
        let value = Bytes::from(format!("proposal from {}", sender));
        let msg = HotStuffMsg {
            msg_type: MsgType::NewView,
            sender,
            view: 1,
            value_hash: hash_value(&value),
            value,
            signature: Bytes::new(),
            justify: None,
        };
        transport.broadcast(&cancel, &msg).await?;
    }

    for transport in &mut transports {
        let local_id = transport.local_id();
        for _ in 0..args.num_nodes {
            let msg = timeout(Duration::from_secs(5), transport.receive_ch().recv()).await?
                .ok_or_else(|| anyhow!("inbound queue was closed"))?;
            info!(?local_id, from = ?msg.sender, "received {:?}", msg.value);
        }
    }

    for messaging in &messagings {
        messaging.shut_down();
    }
    Ok(())
}
