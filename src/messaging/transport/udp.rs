use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace};

use crate::messaging::transport::{MessageHandler, Transport};

pub struct UdpTransport {
    receive_socket: UdpSocket,
    receive_buffer_size: usize,
    ipv4_send_socket: UdpSocket,
    ipv6_send_socket: UdpSocket,
}
impl UdpTransport {
    /// The receive socket is bound here rather than in [Transport::recv_loop] so that datagrams
    ///  arriving before the loop is polled are buffered by the OS instead of being lost.
    pub async fn new(self_addr: SocketAddr, receive_buffer_size: usize) -> anyhow::Result<UdpTransport> {
        let receive_socket = UdpSocket::bind(self_addr).await?;

        let ipv4_send_socket = UdpSocket::bind("0.0.0.0:0").await?;
        let ipv6_send_socket = UdpSocket::bind("[::]:0").await?;

        Ok(UdpTransport {
            receive_socket,
            receive_buffer_size,
            ipv4_send_socket,
            ipv6_send_socket,
        })
    }

    /// the actual address of the receive socket, which differs from the configured address if
    ///  that had port 0
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.receive_socket.local_addr()?)
    }
}

#[async_trait::async_trait]
impl Transport for UdpTransport {
    async fn send(&self, to: SocketAddr, buf: &[u8]) -> anyhow::Result<()> {
        let socket = if to.is_ipv4() { &self.ipv4_send_socket } else { &self.ipv6_send_socket };
        socket.send_to(buf, to).await?;
        Ok(())
    }

    async fn recv_loop(&self, handler: Arc<dyn MessageHandler>, cancel: CancellationToken) -> anyhow::Result<()> {
        let mut buf = vec![0u8; self.receive_buffer_size];

        trace!("starting UDP receive loop");

        loop {
            tokio::select! {
                r = self.receive_socket.recv_from(&mut buf) => {
                    match r {
                        Ok((len, from)) => {
                            handler.handle_message(&buf[..len], from).await;
                        }
                        Err(e) => {
                            error!(error = ?e, "error receiving from datagram socket");
                            return Err(e.into());
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    info!("UDP receive loop was cancelled");
                    break;
                }
            }
        }

        Ok(())
    }
}
