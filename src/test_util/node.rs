use std::net::{Ipv4Addr, SocketAddrV4};

use crate::consensus::peer_directory::PeerDirectory;
use crate::messaging::node_addr::NodeAddr;

/// convenience method for unit test code: create a [NodeAddr] based on a number, the same number
///  generating the same address and different numbers different addresses
pub fn test_node_addr_from_number(number: u16) -> NodeAddr {
    NodeAddr {
        unique: number.into(),
        socket_addr: SocketAddrV4::new(Ipv4Addr::LOCALHOST, number).into(),
    }
}

/// a directory of `num_peers` peers where [crate::consensus::peer_directory::PeerId] `n` has the
///  address `test_node_addr_from_number(n)`
pub fn test_peer_directory(num_peers: u16) -> PeerDirectory {
    PeerDirectory::new((1..=num_peers).map(test_node_addr_from_number).collect())
        .expect("test peer directories are non-empty and have distinct addresses")
}
