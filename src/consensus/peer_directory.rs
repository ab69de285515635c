use std::fmt::{Debug, Display, Formatter};

use anyhow::bail;
use rustc_hash::FxHashSet;

use crate::messaging::node_addr::NodeAddr;

/// A participant's identity within one consensus instance: 1-based, and stable for the instance's
///  lifetime.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PeerId(pub u32);

impl PeerId {
    /// NB: only meaningful for ids in `[1, N]`, see [PeerDirectory::get]
    pub fn to_index(self) -> usize {
        (self.0 as usize).wrapping_sub(1)
    }
}

impl Debug for PeerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl Display for PeerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Peer {
    pub id: PeerId,
    pub addr: NodeAddr,
}

/// The fixed, ordered set of participants of a consensus instance. It is immutable after
///  construction.
#[derive(Debug, Clone)]
pub struct PeerDirectory {
    peers: Vec<Peer>,
}

impl PeerDirectory {
    /// Ids are assigned in list order, starting with 1.
    pub fn new(addrs: Vec<NodeAddr>) -> anyhow::Result<PeerDirectory> {
        if addrs.is_empty() {
            bail!("a peer directory requires at least one peer");
        }
        if addrs.len() > u32::MAX as usize {
            bail!("too many peers: {}", addrs.len());
        }

        let mut unique_addrs = FxHashSet::default();
        for addr in &addrs {
            if !unique_addrs.insert(*addr) {
                bail!("duplicate peer address {:?}", addr);
            }
        }

        let peers = addrs.into_iter()
            .enumerate()
            .map(|(idx, addr)| Peer {
                id: PeerId(idx as u32 + 1),
                addr,
            })
            .collect();

        Ok(PeerDirectory { peers })
    }

    /// `None` for ids outside `[1, N]`
    pub fn get(&self, id: PeerId) -> Option<&Peer> {
        if id.0 == 0 {
            return None;
        }
        self.peers.get(id.to_index())
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter()
    }

    pub fn is_local(&self, peer: &Peer, self_addr: &NodeAddr) -> bool {
        peer.addr == *self_addr
    }

    pub fn local_id(&self, self_addr: &NodeAddr) -> Option<PeerId> {
        self.peers.iter()
            .find(|p| self.is_local(p, self_addr))
            .map(|p| p.id)
    }
}
