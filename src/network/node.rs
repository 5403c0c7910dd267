use crate::core::NodeId;
use std::sync::{PoisonError, RwLock};

/// A known peer server and, once it answered, the node it runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    addr: String,
    node_id: Option<NodeId>,
}

impl Peer {
    fn new(addr: String) -> Peer {
        Peer { addr, node_id: None }
    }

    pub fn get_addr(&self) -> &str {
        self.addr.as_str()
    }

    pub fn get_node_id(&self) -> Option<&NodeId> {
        self.node_id.as_ref()
    }
}

#[derive(Debug, Default)]
pub struct Peers {
    inner: RwLock<Vec<Peer>>,
}

impl Peers {
    pub fn new() -> Peers {
        Peers::default()
    }

    pub fn from_addrs<I, S>(addrs: I) -> Peers
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let peers = Peers::new();
        for addr in addrs {
            peers.add_peer(addr.into());
        }
        peers
    }

    /// Returns false if the address was already known
    pub fn add_peer(&self, addr: String) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.iter().any(|peer| peer.addr == addr) {
            return false;
        }
        inner.push(Peer::new(addr));
        true
    }

    pub fn evict_peer(&self, addr: &str) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.retain(|peer| peer.addr != addr);
    }

    /// Remember which node answered at `addr`
    pub fn record_identity(&self, addr: &str, node_id: &NodeId) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(peer) = inner.iter_mut().find(|peer| peer.addr == addr) {
            peer.node_id = Some(node_id.clone());
        }
    }

    pub fn addr_of(&self, node_id: &NodeId) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|peer| peer.node_id.as_ref() == Some(node_id))
            .map(|peer| peer.addr.clone())
    }

    pub fn get_peers(&self) -> Vec<Peer> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .to_vec()
    }

    pub fn get_addrs(&self) -> Vec<String> {
        self.get_peers().into_iter().map(|peer| peer.addr).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_deduplicated() {
        let peers = Peers::from_addrs(["127.0.0.1:2001", "127.0.0.1:2002"]);
        assert!(!peers.add_peer("127.0.0.1:2001".to_string()));
        assert_eq!(peers.len(), 2);
        peers.evict_peer("127.0.0.1:2001");
        assert_eq!(peers.get_addrs(), vec!["127.0.0.1:2002".to_string()]);
    }

    #[test]
    fn test_identity_lookup() {
        let peers = Peers::from_addrs(["127.0.0.1:2001"]);
        let node = NodeId::new("n1");
        assert_eq!(peers.addr_of(&node), None);
        peers.record_identity("127.0.0.1:2001", &node);
        assert_eq!(peers.addr_of(&node), Some("127.0.0.1:2001".to_string()));
        assert_eq!(peers.get_peers()[0].get_node_id(), Some(&node));
    }
}
