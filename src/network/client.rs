use crate::core::{Block, NodeId, Transaction};
use crate::error::{BlockchainError, Result};
use crate::network::{ChainSource, Package, Peers};
use log::{debug, info, warn};
use std::io::BufReader;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

/// Send one package to `addr` and wait for the reply
pub fn send_request(addr: &str, pkg: &Package, timeout: Duration) -> Result<Package> {
    let socket_addr: SocketAddr = addr
        .parse()
        .map_err(|e| BlockchainError::Network(format!("Failed to parse address {addr}: {e}")))?;
    debug!("Sending package to {addr}: {pkg:?}");

    let stream = TcpStream::connect_timeout(&socket_addr, timeout)
        .map_err(|e| BlockchainError::Network(format!("Failed to connect to {addr}: {e}")))?;
    stream
        .set_write_timeout(Some(timeout))
        .map_err(|e| BlockchainError::Network(format!("Failed to set write timeout: {e}")))?;
    stream
        .set_read_timeout(Some(timeout))
        .map_err(|e| BlockchainError::Network(format!("Failed to set read timeout: {e}")))?;

    serde_json::to_writer(&stream, pkg)
        .map_err(|e| BlockchainError::Network(format!("Failed to send data to {addr}: {e}")))?;
    stream
        .shutdown(Shutdown::Write)
        .map_err(|e| BlockchainError::Network(format!("Failed to finish request to {addr}: {e}")))?;

    serde_json::from_reader(BufReader::new(&stream))
        .map_err(|e| BlockchainError::Network(format!("Bad reply from {addr}: {e}")))
}

/// Talks to peer servers on behalf of one node
pub struct GossipClient {
    addr: String,
    peers: Arc<Peers>,
    timeout: Duration,
}

impl GossipClient {
    /// `addr` is this node's own server address, sent as `addr_from`
    pub fn new(addr: &str, peers: Arc<Peers>, timeout: Duration) -> GossipClient {
        GossipClient {
            addr: addr.to_string(),
            peers,
            timeout,
        }
    }

    pub fn get_peers(&self) -> &Arc<Peers> {
        &self.peers
    }

    /// Announce this node to every known peer
    pub fn announce(&self) {
        for addr in self.peers.get_addrs() {
            let hello = Package::Hello {
                addr_from: self.addr.clone(),
            };
            match send_request(&addr, &hello, self.timeout) {
                Ok(Package::ChainInfo { node_id, height }) => {
                    info!("Peer {addr} is node {node_id} at height {height}");
                    self.peers.record_identity(&addr, &node_id);
                }
                Ok(other) => warn!("Unexpected reply to hello from {addr}: {other:?}"),
                Err(e) => warn!("Peer {addr} unreachable: {e}"),
            }
        }
    }

    /// Send a transaction to every peer. Returns how many accepted it.
    pub fn broadcast_transaction(&self, tx: &Transaction) -> usize {
        let package = Package::Tx {
            addr_from: self.addr.clone(),
            transaction: tx.clone(),
        };
        let mut accepted = 0;
        for addr in self.peers.get_addrs() {
            match send_request(&addr, &package, self.timeout) {
                Ok(Package::Ack) => accepted += 1,
                Ok(Package::Error { message }) => warn!("Peer {addr} rejected {}: {message}", tx.get_id()),
                Ok(other) => warn!("Unexpected reply from {addr}: {other:?}"),
                Err(e) => warn!("Failed to send {} to {addr}: {e}", tx.get_id()),
            }
        }
        accepted
    }
}

impl ChainSource for GossipClient {
    fn chain_heights(&self) -> Result<Vec<(NodeId, usize)>> {
        let request = Package::GetChainInfo {
            addr_from: self.addr.clone(),
        };
        let mut heights = Vec::new();
        for addr in self.peers.get_addrs() {
            match send_request(&addr, &request, self.timeout) {
                Ok(Package::ChainInfo { node_id, height }) => {
                    self.peers.record_identity(&addr, &node_id);
                    heights.push((node_id, height));
                }
                Ok(other) => warn!("Unexpected chain info from {addr}: {other:?}"),
                Err(e) => debug!("Peer {addr} skipped: {e}"),
            }
        }
        Ok(heights)
    }

    fn fetch_chain(&self, node_id: &NodeId) -> Result<Vec<Block>> {
        let addr = self
            .peers
            .addr_of(node_id)
            .ok_or_else(|| BlockchainError::Network(format!("No known address for node {node_id}")))?;
        let request = Package::GetChain {
            addr_from: self.addr.clone(),
        };
        match send_request(&addr, &request, self.timeout)? {
            Package::Chain {
                node_id: answered,
                blocks,
            } if answered == *node_id => Ok(blocks),
            Package::Chain { node_id: answered, .. } => Err(BlockchainError::Network(format!(
                "Peer {addr} is now node {answered}, expected {node_id}"
            ))),
            Package::Error { message } => Err(BlockchainError::Network(message)),
            other => Err(BlockchainError::Network(format!(
                "Unexpected chain reply from {addr}: {other:?}"
            ))),
        }
    }
}
