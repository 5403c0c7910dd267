use crate::api::LedgerApi;
use crate::core::{Block, NodeId, Transaction};
use crate::error::{BlockchainError, Result};
use crate::network::{send_request, Peers};
use crate::storage::LedgerStore;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Deserializer;
use std::io::{BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Gossip wire messages. One request and one reply per connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Package {
    Hello {
        addr_from: String,
    },
    Tx {
        addr_from: String,
        transaction: Transaction,
    },
    GetChainInfo {
        addr_from: String,
    },
    GetChain {
        addr_from: String,
    },
    ChainInfo {
        node_id: NodeId,
        height: usize,
    },
    Chain {
        node_id: NodeId,
        blocks: Vec<Block>,
    },
    Ack,
    Error {
        message: String,
    },
}

struct Handler {
    addr: String,
    node_id: NodeId,
    store: LedgerStore,
    api: LedgerApi,
    peers: Arc<Peers>,
    timeout: Duration,
}

/// Serves this node's pool and chain to its peers
pub struct Server {
    listener: TcpListener,
    handler: Arc<Handler>,
}

impl Server {
    pub fn bind(
        addr: &str,
        node_id: NodeId,
        store: LedgerStore,
        api: LedgerApi,
        peers: Arc<Peers>,
        timeout: Duration,
    ) -> Result<Server> {
        let listener = TcpListener::bind(addr)
            .map_err(|e| BlockchainError::Network(format!("Failed to bind to {addr}: {e}")))?;
        let local = listener
            .local_addr()
            .map_err(|e| BlockchainError::Network(format!("Failed to read bound address: {e}")))?;
        Ok(Server {
            listener,
            handler: Arc::new(Handler {
                addr: local.to_string(),
                node_id,
                store,
                api,
                peers,
                timeout,
            }),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| BlockchainError::Network(format!("Failed to read bound address: {e}")))
    }

    /// Accept connections until the listener fails
    pub fn run(self) -> Result<()> {
        info!(
            "Node {} listening on {}",
            self.handler.node_id, self.handler.addr
        );
        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    let handler = Arc::clone(&self.handler);
                    thread::spawn(move || {
                        let peer_addr = stream
                            .peer_addr()
                            .map(|addr| addr.to_string())
                            .unwrap_or_else(|_| "unknown peer".to_string());
                        if let Err(e) = handler.handle_connection(stream) {
                            error!("Error handling connection from {peer_addr}: {e}");
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {e}");
                }
            }
        }
        Ok(())
    }

    pub fn spawn(self) -> Result<JoinHandle<()>> {
        Ok(thread::Builder::new()
            .name(format!("gossip-{}", self.handler.node_id))
            .spawn(move || {
                if let Err(e) = self.run() {
                    error!("Gossip server stopped: {e}");
                }
            })?)
    }
}

impl Handler {
    fn handle_connection(&self, stream: TcpStream) -> Result<()> {
        stream
            .set_read_timeout(Some(self.timeout))
            .map_err(|e| BlockchainError::Network(format!("Failed to set read timeout: {e}")))?;

        let reader = BufReader::new(&stream);
        let request = Deserializer::from_reader(reader)
            .into_iter::<Package>()
            .next()
            .ok_or_else(|| BlockchainError::Network("Connection closed before a request".to_string()))?
            .map_err(|e| BlockchainError::Network(format!("Failed to deserialize package: {e}")))?;
        debug!("Received request: {request:?}");

        let reply = match self.process(request) {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Request failed: {e}");
                Package::Error {
                    message: e.to_string(),
                }
            }
        };

        serde_json::to_writer(&stream, &reply)
            .map_err(|e| BlockchainError::Network(format!("Failed to send reply: {e}")))?;
        let mut writer = &stream;
        let _ = writer.flush();
        let _ = stream.shutdown(Shutdown::Both);
        Ok(())
    }

    fn process(&self, request: Package) -> Result<Package> {
        match request {
            Package::Hello { addr_from } => {
                if addr_from != self.addr && self.peers.add_peer(addr_from.clone()) {
                    info!("Registered peer {addr_from}");
                }
                self.chain_info()
            }
            Package::Tx {
                addr_from,
                transaction,
            } => {
                let fresh = self.store.get_transaction(transaction.get_id())?.is_none();
                self.api.submit_transaction(&transaction)?;
                if fresh {
                    self.relay(&addr_from, transaction);
                }
                Ok(Package::Ack)
            }
            Package::GetChainInfo { .. } => self.chain_info(),
            Package::GetChain { .. } => Ok(Package::Chain {
                node_id: self.node_id.clone(),
                blocks: self.api.get_local_chain(&self.node_id)?,
            }),
            other => Err(BlockchainError::Network(format!(
                "Unexpected request {other:?}"
            ))),
        }
    }

    fn chain_info(&self) -> Result<Package> {
        Ok(Package::ChainInfo {
            node_id: self.node_id.clone(),
            height: self.api.get_local_chain(&self.node_id)?.len(),
        })
    }

    // Forward a newly pooled transaction to every other peer
    fn relay(&self, addr_from: &str, transaction: Transaction) {
        let targets: Vec<String> = self
            .peers
            .get_addrs()
            .into_iter()
            .filter(|addr| addr != addr_from && *addr != self.addr)
            .collect();
        if targets.is_empty() {
            return;
        }
        let package = Package::Tx {
            addr_from: self.addr.clone(),
            transaction,
        };
        let timeout = self.timeout;
        thread::spawn(move || {
            for addr in targets {
                if let Err(e) = send_request(&addr, &package, timeout) {
                    warn!("Failed to relay transaction to {addr}: {e}");
                }
            }
        });
    }
}
