//! Peer-to-peer gossip
//!
//! JSON-over-TCP packages let nodes with separate stores exchange
//! transactions and chains. `ChainSource` is the seam the fork resolver
//! reads peer chains through, whether they come from a shared store or
//! from peer servers.

pub mod client;
pub mod node;
pub mod server;
pub mod source;

pub use client::{send_request, GossipClient};
pub use node::{Peer, Peers};
pub use server::{Package, Server};
pub use source::ChainSource;
