//! Per-node engine
//!
//! State shared by a node's two loops, and the intake, mining and fork
//! resolution steps those loops run.

pub mod engine;
pub mod intake;
pub mod miner;
pub mod resolver;
pub mod state;

pub use engine::{Node, NodeHandle};
pub use intake::poll_once;
pub use miner::Miner;
pub use resolver::ForkResolver;
pub use state::{NodeState, SharedState};
