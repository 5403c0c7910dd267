use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "forkchain")]
pub struct Opt {
    #[arg(long = "config", global = true, help = "Path to a TOML configuration file")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "createwallet", about = "Create a new named wallet")]
    Createwallet {
        #[arg(help = "Name to store the wallet under")]
        name: String,
    },
    #[command(name = "listwallets", about = "Print local wallet names and public keys")]
    ListWallets,
    #[command(name = "submit", about = "Sign a transfer and submit it to the pool")]
    Submit {
        #[arg(help = "Name of the sending wallet")]
        from: String,
        #[arg(help = "Recipient")]
        to: String,
        #[arg(help = "Amount to transfer")]
        amount: u64,
        #[arg(
            long = "peer",
            help = "Send to this node instead of the local store (repeatable)"
        )]
        peers: Vec<String>,
    },
    #[command(name = "startnode", about = "Run a node with its gossip server")]
    StartNode {
        #[arg(long = "peer", help = "Additional peer address (repeatable)")]
        peers: Vec<String>,
    },
    #[command(name = "printchain", about = "Print this node's chain")]
    Printchain {
        #[arg(
            long = "consensus",
            help = "Print the longest valid chain among all known chains instead"
        )]
        consensus: bool,
    },
    #[command(name = "simulate", about = "Run an in-process network of nodes")]
    Simulate {
        #[arg(long = "nodes", default_value_t = 3, help = "Number of nodes")]
        nodes: usize,
        #[arg(long = "transactions", default_value_t = 10, help = "Transfers to submit")]
        transactions: usize,
        #[arg(long = "timeout", default_value_t = 30, help = "Seconds to wait for the nodes to settle")]
        timeout_secs: u64,
    },
}
