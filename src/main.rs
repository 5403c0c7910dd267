// Entry point for the forkchain CLI
// Every command loads the node configuration first, then works on the
// node's own store, on its peers, or on an in-process testnet
use clap::Parser;
use forkchain::network::{ChainSource, GossipClient, Peers, Server};
use forkchain::storage::{LedgerStore, SledStore};
use forkchain::{
    Block, Command, Config, LedgerApi, LocalTestnet, Node, NodeId, Opt, Wallet, Wallets,
};
use log::{error, info, LevelFilter};
use rand::Rng;
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() {
    // Info by default; RUST_LOG still wins when set
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let opt = Opt::parse();

    if let Err(e) = run_command(opt) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(opt: Opt) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(opt.config.as_deref())?;

    match opt.command {
        Command::Createwallet { name } => {
            let mut wallets = Wallets::load(&config.get_wallet_path())?;
            let wallet = wallets.create_wallet(&name)?;
            println!("Created wallet {name}: {}", wallet.get_public_key_hex());
        }
        Command::ListWallets => {
            let wallets = Wallets::load(&config.get_wallet_path())?;
            for name in wallets.get_names() {
                if let Some(wallet) = wallets.get_wallet(&name) {
                    println!("{name}: {}", wallet.get_public_key_hex());
                }
            }
        }
        Command::Submit {
            from,
            to,
            amount,
            peers,
        } => {
            let wallets = Wallets::load(&config.get_wallet_path())?;
            let wallet = wallets
                .get_wallet(&from)
                .ok_or_else(|| format!("No wallet named {from}"))?;
            let tx = wallet.sign_transfer(&to, amount)?;

            let peers = if peers.is_empty() { config.peers.clone() } else { peers };
            if peers.is_empty() {
                // No peers: the pool is this node's own store
                let store = open_store(&config)?;
                let api = LedgerApi::new(store.clone(), Arc::new(store), config.difficulty);
                api.submit_transaction(&tx)?;
            } else {
                let client = GossipClient::new(
                    &config.node_address,
                    Arc::new(Peers::from_addrs(peers)),
                    config.get_network_timeout(),
                );
                if client.broadcast_transaction(&tx) == 0 {
                    return Err("No peer accepted the transaction".into());
                }
            }
            println!("Submitted transaction {}", tx.get_id());
        }
        Command::StartNode { peers } => {
            let store = open_store(&config)?;
            let node_id = local_node_id(&config, &store)?;
            let timeout = config.get_network_timeout();

            let peers = Arc::new(Peers::from_addrs(config.peers.iter().cloned().chain(peers)));
            let gossip = Arc::new(GossipClient::new(
                &config.node_address,
                Arc::clone(&peers),
                timeout,
            ));
            let api = LedgerApi::new(store.clone(), gossip.clone(), config.difficulty);
            let server = Server::bind(
                &config.node_address,
                node_id.clone(),
                store.clone(),
                api,
                peers,
                timeout,
            )?;

            let node = Node::recover(node_id, store, gossip.clone(), &config)?;
            gossip.announce();
            // The loops run for as long as the server does
            let _handle = node.start()?;
            server.run()?;
        }
        Command::Printchain { consensus } => {
            let store = open_store(&config)?;
            let node_id = local_node_id(&config, &store)?;
            let source: Arc<dyn ChainSource> = if config.peers.is_empty() {
                Arc::new(store.clone())
            } else {
                Arc::new(GossipClient::new(
                    &config.node_address,
                    Arc::new(Peers::from_addrs(config.peers.clone())),
                    config.get_network_timeout(),
                ))
            };
            let api = LedgerApi::new(store, source, config.difficulty);
            let chain = if consensus {
                api.get_consensus_chain()?
            } else {
                api.get_local_chain(&node_id)?
            };
            print_chain(&chain);
        }
        Command::Simulate {
            nodes,
            transactions,
            timeout_secs,
        } => {
            simulate(&config, nodes, transactions, Duration::from_secs(timeout_secs))?;
        }
    }
    Ok(())
}

fn open_store(config: &Config) -> Result<LedgerStore, Box<dyn std::error::Error>> {
    let kv = SledStore::open(&config.get_ledger_path())?;
    Ok(LedgerStore::new(Arc::new(kv)))
}

fn local_node_id(config: &Config, store: &LedgerStore) -> Result<NodeId, Box<dyn std::error::Error>> {
    Ok(match &config.node_id {
        Some(id) => NodeId::new(id.as_str()),
        None => store.load_or_create_node_id()?,
    })
}

fn print_chain(chain: &[Block]) {
    for (index, block) in chain.iter().enumerate() {
        println!("Block {index}");
        println!("  Hash: {}", block.get_hash());
        println!("  Previous hash: {}", block.get_previous_hash());
        println!("  Nonce: {}", block.get_nonce());
        println!("  Miner: {}", block.get_miner_id());
        for tx in block.get_transactions().values() {
            println!(
                "  - {} sends {} to {}",
                tx.get_id(),
                tx.get_amount(),
                tx.get_recipient()
            );
        }
    }
    println!("{} blocks", chain.len());
}

// Two named users trade random amounts while the nodes mine
fn simulate(
    config: &Config,
    node_count: usize,
    transactions: usize,
    timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let net = LocalTestnet::new(node_count, config)?;
    let handles = net.start()?;
    let users = [("genesis", Wallet::new()?), ("foo", Wallet::new()?)];
    let mut rng = rand::thread_rng();

    for i in 0..transactions {
        let (_, sender) = &users[i % users.len()];
        let recipient = users[(i + 1) % users.len()].0;
        let tx = sender.sign_transfer(recipient, rng.gen_range(1..=100))?;
        net.get_api().submit_transaction(&tx)?;
        thread::sleep(Duration::from_millis(
            rng.gen_range(0..=config.poll_interval_max_ms / 2),
        ));
    }

    let settled = net.wait_until_settled(timeout)?;
    for handle in handles {
        handle.shutdown();
    }

    for node in net.get_nodes() {
        let chain = node.get_chain();
        let tip = chain
            .last()
            .map(|block| block.get_hash().to_string())
            .unwrap_or_else(|| "genesis".to_string());
        println!("Node {}: {} blocks, tip {tip}", node.get_node_id(), chain.len());
    }
    let consensus = net.consensus_chain()?;
    println!("Consensus chain: {} blocks", consensus.len());
    if settled {
        info!("All nodes agree on one chain holding every transaction");
    } else {
        println!("Nodes did not settle within {}s", timeout.as_secs());
    }
    Ok(())
}
