// Entry point of the ledger node binary
use clap::Parser;
use ledger_node::{
    run_console, ChainStore, Command, Config, Node, Opt, PeerRegistry, Server, Wallet,
};
use log::{error, info, warn};
use std::io;
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() {
    // Info level unless RUST_LOG says otherwise
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opt = Opt::parse();
    if let Err(e) = run_command(opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::StartNode { config, mine } => {
            let mut config = Config::load(config.as_deref())?;
            config.mine |= mine;
            start_node(config)?;
        }
        Command::Address { key } => {
            let key_path = match key {
                Some(path) => path,
                None => Config::load(None)?.key_path,
            };
            let wallet = Wallet::load_or_generate(&key_path)?;
            println!("{}", wallet.get_address());
        }
    }
    Ok(())
}

fn start_node(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let wallet = Wallet::load_or_generate(&config.key_path)?;
    let store = ChainStore::open(&config.data_dir)?;
    let node = Arc::new(Node::open(wallet, Arc::new(PeerRegistry::new()), store)?);
    info!("Node address: {}", node.get_my_address());

    let server = Server::new(Arc::clone(&node));
    server.listen(&config.p2p_address)?;
    for peer in &config.peers {
        if let Err(e) = server.connect_to_peer(peer) {
            warn!("Could not connect to {peer}: {e}");
        }
    }

    let miner = if config.mine {
        let node = Arc::clone(&node);
        Some(thread::spawn(move || mine_forever(&node)))
    } else {
        None
    };

    // the console returns on `stop`; on end of input the node keeps running
    if !run_console(&server, io::stdin().lock(), io::stdout())? {
        info!("Console closed, node keeps running until stopped");
        while !node.is_stopped() {
            thread::sleep(Duration::from_millis(500));
        }
    }

    if let Some(miner) = miner {
        if miner.join().is_err() {
            error!("Mining thread panicked");
        }
    }
    info!("Node stopped");
    Ok(())
}

fn mine_forever(node: &Node) {
    while !node.is_stopped() {
        match node.mine_block() {
            Ok(block) => info!("Mined block {} ({} transactions)", block.index, block.data.len()),
            Err(e) if node.is_stopped() => info!("Mining stopped: {e}"),
            // a peer block moved the tip; start over on top of it
            Err(e) => warn!("{e}"),
        }
    }
}
