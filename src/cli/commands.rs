use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "ledger-node")]
pub struct Opt {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "startnode", about = "Start a ledger node")]
    StartNode {
        #[arg(long, help = "TOML configuration file")]
        config: Option<PathBuf>,
        #[arg(long, help = "Mine continuously, sending rewards to this node's wallet")]
        mine: bool,
    },
    #[command(name = "address", about = "Print this node's wallet address")]
    Address {
        #[arg(long, help = "Key file (created if missing)")]
        key: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_startnode() {
        let opt = Opt::parse_from(["ledger-node", "startnode", "--config", "node.toml", "--mine"]);
        match opt.command {
            Command::StartNode { config, mine } => {
                assert_eq!(config, Some(PathBuf::from("node.toml")));
                assert!(mine);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_address_defaults() {
        let opt = Opt::parse_from(["ledger-node", "address"]);
        assert!(matches!(opt.command, Command::Address { key: None }));
    }
}
