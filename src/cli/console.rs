// Line-oriented operator console for a running node. Each command maps onto
// one node operation; results go to `output`, one item per line.

use crate::error::{BlockchainError, Result};
use crate::network::Server;
use std::io::{BufRead, Write};

const HELP: &str = "commands: chain | block <hash> | tx <id> | utxos [address] | myutxos | \
balance | address | pool | peers | addpeer <host:port> | mine | mineraw <json> | \
minetx <address> <amount> | send <address> <amount> | stop";

/// Read commands from `input` until `stop` or end of input.
/// Returns true if the operator asked the node to stop.
pub fn run_console<R: BufRead, W: Write>(server: &Server, input: R, mut output: W) -> Result<bool> {
    for line in input.lines() {
        let line = line?;
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }
        if words[0] == "stop" {
            server.get_node().stop();
            writeln!(output, "stopping")?;
            return Ok(true);
        }
        match execute(server, &words, &line) {
            Ok(lines) => {
                for text in lines {
                    writeln!(output, "{text}")?;
                }
            }
            Err(e) => writeln!(output, "error: {e}")?,
        }
        output.flush()?;
    }
    Ok(false)
}

fn execute(server: &Server, words: &[&str], line: &str) -> Result<Vec<String>> {
    let node = server.get_node();
    match words {
        ["chain"] => node.get_chain()?.iter().map(to_json).collect(),
        ["block", hash] => match node.get_block_by_hash(hash)? {
            Some(block) => Ok(vec![to_json(&block)?]),
            None => Ok(vec!["not found".to_string()]),
        },
        ["tx", id] => match node.get_transaction_by_id(id)? {
            Some(tx) => Ok(vec![to_json(&tx)?]),
            None => Ok(vec!["not found".to_string()]),
        },
        ["utxos"] => node.get_all_utxos()?.iter().map(to_json).collect(),
        ["utxos", address] => node.get_utxos_by_address(address)?.iter().map(to_json).collect(),
        ["myutxos"] => node.get_my_utxos()?.iter().map(to_json).collect(),
        ["balance"] => Ok(vec![node.get_balance()?.to_string()]),
        ["address"] => Ok(vec![node.get_my_address()]),
        ["pool"] => node.get_pool()?.iter().map(to_json).collect(),
        ["peers"] => Ok(node.list_peer_endpoints()),
        ["addpeer", addr] => {
            server.add_peer(addr)?;
            Ok(vec![format!("connected to {addr}")])
        }
        ["mine"] => Ok(vec![to_json(&node.mine_block()?)?]),
        ["mineraw", ..] => {
            let json = line.trim_start()["mineraw".len()..].trim();
            let data = serde_json::from_str(json)
                .map_err(|e| BlockchainError::InvalidTransaction(format!("Bad block data: {e}")))?;
            Ok(vec![to_json(&node.mine_raw_block(data)?)?])
        }
        ["minetx", address, amount] => {
            let block = node.mine_block_with_transaction(address, parse_amount(amount)?)?;
            Ok(vec![to_json(&block)?])
        }
        ["send", address, amount] => {
            let tx = node.send_transaction(address, parse_amount(amount)?)?;
            Ok(vec![to_json(&tx)?])
        }
        _ => Ok(vec![HELP.to_string()]),
    }
}

fn parse_amount(amount: &str) -> Result<u64> {
    amount
        .parse()
        .map_err(|_| BlockchainError::InvalidTransaction(format!("Invalid amount: {amount}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| BlockchainError::Serialization(format!("Failed to encode output: {e}")))
}
