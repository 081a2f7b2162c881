// Reconciliation rules: how each incoming message changes the local ledger
// and what, if anything, goes back to the sender.

use crate::core::{Block, Transaction};
use crate::network::Message;
use crate::node::Node;
use log::{debug, error, info, warn};

/// Apply `message` to `node` and return the reply for the sender, if any.
///
/// Failures caused by peer data are logged and dropped; the ledger is left
/// as it was.
pub fn handle_message(node: &Node, message: Message) -> Option<Message> {
    match message {
        Message::QueryLatestBlock => match node.get_latest_block() {
            Ok(block) => Some(Message::ResponseBlocks(vec![block])),
            Err(e) => {
                error!("Cannot answer latest block query: {e}");
                None
            }
        },
        Message::QueryAllBlocks => match node.get_chain() {
            Ok(chain) => Some(Message::ResponseBlocks(chain)),
            Err(e) => {
                error!("Cannot answer chain query: {e}");
                None
            }
        },
        Message::QueryTransactionPool => match node.get_pool() {
            Ok(pool) => Some(Message::ResponseTransactionPool(pool)),
            Err(e) => {
                error!("Cannot answer pool query: {e}");
                None
            }
        },
        Message::ResponseBlocks(blocks) => handle_blocks(node, blocks),
        Message::NewBlock(block) => handle_blocks(node, vec![block]),
        Message::ResponseTransactionPool(txs) => {
            handle_transactions(node, txs);
            None
        }
        Message::NewTransaction(tx) => {
            handle_transactions(node, vec![tx]);
            None
        }
    }
}

fn handle_blocks(node: &Node, blocks: Vec<Block>) -> Option<Message> {
    let received = match blocks.last() {
        Some(block) => block.clone(),
        None => {
            debug!("Received an empty block list");
            return None;
        }
    };
    let local = match node.get_latest_block() {
        Ok(block) => block,
        Err(e) => {
            error!("Cannot read local tip: {e}");
            return None;
        }
    };
    // a full chain is weighed regardless of its length
    if blocks.len() > 1 {
        return match node.accept_chain(blocks) {
            Ok(true) => {
                node.broadcast(&Message::NewBlock(received));
                None
            }
            Ok(false) => None,
            Err(e) => {
                error!("Chain replacement failed: {e}");
                None
            }
        };
    }

    if received.hash == local.hash || received.index < local.index {
        debug!(
            "Received tip {} is not ahead of local tip {}",
            received.index, local.index
        );
        return None;
    }
    if received.index == local.index {
        info!(
            "Received a competing block at height {}, requesting full chain",
            received.index
        );
        return Some(Message::QueryAllBlocks);
    }

    if received.previous_hash != local.hash || received.index != local.index + 1 {
        info!(
            "Received block {} does not extend local tip {}, requesting full chain",
            received.index, local.index
        );
        return Some(Message::QueryAllBlocks);
    }

    match node.accept_block(received.clone()) {
        Ok(()) => {
            info!("Appended block {} received from peer", received.index);
            node.broadcast(&Message::NewBlock(received));
            None
        }
        Err(e) => {
            warn!("Received block {} rejected ({e}), requesting full chain", received.index);
            Some(Message::QueryAllBlocks)
        }
    }
}

fn handle_transactions(node: &Node, txs: Vec<Transaction>) {
    for tx in txs {
        let id = tx.id.clone();
        match node.accept_transaction(tx.clone()) {
            Ok(()) => {
                info!("Pooled transaction {id} received from peer");
                node.broadcast(&Message::NewTransaction(tx));
            }
            Err(e) => debug!("Dropped transaction {id}: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Blockchain, ProofOfWork};
    use crate::network::PeerRegistry;
    use crate::utils::current_timestamp;
    use crate::wallet::Wallet;
    use std::sync::Arc;

    fn new_node() -> Node {
        Node::new(Wallet::generate().unwrap(), Arc::new(PeerRegistry::new())).unwrap()
    }

    #[test]
    fn test_queries_are_answered() {
        let node = new_node();
        node.mine_block().unwrap();

        match handle_message(&node, Message::QueryLatestBlock) {
            Some(Message::ResponseBlocks(blocks)) => assert_eq!(blocks[0].index, 1),
            other => panic!("unexpected reply {other:?}"),
        }
        match handle_message(&node, Message::QueryAllBlocks) {
            Some(Message::ResponseBlocks(blocks)) => assert_eq!(blocks.len(), 2),
            other => panic!("unexpected reply {other:?}"),
        }
        assert_eq!(
            handle_message(&node, Message::QueryTransactionPool),
            Some(Message::ResponseTransactionPool(vec![]))
        );
    }

    #[test]
    fn test_successor_block_is_appended() {
        let local = new_node();
        let remote = new_node();
        let block = remote.mine_block().unwrap();

        assert_eq!(handle_message(&local, Message::NewBlock(block.clone())), None);
        assert_eq!(local.get_latest_block().unwrap(), block);
    }

    #[test]
    fn test_block_far_ahead_requests_full_chain() {
        let local = new_node();
        let remote = new_node();
        remote.mine_block().unwrap();
        let tip = remote.mine_block().unwrap();

        assert_eq!(
            handle_message(&local, Message::ResponseBlocks(vec![tip])),
            Some(Message::QueryAllBlocks)
        );
        let chain = remote.get_chain().unwrap();
        assert_eq!(handle_message(&local, Message::ResponseBlocks(chain.clone())), None);
        assert_eq!(local.get_chain().unwrap(), chain);
    }

    #[test]
    fn test_invalid_successor_falls_back_to_full_chain() {
        let local = new_node();
        let genesis = local.get_latest_block().unwrap();

        // links correctly but carries no coinbase
        let template = Block::new_template(1, genesis.hash, current_timestamp().unwrap(), vec![], 0);
        let bogus = ProofOfWork::mine(template, || false).unwrap().unwrap();
        assert_eq!(
            handle_message(&local, Message::NewBlock(bogus)),
            Some(Message::QueryAllBlocks)
        );
        assert_eq!(local.get_chain().unwrap().len(), 1);
    }

    #[test]
    fn test_stale_blocks_are_ignored() {
        let local = new_node();
        local.mine_block().unwrap();
        let genesis = local.get_chain().unwrap()[0].clone();

        assert_eq!(handle_message(&local, Message::ResponseBlocks(vec![])), None);
        assert_eq!(handle_message(&local, Message::NewBlock(genesis)), None);
        assert_eq!(local.get_chain().unwrap().len(), 2);
    }

    fn build_chain(length: usize, spacing: i64) -> Vec<Block> {
        let miner = Wallet::generate().unwrap();
        let mut chain = Blockchain::new().unwrap();
        while chain.get_blocks().len() < length {
            let latest = chain.get_latest_block().clone();
            let coinbase = Transaction::new_coinbase(&miner.get_address(), latest.index + 1).unwrap();
            let template = chain.next_block_template(vec![coinbase], latest.timestamp + spacing);
            chain
                .add_block(ProofOfWork::mine(template, || false).unwrap().unwrap())
                .unwrap();
        }
        chain.get_blocks().to_vec()
    }

    #[test]
    fn test_heavier_chain_of_equal_length_is_adopted() {
        let local = new_node();
        // compressed timestamps raise difficulty at the first retarget
        let heavy = build_chain(12, 1);
        let light = build_chain(12, 10);
        assert!(local.accept_chain(light.clone()).unwrap());

        // a competing tip at the same height asks for the whole chain
        assert_eq!(
            handle_message(&local, Message::NewBlock(heavy[11].clone())),
            Some(Message::QueryAllBlocks)
        );
        assert_eq!(handle_message(&local, Message::ResponseBlocks(heavy.clone())), None);
        assert_eq!(local.get_chain().unwrap(), heavy);

        assert_eq!(handle_message(&local, Message::ResponseBlocks(light)), None);
        assert_eq!(local.get_chain().unwrap(), heavy);
        // the same tip again is not a fork
        assert_eq!(handle_message(&local, Message::NewBlock(heavy[11].clone())), None);
    }

    #[test]
    fn test_pool_response_drops_invalid_transactions() {
        let sender = new_node();
        let local = new_node();
        let receiver = Wallet::generate().unwrap();

        let block = sender.mine_block().unwrap();
        handle_message(&local, Message::NewBlock(block));
        let tx = sender.send_transaction(&receiver.get_address(), 5).unwrap();
        let mut forged = tx.clone();
        forged.tx_outs[0].amount = 6;

        handle_message(&local, Message::ResponseTransactionPool(vec![forged, tx.clone()]));
        assert_eq!(local.get_pool().unwrap(), vec![tx]);
    }
}
