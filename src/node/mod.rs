//! The running node
//!
//! `Node` owns the ledger behind a single mutex together with the wallet,
//! the peer registry used for gossip and the optional chain store. Every
//! ledger mutation goes through it, so a locally mined block and a block
//! received from a peer can never interleave.

use crate::core::{Block, Blockchain, ProofOfWork, Transaction};
use crate::error::{BlockchainError, Result};
use crate::network::{Message, PeerRegistry};
use crate::storage::{ChainStore, UnspentTxOut};
use crate::utils::current_timestamp;
use crate::wallet::{create_transaction, Wallet};
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

pub struct Node {
    ledger: Mutex<Blockchain>,
    wallet: Wallet,
    peers: Arc<PeerRegistry>,
    store: Option<ChainStore>,
    // bumped on every tip change; an in-flight search started under an older value is stale
    tip_epoch: AtomicU64,
    stopped: AtomicBool,
}

impl Node {
    /// A node starting from genesis with nothing persisted
    pub fn new(wallet: Wallet, peers: Arc<PeerRegistry>) -> Result<Node> {
        Ok(Node::with_ledger(Blockchain::new()?, wallet, peers, None))
    }

    /// A node backed by `store`: the stored chain is reloaded if it still validates
    pub fn open(wallet: Wallet, peers: Arc<PeerRegistry>, store: ChainStore) -> Result<Node> {
        let ledger = match store.load_chain()? {
            Some(blocks) => {
                let length = blocks.len();
                match Blockchain::from_blocks(blocks) {
                    Ok(ledger) => {
                        info!("Loaded chain of {length} blocks from store");
                        ledger
                    }
                    Err(e) => {
                        warn!("Stored chain is invalid, starting from genesis: {e}");
                        Blockchain::new()?
                    }
                }
            }
            None => Blockchain::new()?,
        };
        store.save_chain(ledger.get_blocks())?;
        Ok(Node::with_ledger(ledger, wallet, peers, Some(store)))
    }

    fn with_ledger(
        ledger: Blockchain,
        wallet: Wallet,
        peers: Arc<PeerRegistry>,
        store: Option<ChainStore>,
    ) -> Node {
        Node {
            ledger: Mutex::new(ledger),
            wallet,
            peers,
            store,
            tip_epoch: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        }
    }

    fn ledger(&self) -> Result<MutexGuard<'_, Blockchain>> {
        self.ledger
            .lock()
            .map_err(|_| BlockchainError::Lock("Ledger lock poisoned".to_string()))
    }

    /// Record a tip change made while holding the ledger lock
    fn on_tip_changed(&self, ledger: &Blockchain) {
        self.tip_epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(store) = &self.store {
            if let Err(e) = store.save_chain(ledger.get_blocks()) {
                error!("Failed to persist chain: {e}");
            }
        }
    }

    pub fn peers(&self) -> &Arc<PeerRegistry> {
        &self.peers
    }

    pub fn broadcast(&self, message: &Message) {
        self.peers.broadcast(message);
    }

    pub fn get_chain(&self) -> Result<Vec<Block>> {
        Ok(self.ledger()?.get_blocks().to_vec())
    }

    pub fn get_latest_block(&self) -> Result<Block> {
        Ok(self.ledger()?.get_latest_block().clone())
    }

    pub fn get_block_by_hash(&self, hash: &str) -> Result<Option<Block>> {
        Ok(self.ledger()?.get_block_by_hash(hash).cloned())
    }

    pub fn get_transaction_by_id(&self, id: &str) -> Result<Option<Transaction>> {
        Ok(self.ledger()?.find_transaction(id).cloned())
    }

    pub fn get_utxos_by_address(&self, address: &str) -> Result<Vec<UnspentTxOut>> {
        Ok(self.ledger()?.get_utxo_set().find_by_address(address))
    }

    pub fn get_all_utxos(&self) -> Result<Vec<UnspentTxOut>> {
        Ok(self.ledger()?.get_utxo_set().to_vec())
    }

    pub fn get_my_utxos(&self) -> Result<Vec<UnspentTxOut>> {
        self.get_utxos_by_address(&self.get_my_address())
    }

    pub fn get_my_address(&self) -> String {
        self.wallet.get_address()
    }

    /// Balance of this node's wallet
    pub fn get_balance(&self) -> Result<u64> {
        Ok(self.ledger()?.get_utxo_set().get_balance(&self.get_my_address()))
    }

    pub fn get_pool(&self) -> Result<Vec<Transaction>> {
        Ok(self.ledger()?.get_pool().get_all())
    }

    pub fn list_peer_endpoints(&self) -> Vec<String> {
        self.peers.endpoints()
    }

    /// Mine a block carrying exactly `data`, coinbase included
    pub fn mine_raw_block(&self, data: Vec<Transaction>) -> Result<Block> {
        self.mine_with(|_, _| Ok(data))
    }

    /// Mine a block paying the reward to this node plus every pooled transaction
    pub fn mine_block(&self) -> Result<Block> {
        let address = self.get_my_address();
        self.mine_with(|ledger, index| {
            let mut data = vec![Transaction::new_coinbase(&address, index)?];
            data.extend(ledger.get_pool().get_all());
            Ok(data)
        })
    }

    /// Mine a block paying the reward to this node and `amount` to `receiver`
    pub fn mine_block_with_transaction(&self, receiver: &str, amount: u64) -> Result<Block> {
        let address = self.get_my_address();
        self.mine_with(|ledger, index| {
            let coinbase = Transaction::new_coinbase(&address, index)?;
            let tx = create_transaction(
                receiver,
                amount,
                &self.wallet,
                ledger.get_utxo_set(),
                ledger.get_pool(),
            )?;
            Ok(vec![coinbase, tx])
        })
    }

    /// Build the block contents under the lock, search without it, then
    /// apply the result through the same validation a peer block gets.
    fn mine_with<F>(&self, build: F) -> Result<Block>
    where
        F: FnOnce(&Blockchain, u64) -> Result<Vec<Transaction>>,
    {
        let (template, epoch) = {
            let ledger = self.ledger()?;
            let index = ledger.get_latest_block().index + 1;
            let data = build(&ledger, index)?;
            let template = ledger.next_block_template(data, current_timestamp()?);
            (template, self.tip_epoch.load(Ordering::SeqCst))
        };
        self.mine_template(template, epoch)
    }

    /// Search for `template`'s nonce and apply it, unless the tip moves past
    /// `epoch` or the node stops first.
    fn mine_template(&self, template: Block, epoch: u64) -> Result<Block> {
        info!(
            "Mining block {} at difficulty {}",
            template.index, template.difficulty
        );
        let block = ProofOfWork::mine(template, || {
            self.stopped.load(Ordering::SeqCst) || self.tip_epoch.load(Ordering::SeqCst) != epoch
        })?
        .ok_or_else(|| {
            BlockchainError::Mining("could not generate block: chain tip moved".to_string())
        })?;

        {
            let mut ledger = self.ledger()?;
            ledger
                .add_block(block.clone())
                .map_err(|e| BlockchainError::Mining(format!("could not generate block: {e}")))?;
            self.on_tip_changed(&ledger);
        }
        info!("Mined block {} at index {}", block.hash, block.index);
        self.broadcast(&Message::NewBlock(block.clone()));
        Ok(block)
    }

    /// Pay `amount` to `receiver` through the pool and gossip the transaction
    pub fn send_transaction(&self, receiver: &str, amount: u64) -> Result<Transaction> {
        let tx = {
            let mut ledger = self.ledger()?;
            let tx = create_transaction(
                receiver,
                amount,
                &self.wallet,
                ledger.get_utxo_set(),
                ledger.get_pool(),
            )?;
            ledger.add_to_pool(tx.clone())?;
            tx
        };
        info!("Accepted local transaction {}", tx.id);
        self.broadcast(&Message::NewTransaction(tx.clone()));
        Ok(tx)
    }

    /// Append a block received from a peer on top of the local tip
    pub fn accept_block(&self, block: Block) -> Result<()> {
        let mut ledger = self.ledger()?;
        ledger.add_block(block)?;
        self.on_tip_changed(&ledger);
        Ok(())
    }

    /// Adopt a received chain if it is valid and heavier. Returns whether it was adopted.
    pub fn accept_chain(&self, blocks: Vec<Block>) -> Result<bool> {
        let mut ledger = self.ledger()?;
        let replaced = ledger.replace_chain(blocks);
        if replaced {
            self.on_tip_changed(&ledger);
        }
        Ok(replaced)
    }

    pub fn accept_transaction(&self, tx: Transaction) -> Result<()> {
        self.ledger()?.add_to_pool(tx)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Cancel any running search and close every peer connection
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Stopping node");
        self.peers.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::COINBASE_AMOUNT;
    use std::thread;
    use tempfile::TempDir;

    fn new_node() -> Node {
        Node::new(Wallet::generate().unwrap(), Arc::new(PeerRegistry::new())).unwrap()
    }

    #[test]
    fn test_mine_and_query() {
        let node = new_node();
        let block = node.mine_block().unwrap();

        assert_eq!(block.index, 1);
        assert_eq!(node.get_chain().unwrap().len(), 2);
        assert_eq!(node.get_balance().unwrap(), COINBASE_AMOUNT);
        assert_eq!(node.get_block_by_hash(&block.hash).unwrap(), Some(block.clone()));
        let coinbase_id = &block.data[0].id;
        assert!(node.get_transaction_by_id(coinbase_id).unwrap().is_some());
        assert_eq!(node.get_my_utxos().unwrap().len(), 1);
        assert_eq!(node.get_all_utxos().unwrap().len(), 2);
    }

    #[test]
    fn test_send_then_mine() {
        let node = new_node();
        let receiver = Wallet::generate().unwrap();
        node.mine_block().unwrap();

        let tx = node.send_transaction(&receiver.get_address(), 20).unwrap();
        assert_eq!(node.get_pool().unwrap(), vec![tx]);
        // pooled outputs are not offered twice
        assert!(matches!(
            node.send_transaction(&receiver.get_address(), 40),
            Err(BlockchainError::InsufficientFunds { .. })
        ));

        node.mine_block().unwrap();
        assert!(node.get_pool().unwrap().is_empty());
        assert_eq!(node.get_utxos_by_address(&receiver.get_address()).unwrap().len(), 1);
        assert_eq!(node.get_balance().unwrap(), 2 * COINBASE_AMOUNT - 20);
    }

    #[test]
    fn test_mine_block_with_transaction() {
        let node = new_node();
        let receiver = Wallet::generate().unwrap();
        node.mine_block().unwrap();

        let block = node
            .mine_block_with_transaction(&receiver.get_address(), 35)
            .unwrap();
        assert_eq!(block.data.len(), 2);
        assert_eq!(
            node.get_utxos_by_address(&receiver.get_address()).unwrap()[0].amount,
            35
        );
    }

    #[test]
    fn test_invalid_raw_block_is_a_mining_error() {
        let node = new_node();
        let result = node.mine_raw_block(vec![]);
        assert!(matches!(result, Err(BlockchainError::Mining(_))));
        assert_eq!(node.get_chain().unwrap().len(), 1);
    }

    #[test]
    fn test_stopped_node_cannot_mine() {
        let node = new_node();
        node.stop();
        assert!(node.is_stopped());
        assert!(matches!(node.mine_block(), Err(BlockchainError::Mining(_))));
    }

    #[test]
    fn test_adopted_chain_cancels_mining() {
        let node = Arc::new(new_node());
        let other = new_node();
        other.mine_block().unwrap();
        other.mine_block().unwrap();

        let (template, epoch) = {
            let ledger = node.ledger().unwrap();
            let coinbase = Transaction::new_coinbase(&node.get_my_address(), 1).unwrap();
            let mut template =
                ledger.next_block_template(vec![coinbase], current_timestamp().unwrap());
            // no hash meets this target, so only cancellation ends the search
            template.difficulty = 256;
            (template, node.tip_epoch.load(Ordering::SeqCst))
        };
        let miner = {
            let node = Arc::clone(&node);
            thread::spawn(move || node.mine_template(template, epoch))
        };

        assert!(node.accept_chain(other.get_chain().unwrap()).unwrap());
        let result = miner.join().unwrap();
        assert!(
            matches!(&result, Err(BlockchainError::Mining(msg)) if msg.contains("chain tip moved")),
            "unexpected result {result:?}"
        );
        assert_eq!(node.get_chain().unwrap(), other.get_chain().unwrap());
        assert!(!node.is_stopped());
    }

    #[test]
    fn test_accepted_peer_block_moves_the_epoch() {
        let node = new_node();
        let other = new_node();
        let before = node.tip_epoch.load(Ordering::SeqCst);

        node.accept_block(other.mine_block().unwrap()).unwrap();
        assert_eq!(node.tip_epoch.load(Ordering::SeqCst), before + 1);
        // a rejected chain leaves the tip and the epoch alone
        assert!(!node.accept_chain(vec![]).unwrap());
        assert_eq!(node.tip_epoch.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    fn test_chain_survives_restart() {
        let temp_dir = TempDir::new().unwrap();
        let wallet = Wallet::generate().unwrap();
        let mined = {
            let store = ChainStore::open(temp_dir.path()).unwrap();
            let node = Node::open(wallet.clone(), Arc::new(PeerRegistry::new()), store).unwrap();
            node.mine_block().unwrap();
            node.mine_block().unwrap();
            node.get_chain().unwrap()
        };

        let store = ChainStore::open(temp_dir.path()).unwrap();
        let node = Node::open(wallet, Arc::new(PeerRegistry::new()), store).unwrap();
        assert_eq!(node.get_chain().unwrap(), mined);
        assert_eq!(node.get_balance().unwrap(), 2 * COINBASE_AMOUNT);
    }
}
