use crate::core::{Block, Transaction};
use crate::error::{BlockchainError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A spendable output, keyed by the transaction that produced it and its position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnspentTxOut {
    pub tx_out_id: String,
    pub tx_out_index: u64,
    pub address: String,
    pub amount: u64,
}

/// ( K -> (tx_out_id, tx_out_index), V => UnspentTxOut )
///
/// The set is a value derived from a chain. Applying a block yields a new set
/// and leaves the old one untouched, so a failed block never leaves a half
/// applied state behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UTXOSet {
    entries: BTreeMap<(String, u64), UnspentTxOut>,
}

impl UTXOSet {
    pub fn new() -> UTXOSet {
        UTXOSet {
            entries: BTreeMap::new(),
        }
    }

    /// Fold every block of `chain`, genesis included
    pub fn from_chain(chain: &[Block]) -> Result<UTXOSet> {
        chain.iter().try_fold(UTXOSet::new(), |utxos, block| {
            utxos.process_block(&block.data, block.index)
        })
    }

    /// Consume every referenced output and add every produced one.
    ///
    /// Fails when an input references an entry that is not present, which is
    /// how a double spend across blocks surfaces.
    pub fn process_block(&self, transactions: &[Transaction], block_index: u64) -> Result<UTXOSet> {
        let mut entries = self.entries.clone();

        for tx in transactions {
            if tx.is_coinbase() {
                continue;
            }
            for tx_in in &tx.tx_ins {
                let key = (tx_in.tx_out_id.clone(), tx_in.tx_out_index);
                if entries.remove(&key).is_none() {
                    return Err(BlockchainError::InvalidTransaction(format!(
                        "Block {block_index} spends missing output {}:{}",
                        tx_in.tx_out_id, tx_in.tx_out_index
                    )));
                }
            }
        }

        for tx in transactions {
            for (index, tx_out) in tx.tx_outs.iter().enumerate() {
                let utxo = UnspentTxOut {
                    tx_out_id: tx.id.clone(),
                    tx_out_index: index as u64,
                    address: tx_out.address.clone(),
                    amount: tx_out.amount,
                };
                entries.insert((tx.id.clone(), index as u64), utxo);
            }
        }

        Ok(UTXOSet { entries })
    }

    pub fn find(&self, tx_out_id: &str, tx_out_index: u64) -> Option<&UnspentTxOut> {
        self.entries.get(&(tx_out_id.to_string(), tx_out_index))
    }

    pub fn contains(&self, tx_out_id: &str, tx_out_index: u64) -> bool {
        self.find(tx_out_id, tx_out_index).is_some()
    }

    pub fn find_by_address(&self, address: &str) -> Vec<UnspentTxOut> {
        self.entries
            .values()
            .filter(|utxo| utxo.address == address)
            .cloned()
            .collect()
    }

    pub fn get_balance(&self, address: &str) -> u64 {
        self.entries
            .values()
            .filter(|utxo| utxo.address == address)
            .map(|utxo| utxo.amount)
            .sum()
    }

    pub fn total_amount(&self) -> u64 {
        self.entries.values().map(|utxo| utxo.amount).sum()
    }

    pub fn to_vec(&self) -> Vec<UnspentTxOut> {
        self.entries.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{TxIn, TxOut, COINBASE_AMOUNT, GENESIS_BLOCK};
    use crate::wallet::Wallet;

    #[test]
    fn test_genesis_set_holds_one_reward() {
        let utxos = UTXOSet::from_chain(std::slice::from_ref(&*GENESIS_BLOCK)).unwrap();
        assert_eq!(utxos.len(), 1);
        assert_eq!(utxos.total_amount(), COINBASE_AMOUNT);
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let miner = Wallet::generate().unwrap();
        let chain: Vec<Block> = vec![GENESIS_BLOCK.clone()];
        let first = UTXOSet::from_chain(&chain).unwrap();
        let second = UTXOSet::from_chain(&chain).unwrap();
        assert_eq!(first, second);

        let coinbase = Transaction::new_coinbase(&miner.get_address(), 1).unwrap();
        let next = first.process_block(&[coinbase], 1).unwrap();
        assert_eq!(next.total_amount(), 2 * COINBASE_AMOUNT);
        assert_eq!(next.get_balance(&miner.get_address()), COINBASE_AMOUNT);
        // the original set is left as it was
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn test_spending_missing_output_fails() {
        let wallet = Wallet::generate().unwrap();
        let coinbase = Transaction::new_coinbase(&wallet.get_address(), 1).unwrap();
        let utxos = UTXOSet::new().process_block(&[coinbase.clone()], 1).unwrap();

        let spend = Transaction::new(
            vec![TxIn {
                tx_out_id: coinbase.id.clone(),
                tx_out_index: 0,
                signature: String::new(),
            }],
            vec![TxOut::new(&wallet.get_address(), COINBASE_AMOUNT).unwrap()],
        )
        .unwrap();

        let after = utxos.process_block(&[spend.clone()], 2).unwrap();
        assert!(!after.contains(&coinbase.id, 0));
        assert!(after.contains(&spend.id, 0));

        // the same output cannot be consumed again
        assert!(after.process_block(&[spend], 3).is_err());
    }
}
