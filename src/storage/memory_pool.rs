use crate::core::{validate_transaction, Transaction};
use crate::error::{BlockchainError, Result};
use crate::storage::UTXOSet;

/// Validated transactions waiting for a block, in arrival order
#[derive(Debug, Clone, Default)]
pub struct MemoryPool {
    inner: Vec<Transaction>,
}

impl MemoryPool {
    pub fn new() -> MemoryPool {
        MemoryPool { inner: Vec::new() }
    }

    pub fn get(&self, txid: &str) -> Option<&Transaction> {
        self.inner.iter().find(|tx| tx.id == txid)
    }

    pub fn contains(&self, txid: &str) -> bool {
        self.get(txid).is_some()
    }

    /// True if some pooled transaction already spends output `tx_out_id:tx_out_index`
    pub fn spends(&self, tx_out_id: &str, tx_out_index: u64) -> bool {
        self.inner
            .iter()
            .flat_map(|tx| tx.tx_ins.iter())
            .any(|pooled| pooled.tx_out_id == tx_out_id && pooled.tx_out_index == tx_out_index)
    }

    /// Admit `tx` if it is valid against `utxo_set` and races no pooled spend
    pub fn add(&mut self, tx: Transaction, utxo_set: &UTXOSet) -> Result<()> {
        if tx.is_coinbase() {
            return Err(BlockchainError::InvalidTransaction(
                "Coinbase transactions cannot be pooled".to_string(),
            ));
        }
        if self.contains(&tx.id) {
            return Err(BlockchainError::InvalidTransaction(format!(
                "Transaction {} is already pooled",
                tx.id
            )));
        }
        validate_transaction(&tx, utxo_set)?;
        if let Some(tx_in) = tx
            .tx_ins
            .iter()
            .find(|tx_in| self.spends(&tx_in.tx_out_id, tx_in.tx_out_index))
        {
            return Err(BlockchainError::InvalidTransaction(format!(
                "Output {}:{} is already spent by a pooled transaction",
                tx_in.tx_out_id, tx_in.tx_out_index
            )));
        }

        log::debug!("Pooled transaction {}", tx.id);
        self.inner.push(tx);
        Ok(())
    }

    /// Evict every transaction that no longer fully resolves against `utxo_set`
    pub fn update(&mut self, utxo_set: &UTXOSet) {
        self.inner.retain(|tx| {
            let resolves = tx
                .tx_ins
                .iter()
                .all(|tx_in| utxo_set.contains(&tx_in.tx_out_id, tx_in.tx_out_index));
            if !resolves {
                log::debug!("Evicting transaction {} from pool", tx.id);
            }
            resolves
        });
    }

    pub fn get_all(&self) -> Vec<Transaction> {
        self.inner.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
