// This file implements the transaction model: value moves by consuming unspent
// outputs and producing new ones. A transaction is identified by the digest of
// its inputs and outputs, and each input is signed over that identifier.

use crate::core::COINBASE_AMOUNT;
use crate::error::{BlockchainError, Result};
use crate::storage::UTXOSet;
use crate::utils::{
    ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify, public_key_from_pkcs8,
    serialize, sha256_digest,
};
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Hex length of an uncompressed P-256 public key
const ADDRESS_HEX_LEN: usize = 130;

// An input points at an output of an earlier transaction and proves ownership of it
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TxIn {
    pub tx_out_id: String,
    /// Output index; for a coinbase input this carries the block index instead
    pub tx_out_index: u64,
    pub signature: String,
}

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TxOut {
    pub address: String,
    pub amount: u64,
}

impl TxOut {
    pub fn new(address: &str, amount: u64) -> Result<TxOut> {
        if amount == 0 {
            return Err(BlockchainError::InvalidTransaction(
                "Output amount must be positive".to_string(),
            ));
        }
        if !is_valid_address(address) {
            return Err(BlockchainError::InvalidAddress(address.to_string()));
        }
        Ok(TxOut {
            address: address.to_string(),
            amount,
        })
    }
}

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Transaction {
    pub id: String,
    pub tx_ins: Vec<TxIn>,
    pub tx_outs: Vec<TxOut>,
}

impl Transaction {
    /// Build an unsigned transaction; its id is derived from inputs and outputs
    pub fn new(tx_ins: Vec<TxIn>, tx_outs: Vec<TxOut>) -> Result<Transaction> {
        let id = Self::compute_id(&tx_ins, &tx_outs)?;
        Ok(Transaction { id, tx_ins, tx_outs })
    }

    /// The reward-minting transaction for the block at `block_index`
    pub fn new_coinbase(address: &str, block_index: u64) -> Result<Transaction> {
        let tx_in = TxIn {
            tx_out_id: String::new(),
            tx_out_index: block_index,
            signature: String::new(),
        };
        let tx_out = TxOut::new(address, COINBASE_AMOUNT)?;
        Self::new(vec![tx_in], vec![tx_out])
    }

    /// Digest over every input reference and every output; signatures are excluded
    pub fn compute_id(tx_ins: &[TxIn], tx_outs: &[TxOut]) -> Result<String> {
        let inputs: Vec<(String, u64)> = tx_ins
            .iter()
            .map(|tx_in| (tx_in.tx_out_id.clone(), tx_in.tx_out_index))
            .collect();
        let outputs: Vec<(String, u64)> = tx_outs
            .iter()
            .map(|tx_out| (tx_out.address.clone(), tx_out.amount))
            .collect();
        let bytes = serialize(&(inputs, outputs))?;
        Ok(HEXLOWER.encode(&sha256_digest(&bytes)))
    }

    /// Sign every input with `pkcs8`; each referenced output must belong to that key
    pub fn sign(&mut self, pkcs8: &[u8], utxo_set: &UTXOSet) -> Result<()> {
        let signer = HEXLOWER.encode(&public_key_from_pkcs8(pkcs8)?);
        let message = self.id_bytes()?;

        for tx_in in self.tx_ins.iter_mut() {
            let referenced = utxo_set
                .find(&tx_in.tx_out_id, tx_in.tx_out_index)
                .ok_or_else(|| {
                    BlockchainError::InvalidTransaction(format!(
                        "Could not find referenced output {}:{}",
                        tx_in.tx_out_id, tx_in.tx_out_index
                    ))
                })?;
            if referenced.address != signer {
                return Err(BlockchainError::Wallet(
                    "Trying to sign an input with a key that does not own it".to_string(),
                ));
            }
            let signature = ecdsa_p256_sha256_sign_digest(pkcs8, &message)?;
            tx_in.signature = HEXLOWER.encode(&signature);
        }
        Ok(())
    }

    pub fn is_coinbase(&self) -> bool {
        self.tx_ins.len() == 1 && self.tx_ins[0].tx_out_id.is_empty()
    }

    pub fn get_output_value(&self) -> Result<u64> {
        sum_amounts(self.tx_outs.iter().map(|tx_out| tx_out.amount))
    }

    fn id_bytes(&self) -> Result<Vec<u8>> {
        HEXLOWER.decode(self.id.as_bytes()).map_err(|e| {
            BlockchainError::InvalidTransaction(format!("Malformed transaction id: {e}"))
        })
    }
}

fn sum_amounts(amounts: impl Iterator<Item = u64>) -> Result<u64> {
    let mut total = 0u64;
    for amount in amounts {
        total = total
            .checked_add(amount)
            .ok_or_else(|| BlockchainError::InvalidTransaction("Amount overflow".to_string()))?;
    }
    Ok(total)
}

/// An address is an uncompressed P-256 public key in lowercase hex
pub fn is_valid_address(address: &str) -> bool {
    address.len() == ADDRESS_HEX_LEN
        && address.starts_with("04")
        && address
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn validate_structure(tx: &Transaction) -> Result<()> {
    if tx.tx_ins.is_empty() {
        return Err(BlockchainError::InvalidTransaction(format!(
            "Transaction {} has no inputs",
            tx.id
        )));
    }
    if tx.tx_outs.is_empty() {
        return Err(BlockchainError::InvalidTransaction(format!(
            "Transaction {} has no outputs",
            tx.id
        )));
    }
    for tx_out in &tx.tx_outs {
        if tx_out.amount == 0 {
            return Err(BlockchainError::InvalidTransaction(format!(
                "Transaction {} has a zero-amount output",
                tx.id
            )));
        }
        if !is_valid_address(&tx_out.address) {
            return Err(BlockchainError::InvalidAddress(tx_out.address.clone()));
        }
    }

    let expected_id = Transaction::compute_id(&tx.tx_ins, &tx.tx_outs)?;
    if expected_id != tx.id {
        return Err(BlockchainError::InvalidTransaction(format!(
            "Invalid transaction id: {}",
            tx.id
        )));
    }
    Ok(())
}

/// Check a regular (non-coinbase) transaction against the spendable outputs
pub fn validate_transaction(tx: &Transaction, utxo_set: &UTXOSet) -> Result<()> {
    validate_structure(tx)?;

    let mut seen = HashSet::new();
    for tx_in in &tx.tx_ins {
        if !seen.insert((tx_in.tx_out_id.as_str(), tx_in.tx_out_index)) {
            return Err(BlockchainError::InvalidTransaction(format!(
                "Transaction {} spends {}:{} twice",
                tx.id, tx_in.tx_out_id, tx_in.tx_out_index
            )));
        }
    }

    let message = tx.id_bytes()?;
    let mut referenced_amounts = Vec::with_capacity(tx.tx_ins.len());
    for tx_in in &tx.tx_ins {
        let referenced = utxo_set
            .find(&tx_in.tx_out_id, tx_in.tx_out_index)
            .ok_or_else(|| {
                BlockchainError::InvalidTransaction(format!(
                    "Referenced output not found: {}:{}",
                    tx_in.tx_out_id, tx_in.tx_out_index
                ))
            })?;

        let public_key = HEXLOWER
            .decode(referenced.address.as_bytes())
            .map_err(|e| BlockchainError::InvalidAddress(format!("{}: {e}", referenced.address)))?;
        let signature = HEXLOWER.decode(tx_in.signature.as_bytes()).map_err(|e| {
            BlockchainError::InvalidTransaction(format!("Malformed signature: {e}"))
        })?;
        if !ecdsa_p256_sha256_sign_verify(&public_key, &signature, &message) {
            return Err(BlockchainError::InvalidTransaction(format!(
                "Invalid signature for input {}:{} of transaction {}",
                tx_in.tx_out_id, tx_in.tx_out_index, tx.id
            )));
        }
        referenced_amounts.push(referenced.amount);
    }

    let total_in = sum_amounts(referenced_amounts.into_iter())?;
    let total_out = tx.get_output_value()?;
    if total_in != total_out {
        return Err(BlockchainError::InvalidTransaction(format!(
            "Unbalanced transaction {}: inputs={total_in}, outputs={total_out}",
            tx.id
        )));
    }
    Ok(())
}

pub fn is_valid_transaction(tx: &Transaction, utxo_set: &UTXOSet) -> bool {
    match validate_transaction(tx, utxo_set) {
        Ok(()) => true,
        Err(e) => {
            log::debug!("Rejected transaction {}: {e}", tx.id);
            false
        }
    }
}

/// The coinbase must carry `block_index` as its marker and mint exactly the reward
pub fn validate_coinbase(tx: &Transaction, block_index: u64) -> Result<()> {
    validate_structure(tx)?;
    if tx.tx_ins.len() != 1 {
        return Err(BlockchainError::InvalidTransaction(
            "Coinbase transaction must have exactly one input".to_string(),
        ));
    }
    if !tx.tx_ins[0].tx_out_id.is_empty() {
        return Err(BlockchainError::InvalidTransaction(
            "Coinbase input must not reference an output".to_string(),
        ));
    }
    if tx.tx_ins[0].tx_out_index != block_index {
        return Err(BlockchainError::InvalidTransaction(format!(
            "Coinbase marker {} does not match block index {block_index}",
            tx.tx_ins[0].tx_out_index
        )));
    }
    if tx.tx_outs.len() != 1 {
        return Err(BlockchainError::InvalidTransaction(
            "Coinbase transaction must have exactly one output".to_string(),
        ));
    }
    if tx.tx_outs[0].amount != COINBASE_AMOUNT {
        return Err(BlockchainError::InvalidTransaction(format!(
            "Coinbase amount {} differs from reward {COINBASE_AMOUNT}",
            tx.tx_outs[0].amount
        )));
    }
    Ok(())
}

/// Exactly one leading coinbase, every other transaction valid, no output spent twice
pub fn validate_block_transactions(
    transactions: &[Transaction],
    utxo_set: &UTXOSet,
    block_index: u64,
) -> Result<()> {
    let coinbase = transactions.first().ok_or_else(|| {
        BlockchainError::InvalidTransaction("Block has no coinbase transaction".to_string())
    })?;
    validate_coinbase(coinbase, block_index)?;

    let mut spent = HashSet::new();
    for tx_in in transactions.iter().flat_map(|tx| tx.tx_ins.iter()) {
        if !spent.insert((tx_in.tx_out_id.as_str(), tx_in.tx_out_index)) {
            return Err(BlockchainError::InvalidTransaction(format!(
                "Double spend in block {block_index}: {}:{}",
                tx_in.tx_out_id, tx_in.tx_out_index
            )));
        }
    }

    for tx in &transactions[1..] {
        validate_transaction(tx, utxo_set)?;
    }
    Ok(())
}
