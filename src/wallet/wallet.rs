use crate::core::{is_valid_address, Transaction, TxIn, TxOut};
use crate::error::{BlockchainError, Result};
use crate::storage::{MemoryPool, UTXOSet};
use crate::utils::{deserialize, new_key_pair, public_key_from_pkcs8, serialize};
use data_encoding::HEXLOWER;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use zeroize::ZeroizeOnDrop;

/// The node's single key pair; its address is the hex public key
#[derive(Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode, ZeroizeOnDrop)]
pub struct Wallet {
    pkcs8: Vec<u8>,
    #[zeroize(skip)]
    public_key: Vec<u8>,
}

impl Wallet {
    pub fn generate() -> Result<Wallet> {
        let pkcs8 = new_key_pair()?;
        let public_key = public_key_from_pkcs8(&pkcs8)?;
        Ok(Wallet { pkcs8, public_key })
    }

    /// Reuse the key stored at `path`, or create one there on first start
    pub fn load_or_generate(path: &Path) -> Result<Wallet> {
        if path.exists() {
            let wallet = Self::load_from_file(path)?;
            info!("Loaded wallet key from {}", path.display());
            return Ok(wallet);
        }

        let wallet = Self::generate()?;
        wallet.save_to_file(path)?;
        info!("Generated new wallet key at {}", path.display());
        Ok(wallet)
    }

    fn load_from_file(path: &Path) -> Result<Wallet> {
        let mut file = File::open(path)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        let wallet: Wallet = deserialize(&buf)?;

        if public_key_from_pkcs8(&wallet.pkcs8)? != wallet.public_key {
            return Err(BlockchainError::Wallet(format!(
                "Key file {} is corrupt",
                path.display()
            )));
        }
        Ok(wallet)
    }

    fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&serialize(self)?)?;
        writer.flush()?;
        Ok(())
    }

    pub fn get_address(&self) -> String {
        HEXLOWER.encode(&self.public_key)
    }

    pub fn get_public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }

    pub fn get_pkcs8(&self) -> &[u8] {
        self.pkcs8.as_slice()
    }
}

pub fn get_balance(address: &str, utxo_set: &UTXOSet) -> u64 {
    utxo_set.get_balance(address)
}

/// Pay `amount` to `receiver` from `wallet`'s outputs.
///
/// Outputs already spent by pooled transactions are skipped. Outputs are
/// taken in order until they cover `amount`; any excess returns to the
/// sender as change.
pub fn create_transaction(
    receiver: &str,
    amount: u64,
    wallet: &Wallet,
    utxo_set: &UTXOSet,
    pool: &MemoryPool,
) -> Result<Transaction> {
    if !is_valid_address(receiver) {
        return Err(BlockchainError::InvalidAddress(receiver.to_string()));
    }
    if amount == 0 {
        return Err(BlockchainError::InvalidTransaction(
            "Amount must be positive".to_string(),
        ));
    }

    let sender = wallet.get_address();
    let spendable: Vec<_> = utxo_set
        .find_by_address(&sender)
        .into_iter()
        .filter(|utxo| !pool.spends(&utxo.tx_out_id, utxo.tx_out_index))
        .collect();

    let mut accumulated = 0u64;
    let mut tx_ins = vec![];
    for utxo in &spendable {
        if accumulated >= amount {
            break;
        }
        accumulated = accumulated.saturating_add(utxo.amount);
        tx_ins.push(TxIn {
            tx_out_id: utxo.tx_out_id.clone(),
            tx_out_index: utxo.tx_out_index,
            signature: String::new(),
        });
    }
    if accumulated < amount {
        return Err(BlockchainError::InsufficientFunds {
            required: amount,
            available: accumulated,
        });
    }

    let mut tx_outs = vec![TxOut::new(receiver, amount)?];
    let change = accumulated - amount;
    if change > 0 {
        tx_outs.push(TxOut::new(&sender, change)?);
    }

    let mut tx = Transaction::new(tx_ins, tx_outs)?;
    tx.sign(wallet.get_pkcs8(), utxo_set)?;
    Ok(tx)
}
