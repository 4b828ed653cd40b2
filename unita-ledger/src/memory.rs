//! In-memory chain backend for tests, simulation, and single-node runs.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use unita_types::script;
use unita_types::transaction::{OutPoint, Transaction, TxOutput, Utxo};
use unita_types::units::MAX_MONEY_SUPPLY;

use crate::{ChainBackend, LedgerError, UtxoIndex};

#[derive(Default)]
struct ChainInner {
    utxos: BTreeMap<OutPoint, Utxo>,
    height: u64,
    seq: u32,
    last_submitted: Option<Transaction>,
}

/// A minimal UTXO chain held in memory. Submitted transactions are
/// applied immediately: inputs are spent, outputs enter the UTXO set,
/// and the height advances by one per transaction.
#[derive(Clone, Default)]
pub struct MemoryChain {
    inner: Arc<RwLock<ChainInner>>,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain seeded with a single genesis output to `address`.
    pub fn with_genesis(address: &str, amount: i64) -> Self {
        let chain = Self::new();
        chain.fund(address, amount);
        chain
    }

    /// Credit `address` with a fresh output outside normal submission.
    /// Test and bootstrap helper.
    pub fn fund(&self, address: &str, amount: i64) {
        let mut inner = self.write();
        inner.seq += 1;
        let tx = Transaction {
            version: 1,
            inputs: vec![],
            outputs: vec![TxOutput {
                amount,
                script_pubkey: script::lock_to_address(address),
            }],
            // Sequence in the locktime keeps funding txids unique.
            locktime: inner.seq,
            marker: vec![],
        };
        inner.height += 1;
        let height = inner.height;
        apply_outputs(&mut inner.utxos, &tx, height);
    }

    /// The most recently submitted transaction, for inspection.
    pub fn last_submitted(&self) -> Option<Transaction> {
        self.read().last_submitted.clone()
    }

    /// Spendable balance currently locked to `address`.
    pub fn balance_of(&self, address: &str) -> i128 {
        self.read()
            .utxos
            .values()
            .filter(|u| !u.is_unspendable() && u.address() == Some(address))
            .map(|u| u.amount as i128)
            .sum()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ChainInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ChainInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn apply_outputs(utxos: &mut BTreeMap<OutPoint, Utxo>, tx: &Transaction, height: u64) {
    let txid = tx.txid();
    for (index, output) in tx.outputs.iter().enumerate() {
        let outpoint = OutPoint {
            txid,
            index: index as u32,
        };
        utxos.insert(
            outpoint,
            Utxo {
                outpoint,
                amount: output.amount,
                script_pubkey: output.script_pubkey.clone(),
                height,
            },
        );
    }
}

impl UtxoIndex for MemoryChain {
    fn all_utxos(&self) -> Result<Vec<Utxo>, LedgerError> {
        Ok(self.read().utxos.values().cloned().collect())
    }

    fn utxos_for_address(&self, address: &str) -> Result<Vec<Utxo>, LedgerError> {
        Ok(self
            .read()
            .utxos
            .values()
            .filter(|u| u.address() == Some(address))
            .cloned()
            .collect())
    }
}

impl ChainBackend for MemoryChain {
    fn height(&self) -> u64 {
        self.read().height
    }

    fn submit_transaction(&self, tx: Transaction) -> Result<(), LedgerError> {
        let mut inner = self.write();

        if tx.is_peg_expansion() {
            let supply: i128 = inner
                .utxos
                .values()
                .filter(|u| !u.is_unspendable())
                .map(|u| u.amount as i128)
                .sum();
            let minted = tx.outputs[0].amount as i128;
            if supply + minted > MAX_MONEY_SUPPLY {
                return Err(LedgerError::Backend(
                    "peg expansion exceeds max money supply".to_string(),
                ));
            }
        } else {
            if tx.inputs.is_empty() {
                return Err(LedgerError::Backend(
                    "transaction has no inputs and is not a peg expansion".to_string(),
                ));
            }
            let mut input_sum = 0i128;
            for input in &tx.inputs {
                let Some(utxo) = inner.utxos.get(&input.prev_out) else {
                    return Err(LedgerError::Backend(format!(
                        "unknown input {}:{}",
                        hex::encode(input.prev_out.txid),
                        input.prev_out.index
                    )));
                };
                input_sum += utxo.amount as i128;
            }
            let output_sum: i128 = tx.outputs.iter().map(|o| o.amount as i128).sum();
            if output_sum > input_sum {
                return Err(LedgerError::Backend(
                    "outputs exceed inputs".to_string(),
                ));
            }
            for input in &tx.inputs {
                inner.utxos.remove(&input.prev_out);
            }
        }

        inner.height += 1;
        let height = inner.height;
        apply_outputs(&mut inner.utxos, &tx, height);
        inner.last_submitted = Some(tx);
        Ok(())
    }
}
