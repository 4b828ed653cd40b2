//! Ledger port for the peg controller.
//!
//! The controller drives supply changes through the [`Ledger`] trait;
//! [`UtxoLedger`] realizes it against two capabilities the blockchain
//! engine provides: a UTXO index and a transaction-submission handle.
//! Expansion mints a marked no-input transaction to the treasury;
//! contraction locks treasury coins into provably-unspendable outputs.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};
use unita_types::address::is_valid_address;
use unita_types::script;
use unita_types::transaction::{
    Transaction, TxInput, TxOutput, Utxo, PEG_MARKER, PEG_TX_LOCKTIME, PEG_TX_VERSION,
    PROTOCOL_TX_FEE,
};

mod memory;

pub use memory::MemoryChain;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LedgerError {
    #[error("amount must be positive, got {0}")]
    InvalidAmount(i128),
    #[error("invalid treasury address '{0}'")]
    InvalidAddress(String),
    #[error("insufficient treasury balance: {available} available, {required} required")]
    InsufficientBalance { available: i128, required: i128 },
    #[error("amount {0} exceeds the single-output limit")]
    AmountOverflow(i128),
    #[error("chain backend error: {0}")]
    Backend(String),
}

/// Read access to the unspent-output set.
pub trait UtxoIndex: Send + Sync {
    fn all_utxos(&self) -> Result<Vec<Utxo>, LedgerError>;
    fn utxos_for_address(&self, address: &str) -> Result<Vec<Utxo>, LedgerError>;
}

/// Submission handle into the blockchain engine.
pub trait ChainBackend: Send + Sync {
    fn height(&self) -> u64;
    fn submit_transaction(&self, tx: Transaction) -> Result<(), LedgerError>;
}

/// Supply and treasury operations as the peg controller sees them.
/// Amounts are smallest units, 128-bit.
pub trait Ledger: Send + Sync {
    /// Sum of all spendable unspent outputs; provably-unspendable
    /// outputs are burned and excluded.
    fn total_supply(&self) -> Result<i128, LedgerError>;

    /// Sum of spendable outputs locked to `treasury_address`.
    fn treasury_balance(&self, treasury_address: &str) -> Result<i128, LedgerError>;

    /// Mint `amount` new units to the treasury via a marked no-input
    /// transaction.
    fn mint_to_treasury(&self, amount: i128, treasury_address: &str) -> Result<(), LedgerError>;

    /// Destroy `amount` units by spending treasury outputs into a
    /// `PEG_BURN`-tagged unspendable output.
    fn burn_from_treasury(&self, amount: i128, treasury_address: &str) -> Result<(), LedgerError>;

    /// Whether queries can be answered and the chain has blocks.
    fn is_healthy(&self) -> bool;
}

/// [`Ledger`] implementation over a UTXO index and a chain backend.
pub struct UtxoLedger {
    utxos: Arc<dyn UtxoIndex>,
    chain: Arc<dyn ChainBackend>,
}

impl UtxoLedger {
    pub fn new(utxos: Arc<dyn UtxoIndex>, chain: Arc<dyn ChainBackend>) -> Self {
        Self { utxos, chain }
    }

    fn validate(amount: i128, treasury_address: &str) -> Result<i64, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        if !is_valid_address(treasury_address) {
            return Err(LedgerError::InvalidAddress(treasury_address.to_string()));
        }
        i64::try_from(amount).map_err(|_| LedgerError::AmountOverflow(amount))
    }

    /// Deterministic coin selection: ascending outpoint order until the
    /// target is covered.
    fn select_inputs(
        &self,
        treasury_address: &str,
        target: i128,
    ) -> Result<(Vec<Utxo>, i128), LedgerError> {
        let mut candidates: Vec<Utxo> = self
            .utxos
            .utxos_for_address(treasury_address)?
            .into_iter()
            .filter(|u| !u.is_unspendable())
            .collect();
        candidates.sort_by_key(|u| u.outpoint);

        let available: i128 = candidates.iter().map(|u| u.amount as i128).sum();
        if available < target {
            return Err(LedgerError::InsufficientBalance {
                available,
                required: target,
            });
        }

        let mut selected = Vec::new();
        let mut total = 0i128;
        for utxo in candidates {
            total += utxo.amount as i128;
            selected.push(utxo);
            if total >= target {
                break;
            }
        }
        Ok((selected, total))
    }
}

impl Ledger for UtxoLedger {
    fn total_supply(&self) -> Result<i128, LedgerError> {
        let utxos = self.utxos.all_utxos()?;
        let supply = utxos
            .iter()
            .filter(|u| !u.is_unspendable())
            .map(|u| u.amount as i128)
            .sum();
        debug!(supply, utxo_count = utxos.len(), "total supply computed");
        Ok(supply)
    }

    fn treasury_balance(&self, treasury_address: &str) -> Result<i128, LedgerError> {
        if !is_valid_address(treasury_address) {
            return Err(LedgerError::InvalidAddress(treasury_address.to_string()));
        }
        let balance = self
            .utxos
            .utxos_for_address(treasury_address)?
            .iter()
            .filter(|u| !u.is_unspendable())
            .map(|u| u.amount as i128)
            .sum();
        Ok(balance)
    }

    fn mint_to_treasury(&self, amount: i128, treasury_address: &str) -> Result<(), LedgerError> {
        let amount_i64 = Self::validate(amount, treasury_address)?;

        let tx = Transaction {
            version: PEG_TX_VERSION,
            inputs: vec![],
            outputs: vec![TxOutput {
                amount: amount_i64,
                script_pubkey: script::lock_to_address(treasury_address),
            }],
            locktime: PEG_TX_LOCKTIME,
            marker: PEG_MARKER.to_vec(),
        };
        let txid = tx.txid();
        self.chain.submit_transaction(tx)?;

        info!(
            amount,
            treasury = treasury_address,
            txid = %hex::encode(txid),
            "minted units to treasury"
        );
        Ok(())
    }

    fn burn_from_treasury(&self, amount: i128, treasury_address: &str) -> Result<(), LedgerError> {
        let amount_i64 = Self::validate(amount, treasury_address)?;

        let target = amount + PROTOCOL_TX_FEE as i128;
        let (selected, total_input) = self.select_inputs(treasury_address, target)?;

        let inputs = selected
            .into_iter()
            .map(|utxo| TxInput {
                prev_out: utxo.outpoint,
                // Unlocking scripts are supplied by the treasury wallet
                // before broadcast.
                script_sig: vec![],
            })
            .collect();

        let mut outputs = vec![TxOutput {
            amount: amount_i64,
            script_pubkey: script::unspendable_with_tag(script::BURN_TAG),
        }];
        let change = total_input - target;
        if change > 0 {
            let change_i64 =
                i64::try_from(change).map_err(|_| LedgerError::AmountOverflow(change))?;
            outputs.push(TxOutput {
                amount: change_i64,
                script_pubkey: script::lock_to_address(treasury_address),
            });
        }

        let tx = Transaction {
            version: 1,
            inputs,
            outputs,
            locktime: 0,
            marker: vec![],
        };
        let txid = tx.txid();
        self.chain.submit_transaction(tx)?;

        info!(
            amount,
            treasury = treasury_address,
            txid = %hex::encode(txid),
            "burned units from treasury"
        );
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.utxos.all_utxos().is_ok() && self.chain.height() > 0
    }
}
