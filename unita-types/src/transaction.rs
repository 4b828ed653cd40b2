use serde::{Deserialize, Serialize};

use crate::script;

/// Transaction version reserved for peg-adjustment transactions.
pub const PEG_TX_VERSION: u32 = 2;

/// Locktime marker reserved for peg-expansion transactions.
pub const PEG_TX_LOCKTIME: u32 = 0xFFFF_FFFF;

/// Protocol-reserved marker bytes carried by peg-expansion transactions
/// in the `marker` field, which ordinary transactions must leave empty.
pub const PEG_MARKER: &[u8] = b"UNAPEGv1";

/// Flat fee paid by protocol transactions, in smallest units.
pub const PROTOCOL_TX_FEE: i64 = 1_000;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutPoint {
    pub txid: [u8; 32],
    pub index: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    pub prev_out: OutPoint,
    /// Unlocking script; filled in by the wallet that owns the output.
    pub script_sig: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    /// Amount in smallest units. Per-output amounts fit in i64.
    pub amount: i64,
    pub script_pubkey: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub locktime: u32,
    /// Reserved field; must be empty except on peg-expansion
    /// transactions, which carry [`PEG_MARKER`] here.
    pub marker: Vec<u8>,
}

impl Transaction {
    pub fn txid(&self) -> [u8; 32] {
        let encoded = bincode::serialize(self).expect("transaction serialization");
        *blake3::hash(&encoded).as_bytes()
    }

    /// The validator-side recognition rule for peg-expansion
    /// transactions, which are admitted despite having no inputs:
    /// version 2, locktime 0xFFFFFFFF, exactly one output, and the
    /// reserved marker bytes present.
    pub fn is_peg_expansion(&self) -> bool {
        self.version == PEG_TX_VERSION
            && self.locktime == PEG_TX_LOCKTIME
            && self.inputs.is_empty()
            && self.outputs.len() == 1
            && self.marker == PEG_MARKER
    }

    /// Whether the transaction's first output is the canonical
    /// peg-burn form.
    pub fn is_peg_burn(&self) -> bool {
        self.outputs
            .first()
            .is_some_and(|out| script::is_peg_burn(&out.script_pubkey))
    }
}

/// An unspent transaction output as tracked by the UTXO index.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub outpoint: OutPoint,
    pub amount: i64,
    pub script_pubkey: Vec<u8>,
    pub height: u64,
}

impl Utxo {
    pub fn is_unspendable(&self) -> bool {
        script::is_unspendable(&self.script_pubkey)
    }

    pub fn address(&self) -> Option<&str> {
        script::address_of(&self.script_pubkey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expansion_tx() -> Transaction {
        Transaction {
            version: PEG_TX_VERSION,
            inputs: vec![],
            outputs: vec![TxOutput {
                amount: 5_000,
                script_pubkey: script::lock_to_address("una1treasury0dev0000000000000000"),
            }],
            locktime: PEG_TX_LOCKTIME,
            marker: PEG_MARKER.to_vec(),
        }
    }

    #[test]
    fn txid_is_stable_for_equal_transactions() {
        assert_eq!(expansion_tx().txid(), expansion_tx().txid());
        let mut other = expansion_tx();
        other.outputs[0].amount = 5_001;
        assert_ne!(expansion_tx().txid(), other.txid());
    }

    #[test]
    fn peg_expansion_predicate_is_bit_exact() {
        assert!(expansion_tx().is_peg_expansion());

        let mut wrong_version = expansion_tx();
        wrong_version.version = 1;
        assert!(!wrong_version.is_peg_expansion());

        let mut wrong_locktime = expansion_tx();
        wrong_locktime.locktime = 0;
        assert!(!wrong_locktime.is_peg_expansion());

        let mut no_marker = expansion_tx();
        no_marker.marker.clear();
        assert!(!no_marker.is_peg_expansion());

        let mut two_outputs = expansion_tx();
        two_outputs.outputs.push(two_outputs.outputs[0].clone());
        assert!(!two_outputs.is_peg_expansion());

        let mut with_input = expansion_tx();
        with_input.inputs.push(TxInput {
            prev_out: OutPoint {
                txid: [0u8; 32],
                index: 0,
            },
            script_sig: vec![],
        });
        assert!(!with_input.is_peg_expansion());
    }

    #[test]
    fn burn_outputs_are_recognized() {
        let tx = Transaction {
            version: 1,
            inputs: vec![],
            outputs: vec![TxOutput {
                amount: 1_000,
                script_pubkey: script::unspendable_with_tag(script::BURN_TAG),
            }],
            locktime: 0,
            marker: vec![],
        };
        assert!(tx.is_peg_burn());
        assert!(!tx.is_peg_expansion());
    }
}
