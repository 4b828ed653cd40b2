pub mod address;
pub mod script;
pub mod transaction;
pub mod units;

pub use transaction::{OutPoint, Transaction, TxInput, TxOutput, Utxo};
pub use units::{COIN_SCALE, MAX_MONEY_SUPPLY, PPM_SCALE, PRICE_SCALE, TARGET_PRICE};
