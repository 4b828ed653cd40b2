//! Algorithmic peg controller for the UNA stablecoin.
//!
//! Each epoch the controller reads an oracle price, compares it to the
//! 1.00 USD target, and adjusts circulating supply: minting to the
//! protocol treasury when the price is high, burning from it (or
//! issuing bonds for the uncovered remainder) when the price is low.
//! All control math is scaled-integer and bit-exact across nodes;
//! state and an append-only event log persist through the store for
//! audit and crash recovery.

pub mod codec;
pub mod controller;
pub mod error;
pub mod math;
pub mod state;
pub mod store;

pub use controller::PegController;
pub use error::PegError;
pub use state::{BondState, PegAction, PegConfig, PegEvent, PegState};
pub use store::PegStore;
