//! Deterministic scaling constants shared across the chain.
//!
//! All monetary math is scaled-integer: prices carry six decimals,
//! amounts are smallest units (1 UNA = 100_000_000 units), and gains,
//! dead-bands, and caps are expressed in parts per million.

/// Price scaling: 1.000000 USD = 1_000_000.
pub const PRICE_SCALE: i64 = 1_000_000;

/// Coin scaling: 1 UNA = 100_000_000 smallest units.
pub const COIN_SCALE: i64 = 100_000_000;

/// Parts-per-million scale for gains, dead-bands, caps, thresholds.
pub const PPM_SCALE: i64 = 1_000_000;

/// The peg target: 1.000000 USD in scaled units.
pub const TARGET_PRICE: i64 = PRICE_SCALE;

/// Hard cap on total money supply in smallest units (21 billion UNA).
/// Validators apply this to peg-expansion transactions as well.
pub const MAX_MONEY_SUPPLY: i128 = 21_000_000_000 * COIN_SCALE as i128;
