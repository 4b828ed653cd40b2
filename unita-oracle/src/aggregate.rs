//! Median aggregation over several sub-oracles.

use tracing::debug;

use crate::{unix_now, Oracle, OraclePrice};

const DEFAULT_FRESHNESS_WINDOW_SECONDS: u64 = 600;

/// Composes sub-oracles and reports the median of their fresh prices.
///
/// The median is taken over `price_scaled` with ties broken by the
/// earlier source index, so aggregation is deterministic for a given
/// set of observations. Fewer than ⌈n/2⌉ fresh sub-oracle prices means
/// no answer at all; a degraded quorum must not move the peg.
pub struct AggregatedOracle {
    sources: Vec<Box<dyn Oracle>>,
    freshness_window_seconds: u64,
}

impl AggregatedOracle {
    pub fn new(sources: Vec<Box<dyn Oracle>>) -> Self {
        Self {
            sources,
            freshness_window_seconds: DEFAULT_FRESHNESS_WINDOW_SECONDS,
        }
    }

    pub fn with_freshness_window(mut self, seconds: u64) -> Self {
        self.freshness_window_seconds = seconds;
        self
    }

    fn fresh_prices(&self) -> Vec<(usize, OraclePrice)> {
        let now = unix_now();
        self.sources
            .iter()
            .enumerate()
            .filter_map(|(index, source)| {
                source
                    .latest()
                    .filter(|p| p.is_valid() && !p.is_stale(now, self.freshness_window_seconds))
                    .map(|p| (index, p))
            })
            .collect()
    }
}

impl Oracle for AggregatedOracle {
    fn latest(&self) -> Option<OraclePrice> {
        let total = self.sources.len();
        if total == 0 {
            return None;
        }

        let mut fresh = self.fresh_prices();
        let quorum = (total + 1) / 2;
        if fresh.len() < quorum {
            debug!(fresh = fresh.len(), total, quorum, "aggregation quorum not met");
            return None;
        }

        fresh.sort_by_key(|(index, price)| (price.price_scaled, *index));
        let (_, median) = fresh.swap_remove((fresh.len() - 1) / 2);
        Some(median)
    }

    fn recent(&self, count: usize) -> Vec<OraclePrice> {
        self.fresh_prices()
            .into_iter()
            .map(|(_, price)| price)
            .take(count)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FixedOracle;

    struct DeadOracle;

    impl Oracle for DeadOracle {
        fn latest(&self) -> Option<OraclePrice> {
            None
        }
    }

    struct StalePriceOracle;

    impl Oracle for StalePriceOracle {
        fn latest(&self) -> Option<OraclePrice> {
            Some(OraclePrice {
                price_scaled: 2_000_000,
                timestamp: 1,
                source: "stale".into(),
                signature: vec![],
            })
        }
    }

    fn fixed(price: i64) -> Box<dyn Oracle> {
        Box::new(FixedOracle::new(price))
    }

    #[test]
    fn median_of_three_sources() {
        let oracle = AggregatedOracle::new(vec![fixed(1_020_000), fixed(990_000), fixed(1_000_000)]);
        assert_eq!(oracle.latest().unwrap().price_scaled, 1_000_000);
    }

    #[test]
    fn even_count_takes_lower_middle() {
        let oracle = AggregatedOracle::new(vec![fixed(990_000), fixed(1_010_000)]);
        assert_eq!(oracle.latest().unwrap().price_scaled, 990_000);
    }

    #[test]
    fn ties_break_toward_earlier_source() {
        let oracle = AggregatedOracle::new(vec![
            fixed(1_000_000),
            fixed(1_000_000),
            fixed(1_000_000),
        ]);
        let price = oracle.latest().unwrap();
        assert_eq!(price.price_scaled, 1_000_000);
    }

    #[test]
    fn quorum_failure_returns_none() {
        // 1 fresh out of 3: below ⌈3/2⌉ = 2.
        let oracle =
            AggregatedOracle::new(vec![fixed(1_000_000), Box::new(DeadOracle), Box::new(DeadOracle)]);
        assert!(oracle.latest().is_none());

        // 2 fresh out of 3 meets quorum.
        let oracle =
            AggregatedOracle::new(vec![fixed(1_000_000), fixed(1_040_000), Box::new(DeadOracle)]);
        assert_eq!(oracle.latest().unwrap().price_scaled, 1_000_000);
    }

    #[test]
    fn stale_sources_do_not_count_toward_quorum() {
        let oracle = AggregatedOracle::new(vec![
            Box::new(StalePriceOracle),
            Box::new(StalePriceOracle),
            fixed(1_000_000),
        ]);
        assert!(oracle.latest().is_none());
    }

    #[test]
    fn empty_aggregate_is_unavailable() {
        let oracle = AggregatedOracle::new(vec![]);
        assert!(oracle.latest().is_none());
    }
}
