//! Normalized quote model shared by every feed adapter.
//!
//! Adapters turn upstream payloads into `NormalizedQuote`s; the
//! `QuoteValidator` decides which of them may reach the failover
//! controller.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::error::QuoteRejection;

/// Tracked instrument identifier (e.g. "BTC").
pub type InstrumentId = String;

/// One of the two upstream sources in the failover topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Order-book feed, authoritative while healthy.
    Primary,
    /// Oracle feed, used only while the primary is degraded.
    Secondary,
}

impl Source {
    /// The opposite source.
    pub fn other(self) -> Self {
        match self {
            Self::Primary => Self::Secondary,
            Self::Secondary => Self::Primary,
        }
    }

    /// Stable lowercase label for logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bid/ask snapshot for one instrument, as received from one source.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedQuote {
    /// Tracked instrument identifier.
    pub instrument: InstrumentId,
    /// Source the quote arrived on.
    pub source: Source,
    /// Best bid.
    pub bid: f64,
    /// Best ask.
    pub ask: f64,
    /// Monotonic receipt instant, used for staleness.
    pub observed_at: Instant,
    /// Wall-clock receipt time (Unix ms).
    pub observed_at_ms: i64,
    /// Upstream publish time (Unix ms), if the feed reports one.
    pub published_at_ms: Option<i64>,
}

impl NormalizedQuote {
    /// Mid price `(bid + ask) / 2`.
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    /// Spread `ask - bid`. Negative for crossed quotes.
    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }

    /// Whether the ask sits below the bid.
    pub fn is_crossed(&self) -> bool {
        self.ask < self.bid
    }
}

/// What to do with quotes whose ask is below the bid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossedQuotePolicy {
    /// Forward crossed quotes unchanged.
    #[default]
    PassThrough,
    /// Drop crossed quotes at the connection boundary.
    Reject,
}

/// Admission check applied to every parsed quote before it is emitted.
#[derive(Debug, Clone)]
pub struct QuoteValidator {
    tracked: HashSet<InstrumentId>,
    crossed: CrossedQuotePolicy,
}

impl QuoteValidator {
    /// Create a validator for the given tracked instruments.
    pub fn new(tracked: HashSet<InstrumentId>, crossed: CrossedQuotePolicy) -> Self {
        Self { tracked, crossed }
    }

    /// Accept or reject a quote.
    pub fn check(&self, quote: &NormalizedQuote) -> Result<(), QuoteRejection> {
        if !self.tracked.contains(&quote.instrument) {
            return Err(QuoteRejection::UntrackedInstrument(quote.instrument.clone()));
        }

        let valid = |p: f64| p.is_finite() && p >= 0.0;
        if !valid(quote.bid) || !valid(quote.ask) {
            return Err(QuoteRejection::InvalidPrice {
                bid: quote.bid,
                ask: quote.ask,
            });
        }

        if quote.is_crossed() && self.crossed == CrossedQuotePolicy::Reject {
            return Err(QuoteRejection::Crossed {
                bid: quote.bid,
                ask: quote.ask,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(instrument: &str, bid: f64, ask: f64) -> NormalizedQuote {
        NormalizedQuote {
            instrument: instrument.to_string(),
            source: Source::Primary,
            bid,
            ask,
            observed_at: Instant::now(),
            observed_at_ms: 0,
            published_at_ms: None,
        }
    }

    fn validator(policy: CrossedQuotePolicy) -> QuoteValidator {
        QuoteValidator::new(["BTC".to_string()].into_iter().collect(), policy)
    }

    #[test]
    fn test_mid_and_spread() {
        let q = quote("BTC", 100.0, 102.0);
        assert_eq!(q.mid(), 101.0);
        assert_eq!(q.spread(), 2.0);
        assert!(!q.is_crossed());
    }

    #[test]
    fn test_source_other() {
        assert_eq!(Source::Primary.other(), Source::Secondary);
        assert_eq!(Source::Secondary.other(), Source::Primary);
        assert_eq!(Source::Secondary.to_string(), "secondary");
    }

    #[test]
    fn test_untracked_instrument_rejected() {
        let v = validator(CrossedQuotePolicy::PassThrough);
        assert_eq!(
            v.check(&quote("DOGE", 1.0, 1.1)),
            Err(QuoteRejection::UntrackedInstrument("DOGE".to_string()))
        );
    }

    #[test]
    fn test_negative_and_nan_prices_rejected() {
        let v = validator(CrossedQuotePolicy::PassThrough);
        assert!(v.check(&quote("BTC", -1.0, 1.0)).is_err());
        assert!(v.check(&quote("BTC", 1.0, f64::NAN)).is_err());
    }

    #[test]
    fn test_crossed_quote_policy() {
        let crossed = quote("BTC", 101.0, 100.0);
        assert!(validator(CrossedQuotePolicy::PassThrough).check(&crossed).is_ok());
        assert!(matches!(
            validator(CrossedQuotePolicy::Reject).check(&crossed),
            Err(QuoteRejection::Crossed { .. })
        ));
    }
}
