//! DEX quote and comparison-event wire types.

use serde::{Deserialize, Serialize};

/// A single hop within a quote's route plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteHop {
    pub provider: String,
    pub input: String,
    pub output: String,
    /// Percentage of the input routed through this hop, 0..=100.
    pub percent: u8,
}

/// A non-binding price offer from a DEX provider.
///
/// Amounts are arbitrary-precision integers carried as decimal strings; they
/// must never be collapsed to floating point for comparison (spec §9).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Quote {
    pub provider: String,
    pub input_mint: String,
    pub output_mint: String,
    pub input_amount: String,
    pub output_amount: String,
    /// Price impact as a percentage in `[0, 1]`, represented in basis points
    /// of precision (`price_impact_bps` = impact * 10_000) to avoid floats
    /// on the wire while keeping the type small.
    pub price_impact_bps: u32,
    pub route: Vec<RouteHop>,
}

impl Quote {
    #[must_use]
    pub fn price_impact(&self) -> f64 {
        f64::from(self.price_impact_bps) / 10_000.0
    }
}

/// A provider's raw outcome for a dispatched swap, before it is tagged with
/// the provider name at the aggregator level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SwapOutcome {
    pub success: bool,
    pub signature: Option<String>,
    pub error: Option<String>,
}

/// One provider's outcome within a `DexComparisonEvent`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DexComparisonEntry {
    pub provider: String,
    pub out_amount: Option<String>,
    pub price_impact_bps: Option<u32>,
    pub error: Option<String>,
}

/// Published to the event bus as `DEX_QUOTE_COMPARISON` after `getBestQuote`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DexComparisonEvent {
    pub input_mint: String,
    pub output_mint: String,
    pub input_amount: String,
    pub entries: Vec<DexComparisonEntry>,
    pub selected_provider: Option<String>,
}
