//! Derived business metrics with explicit zero-division policy.
//!
//! Every function here is total: empty groups and zero denominators resolve to
//! a fixed value, never NaN and never a panic.

use serde::{Deserialize, Serialize};

use crate::sink::StyleToken;

/// Shipped as a percentage of ordered (0–100). No demand reads as full service.
pub fn fill_rate(ordered: f64, shipped: f64) -> f64 {
    if ordered > 0.0 {
        shipped / ordered * 100.0
    } else {
        100.0
    }
}

/// Gross margin as a percentage of retail (0–100). Zero retail yields 0.
pub fn margin(retail: f64, cost: f64) -> f64 {
    if retail > 0.0 {
        (retail - cost) / retail * 100.0
    } else {
        0.0
    }
}

/// Weeks the on-hand quantity lasts at the period's sales rate. `None` renders blank.
pub fn week_of_supply(on_hand: f64, period_sales: f64, weeks_in_period: f64) -> Option<f64> {
    if period_sales > 0.0 {
        Some(on_hand / period_sales * weeks_in_period)
    } else {
        None
    }
}

/// `value / grand_total`, degrading to the raw value when the total is zero.
pub fn pct_of_total(value: f64, grand_total: f64) -> f64 {
    if grand_total == 0.0 {
        value
    } else {
        value / grand_total
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waterfall {
    pub req_pct: f64,
    pub allo_pct: f64,
    pub ship_pct: f64,
    pub perfect_pct: f64,
}

/// Cascading request → allocate → ship funnel. Each stage's percentage is
/// relative to the base that survived the previous stage, not to `total`.
/// Results are fractions (0–1).
///
/// Perfect lines are not an input: they are whatever survives the three cuts,
/// so `perfect_pct` equals `perfect / total` whenever the stage buckets sum to
/// `total`. Partial lines never enter the funnel; reports show them as their
/// own column.
pub fn waterfall(total: f64, request_cut: f64, allocate_cut: f64, ship_cut: f64) -> Waterfall {
    let base0 = total;
    let base1 = base0 - request_cut;
    let base2 = base1 - allocate_cut;
    let base3 = base2 - ship_cut;

    let req_pct = if base0 == 0.0 { 0.0 } else { base1 / base0 };
    let allo_pct = if base1 > 0.0 { base2 / base1 } else { 0.0 };
    let ship_pct = if base2 > 0.0 { base3 / base2 } else { 0.0 };
    let perfect_pct = if base0 == 0.0 {
        0.0
    } else {
        ((base0 - request_cut - allocate_cut) - ship_cut) / base0
    };

    Waterfall {
        req_pct,
        allo_pct,
        ship_pct,
        perfect_pct,
    }
}

// ---------------------------------------------------------------------------
// Highlight thresholds
// ---------------------------------------------------------------------------

/// A single highlight rule. A value strictly below `below` or strictly above
/// `above` is highlighted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub metric: String,
    #[serde(default)]
    pub below: Option<f64>,
    #[serde(default)]
    pub above: Option<f64>,
}

impl Threshold {
    pub fn below(metric: &str, limit: f64) -> Self {
        Self {
            metric: metric.to_string(),
            below: Some(limit),
            above: None,
        }
    }

    fn crossed(&self, value: f64) -> bool {
        self.below.is_some_and(|b| value < b) || self.above.is_some_and(|a| value > a)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTable {
    pub rules: Vec<Threshold>,
}

impl ThresholdTable {
    pub fn new(rules: Vec<Threshold>) -> Self {
        Self { rules }
    }

    /// Style for a computed metric value: `Highlight` when any rule for the
    /// metric is crossed, otherwise the column's own style.
    pub fn style_for(&self, metric: &str, value: f64, default: StyleToken) -> StyleToken {
        let crossed = self
            .rules
            .iter()
            .filter(|r| r.metric == metric)
            .any(|r| r.crossed(value));
        if crossed {
            StyleToken::Highlight
        } else {
            default
        }
    }
}
