//! # Drift Engine
//!
//! $$
//! \mathcal{O} \to R \to \rho_t \to (\text{verdicts}, w_{\text{adj}})
//! $$
//!
//! Single entry-point orchestration over the pure modules: fetch a
//! materialized history, build returns, roll correlations, evaluate drift and
//! derive target weights. Holds no state across calls beyond its
//! configuration; every run recomputes from the observation history.

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use chrono::Duration;
use chrono::NaiveDate;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::DriftConfig;
use crate::data::ObservationSource;
use crate::drift::adjust_weight;
use crate::drift::drift_breakdown;
use crate::drift::evaluate_drift;
use crate::drift::recommend_substitution;
use crate::drift::rolling_historical_var;
use crate::drift::DriftBreakdown;
use crate::drift::DriftVerdict;
use crate::drift::Substitution;
use crate::drift::WeightAdjustment;
use crate::returns::build_return_matrix;
use crate::returns::ReturnMatrix;
use crate::rolling::rolling_correlation;
use crate::rolling::RollingCorrelation;
use crate::rolling::Shape;
use crate::snapshot::latest_table;
use crate::snapshot::SnapshotTable;

/// Assets under analysis: the full fetch universe, the defensive sleeve and
/// the market benchmark.
#[derive(Clone, Debug)]
pub struct AssetUniverse {
  /// Every ticker to fetch, benchmark included.
  pub tickers: Vec<String>,
  /// Defensive assets monitored for style drift.
  pub defensive: Vec<String>,
  /// Market-representative asset correlations are measured against.
  pub benchmark: String,
}

impl AssetUniverse {
  /// Build a universe, deriving the fetch list from sleeve plus benchmark.
  pub fn new(defensive: Vec<String>, benchmark: impl Into<String>) -> Self {
    let benchmark = benchmark.into();
    let mut tickers = defensive.clone();
    if !tickers.contains(&benchmark) {
      tickers.push(benchmark.clone());
    }
    Self {
      tickers,
      defensive,
      benchmark,
    }
  }

  fn validate(&self) -> Result<()> {
    if self.defensive.is_empty() {
      bail!("defensive asset list must be non-empty");
    }
    if !self.tickers.contains(&self.benchmark) {
      bail!("benchmark {} missing from fetch universe", self.benchmark);
    }
    for asset in &self.defensive {
      if !self.tickers.contains(asset) {
        bail!("defensive asset {asset} missing from fetch universe");
      }
      if *asset == self.benchmark {
        bail!("benchmark {} cannot also be a defensive asset", self.benchmark);
      }
    }
    Ok(())
  }
}

/// Everything a single engine run produces.
///
/// An empty report (no verdicts, no snapshot) means insufficient data, which
/// presentation layers must render as such rather than as "no drift".
#[derive(Clone, Debug, Default)]
pub struct DriftReport {
  /// Date the run was anchored on.
  pub as_of: NaiveDate,
  /// Per-date convergence verdicts over the evaluated history.
  pub verdicts: Vec<DriftVerdict>,
  /// Latest per-asset drift picture, when any correlation is defined.
  pub breakdown: Option<DriftBreakdown>,
  /// Drift-adjusted target weight per defensive asset with defined data.
  pub adjustments: Vec<WeightAdjustment>,
  /// Latest rolling historical VaR per defensive asset with a full window.
  pub value_at_risk: Vec<VarEstimate>,
  /// Latest full correlation matrix, ready for [`crate::snapshot::save_snapshot`].
  pub latest_matrix: Option<SnapshotTable>,
}

/// Rolling historical VaR of one defensive asset at its latest full window.
#[derive(Clone, Debug, PartialEq)]
pub struct VarEstimate {
  /// Asset identifier.
  pub asset: String,
  /// Confidence level the quantile was taken at.
  pub confidence: f64,
  /// Empirical worst-case daily return at that confidence.
  pub value_at_risk: f64,
}

impl DriftReport {
  /// Whether the run had enough history to compute anything.
  pub fn has_data(&self) -> bool {
    self.latest_matrix.is_some()
  }

  /// Dates flagged as drifted.
  pub fn drifted_dates(&self) -> Vec<NaiveDate> {
    self
      .verdicts
      .iter()
      .filter(|v| v.is_drifted)
      .map(|v| v.date)
      .collect()
  }
}

/// Substitution comparison between the incumbent and a candidate asset.
#[derive(Clone, Debug, PartialEq)]
pub struct SwapAdvice {
  /// Incumbent sleeve asset.
  pub current: String,
  /// Proposed replacement.
  pub candidate: String,
  /// Incumbent's latest benchmark correlation.
  pub current_correlation: f64,
  /// Candidate's latest benchmark correlation.
  pub candidate_correlation: f64,
  /// Swap-or-maintain decision.
  pub decision: Substitution,
}

/// Single entry-point engine for drift monitoring workflows.
#[derive(Clone, Debug)]
pub struct DriftEngine {
  config: DriftConfig,
}

impl DriftEngine {
  /// Construct a new engine with explicit configuration.
  pub fn new(config: DriftConfig) -> Self {
    Self { config }
  }

  /// Borrow engine configuration.
  pub fn config(&self) -> &DriftConfig {
    &self.config
  }

  /// Run the full pipeline anchored on `as_of`.
  ///
  /// Upstream fetch failures propagate as hard errors; an empty history
  /// produces an empty report, never a partial computation.
  pub fn run(
    &self,
    source: &dyn ObservationSource,
    universe: &AssetUniverse,
    as_of: NaiveDate,
  ) -> Result<DriftReport> {
    universe.validate()?;

    let start = as_of - Duration::days(self.config.lookback_days);
    let observations = source
      .fetch_observations(&universe.tickers, start, as_of)
      .context("observation source unavailable")?;
    debug!(
      rows = observations.len(),
      start = %start,
      end = %as_of,
      "fetched observation history"
    );

    let returns = build_return_matrix(
      &observations,
      &universe.tickers,
      self.config.lookback_days,
      self.config.alignment,
    )?;
    if returns.is_empty() {
      warn!(%as_of, "no usable return history, reporting insufficient data");
      return Ok(DriftReport {
        as_of,
        ..DriftReport::default()
      });
    }
    debug!(
      dates = returns.len(),
      tickers = returns.tickers.len(),
      "built return matrix"
    );

    let correlations = rolling_correlation(&returns, self.config.window, Shape::FullMatrix)?;
    let verdicts = evaluate_drift(
      &correlations,
      &universe.defensive,
      &universe.benchmark,
      self.config.threshold,
    );
    let drifted = verdicts.iter().filter(|v| v.is_drifted).count();
    if drifted > 0 {
      info!(
        drifted,
        evaluated = verdicts.len(),
        threshold = self.config.threshold,
        "style drift detected"
      );
    }

    let breakdown = drift_breakdown(
      &correlations,
      &universe.defensive,
      &universe.benchmark,
      self.config.threshold,
    );
    let adjustments = self.latest_adjustments(&correlations, universe);
    let value_at_risk = self.latest_var(&returns, universe)?;

    Ok(DriftReport {
      as_of,
      verdicts,
      breakdown,
      adjustments,
      value_at_risk,
      latest_matrix: latest_table(&correlations),
    })
  }

  /// Rolling historical VaR per defensive asset, taken at the latest date
  /// with a fully defined trailing window. Assets without one are omitted.
  pub fn latest_var(
    &self,
    returns: &ReturnMatrix,
    universe: &AssetUniverse,
  ) -> Result<Vec<VarEstimate>> {
    let mut estimates = Vec::new();
    for asset in &universe.defensive {
      let Some(column) = returns.column(asset) else {
        continue;
      };
      let series =
        rolling_historical_var(&column, self.config.window, self.config.var_confidence)?;
      if let Some(value_at_risk) = series.iter().rev().find_map(|v| *v) {
        estimates.push(VarEstimate {
          asset: asset.clone(),
          confidence: self.config.var_confidence,
          value_at_risk,
        });
      }
    }
    Ok(estimates)
  }

  /// Drift-adjusted weight per defensive asset at its latest defined
  /// correlation. Assets with no defined correlation are omitted.
  pub fn latest_adjustments(
    &self,
    correlations: &RollingCorrelation,
    universe: &AssetUniverse,
  ) -> Vec<WeightAdjustment> {
    universe
      .defensive
      .iter()
      .filter_map(|asset| {
        let current = correlations.latest_value(&universe.benchmark, asset)?;
        Some(adjust_weight(
          asset.clone(),
          self.config.base_weight,
          current,
          self.config.target_correlation,
          self.config.sensitivity,
        ))
      })
      .collect()
  }

  /// Compare the incumbent sleeve asset against a candidate replacement.
  ///
  /// `None` when either side lacks a defined benchmark correlation.
  pub fn recommend_swap(
    &self,
    correlations: &RollingCorrelation,
    current: &str,
    candidate: &str,
    benchmark: &str,
  ) -> Option<SwapAdvice> {
    let current_correlation = correlations.latest_value(benchmark, current)?;
    let candidate_correlation = correlations.latest_value(benchmark, candidate)?;

    Some(SwapAdvice {
      current: current.to_string(),
      candidate: candidate.to_string(),
      current_correlation,
      candidate_correlation,
      decision: recommend_substitution(
        current_correlation,
        candidate_correlation,
        self.config.swap_margin,
      ),
    })
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use chrono::Duration;
  use chrono::NaiveDate;

  use super::*;
  use crate::config::AlignmentPolicy;
  use crate::data::InMemorySource;
  use crate::data::PriceObservation;

  fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|t| t.to_string()).collect()
  }

  /// Deterministic price history: XLU tracks SPY tick for tick, GLD
  /// alternates against it.
  fn seeded_source(start: NaiveDate, days: usize) -> InMemorySource {
    let mut src = InMemorySource::new();
    let mut spy = 500.0;
    let mut xlu = 70.0;
    let mut gld = 190.0;

    for i in 0..days {
      let date = start + Duration::days(i as i64);
      let tick = if i % 2 == 0 { 0.01 } else { -0.005 };
      spy *= 1.0 + tick;
      xlu *= 1.0 + tick;
      gld *= 1.0 - tick;
      src.upsert(PriceObservation::new("SPY", date, spy));
      src.upsert(PriceObservation::new("XLU", date, xlu));
      src.upsert(PriceObservation::new("GLD", date, gld));
    }

    src
  }

  fn config() -> DriftConfig {
    DriftConfig {
      window: 5,
      threshold: 0.10,
      target_correlation: 0.10,
      sensitivity: 1.5,
      alignment: AlignmentPolicy::Strict,
      lookback_days: 40,
      base_weight: 0.25,
      swap_margin: 0.05,
      var_confidence: 0.95,
    }
  }

  #[test]
  fn run_produces_verdicts_adjustments_and_snapshot() {
    let start = NaiveDate::from_ymd_opt(2026, 2, 2).unwrap();
    let source = seeded_source(start, 20);
    let universe = AssetUniverse::new(names(&["XLU", "GLD"]), "SPY");
    let engine = DriftEngine::new(config());

    let as_of = start + Duration::days(19);
    let report = engine.run(&source, &universe, as_of).unwrap();

    assert!(report.has_data());
    assert!(!report.verdicts.is_empty());
    // XLU co-moves with SPY at correlation 1, GLD at -1: average 0, stable.
    assert!(report.drifted_dates().is_empty());

    let breakdown = report.breakdown.unwrap();
    assert_eq!(breakdown.primary_driver, "XLU");

    assert_eq!(report.adjustments.len(), 2);
    let xlu = report
      .adjustments
      .iter()
      .find(|a| a.asset == "XLU")
      .unwrap();
    // corr 1.0 against target 0.10 with sensitivity 1.5 floors the weight.
    assert_abs_diff_eq!(xlu.current_correlation, 1.0, epsilon = 1e-9);
    assert_eq!(xlu.adjusted_weight, 0.0);

    let gld = report
      .adjustments
      .iter()
      .find(|a| a.asset == "GLD")
      .unwrap();
    assert_eq!(gld.adjusted_weight, 0.25);

    let table = report.latest_matrix.unwrap();
    assert_eq!(table.tickers.len(), 3);
    assert_eq!(table.matrix.len(), 3);

    // Both sleeve assets have a full trailing window, so both carry a VaR
    // estimate at the configured confidence.
    assert_eq!(report.value_at_risk.len(), 2);
    let xlu_var = report
      .value_at_risk
      .iter()
      .find(|v| v.asset == "XLU")
      .unwrap();
    assert_eq!(xlu_var.confidence, 0.95);
    // Window of five alternating ticks: the 5% quantile sits on the
    // repeated worst return.
    assert_abs_diff_eq!(xlu_var.value_at_risk, -0.005, epsilon = 1e-9);
  }

  #[test]
  fn var_estimates_use_configured_confidence() {
    let start = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
    let returns = ReturnMatrix {
      dates: (0..5).map(|i| start + Duration::days(i)).collect(),
      tickers: names(&["XLU", "SPY"]),
      rows: [0.01, -0.03, 0.02, -0.01, 0.005]
        .iter()
        .map(|r| vec![Some(*r), Some(0.0)])
        .collect(),
    };
    let universe = AssetUniverse::new(names(&["XLU"]), "SPY");
    let engine = DriftEngine::new(config());

    let estimates = engine.latest_var(&returns, &universe).unwrap();
    assert_eq!(estimates.len(), 1);
    assert_eq!(estimates[0].asset, "XLU");
    assert_eq!(estimates[0].confidence, 0.95);
    // Sorted window [-0.03, -0.01, 0.005, 0.01, 0.02]; the 5% quantile
    // interpolates between the two worst returns.
    assert_abs_diff_eq!(estimates[0].value_at_risk, -0.026, epsilon = 1e-12);
  }

  #[test]
  fn empty_source_yields_empty_report_not_error() {
    let source = InMemorySource::new();
    let universe = AssetUniverse::new(names(&["XLU", "GLD"]), "SPY");
    let engine = DriftEngine::new(config());

    let as_of = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
    let report = engine.run(&source, &universe, as_of).unwrap();

    assert!(!report.has_data());
    assert!(report.verdicts.is_empty());
    assert!(report.adjustments.is_empty());
    assert!(report.value_at_risk.is_empty());
  }

  #[test]
  fn drift_is_flagged_when_sleeve_tracks_benchmark() {
    let start = NaiveDate::from_ymd_opt(2026, 2, 2).unwrap();
    let source = seeded_source(start, 20);
    // Both sleeve assets vs SPY: XLU at +1, GLD at -1 -- use only XLU so the
    // average sits above threshold.
    let universe = AssetUniverse::new(names(&["XLU"]), "SPY");
    let engine = DriftEngine::new(config());

    let as_of = start + Duration::days(19);
    let report = engine.run(&source, &universe, as_of).unwrap();
    assert!(!report.drifted_dates().is_empty());
  }

  #[test]
  fn recommend_swap_compares_latest_correlations() {
    let start = NaiveDate::from_ymd_opt(2026, 2, 2).unwrap();
    let source = seeded_source(start, 20);
    let universe = AssetUniverse::new(names(&["XLU", "GLD"]), "SPY");
    let engine = DriftEngine::new(config());

    let as_of = start + Duration::days(19);
    let report = engine.run(&source, &universe, as_of).unwrap();
    assert!(report.has_data());

    let observations = source
      .fetch_observations(&universe.tickers, start, as_of)
      .unwrap();
    let returns = build_return_matrix(
      &observations,
      &universe.tickers,
      engine.config().lookback_days,
      engine.config().alignment,
    )
    .unwrap();
    let correlations =
      rolling_correlation(&returns, engine.config().window, Shape::FullMatrix).unwrap();

    // GLD anti-correlates with SPY, XLU tracks it: swapping XLU for GLD
    // clears the margin easily.
    let advice = engine
      .recommend_swap(&correlations, "XLU", "GLD", "SPY")
      .unwrap();
    assert!(matches!(
      advice.decision,
      Substitution::SwapToCandidate { .. }
    ));
    assert!(advice.current_correlation > advice.candidate_correlation);
  }

  #[test]
  fn benchmark_inside_sleeve_is_rejected() {
    let universe = AssetUniverse::new(names(&["SPY", "XLU"]), "SPY");
    let engine = DriftEngine::new(config());
    let source = InMemorySource::new();

    let as_of = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
    assert!(engine.run(&source, &universe, as_of).is_err());
  }
}
