//! # Drift Evaluator & Weight Adjuster
//!
//! $$
//! w_{\text{adj}} = w_0 \cdot \max\!\big(0,\, 1 - (\rho - \rho^\*)\,s\big)
//! $$
//!
//! Turns benchmark correlations into per-date convergence verdicts, per-asset
//! drift-adjusted target weights and substitution recommendations. Every
//! function is a pure computation over its inputs.

use anyhow::bail;
use anyhow::Result;
use chrono::NaiveDate;

use crate::rolling::RollingCorrelation;

/// Convergence verdict for one date.
#[derive(Clone, Debug, PartialEq)]
pub struct DriftVerdict {
  /// Date the verdict applies to.
  pub date: NaiveDate,
  /// Mean benchmark correlation across defensive assets with a defined value.
  pub average_correlation: f64,
  /// Threshold the average was compared against.
  pub threshold: f64,
  /// Whether the average strictly exceeds the threshold.
  pub is_drifted: bool,
}

/// Drift-adjusted target weight for one asset.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightAdjustment {
  /// Asset identifier.
  pub asset: String,
  /// Weight before any drift penalty.
  pub base_weight: f64,
  /// Asset's current correlation to the benchmark.
  pub current_correlation: f64,
  /// Correlation level below which no penalty applies.
  pub target_correlation: f64,
  /// Weight-cut aggressiveness per unit of drift.
  pub sensitivity: f64,
  /// Resulting target weight, in `[0, base_weight]`.
  pub adjusted_weight: f64,
}

/// Outcome of a substitution comparison between two candidate assets.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Substitution {
  /// The candidate improves diversification by at least the margin.
  SwapToCandidate {
    /// Correlation improvement of the candidate over the incumbent.
    improvement: f64,
  },
  /// Improvement below the margin; keep the incumbent to avoid thrashing.
  MaintainCurrent {
    /// Correlation improvement of the candidate over the incumbent.
    improvement: f64,
  },
}

/// Latest benchmark correlation and drift flag for one defensive asset.
#[derive(Clone, Debug, PartialEq)]
pub struct AssetDrift {
  /// Asset identifier.
  pub asset: String,
  /// Latest defined correlation to the benchmark.
  pub correlation: f64,
  /// Whether this asset alone strictly exceeds the threshold.
  pub is_drifted: bool,
}

/// Per-asset breakdown of the latest drift picture.
#[derive(Clone, Debug, PartialEq)]
pub struct DriftBreakdown {
  /// Date of the underlying correlation snapshot.
  pub date: NaiveDate,
  /// Assets with a defined benchmark correlation on that date.
  pub assets: Vec<AssetDrift>,
  /// Mean of the defined correlations.
  pub average_correlation: f64,
  /// Asset moving most closely with the benchmark.
  pub primary_driver: String,
}

/// Evaluate convergence per date from rolling benchmark correlations.
///
/// Assets with an undefined coefficient on a date are excluded from that
/// date's average; dates where every defensive asset is undefined are skipped
/// entirely rather than scored. Every evaluated date is reported, so
/// historical drift episodes stay inspectable.
pub fn evaluate_drift(
  correlations: &RollingCorrelation,
  defensive_assets: &[String],
  benchmark: &str,
  threshold: f64,
) -> Vec<DriftVerdict> {
  let Some(bi) = correlations.ticker_index(benchmark) else {
    return Vec::new();
  };
  let defensive: Vec<usize> = defensive_assets
    .iter()
    .filter_map(|a| correlations.ticker_index(a))
    .collect();
  if defensive.is_empty() {
    return Vec::new();
  }

  let mut verdicts = Vec::new();
  for snap in &correlations.snapshots {
    let defined: Vec<f64> = defensive
      .iter()
      .filter_map(|&ai| snap.matrix[bi][ai])
      .collect();
    if defined.is_empty() {
      continue;
    }

    let average = defined.iter().sum::<f64>() / defined.len() as f64;
    verdicts.push(DriftVerdict {
      date: snap.date,
      average_correlation: average,
      threshold,
      is_drifted: average > threshold,
    });
  }

  verdicts
}

/// Compute the drift-adjusted target weight for one asset.
///
/// At or below the target correlation the base weight is untouched. Above it
/// the weight shrinks linearly with the drift delta; the reduction factor is
/// clamped to `[0, 1]`, so the weight can reach exactly zero but never go
/// negative or exceed the base.
pub fn adjust_weight(
  asset: impl Into<String>,
  base_weight: f64,
  current_correlation: f64,
  target_correlation: f64,
  sensitivity: f64,
) -> WeightAdjustment {
  let adjusted_weight = if current_correlation <= target_correlation {
    base_weight
  } else {
    let drift_delta = current_correlation - target_correlation;
    let reduction_factor = (1.0 - drift_delta * sensitivity).clamp(0.0, 1.0);
    base_weight * reduction_factor
  };

  WeightAdjustment {
    asset: asset.into(),
    base_weight,
    current_correlation,
    target_correlation,
    sensitivity,
    adjusted_weight,
  }
}

/// Recommend swapping the incumbent for the candidate only when the candidate
/// is less benchmark-correlated by at least `margin`.
pub fn recommend_substitution(
  current_corr: f64,
  candidate_corr: f64,
  margin: f64,
) -> Substitution {
  let improvement = current_corr - candidate_corr;
  if improvement >= margin {
    Substitution::SwapToCandidate { improvement }
  } else {
    Substitution::MaintainCurrent { improvement }
  }
}

/// Per-asset breakdown at the latest date with any defined benchmark
/// correlation. `None` means insufficient data, which callers must render as
/// such instead of a false "no drift".
pub fn drift_breakdown(
  correlations: &RollingCorrelation,
  defensive_assets: &[String],
  benchmark: &str,
  threshold: f64,
) -> Option<DriftBreakdown> {
  let bi = correlations.ticker_index(benchmark)?;
  let defensive: Vec<(String, usize)> = defensive_assets
    .iter()
    .filter_map(|a| correlations.ticker_index(a).map(|i| (a.clone(), i)))
    .collect();
  if defensive.is_empty() {
    return None;
  }

  for snap in correlations.snapshots.iter().rev() {
    let assets: Vec<AssetDrift> = defensive
      .iter()
      .filter_map(|(asset, ai)| {
        snap.matrix[bi][*ai].map(|correlation| AssetDrift {
          asset: asset.clone(),
          correlation,
          is_drifted: correlation > threshold,
        })
      })
      .collect();
    if assets.is_empty() {
      continue;
    }

    let average_correlation =
      assets.iter().map(|a| a.correlation).sum::<f64>() / assets.len() as f64;
    let primary_driver = assets
      .iter()
      .max_by(|a, b| a.correlation.total_cmp(&b.correlation))
      .map(|a| a.asset.clone())
      .unwrap_or_default();

    return Some(DriftBreakdown {
      date: snap.date,
      assets,
      average_correlation,
      primary_driver,
    });
  }

  None
}

/// Rolling historical Value at Risk over a single return series.
///
/// `out[t]` is the `(1 - confidence)` empirical quantile (linear
/// interpolation between order statistics) of the trailing `window` returns,
/// `None` until a fully defined window exists.
pub fn rolling_historical_var(
  returns: &[Option<f64>],
  window: usize,
  confidence: f64,
) -> Result<Vec<Option<f64>>> {
  if window == 0 {
    bail!("VaR window must be positive");
  }
  if confidence <= 0.0 || confidence >= 1.0 {
    bail!("VaR confidence must be in (0, 1), got {confidence}");
  }

  let q = 1.0 - confidence;
  let mut out = vec![None; returns.len()];
  if returns.len() < window {
    return Ok(out);
  }

  for t in (window - 1)..returns.len() {
    let slice = &returns[t + 1 - window..=t];
    if slice.iter().any(|c| c.is_none()) {
      continue;
    }
    let mut values: Vec<f64> = slice.iter().map(|c| c.unwrap()).collect();
    values.sort_by(f64::total_cmp);
    out[t] = Some(quantile(&values, q));
  }

  Ok(out)
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
  if sorted.len() == 1 {
    return sorted[0];
  }
  let rank = q * (sorted.len() - 1) as f64;
  let lo = rank.floor() as usize;
  let hi = rank.ceil() as usize;
  let frac = rank - lo as f64;
  sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
