//! # Configuration
//!
//! $$
//! \theta = (w, \tau, \rho^\*, s, \pi)
//! $$
//!
//! Engine parameters are passed explicitly into every call; there are no
//! process-wide defaults baked into the numeric kernels.

use std::str::FromStr;

use anyhow::bail;

/// Missing-return policy applied when aligning tickers on a common date index.
///
/// The two policies yield different correlation values on gapped data and are
/// therefore an explicit caller choice, never a silent default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AlignmentPolicy {
  /// Drop any date with at least one missing return among the analyzed tickers.
  #[default]
  Strict,
  /// Replace missing returns with 0.0, keeping every date.
  ZeroFill,
}

impl FromStr for AlignmentPolicy {
  type Err = anyhow::Error;

  /// Parse an alignment policy. Unknown input is an error, never a silent
  /// fallback to either policy.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "strict" | "drop" => Ok(Self::Strict),
      "zero" | "zero-fill" | "zerofill" | "soft" => Ok(Self::ZeroFill),
      other => bail!("unknown alignment policy {other:?}"),
    }
  }
}

/// Runtime configuration for [`DriftEngine`](crate::engine::DriftEngine).
#[derive(Clone, Debug)]
pub struct DriftConfig {
  /// Trailing observation count for rolling correlations.
  pub window: usize,
  /// Average-correlation level above which a date is flagged as drifted.
  pub threshold: f64,
  /// Correlation level below which no weight penalty applies.
  pub target_correlation: f64,
  /// How aggressively weight is cut per unit of correlation drift.
  pub sensitivity: f64,
  /// Missing-return policy used when building the return matrix.
  pub alignment: AlignmentPolicy,
  /// Calendar-day lookback applied to the observation history.
  pub lookback_days: i64,
  /// Starting weight of each defensive sleeve position.
  pub base_weight: f64,
  /// Minimum correlation improvement required to recommend an asset swap.
  pub swap_margin: f64,
  /// Confidence level for rolling historical VaR.
  pub var_confidence: f64,
}

impl Default for DriftConfig {
  fn default() -> Self {
    Self {
      window: 60,
      threshold: 0.10,
      target_correlation: 0.10,
      sensitivity: 1.5,
      alignment: AlignmentPolicy::Strict,
      lookback_days: 90,
      base_weight: 0.25,
      swap_margin: 0.05,
      var_confidence: 0.95,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn alignment_policy_parses_aliases() {
    assert_eq!(
      "zero-fill".parse::<AlignmentPolicy>().unwrap(),
      AlignmentPolicy::ZeroFill
    );
    assert_eq!(
      "soft".parse::<AlignmentPolicy>().unwrap(),
      AlignmentPolicy::ZeroFill
    );
    assert_eq!(
      "Strict".parse::<AlignmentPolicy>().unwrap(),
      AlignmentPolicy::Strict
    );
  }

  #[test]
  fn alignment_policy_rejects_unknown_input() {
    assert!("anything-else".parse::<AlignmentPolicy>().is_err());
    assert!("".parse::<AlignmentPolicy>().is_err());
  }

  #[test]
  fn default_config_matches_documented_parameters() {
    let cfg = DriftConfig::default();
    assert_eq!(cfg.window, 60);
    assert_eq!(cfg.threshold, 0.10);
    assert_eq!(cfg.sensitivity, 1.5);
    assert_eq!(cfg.alignment, AlignmentPolicy::Strict);
  }
}
