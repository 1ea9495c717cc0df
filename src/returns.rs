//! # Return Series Builder
//!
//! $$
//! r_t = \frac{p_t}{p_{t-1}} - 1
//! $$
//!
//! Pivots long-format price observations into a wide matrix of per-asset
//! simple returns aligned on a common ascending date index. Pure
//! transformation: no I/O, no retained state.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use anyhow::bail;
use anyhow::Result;
use chrono::Duration;
use chrono::NaiveDate;

use crate::config::AlignmentPolicy;
use crate::data::PriceObservation;

/// Wide matrix of simple returns, one column per ticker.
///
/// `rows[i][j]` is the return of `tickers[j]` on `dates[i]`; `None` marks a
/// missing or undefined return and is never coerced to a number.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReturnMatrix {
  /// Ascending date index.
  pub dates: Vec<NaiveDate>,
  /// Column labels. Tickers with no observations are absent.
  pub tickers: Vec<String>,
  /// Row-major return cells.
  pub rows: Vec<Vec<Option<f64>>>,
}

impl ReturnMatrix {
  /// Whether the matrix holds no usable rows.
  pub fn is_empty(&self) -> bool {
    self.dates.is_empty() || self.tickers.is_empty()
  }

  /// Number of date rows.
  pub fn len(&self) -> usize {
    self.dates.len()
  }

  /// Column position of a ticker, if present.
  pub fn ticker_index(&self, ticker: &str) -> Option<usize> {
    self.tickers.iter().position(|t| t == ticker)
  }

  /// Full return column for a ticker, if present.
  pub fn column(&self, ticker: &str) -> Option<Vec<Option<f64>>> {
    let j = self.ticker_index(ticker)?;
    Some(self.rows.iter().map(|row| row[j]).collect())
  }
}

/// Build a [`ReturnMatrix`] from price observations.
///
/// The lookback is counted in calendar days back from the latest observation
/// date. Requested tickers without any observation simply produce no column;
/// an empty observation set produces an explicitly empty matrix, not an
/// error. Non-finite or non-positive prices fail fast.
///
/// The first pivoted row has no defined return for any ticker and is removed
/// before `policy` is applied, so zero-filling never manufactures a leading
/// return that would bias the first correlation window.
pub fn build_return_matrix(
  observations: &[PriceObservation],
  tickers: &[String],
  lookback_days: i64,
  policy: AlignmentPolicy,
) -> Result<ReturnMatrix> {
  if lookback_days <= 0 {
    bail!("lookback_days must be positive, got {lookback_days}");
  }
  if tickers.is_empty() {
    bail!("tickers list must be non-empty");
  }
  if observations.is_empty() {
    return Ok(ReturnMatrix::default());
  }

  let anchor = observations
    .iter()
    .map(|o| o.date)
    .max()
    .unwrap_or_default();
  let start = anchor - Duration::days(lookback_days);

  // Pivot: per-ticker price curves plus the union date index. Duplicate
  // (ticker, date) rows keep the last value, matching upsert ingestion.
  let mut curves: BTreeMap<&str, BTreeMap<NaiveDate, f64>> = BTreeMap::new();
  let mut union_dates: BTreeSet<NaiveDate> = BTreeSet::new();

  for obs in observations {
    if obs.date < start {
      continue;
    }
    if !tickers.iter().any(|t| t == &obs.ticker) {
      continue;
    }
    if !obs.adjusted_close.is_finite() || obs.adjusted_close <= 0.0 {
      bail!(
        "malformed adjusted close {} for {} on {}",
        obs.adjusted_close,
        obs.ticker,
        obs.date
      );
    }
    curves
      .entry(obs.ticker.as_str())
      .or_default()
      .insert(obs.date, obs.adjusted_close);
    union_dates.insert(obs.date);
  }

  let kept: Vec<&String> = tickers.iter().filter(|t| curves.contains_key(t.as_str())).collect();
  if kept.is_empty() || union_dates.len() < 2 {
    return Ok(ReturnMatrix::default());
  }

  let dates: Vec<NaiveDate> = union_dates.into_iter().collect();

  // Returns on the union grid: defined only when the price exists on both the
  // current and the previous grid date. The leading all-undefined row is
  // dropped here.
  let mut rows: Vec<Vec<Option<f64>>> = Vec::with_capacity(dates.len() - 1);
  for i in 1..dates.len() {
    let mut row = Vec::with_capacity(kept.len());
    for ticker in &kept {
      let curve = &curves[ticker.as_str()];
      let cell = match (curve.get(&dates[i - 1]), curve.get(&dates[i])) {
        (Some(prev), Some(cur)) => Some(cur / prev - 1.0),
        _ => None,
      };
      row.push(cell);
    }
    rows.push(row);
  }
  let mut dates: Vec<NaiveDate> = dates[1..].to_vec();

  match policy {
    AlignmentPolicy::Strict => {
      let keep: Vec<bool> = rows
        .iter()
        .map(|row| row.iter().all(|c| c.is_some()))
        .collect();
      dates = dates
        .iter()
        .zip(&keep)
        .filter_map(|(d, k)| k.then_some(*d))
        .collect();
      rows = rows
        .into_iter()
        .zip(&keep)
        .filter_map(|(row, k)| k.then_some(row))
        .collect();
    }
    AlignmentPolicy::ZeroFill => {
      for row in &mut rows {
        for cell in row.iter_mut() {
          if cell.is_none() {
            *cell = Some(0.0);
          }
        }
      }
    }
  }

  if rows.is_empty() {
    return Ok(ReturnMatrix::default());
  }

  Ok(ReturnMatrix {
    dates,
    tickers: kept.into_iter().cloned().collect(),
    rows,
  })
}
