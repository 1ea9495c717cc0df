//! # Rolling Correlation Engine
//!
//! $$
//! \rho_{t}(a,b) = \frac{\sum_{i=t-w+1}^{t} (x_i-\bar x)(y_i-\bar y)}
//! {\sqrt{\sum (x_i-\bar x)^2 \sum (y_i-\bar y)^2}}
//! $$
//!
//! Trailing-window Pearson correlation for every unordered asset pair, one
//! square matrix per date. Windows are advanced with running sums rather than
//! recomputed from scratch; independent pairs are computed in parallel with
//! identical results.

use anyhow::bail;
use anyhow::Result;
use chrono::NaiveDate;
use rayon::prelude::*;

use crate::returns::ReturnMatrix;

/// Which slice of the pairwise correlation structure a request computes.
#[derive(Clone, Copy, Debug)]
pub enum Shape<'a> {
  /// Every unordered pair, every date.
  FullMatrix,
  /// A single asset-vs-benchmark series across all dates.
  PairSeries(&'a str, &'a str),
}

/// Pairwise correlation matrix for a single date.
///
/// Symmetric; the diagonal is `Some(1.0)` exactly whenever the window is
/// complete with non-zero variance. `None` marks an undefined coefficient,
/// which is distinct from a computed 0.0.
#[derive(Clone, Debug, PartialEq)]
pub struct CorrelationSnapshot {
  /// Date the trailing window ends on.
  pub date: NaiveDate,
  /// Square coefficient matrix over the parent's tickers.
  pub matrix: Vec<Vec<Option<f64>>>,
}

/// Rolling correlation structure over a return matrix.
///
/// One snapshot per return-matrix date; the first `window - 1` snapshots are
/// entirely undefined.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RollingCorrelation {
  /// Asset labels indexing every snapshot matrix.
  pub tickers: Vec<String>,
  /// Per-date matrices, dates ascending.
  pub snapshots: Vec<CorrelationSnapshot>,
}

impl RollingCorrelation {
  /// Whether no snapshots were produced.
  pub fn is_empty(&self) -> bool {
    self.snapshots.is_empty()
  }

  /// Column position of a ticker, if present.
  pub fn ticker_index(&self, ticker: &str) -> Option<usize> {
    self.tickers.iter().position(|t| t == ticker)
  }

  /// Coefficient for `(date, a, b)`. Order-insensitive; `None` when the date
  /// or either ticker is unknown, or the coefficient is undefined.
  pub fn get(&self, date: NaiveDate, a: &str, b: &str) -> Option<f64> {
    let i = self.ticker_index(a)?;
    let j = self.ticker_index(b)?;
    let at = self
      .snapshots
      .binary_search_by_key(&date, |s| s.date)
      .ok()?;
    self.snapshots[at].matrix[i][j]
  }

  /// Correlation series of one pair across all dates.
  pub fn pair_series(&self, a: &str, b: &str) -> Option<Vec<(NaiveDate, Option<f64>)>> {
    let i = self.ticker_index(a)?;
    let j = self.ticker_index(b)?;
    Some(
      self
        .snapshots
        .iter()
        .map(|s| (s.date, s.matrix[i][j]))
        .collect(),
    )
  }

  /// Most recent defined coefficient of a pair.
  pub fn latest_value(&self, a: &str, b: &str) -> Option<f64> {
    let i = self.ticker_index(a)?;
    let j = self.ticker_index(b)?;
    self
      .snapshots
      .iter()
      .rev()
      .find_map(|s| s.matrix[i][j])
  }

  /// Most recent snapshot with at least one defined coefficient.
  pub fn latest_defined(&self) -> Option<&CorrelationSnapshot> {
    self
      .snapshots
      .iter()
      .rev()
      .find(|s| s.matrix.iter().flatten().any(|c| c.is_some()))
  }
}

/// Relative variance floor below which a window counts as constant. Running
/// sums leave cancellation residue on constant series, so an exact zero check
/// would misclassify them as correlated.
const VAR_FLOOR: f64 = 1e-12;

/// Windowed Pearson series for one pair of columns, via prefix sums.
///
/// `out[t]` covers rows `[t - window + 1, t]` and is `None` until a full
/// window of jointly defined cells exists, and whenever either side has zero
/// variance over the window.
fn pair_kernel(x: &[Option<f64>], y: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
  let n = x.len();
  let mut out = vec![None; n];
  if n < window {
    return out;
  }

  let mut cnt = vec![0usize; n + 1];
  let mut sx = vec![0.0f64; n + 1];
  let mut sy = vec![0.0f64; n + 1];
  let mut sxx = vec![0.0f64; n + 1];
  let mut syy = vec![0.0f64; n + 1];
  let mut sxy = vec![0.0f64; n + 1];

  for i in 0..n {
    cnt[i + 1] = cnt[i];
    sx[i + 1] = sx[i];
    sy[i + 1] = sy[i];
    sxx[i + 1] = sxx[i];
    syy[i + 1] = syy[i];
    sxy[i + 1] = sxy[i];
    if let (Some(a), Some(b)) = (x[i], y[i]) {
      cnt[i + 1] += 1;
      sx[i + 1] += a;
      sy[i + 1] += b;
      sxx[i + 1] += a * a;
      syy[i + 1] += b * b;
      sxy[i + 1] += a * b;
    }
  }

  let w = window as f64;
  for t in (window - 1)..n {
    let lo = t + 1 - window;
    if cnt[t + 1] - cnt[lo] != window {
      continue;
    }

    let dx = sx[t + 1] - sx[lo];
    let dy = sy[t + 1] - sy[lo];
    let dxx = sxx[t + 1] - sxx[lo];
    let dyy = syy[t + 1] - syy[lo];
    let dxy = sxy[t + 1] - sxy[lo];

    let vx = dxx - dx * dx / w;
    let vy = dyy - dy * dy / w;
    let scale_x = (dxx.abs() + dx * dx / w).max(f64::MIN_POSITIVE);
    let scale_y = (dyy.abs() + dy * dy / w).max(f64::MIN_POSITIVE);
    if vx <= VAR_FLOOR * scale_x || vy <= VAR_FLOOR * scale_y {
      continue;
    }

    let cov = dxy - dx * dy / w;
    out[t] = Some((cov / (vx * vy).sqrt()).clamp(-1.0, 1.0));
  }

  out
}

fn column(returns: &ReturnMatrix, j: usize) -> Vec<Option<f64>> {
  returns.rows.iter().map(|row| row[j]).collect()
}

fn validate(returns: &ReturnMatrix, window: usize) -> Result<()> {
  if window < 2 {
    bail!("correlation window must be at least 2, got {window}");
  }
  for (i, row) in returns.rows.iter().enumerate() {
    if row.len() != returns.tickers.len() {
      bail!(
        "return matrix row {} has {} cells for {} tickers",
        i,
        row.len(),
        returns.tickers.len()
      );
    }
    for cell in row {
      if let Some(v) = cell {
        if !v.is_finite() {
          bail!("non-finite return {v} in row {i}");
        }
      }
    }
  }
  Ok(())
}

/// Compute rolling pairwise correlations over a return matrix.
///
/// A window longer than the available history yields an all-undefined
/// structure, never an error; an empty return matrix yields an empty one.
/// `window < 2`, ragged rows, non-finite cells and unknown pair tickers fail
/// fast.
pub fn rolling_correlation(
  returns: &ReturnMatrix,
  window: usize,
  shape: Shape<'_>,
) -> Result<RollingCorrelation> {
  validate(returns, window)?;
  if returns.is_empty() {
    return Ok(RollingCorrelation::default());
  }

  let (tickers, columns): (Vec<String>, Vec<Vec<Option<f64>>>) = match shape {
    Shape::FullMatrix => (
      returns.tickers.clone(),
      (0..returns.tickers.len())
        .map(|j| column(returns, j))
        .collect(),
    ),
    Shape::PairSeries(a, b) => {
      let Some(ia) = returns.ticker_index(a) else {
        bail!("unknown ticker {a} in pair request");
      };
      let Some(ib) = returns.ticker_index(b) else {
        bail!("unknown ticker {b} in pair request");
      };
      if ia == ib {
        (vec![a.to_string()], vec![column(returns, ia)])
      } else {
        (
          vec![a.to_string(), b.to_string()],
          vec![column(returns, ia), column(returns, ib)],
        )
      }
    }
  };

  let n = tickers.len();
  let pairs: Vec<(usize, usize)> = (0..n)
    .flat_map(|i| (i..n).map(move |j| (i, j)))
    .collect();

  // Pairs are independent; parallel evaluation is result-identical.
  let series: Vec<((usize, usize), Vec<Option<f64>>)> = pairs
    .par_iter()
    .map(|&(i, j)| ((i, j), pair_kernel(&columns[i], &columns[j], window)))
    .collect();

  let mut snapshots: Vec<CorrelationSnapshot> = returns
    .dates
    .iter()
    .map(|&date| CorrelationSnapshot {
      date,
      matrix: vec![vec![None; n]; n],
    })
    .collect();

  for ((i, j), values) in series {
    for (t, value) in values.into_iter().enumerate() {
      snapshots[t].matrix[i][j] = value;
      snapshots[t].matrix[j][i] = value;
    }
  }

  Ok(RollingCorrelation { tickers, snapshots })
}
