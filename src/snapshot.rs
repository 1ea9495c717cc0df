//! # Snapshot Export
//!
//! $$
//! \rho_{ij}(t_{\text{latest}}) \mapsto \text{CSV}
//! $$
//!
//! Flat-file export of the latest full correlation matrix for downstream
//! reporting tools: a square table with asset identifiers as both row and
//! column labels, keyed by the date of computation. A snapshot is a cached
//! view, never a source of truth.

use std::fs;
use std::path::Path;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use chrono::NaiveDate;

use crate::rolling::RollingCorrelation;

/// Square labelled correlation matrix for one date.
#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotTable {
  /// Date of computation.
  pub date: NaiveDate,
  /// Row and column labels.
  pub tickers: Vec<String>,
  /// Coefficients; `None` cells serialize as empty fields.
  pub matrix: Vec<Vec<Option<f64>>>,
}

/// Latest snapshot with any defined coefficient, as an exportable table.
pub fn latest_table(correlations: &RollingCorrelation) -> Option<SnapshotTable> {
  let snap = correlations.latest_defined()?;
  Some(SnapshotTable {
    date: snap.date,
    tickers: correlations.tickers.clone(),
    matrix: snap.matrix.clone(),
  })
}

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Write a snapshot table as CSV.
///
/// Layout: header `date,T1,T2,...`, then one row per ticker with the ticker
/// as the first field. Undefined coefficients are written as empty fields so
/// they reload as undefined rather than zero.
pub fn save_snapshot(path: &Path, table: &SnapshotTable) -> Result<()> {
  if table.matrix.len() != table.tickers.len()
    || table.matrix.iter().any(|row| row.len() != table.tickers.len())
  {
    bail!(
      "snapshot matrix is not square over {} tickers",
      table.tickers.len()
    );
  }
  for ticker in &table.tickers {
    if ticker.contains(',') || ticker.contains('\n') {
      bail!("ticker {ticker:?} cannot be used as a CSV label");
    }
  }

  let mut out = String::new();
  out.push_str(&table.date.format(DATE_FORMAT).to_string());
  for ticker in &table.tickers {
    out.push(',');
    out.push_str(ticker);
  }
  out.push('\n');

  for (ticker, row) in table.tickers.iter().zip(&table.matrix) {
    out.push_str(ticker);
    for cell in row {
      out.push(',');
      if let Some(v) = cell {
        out.push_str(&v.to_string());
      }
    }
    out.push('\n');
  }

  fs::write(path, out).with_context(|| format!("writing snapshot to {}", path.display()))
}

/// Load a snapshot table previously written by [`save_snapshot`].
pub fn load_snapshot(path: &Path) -> Result<SnapshotTable> {
  let raw =
    fs::read_to_string(path).with_context(|| format!("reading snapshot from {}", path.display()))?;
  let mut lines = raw.lines();

  let header = match lines.next() {
    Some(line) if !line.is_empty() => line,
    _ => bail!("snapshot file {} is empty", path.display()),
  };
  let mut fields = header.split(',');
  let date_field = fields.next().unwrap_or_default();
  let date = NaiveDate::parse_from_str(date_field, DATE_FORMAT)
    .with_context(|| format!("invalid snapshot date {date_field:?}"))?;
  let tickers: Vec<String> = fields.map(str::to_string).collect();
  if tickers.is_empty() {
    bail!("snapshot header has no tickers");
  }

  let mut matrix = Vec::with_capacity(tickers.len());
  for (i, line) in lines.enumerate() {
    let mut fields = line.split(',');
    let label = fields.next().unwrap_or_default();
    if label != tickers.get(i).map(String::as_str).unwrap_or_default() {
      bail!(
        "snapshot row label {label:?} does not match header ticker at position {i}"
      );
    }

    let mut row = Vec::with_capacity(tickers.len());
    for field in fields {
      if field.is_empty() {
        row.push(None);
      } else {
        let value: f64 = field
          .parse()
          .with_context(|| format!("invalid coefficient {field:?} in row {label}"))?;
        row.push(Some(value));
      }
    }
    if row.len() != tickers.len() {
      bail!(
        "snapshot row {label} has {} cells for {} tickers",
        row.len(),
        tickers.len()
      );
    }
    matrix.push(row);
  }

  if matrix.len() != tickers.len() {
    bail!(
      "snapshot has {} rows for {} tickers",
      matrix.len(),
      tickers.len()
    );
  }

  Ok(SnapshotTable {
    date,
    tickers,
    matrix,
  })
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;

  fn table() -> SnapshotTable {
    SnapshotTable {
      date: NaiveDate::from_ymd_opt(2026, 3, 6).unwrap(),
      tickers: vec!["GLD".to_string(), "SPY".to_string(), "XLU".to_string()],
      matrix: vec![
        vec![Some(1.0), Some(0.1234567890123), None],
        vec![Some(0.1234567890123), Some(1.0), Some(-0.25)],
        vec![None, Some(-0.25), Some(1.0)],
      ],
    }
  }

  #[test]
  fn snapshot_round_trips_including_undefined_cells() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("correlation_matrix_snapshot.csv");

    save_snapshot(&path, &table()).unwrap();
    let loaded = load_snapshot(&path).unwrap();

    assert_eq!(loaded, table());
  }

  #[test]
  fn rejects_non_square_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.csv");

    let mut bad = table();
    bad.matrix.pop();
    assert!(save_snapshot(&path, &bad).is_err());
  }

  #[test]
  fn rejects_mismatched_row_label() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tampered.csv");

    fs::write(&path, "2026-03-06,GLD,SPY\nGLD,1,0.5\nXLU,0.5,1\n").unwrap();
    assert!(load_snapshot(&path).is_err());
  }

  #[test]
  fn rejects_unparseable_coefficient() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbled.csv");

    fs::write(&path, "2026-03-06,GLD,SPY\nGLD,1,abc\nSPY,abc,1\n").unwrap();
    assert!(load_snapshot(&path).is_err());
  }
}
