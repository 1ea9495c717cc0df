//! # Observation Data
//!
//! $$
//! \mathcal{O} = \{(\text{ticker}, t, p_t)\}
//! $$
//!
//! Price observations and the source seam behind which the (out-of-scope)
//! ingestion and storage collaborators live. The engine only ever consumes a
//! fully materialized, ordered observation history.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::NaiveDate;

/// One adjusted close for one ticker on one trading day.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceObservation {
  /// Asset identifier.
  pub ticker: String,
  /// Trading day.
  pub date: NaiveDate,
  /// Dividend/split adjusted close.
  pub adjusted_close: f64,
}

impl PriceObservation {
  /// Construct an observation.
  pub fn new(ticker: impl Into<String>, date: NaiveDate, adjusted_close: f64) -> Self {
    Self {
      ticker: ticker.into(),
      date,
      adjusted_close,
    }
  }
}

/// Materialized price-history provider consumed by the engine.
///
/// An empty result is valid (not an error); an unreachable store is a hard
/// failure the engine propagates without computing on partial data.
pub trait ObservationSource {
  /// Fetch observations for `tickers` within `[start, end]`, ordered by
  /// `(date, ticker)`.
  fn fetch_observations(
    &self,
    tickers: &[String],
    start: NaiveDate,
    end: NaiveDate,
  ) -> Result<Vec<PriceObservation>>;
}

/// In-memory observation store with upsert-by-`(ticker, date)` semantics.
///
/// Stands in for the relational store: re-ingesting a `(ticker, date)` pair
/// overwrites the previous close, so the uniqueness invariant holds by
/// construction.
#[derive(Clone, Debug, Default)]
pub struct InMemorySource {
  closes: BTreeMap<(NaiveDate, String), f64>,
}

impl InMemorySource {
  /// Empty store.
  pub fn new() -> Self {
    Self::default()
  }

  /// Insert or overwrite a single observation.
  pub fn upsert(&mut self, obs: PriceObservation) {
    self.closes.insert((obs.date, obs.ticker), obs.adjusted_close);
  }

  /// Insert or overwrite a batch of observations.
  pub fn extend(&mut self, observations: impl IntoIterator<Item = PriceObservation>) {
    for obs in observations {
      self.upsert(obs);
    }
  }

  /// Number of stored `(ticker, date)` rows.
  pub fn len(&self) -> usize {
    self.closes.len()
  }

  /// Whether the store holds no rows.
  pub fn is_empty(&self) -> bool {
    self.closes.is_empty()
  }
}

impl ObservationSource for InMemorySource {
  fn fetch_observations(
    &self,
    tickers: &[String],
    start: NaiveDate,
    end: NaiveDate,
  ) -> Result<Vec<PriceObservation>> {
    let mut out = Vec::new();

    for ((date, ticker), close) in &self.closes {
      if *date < start || *date > end {
        continue;
      }
      if !tickers.iter().any(|t| t == ticker) {
        continue;
      }
      out.push(PriceObservation::new(ticker.clone(), *date, *close));
    }

    Ok(out)
  }
}
