//! # Drift Monitor
//!
//! $$
//! \rho_t(a, m) = \operatorname{corr}\big(r^{a}_{t-w+1..t},\, r^{m}_{t-w+1..t}\big)
//! $$
//!
//! Style-drift detection and weight adjustment for defensive asset sleeves:
//! rolling pairwise correlations against a market benchmark, threshold-based
//! convergence verdicts per date, drift-adjusted target weights and
//! substitution recommendations. All computation is pure and single pass over
//! an in-memory observation history; ingestion and presentation live behind
//! the [`data::ObservationSource`] seam and the [`engine::DriftReport`]
//! output.

pub mod config;
pub mod data;
pub mod drift;
pub mod engine;
pub mod returns;
pub mod rolling;
pub mod snapshot;

pub use config::AlignmentPolicy;
pub use config::DriftConfig;
pub use data::InMemorySource;
pub use data::ObservationSource;
pub use data::PriceObservation;
pub use drift::adjust_weight;
pub use drift::drift_breakdown;
pub use drift::evaluate_drift;
pub use drift::recommend_substitution;
pub use drift::rolling_historical_var;
pub use drift::AssetDrift;
pub use drift::DriftBreakdown;
pub use drift::DriftVerdict;
pub use drift::Substitution;
pub use drift::WeightAdjustment;
pub use engine::AssetUniverse;
pub use engine::DriftEngine;
pub use engine::DriftReport;
pub use engine::SwapAdvice;
pub use engine::VarEstimate;
pub use returns::build_return_matrix;
pub use returns::ReturnMatrix;
pub use rolling::rolling_correlation;
pub use rolling::CorrelationSnapshot;
pub use rolling::RollingCorrelation;
pub use rolling::Shape;
pub use snapshot::latest_table;
pub use snapshot::load_snapshot;
pub use snapshot::save_snapshot;
pub use snapshot::SnapshotTable;
