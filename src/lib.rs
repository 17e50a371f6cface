//! ROC analysis of the CICADA anomaly-detection trigger.
//!
//! Ntuples are filled into score x HT x L1-flag histograms ([`fill`]),
//! persisted per sample ([`store`]), and swept into signal efficiency vs.
//! background rate curves ([`sweep`]). [`batch`] runs every
//! `(background, version, signal)` combination and hands the results to
//! [`plot`] and [`report`]. [`compare`] checks that the unpacked and
//! emulated scores agree run by run.

pub mod batch;
pub mod compare;
pub mod config;
pub mod error;
pub mod fill;
pub mod histogram;
pub mod plot;
pub mod report;
pub mod sample;
pub mod store;
pub mod sweep;
pub mod toy;

pub use config::AnalysisConfig;
pub use error::{RocError, RocResult};
pub use histogram::{Axis, BinnedHistogram};
pub use sweep::{EfficiencyPoint, OrAxis, SweepAxis, ThresholdCurve};
