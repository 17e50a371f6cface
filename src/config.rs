//! Analysis configuration.
//!
//! Everything the plotting and histogramming commands share lives in one
//! [`AnalysisConfig`], loaded from a TOML file. Every field has a default, so
//! an empty file (or no file) is a valid configuration.
//!
//! ```toml
//! ntuple_dir = "ntuples"
//! store_dir = "hists"
//! file_prefix = "ROChist"
//! cicada_versions = ["CICADA_v1p2p2", "CICADA_v2p2p2"]
//! backgrounds = ["ZeroBias"]
//! ht_threshold = 200.0
//! rate_scale_factor = 28607.28
//!
//! [binning.score]
//! bins = 400
//! min = 0.0
//! max = 1024.0
//!
//! [labels]
//! TT_TuneCP5_13p6TeV_powheg-pythia8 = "TTbar"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{RocError, RocResult};
use crate::histogram::Axis;
use crate::sweep::OrAxis;

/// Uniform binning of one histogram axis.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct AxisBinning {
    pub bins: usize,
    pub min: f64,
    pub max: f64,
}

impl AxisBinning {
    pub const fn new(bins: usize, min: f64, max: f64) -> Self {
        Self { bins, min, max }
    }

    pub fn axis(&self) -> RocResult<Axis> {
        Axis::uniform(self.bins, self.min, self.max)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Binning {
    pub score: AxisBinning,
    pub ht: AxisBinning,
    pub flag: AxisBinning,
    pub jet_et: AxisBinning,
}

impl Default for Binning {
    fn default() -> Self {
        Self {
            score: AxisBinning::new(400, 0.0, 1024.0),
            ht: AxisBinning::new(300, 0.0, 2000.0),
            flag: AxisBinning::new(2, -0.5, 1.5),
            jet_et: AxisBinning::new(300, 0.0, 1000.0),
        }
    }
}

/// Display ranges of the ROC charts, in efficiency units.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RocDisplay {
    pub x_max: f64,
    pub y_max: f64,
    /// Draw the background axis as a rate (scaled by `rate_scale_factor`).
    pub rate: bool,
    pub width: u32,
    pub height: u32,
    /// Which OR charts to draw per job: `1` for HT, `2` for the L1 flag.
    pub or_axes: Vec<usize>,
}

impl Default for RocDisplay {
    fn default() -> Self {
        Self {
            x_max: 1.0,
            y_max: 1.2,
            rate: true,
            width: 1000,
            height: 800,
            or_axes: vec![1, 2],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub ntuple_dir: PathBuf,
    pub store_dir: PathBuf,
    pub file_prefix: String,
    pub output_dir: PathBuf,
    pub cicada_versions: Vec<String>,
    pub backgrounds: Vec<String>,
    /// Signal samples; empty means every stored sample that is not a background.
    pub signals: Vec<String>,
    /// Samples split into test/train halves by luminosity block parity.
    pub split_samples: Vec<String>,
    /// Sample whose prescale columns decide which triggers are unprescaled.
    pub reference_sample: String,
    /// Triggers ORed into the unprescaled flag; empty means discover them.
    pub unprescaled_triggers: Vec<String>,
    pub candidate_triggers: Vec<String>,
    pub ht_threshold: f64,
    /// Converts a background acceptance fraction into a rate in kHz.
    pub rate_scale_factor: f64,
    /// Worker threads for batch jobs; 0 lets rayon decide.
    pub workers: usize,
    pub plots: bool,
    pub labels: BTreeMap<String, String>,
    pub binning: Binning,
    pub roc: RocDisplay,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            ntuple_dir: PathBuf::from("ntuples"),
            store_dir: PathBuf::from("hists"),
            file_prefix: "ROChist".to_string(),
            output_dir: PathBuf::from("plots"),
            cicada_versions: vec![
                "CICADA_v1p2p2".to_string(),
                "CICADA_v2p2p2".to_string(),
                "CICADA_v1p2p2N".to_string(),
                "CICADA_v2p2p2N".to_string(),
            ],
            backgrounds: vec!["ZeroBias".to_string()],
            signals: vec![],
            split_samples: vec!["ZeroBias".to_string()],
            reference_sample: "ZeroBias".to_string(),
            unprescaled_triggers: vec![],
            candidate_triggers: vec![],
            ht_threshold: 200.0,
            // bunches * revolution frequency [kHz]
            rate_scale_factor: 2544.0 * 11245e-3,
            workers: 0,
            plots: true,
            labels: BTreeMap::new(),
            binning: Binning::default(),
            roc: RocDisplay::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn from_toml(text: &str) -> RocResult<Self> {
        let config: AnalysisConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> RocResult<Self> {
        debug!("loading config from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Loads `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> RocResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> RocResult<()> {
        for binning in [
            &self.binning.score,
            &self.binning.ht,
            &self.binning.flag,
            &self.binning.jet_et,
        ] {
            binning.axis()?;
        }
        if self.binning.flag.bins != 2 {
            return Err(RocError::InvalidArgument(format!(
                "flag axis needs exactly 2 bins, got {}",
                self.binning.flag.bins
            )));
        }
        if !(self.rate_scale_factor > 0.0) {
            return Err(RocError::InvalidArgument(format!(
                "rate_scale_factor must be positive, got {}",
                self.rate_scale_factor
            )));
        }
        self.or_axes()?;
        if self.cicada_versions.is_empty() {
            return Err(RocError::InvalidArgument(
                "no CICADA versions configured".into(),
            ));
        }
        Ok(())
    }

    /// OR charts drawn for every job.
    pub fn or_axes(&self) -> RocResult<Vec<OrAxis>> {
        self.roc.or_axes.iter().map(|&i| OrAxis::try_from(i)).collect()
    }

    pub fn is_split(&self, sample: &str) -> bool {
        self.split_samples.iter().any(|s| s == sample)
    }

    /// Display label of a sample, falling back to its name.
    pub fn label<'a>(&'a self, sample: &'a str) -> &'a str {
        self.labels.get(sample).map_or(sample, String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AnalysisConfig::from_toml("").unwrap();
        assert_eq!(config, AnalysisConfig::default());
        assert_eq!(config.binning.score.bins, 400);
        assert!((config.rate_scale_factor - 28607.28).abs() < 1e-6);
        assert!(config.is_split("ZeroBias"));
        assert!(!config.is_split("TT"));
    }

    #[test]
    fn test_partial_config() {
        let config = AnalysisConfig::from_toml(
            r#"
            cicada_versions = ["CICADA_v1p2p2"]
            backgrounds = ["ZeroBias", "SingleNeutrino_E-10-gun"]
            ht_threshold = 250.0
            plots = false

            [binning.ht]
            bins = 100
            min = 0.0
            max = 1000.0

            [roc]
            x_max = 0.01

            [labels]
            "TT_TuneCP5_13p6TeV_powheg-pythia8" = "TTbar"
            "#,
        )
        .unwrap();
        assert_eq!(config.cicada_versions, vec!["CICADA_v1p2p2"]);
        assert_eq!(config.backgrounds.len(), 2);
        assert_eq!(config.ht_threshold, 250.0);
        assert!(!config.plots);
        assert_eq!(config.binning.ht, AxisBinning::new(100, 0.0, 1000.0));
        assert_eq!(config.binning.score, Binning::default().score);
        assert_eq!(config.roc.x_max, 0.01);
        assert_eq!(config.roc.y_max, 1.2);
        assert_eq!(config.label("TT_TuneCP5_13p6TeV_powheg-pythia8"), "TTbar");
        assert_eq!(config.label("ZeroBias"), "ZeroBias");
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            AnalysisConfig::from_toml("[binning.flag]\nbins = 3\nmin = 0.0\nmax = 3.0"),
            Err(RocError::InvalidArgument(_))
        ));
        assert!(matches!(
            AnalysisConfig::from_toml("rate_scale_factor = 0.0"),
            Err(RocError::InvalidArgument(_))
        ));
        assert!(matches!(
            AnalysisConfig::from_toml("cicada_versions = []"),
            Err(RocError::InvalidArgument(_))
        ));
        assert!(matches!(
            AnalysisConfig::from_toml("ht_threshold = \"high\""),
            Err(RocError::Toml(_))
        ));
        assert!(matches!(
            AnalysisConfig::from_toml("[roc]\nor_axes = [0]"),
            Err(RocError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_or_axes_selection() {
        assert_eq!(
            AnalysisConfig::default().or_axes().unwrap(),
            vec![OrAxis::Auxiliary, OrAxis::Flag]
        );
        let config = AnalysisConfig::from_toml("[roc]\nor_axes = [2]").unwrap();
        assert_eq!(config.or_axes().unwrap(), vec![OrAxis::Flag]);
    }
}
