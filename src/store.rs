//! File-per-sample histogram store.
//!
//! Each sample gets one `<prefix>_<sample>.json` file holding a map from
//! histogram name to [`BinnedHistogram`].

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::AnalysisConfig;
use crate::error::{RocError, RocResult};
use crate::histogram::BinnedHistogram;

pub type SampleHistograms = BTreeMap<String, BinnedHistogram>;

/// Half of a sample split by luminosity block parity.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Split {
    Test,
    Train,
}

impl Split {
    /// Odd luminosity blocks are held out for testing.
    pub fn of_lumi(lumi: i64) -> Self {
        if lumi.rem_euclid(2) == 1 {
            Split::Test
        } else {
            Split::Train
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Split::Test => "test",
            Split::Train => "train",
        }
    }
}

fn with_split(base: String, split: Option<Split>) -> String {
    match split {
        Some(split) => format!("{base}_{}", split.as_str()),
        None => base,
    }
}

/// Name of the score x HT x L1 flag histogram.
pub fn score_key(sample: &str, split: Option<Split>, version: &str) -> String {
    format!(
        "{}_{version}",
        with_split(format!("anomalyScore_{sample}"), split)
    )
}

/// Name of the leading jet Et histogram.
pub fn jet_et_key(sample: &str, split: Option<Split>) -> String {
    with_split(format!("jetEt_{sample}"), split)
}

#[derive(Debug, Clone)]
pub struct HistogramStore {
    dir: PathBuf,
    prefix: String,
}

impl HistogramStore {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(&config.store_dir, &config.file_prefix)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, sample: &str) -> PathBuf {
        self.dir.join(format!("{}_{sample}.json", self.prefix))
    }

    pub fn load_sample(&self, sample: &str) -> RocResult<SampleHistograms> {
        let path = self.path_for(sample);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(RocError::NotFound(format!(
                    "histogram file for sample {sample} ({})",
                    path.display()
                )));
            }
            Err(err) => return Err(err.into()),
        };
        debug!("reading {}", path.display());
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn load(&self, sample: &str, name: &str) -> RocResult<BinnedHistogram> {
        self.load_sample(sample)?
            .remove(name)
            .ok_or_else(|| RocError::NotFound(format!("histogram {name} in sample {sample}")))
    }

    pub fn save(&self, sample: &str, histograms: &SampleHistograms) -> RocResult<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(sample);
        let writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(writer, histograms)?;
        debug!("wrote {} histograms to {}", histograms.len(), path.display());
        Ok(path)
    }

    /// Names of all samples with a file in the store, sorted.
    pub fn samples(&self) -> RocResult<Vec<String>> {
        let lead = format!("{}_", self.prefix);
        let mut samples = Vec::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(RocError::NotFound(format!(
                    "histogram store {}",
                    self.dir.display()
                )));
            }
            Err(err) => return Err(err.into()),
        };
        for entry in entries {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(sample) = name
                .strip_prefix(&lead)
                .and_then(|rest| rest.strip_suffix(".json"))
            {
                samples.push(sample.to_string());
            }
        }
        samples.sort();
        Ok(samples)
    }
}
