use std::path::PathBuf;

use tracing::warn;
use walkdir::WalkDir;

use crate::config::AnalysisConfig;
use crate::error::{RocError, RocResult};

/// A named set of ntuple files living under one directory.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub label: String,
    pub dir: PathBuf,
}

impl Sample {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            dir: dir.into(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Every `.csv` file below the sample directory, sorted.
    pub fn files(&self) -> RocResult<Vec<PathBuf>> {
        if !self.dir.is_dir() {
            return Err(RocError::NotFound(format!(
                "ntuple directory for sample {} ({})",
                self.name,
                self.dir.display()
            )));
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.dir).follow_links(true) {
            let entry = entry.map_err(std::io::Error::from)?;
            let path = entry.path();
            if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "csv") {
                files.push(path.to_path_buf());
            }
        }
        files.sort();
        Ok(files)
    }
}

/// One sample per subdirectory of the configured ntuple directory.
pub fn discover(config: &AnalysisConfig) -> RocResult<Vec<Sample>> {
    let root = &config.ntuple_dir;
    if !root.is_dir() {
        return Err(RocError::NotFound(format!(
            "ntuple directory {}",
            root.display()
        )));
    }
    let mut samples = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(1).follow_links(true) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let path = entry.path();
        let Some(name) = entry.file_name().to_str() else {
            warn!("skipping non UTF-8 sample directory {}", path.display());
            continue;
        };
        let label = config.label(name).to_string();
        samples.push(Sample::new(name, path).with_label(label));
    }
    samples.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(samples)
}

/// `CICADA_v1p2p2N` -> `CICADA 1.2.2N`.
pub fn version_label(version: &str) -> String {
    match version.rsplit_once('_') {
        Some((model, tag)) => {
            let tag = tag.strip_prefix('v').unwrap_or(tag).replace('p', ".");
            format!("{model} {tag}")
        }
        None => version.to_string(),
    }
}
