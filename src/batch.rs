//! Batch ROC production over `(background, version, signal)` jobs.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::PathBuf;

use indicatif::ParallelProgressIterator;
use rayon::prelude::*;
use tracing::{error, info, warn};

use crate::config::AnalysisConfig;
use crate::error::{RocError, RocResult};
use crate::histogram::BinnedHistogram;
use crate::plot::{
    roc_file_name, score_file_name, DistributionPlot, RocPlot, HT_FILE_NAME, JET_ET_FILE_NAME,
};
use crate::report::{self, EfficiencyRow};
use crate::sample::version_label;
use crate::store::{jet_et_key, score_key, HistogramStore, SampleHistograms, Split};
use crate::sweep::{self, EfficiencyPoint, OrAxis, SweepAxis, ThresholdCurve};

pub const EFFICIENCY_TABLE: &str = "efficiencies.tsv";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RocJob {
    pub background: String,
    pub version: String,
    pub signal: String,
}

/// Every curve and marker drawn for one job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobCurves {
    pub score: ThresholdCurve,
    pub ht: ThresholdCurve,
    pub score_or_ht: ThresholdCurve,
    pub score_or_l1: ThresholdCurve,
    pub l1: EfficiencyPoint,
    pub ht_cut: EfficiencyPoint,
}

impl JobCurves {
    pub fn compute(bkg: &BinnedHistogram, sig: &BinnedHistogram, ht_threshold: f64) -> RocResult<Self> {
        Ok(Self {
            score: sweep::threshold_curve(bkg, sig, SweepAxis::Primary)?,
            ht: sweep::threshold_curve(bkg, sig, SweepAxis::Auxiliary)?,
            score_or_ht: sweep::or_curve(bkg, sig, OrAxis::Auxiliary, ht_threshold)?,
            score_or_l1: sweep::or_curve(bkg, sig, OrAxis::Flag, 1.0)?,
            l1: EfficiencyPoint::measure(bkg, sig, |h| {
                sweep::flag_efficiency(h, OrAxis::Flag.index())
            })?,
            ht_cut: EfficiencyPoint::measure(bkg, sig, |h| {
                sweep::cut_efficiency(h, SweepAxis::Auxiliary.index(), ht_threshold)
            })?,
        })
    }

    /// The configured OR charts of `job`, keyed by their file name.
    pub fn plots(&self, config: &AnalysisConfig, job: &RocJob) -> RocResult<Vec<(String, RocPlot)>> {
        let bkg_label = config.label(&job.background);
        let (x_desc, x_scale) = if config.roc.rate {
            (format!("{bkg_label} Rate [kHz]"), config.rate_scale_factor)
        } else {
            (format!("{bkg_label} Efficiency"), 1.0)
        };
        let title = format!(
            "{}: {} vs {bkg_label}",
            version_label(&job.version),
            config.label(&job.signal)
        );
        let base = || {
            RocPlot::new(title.clone(), x_desc.clone(), x_scale)
                .with_ranges(config.roc.x_max, config.roc.y_max)
        };
        let cut = config.ht_threshold;

        let plots = config
            .or_axes()?
            .into_iter()
            .map(|or_axis| {
                let plot = match or_axis {
                    OrAxis::Auxiliary => base()
                        .with_curve(format!("CICADA OR HT >= {cut}"), &self.score_or_ht)
                        .with_curve("CICADA", &self.score)
                        .with_curve("HT", &self.ht)
                        .with_point(format!("HT >= {cut}"), self.ht_cut),
                    OrAxis::Flag => base()
                        .with_curve("CICADA OR L1 unprescaled", &self.score_or_l1)
                        .with_curve("CICADA", &self.score)
                        .with_point("L1 unprescaled", self.l1),
                };
                let file_name =
                    roc_file_name(or_axis, &job.background, &job.version, &job.signal);
                (file_name, plot)
            })
            .collect();
        Ok(plots)
    }
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub rows: Vec<EfficiencyRow>,
    pub plots: Vec<PathBuf>,
    pub skipped: usize,
    pub failed: usize,
    pub table: Option<PathBuf>,
}

/// Histogram name of `sample`, using the test half of split samples.
fn job_key(config: &AnalysisConfig, sample: &str, version: &str) -> String {
    let split = config.is_split(sample).then_some(Split::Test);
    score_key(sample, split, version)
}

/// Configured signals, or every stored sample that is not a background.
pub fn signals(config: &AnalysisConfig, store: &HistogramStore) -> RocResult<Vec<String>> {
    if !config.signals.is_empty() {
        return Ok(config.signals.clone());
    }
    Ok(store
        .samples()?
        .into_iter()
        .filter(|s| !config.backgrounds.contains(s))
        .collect())
}

pub fn jobs(config: &AnalysisConfig, signals: &[String]) -> Vec<RocJob> {
    let mut jobs = Vec::new();
    for background in &config.backgrounds {
        for version in &config.cicada_versions {
            for signal in signals {
                jobs.push(RocJob {
                    background: background.clone(),
                    version: version.clone(),
                    signal: signal.clone(),
                });
            }
        }
    }
    jobs
}

/// Loads each sample once; unreadable samples are logged and left out.
fn load_samples<'a>(
    store: &HistogramStore,
    samples: impl IntoIterator<Item = &'a str>,
) -> BTreeMap<String, SampleHistograms> {
    let mut loaded = BTreeMap::new();
    for sample in samples {
        if loaded.contains_key(sample) {
            continue;
        }
        match store.load_sample(sample) {
            Ok(histograms) => {
                loaded.insert(sample.to_string(), histograms);
            }
            Err(err) if err.is_recoverable() => warn!("{err}"),
            Err(err) => error!("failed to load {sample}: {err}"),
        }
    }
    loaded
}

fn lookup<'a>(
    loaded: &'a BTreeMap<String, SampleHistograms>,
    sample: &str,
    name: &str,
) -> RocResult<&'a BinnedHistogram> {
    loaded
        .get(sample)
        .and_then(|histograms| histograms.get(name))
        .ok_or_else(|| RocError::NotFound(format!("histogram {name} in sample {sample}")))
}

fn run_job(
    config: &AnalysisConfig,
    loaded: &BTreeMap<String, SampleHistograms>,
    job: &RocJob,
) -> RocResult<(EfficiencyRow, Vec<PathBuf>)> {
    let bkg = lookup(loaded, &job.background, &job_key(config, &job.background, &job.version))?;
    let sig = lookup(loaded, &job.signal, &job_key(config, &job.signal, &job.version))?;
    let curves = JobCurves::compute(bkg, sig, config.ht_threshold)?;

    let mut written = Vec::new();
    if config.plots {
        for (file_name, plot) in curves.plots(config, job)? {
            let path = config.output_dir.join(file_name);
            plot.render(&path, (config.roc.width, config.roc.height))?;
            written.push(path);
        }
    }
    let row = EfficiencyRow {
        background: job.background.clone(),
        version: job.version.clone(),
        signal: job.signal.clone(),
        l1_signal: curves.l1.tpr,
        l1_background: curves.l1.fpr,
        ht_signal: curves.ht_cut.tpr,
        ht_background: curves.ht_cut.fpr,
    };
    Ok((row, written))
}

/// Runs every job on a rayon pool and writes the efficiency table.
///
/// Jobs with missing inputs are skipped with a warning and any other failing
/// job is logged; neither stops the batch.
pub fn run(config: &AnalysisConfig) -> RocResult<BatchSummary> {
    let store = HistogramStore::from_config(config);
    let signals = signals(config, &store)?;
    let jobs = jobs(config, &signals);
    let loaded = load_samples(
        &store,
        config
            .backgrounds
            .iter()
            .chain(&signals)
            .map(String::as_str),
    );
    std::fs::create_dir_all(&config.output_dir)?;
    info!("running {} ROC jobs", jobs.len());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers)
        .build()?;
    let results: Vec<_> = pool.install(|| {
        jobs.par_iter()
            .progress()
            .map(|job| (job, run_job(config, &loaded, job)))
            .collect()
    });

    let mut summary = BatchSummary::default();
    for (job, result) in results {
        match result {
            Ok((row, plots)) => {
                summary.rows.push(row);
                summary.plots.extend(plots);
            }
            Err(err) if err.is_recoverable() => {
                warn!("skipping {} / {} / {}: {err}", job.background, job.version, job.signal);
                summary.skipped += 1;
            }
            Err(err) => {
                error!("{} / {} / {} failed: {err}", job.background, job.version, job.signal);
                summary.failed += 1;
            }
        }
    }

    let path = config.output_dir.join(EFFICIENCY_TABLE);
    let mut df = report::efficiency_frame(&summary.rows)?;
    report::write_tsv(&mut df, File::create(&path)?)?;
    summary.table = Some(path);
    info!(
        "{} jobs done, {} skipped, {} failed",
        summary.rows.len(),
        summary.skipped,
        summary.failed
    );
    Ok(summary)
}

/// Adds one normalized series per sample, leaving out samples whose
/// histogram is missing or empty.
fn distribution_plot<F>(
    config: &AnalysisConfig,
    loaded: &BTreeMap<String, SampleHistograms>,
    samples: &[&String],
    file_name: &str,
    mut plot: DistributionPlot,
    axis: usize,
    key: F,
) -> Option<(String, DistributionPlot)>
where
    F: Fn(&str) -> String,
{
    for sample in samples {
        let added = lookup(loaded, sample, &key(sample.as_str()))
            .and_then(|hist| plot.clone().with_histogram(config.label(sample), hist, axis));
        match added {
            Ok(with_sample) => plot = with_sample,
            Err(err) => warn!("leaving {sample} out of {file_name}: {err}"),
        }
    }
    (!plot.series.is_empty()).then(|| (file_name.to_string(), plot))
}

/// Score chart of each version, then HT and leading jet Et charts, each with
/// backgrounds first and signals after.
pub fn distribution_plots(
    config: &AnalysisConfig,
    loaded: &BTreeMap<String, SampleHistograms>,
    signals: &[String],
) -> Vec<(String, DistributionPlot)> {
    let samples: Vec<&String> = config.backgrounds.iter().chain(signals).collect();
    let mut plots = Vec::new();
    for version in &config.cicada_versions {
        let file_name = score_file_name(version);
        plots.extend(distribution_plot(
            config,
            loaded,
            &samples,
            &file_name,
            DistributionPlot::new(version_label(version), "Anomaly Score"),
            SweepAxis::Primary.index(),
            |sample| job_key(config, sample, version),
        ));
    }
    // HT does not depend on the version, any score histogram carries it
    if let Some(version) = config.cicada_versions.first() {
        plots.extend(distribution_plot(
            config,
            loaded,
            &samples,
            HT_FILE_NAME,
            DistributionPlot::new("HT", "HT [GeV]"),
            SweepAxis::Auxiliary.index(),
            |sample| job_key(config, sample, version),
        ));
    }
    plots.extend(distribution_plot(
        config,
        loaded,
        &samples,
        JET_ET_FILE_NAME,
        DistributionPlot::new("Leading jet", "Leading jet Et [GeV]"),
        0,
        |sample| jet_et_key(sample, config.is_split(sample).then_some(Split::Test)),
    ));
    plots
}

pub fn render_distribution_plots(config: &AnalysisConfig) -> RocResult<Vec<PathBuf>> {
    let store = HistogramStore::from_config(config);
    let signals = signals(config, &store)?;
    let loaded = load_samples(
        &store,
        config
            .backgrounds
            .iter()
            .chain(&signals)
            .map(String::as_str),
    );
    std::fs::create_dir_all(&config.output_dir)?;
    let mut written = Vec::new();
    for (file_name, plot) in distribution_plots(config, &loaded, &signals) {
        let path = config.output_dir.join(file_name);
        plot.render(&path, (config.roc.width, config.roc.height))?;
        written.push(path);
    }
    Ok(written)
}
