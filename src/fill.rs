//! Ntuple tables to binned histograms.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use indicatif::ProgressIterator;
use polars::prelude::*;
use tracing::{debug, error, info, warn};

use crate::config::AnalysisConfig;
use crate::error::{RocError, RocResult};
use crate::histogram::BinnedHistogram;
use crate::sample::{self, Sample};
use crate::store::{jet_et_key, score_key, HistogramStore, SampleHistograms, Split};

pub const UNPRESCALED_OR: &str = "L1UnprescaledOR";

fn score_column(version: &str) -> String {
    format!("{version}_score")
}

fn read_table(path: &Path) -> RocResult<DataFrame> {
    debug!("reading {}", path.display());
    Ok(CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?)
}

/// Reads `columns` of every file as `Float64` and stacks the rows.
pub fn read_ntuples(files: &[PathBuf], columns: &[String]) -> RocResult<DataFrame> {
    let mut stacked: Option<DataFrame> = None;
    for path in files {
        let df = read_table(path)?;
        if let Some(missing) = columns.iter().find(|c| df.column(c).is_err()) {
            return Err(RocError::NotFound(format!(
                "column {missing} in {}",
                path.display()
            )));
        }
        let df = df
            .lazy()
            .select(
                columns
                    .iter()
                    .map(|c| col(c).cast(DataType::Float64))
                    .collect::<Vec<_>>(),
            )
            .collect()?;
        match stacked.as_mut() {
            Some(acc) => {
                acc.vstack_mut(&df)?;
            }
            None => stacked = Some(df),
        }
    }
    stacked.ok_or_else(|| RocError::NotFound("no ntuple files".into()))
}

/// `1` when any of `triggers` fired, `0` otherwise (always `0` with no triggers).
pub fn unprescaled_or(triggers: &[String]) -> Expr {
    triggers
        .iter()
        .map(|t| col(t).neq(lit(0)))
        .reduce(|a, b| a.or(b))
        .map_or(lit(0), |any| any.cast(DataType::Int32))
        .alias(UNPRESCALED_OR)
}

fn split_predicate(split: Split) -> Expr {
    let parity = match split {
        Split::Test => 1,
        Split::Train => 0,
    };
    (col("lumi").cast(DataType::Int64) % lit(2)).eq(lit(parity))
}

fn column_values(df: &DataFrame, name: &str) -> RocResult<Vec<Option<f64>>> {
    Ok(df
        .column(name)?
        .cast(&DataType::Float64)?
        .f64()?
        .into_iter()
        .collect())
}

/// Passing fraction among the non-null flags; `None` when every flag is null.
fn flag_pass_fraction(flag: &[Option<f64>]) -> Option<f64> {
    let filled = flag.iter().flatten().count();
    let passed = flag.iter().flatten().filter(|&&f| f == 1.0).count();
    (filled > 0).then(|| passed as f64 / filled as f64)
}

/// Fills the score x HT x flag histogram of each version and the jet Et
/// histogram from a frame that already carries the unprescaled OR column.
pub fn fill_frame(
    config: &AnalysisConfig,
    sample: &str,
    split: Option<Split>,
    df: &DataFrame,
    out: &mut SampleHistograms,
) -> RocResult<()> {
    let binning = &config.binning;
    let ht = column_values(df, "HT")?;
    let flag = column_values(df, UNPRESCALED_OR)?;

    for version in &config.cicada_versions {
        let score = column_values(df, &score_column(version))?;
        let mut hist = BinnedHistogram::new(
            score_key(sample, split, version),
            vec![
                binning.score.axis()?,
                binning.ht.axis()?,
                binning.flag.axis()?,
            ],
        )?;
        for ((s, h), f) in score.iter().zip(&ht).zip(&flag) {
            if let (Some(s), Some(h), Some(f)) = (s, h, f) {
                hist.fill(&[*s, *h, *f])?;
            }
        }
        debug!("{}: {} entries", hist.name(), hist.entries());
        out.insert(hist.name().to_string(), hist);
    }

    let mut jet_et = BinnedHistogram::new(jet_et_key(sample, split), vec![binning.jet_et.axis()?])?;
    for et in column_values(df, "leadJetEt")?.into_iter().flatten() {
        if et >= 0.0 {
            jet_et.fill(&[et])?;
        }
    }
    out.insert(jet_et.name().to_string(), jet_et);

    if let Some(efficiency) = flag_pass_fraction(&flag) {
        info!(
            "{sample}{}: unprescaled L1 OR efficiency {efficiency:.4}",
            split.map_or(String::new(), |s| format!(" ({})", s.as_str()))
        );
    }
    Ok(())
}

/// Reads a sample's ntuples and fills all of its histograms.
pub fn fill_sample(
    config: &AnalysisConfig,
    sample: &Sample,
    triggers: &[String],
) -> RocResult<SampleHistograms> {
    let files = sample.files()?;
    if files.is_empty() {
        return Err(RocError::NotFound(format!(
            "ntuple files for sample {}",
            sample.name
        )));
    }
    let mut columns: Vec<String> = ["lumi", "HT", "leadJetEt"].map(String::from).to_vec();
    columns.extend(config.cicada_versions.iter().map(|v| score_column(v)));
    columns.extend(triggers.iter().cloned());

    let df = read_ntuples(&files, &columns)?
        .lazy()
        .with_column(unprescaled_or(triggers))
        .collect()?;
    info!("{}: {} events from {} files", sample.name, df.height(), files.len());

    let mut out = SampleHistograms::new();
    if config.is_split(&sample.name) {
        for split in [Split::Test, Split::Train] {
            let half = df.clone().lazy().filter(split_predicate(split)).collect()?;
            fill_frame(config, &sample.name, Some(split), &half, &mut out)?;
        }
    } else {
        fill_frame(config, &sample.name, None, &df, &mut out)?;
    }
    Ok(out)
}

/// Whether each of `candidates` has a mean prescale of exactly 1 in `df`.
///
/// With no candidates every `<trigger>_prescale` column of `df` is checked.
/// Missing columns are skipped; a column with no values counts as unprescaled.
fn prescale_verdicts(df: &DataFrame, candidates: &[String]) -> RocResult<Vec<(String, bool)>> {
    let candidates: Vec<String> = if candidates.is_empty() {
        df.get_column_names()
            .iter()
            .filter_map(|c| c.strip_suffix("_prescale"))
            .map(String::from)
            .collect()
    } else {
        candidates.to_vec()
    };

    let mut verdicts = Vec::new();
    for trigger in candidates {
        let column = format!("{trigger}_prescale");
        let Ok(prescale) = df.column(&column) else {
            warn!("no {column} column, skipping {trigger}");
            continue;
        };
        let unprescaled = match prescale.cast(&DataType::Float64)?.mean() {
            Some(mean) if mean != 1.0 => {
                debug!("{trigger} is prescaled (mean {mean})");
                false
            }
            _ => true,
        };
        verdicts.push((trigger, unprescaled));
    }
    Ok(verdicts)
}

/// Triggers among `candidates` whose mean prescale in `df` is exactly 1.
pub fn unprescaled_triggers(df: &DataFrame, candidates: &[String]) -> RocResult<Vec<String>> {
    Ok(prescale_verdicts(df, candidates)?
        .into_iter()
        .filter_map(|(trigger, unprescaled)| unprescaled.then_some(trigger))
        .collect())
}

/// Unprescaled triggers of the reference sample, unless configured explicitly.
///
/// Each file is judged on its own: a trigger is kept when every file that has
/// its prescale column averages exactly 1. Unreadable files are logged and
/// left out.
pub fn resolve_triggers(config: &AnalysisConfig, samples: &[Sample]) -> RocResult<Vec<String>> {
    if !config.unprescaled_triggers.is_empty() {
        return Ok(config.unprescaled_triggers.clone());
    }
    let reference = samples
        .iter()
        .find(|s| s.name == config.reference_sample)
        .ok_or_else(|| {
            RocError::NotFound(format!("reference sample {}", config.reference_sample))
        })?;

    let mut verdicts: BTreeMap<String, bool> = BTreeMap::new();
    for path in reference.files()? {
        let df = match read_table(&path) {
            Ok(df) => df,
            Err(err) => {
                error!("leaving {} out of trigger discovery: {err}", path.display());
                continue;
            }
        };
        for (trigger, unprescaled) in prescale_verdicts(&df, &config.candidate_triggers)? {
            *verdicts.entry(trigger).or_insert(true) &= unprescaled;
        }
    }
    let triggers: Vec<String> = verdicts
        .into_iter()
        .filter_map(|(trigger, unprescaled)| unprescaled.then_some(trigger))
        .collect();
    info!(
        "{} unprescaled triggers in {}: {}",
        triggers.len(),
        reference.name,
        triggers.join(", ")
    );
    Ok(triggers)
}

/// Outcome of filling every sample.
#[derive(Debug, Default)]
pub struct FillSummary {
    pub written: Vec<PathBuf>,
    pub skipped: usize,
    pub failed: usize,
}

/// Fills and stores every sample under the ntuple directory.
///
/// Samples without ntuples are skipped with a warning; a sample that fails
/// to read, fill or save is logged and counted. Neither stops the run.
pub fn run(config: &AnalysisConfig) -> RocResult<FillSummary> {
    let samples = sample::discover(config)?;
    let triggers = match resolve_triggers(config, &samples) {
        Ok(triggers) => triggers,
        Err(err) if err.is_recoverable() => {
            warn!("no unprescaled triggers: {err}");
            Vec::new()
        }
        Err(err) => return Err(err),
    };
    let store = HistogramStore::from_config(config);
    let mut summary = FillSummary::default();
    for sample in samples.iter().progress() {
        match fill_sample(config, sample, &triggers)
            .and_then(|histograms| store.save(&sample.name, &histograms))
        {
            Ok(path) => summary.written.push(path),
            Err(err) if err.is_recoverable() => {
                warn!("skipping {}: {err}", sample.name);
                summary.skipped += 1;
            }
            Err(err) => {
                error!("failed to fill {}: {err}", sample.name);
                summary.failed += 1;
            }
        }
    }
    info!(
        "filled {} samples into {}, {} skipped, {} failed",
        summary.written.len(),
        store.dir().display(),
        summary.skipped,
        summary.failed
    );
    Ok(summary)
}
