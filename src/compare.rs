//! Agreement of unpacked and emulated CICADA scores, run by run.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use polars::prelude::*;
use tracing::{debug, info};

use crate::config::AnalysisConfig;
use crate::error::{RocError, RocResult};
use crate::fill::read_ntuples;
use crate::sample;

pub const RUN: &str = "run";
pub const UNPACKED: &str = "CICADAScore_unpacked";
pub const EMULATED: &str = "CICADAScore_emulated";

const AGREEMENT: &str = "agreement";

/// Fraction of events per run whose unpacked and emulated scores are equal.
///
/// Events missing either score or the run number are not counted.
pub fn run_agreement(df: &DataFrame) -> RocResult<BTreeMap<i64, f64>> {
    let grouped = df
        .clone()
        .lazy()
        .filter(
            col(RUN)
                .is_not_null()
                .and(col(UNPACKED).is_not_null())
                .and(col(EMULATED).is_not_null()),
        )
        .group_by_stable([col(RUN).cast(DataType::Int64)])
        .agg([col(UNPACKED)
            .eq(col(EMULATED))
            .cast(DataType::Float64)
            .mean()
            .alias(AGREEMENT)])
        .collect()?;

    let runs = grouped.column(RUN)?.i64()?;
    let agreement = grouped.column(AGREEMENT)?.f64()?;
    Ok(runs
        .into_iter()
        .zip(agreement)
        .filter_map(|(run, fraction)| Some((run?, fraction?)))
        .collect())
}

pub fn agreement_file_name(sample: &str) -> String {
    format!("differences_{sample}.json")
}

/// Reads the ntuples of `sample` and writes its per-run agreement as a JSON
/// object keyed by run number.
pub fn compare_sample(config: &AnalysisConfig, sample: &str) -> RocResult<PathBuf> {
    let found = sample::discover(config)?
        .into_iter()
        .find(|s| s.name == sample)
        .ok_or_else(|| RocError::NotFound(format!("sample {sample}")))?;
    let files = found.files()?;
    if files.is_empty() {
        return Err(RocError::NotFound(format!("ntuple files for sample {sample}")));
    }
    let columns = [RUN, UNPACKED, EMULATED].map(String::from);
    let df = read_ntuples(&files, &columns)?;
    let agreement = run_agreement(&df)?;
    for (run, fraction) in &agreement {
        debug!("run {run}: {fraction:.4} of scores agree");
    }

    std::fs::create_dir_all(&config.output_dir)?;
    let path = config.output_dir.join(agreement_file_name(sample));
    let writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(writer, &agreement)?;
    info!(
        "{sample}: agreement of {} runs written to {}",
        agreement.len(),
        path.display()
    );
    Ok(path)
}
