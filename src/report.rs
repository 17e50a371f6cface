//! Tab-separated efficiency and rate tables.

use std::env;
use std::io::Write;

use polars::prelude::*;
use tracing::{error, warn};

use crate::config::AnalysisConfig;
use crate::error::RocResult;
use crate::histogram::BinnedHistogram;
use crate::store::{score_key, HistogramStore, Split};
use crate::sweep::{self, SweepAxis};

/// Single-point efficiencies of one `(background, version, signal)` job.
#[derive(Debug, Clone, PartialEq)]
pub struct EfficiencyRow {
    pub background: String,
    pub version: String,
    pub signal: String,
    pub l1_signal: f64,
    pub l1_background: f64,
    pub ht_signal: f64,
    pub ht_background: f64,
}

pub fn efficiency_frame(rows: &[EfficiencyRow]) -> PolarsResult<DataFrame> {
    df!(
        "Background" => rows.iter().map(|r| r.background.as_str()).collect::<Vec<_>>(),
        "Version" => rows.iter().map(|r| r.version.as_str()).collect::<Vec<_>>(),
        "Signal" => rows.iter().map(|r| r.signal.as_str()).collect::<Vec<_>>(),
        "L1_sig" => rows.iter().map(|r| r.l1_signal).collect::<Vec<_>>(),
        "L1_bkg" => rows.iter().map(|r| r.l1_background).collect::<Vec<_>>(),
        "HT_sig" => rows.iter().map(|r| r.ht_signal).collect::<Vec<_>>(),
        "HT_bkg" => rows.iter().map(|r| r.ht_background).collect::<Vec<_>>()
    )
}

/// Unprescaled-trigger and HT-cut efficiency of every stored sample and version.
///
/// Split samples are measured on their test half. Missing, empty or
/// unreadable histograms are logged and left out.
pub fn sample_efficiencies(config: &AnalysisConfig, store: &HistogramStore) -> RocResult<DataFrame> {
    let (mut samples, mut versions, mut l1, mut ht) = (vec![], vec![], vec![], vec![]);
    for sample in store.samples()? {
        let histograms = match store.load_sample(&sample) {
            Ok(histograms) => histograms,
            Err(err) if err.is_recoverable() => {
                warn!("skipping {sample}: {err}");
                continue;
            }
            Err(err) => {
                error!("failed to load {sample}: {err}");
                continue;
            }
        };
        let split = config.is_split(&sample).then_some(Split::Test);
        for version in &config.cicada_versions {
            let key = score_key(&sample, split, version);
            let Some(hist) = histograms.get(&key) else {
                warn!("no {key} in {sample}");
                continue;
            };
            let measured = sweep::flag_efficiency(hist, 2).and_then(|l1_eff| {
                Ok((l1_eff, sweep::cut_efficiency(hist, 1, config.ht_threshold)?))
            });
            match measured {
                Ok((l1_eff, ht_eff)) => {
                    samples.push(sample.clone());
                    versions.push(version.clone());
                    l1.push(l1_eff);
                    ht.push(ht_eff);
                }
                Err(err) => warn!("skipping {key}: {err}"),
            }
        }
    }
    Ok(df!(
        "Sample" => samples,
        "Version" => versions,
        "L1_eff" => l1,
        &format!("HT{}_eff", config.ht_threshold) => ht
    )?)
}

/// Accept rate vs. threshold along `axis`, in units of `rate_scale`.
pub fn rate_frame(hist: &BinnedHistogram, axis: SweepAxis, rate_scale: f64) -> RocResult<DataFrame> {
    let ratio = sweep::accept_ratio(hist, axis)?;
    let scale = |v: &[f64]| v.iter().map(|x| x * rate_scale).collect::<Vec<_>>();
    Ok(df!(
        "Threshold" => &ratio.thresholds,
        "Rate" => scale(&ratio.ratio),
        "Rate_err" => scale(&ratio.uncertainty)
    )?)
}

pub fn write_tsv<W: Write>(df: &mut DataFrame, writer: W) -> RocResult<()> {
    CsvWriter::new(writer).with_separator(b'\t').finish(df)?;
    Ok(())
}

pub fn print_table(df: &DataFrame) {
    env::set_var("POLARS_FMT_TABLE_ROUNDED_CORNERS", "1");
    env::set_var("POLARS_FMT_MAX_COLS", "-1");
    env::set_var("POLARS_FMT_MAX_ROWS", "-1");
    env::set_var("POLARS_FMT_STR_LEN", "50");
    println!("{}", df);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::Axis;
    use crate::store::SampleHistograms;

    fn score_hist(name: String, events: &[(f64, f64, f64)]) -> BinnedHistogram {
        let mut hist = BinnedHistogram::new(
            name,
            vec![
                Axis::uniform(4, 0.0, 4.0).unwrap(),
                Axis::uniform(4, 0.0, 400.0).unwrap(),
                Axis::uniform(2, -0.5, 1.5).unwrap(),
            ],
        )
        .unwrap();
        for &(s, h, f) in events {
            hist.fill(&[s, h, f]).unwrap();
        }
        hist
    }

    #[test]
    fn test_efficiency_table_as_tsv() {
        let rows = vec![EfficiencyRow {
            background: "ZeroBias".into(),
            version: "CICADA_v1p2p2".into(),
            signal: "TT".into(),
            l1_signal: 0.75,
            l1_background: 0.5,
            ht_signal: 0.25,
            ht_background: 0.125,
        }];
        let mut df = efficiency_frame(&rows).unwrap();
        let mut buf = Vec::new();
        write_tsv(&mut df, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("Background\tVersion\tSignal\tL1_sig\tL1_bkg\tHT_sig\tHT_bkg")
        );
        assert_eq!(lines.next(), Some("ZeroBias\tCICADA_v1p2p2\tTT\t0.75\t0.5\t0.25\t0.125"));
    }

    #[test]
    fn test_sample_efficiencies() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistogramStore::new(dir.path(), "ROChist");
        let config = AnalysisConfig {
            cicada_versions: vec!["CICADA_v1p2p2".into(), "CICADA_v2p2p2".into()],
            ..AnalysisConfig::default()
        };

        let mut zb = SampleHistograms::new();
        let name = score_key("ZeroBias", Some(Split::Test), "CICADA_v1p2p2");
        zb.insert(
            name.clone(),
            score_hist(name, &[(0.5, 50.0, 0.0), (1.5, 250.0, 1.0), (2.5, 150.0, 0.0), (3.5, 350.0, 0.0)]),
        );
        store.save("ZeroBias", &zb).unwrap();

        let df = sample_efficiencies(&config, &store).unwrap();
        // the v2p2p2 histogram is missing and left out
        assert_eq!(df.height(), 1);
        let l1 = df.column("L1_eff").unwrap().f64().unwrap().get(0);
        let ht = df.column("HT200_eff").unwrap().f64().unwrap().get(0);
        assert_eq!(l1, Some(0.25));
        assert_eq!(ht, Some(0.5));
    }

    #[test]
    fn test_unreadable_sample_is_left_out() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistogramStore::new(dir.path(), "ROChist");
        let config = AnalysisConfig {
            cicada_versions: vec!["CICADA_v1p2p2".into()],
            ..AnalysisConfig::default()
        };

        let mut zb = SampleHistograms::new();
        let name = score_key("ZeroBias", Some(Split::Test), "CICADA_v1p2p2");
        zb.insert(name.clone(), score_hist(name, &[(0.5, 250.0, 1.0), (1.5, 50.0, 0.0)]));
        store.save("ZeroBias", &zb).unwrap();
        std::fs::write(store.path_for("Broken"), "not json").unwrap();

        let df = sample_efficiencies(&config, &store).unwrap();
        assert_eq!(df.height(), 1);
        assert_eq!(df.column("Sample").unwrap().str().unwrap().get(0), Some("ZeroBias"));
        assert_eq!(df.column("L1_eff").unwrap().f64().unwrap().get(0), Some(0.5));
    }

    #[test]
    fn test_rate_frame_scales() {
        let hist = score_hist(
            "ZeroBias".into(),
            &[(0.5, 0.0, 0.0), (1.5, 0.0, 0.0), (2.5, 0.0, 0.0), (3.5, 0.0, 0.0)],
        );
        let df = rate_frame(&hist, SweepAxis::Primary, 100.0).unwrap();
        let rates: Vec<_> = df.column("Rate").unwrap().f64().unwrap().into_no_null_iter().collect();
        assert_eq!(rates, vec![100.0, 75.0, 50.0, 25.0, 0.0]);
        let errs: Vec<_> = df.column("Rate_err").unwrap().f64().unwrap().into_no_null_iter().collect();
        assert_eq!(errs[3], 25.0);
    }
}
