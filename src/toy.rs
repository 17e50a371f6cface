//! Toy ntuples for exercising the pipeline without detector data.

use std::fs::File;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use rand::{distributions::Uniform, rngs::StdRng, Rng, SeedableRng};
use tracing::info;

use crate::config::AnalysisConfig;
use crate::error::RocResult;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum EventType {
    Signal,
    Background,
}

/// An HT trigger with a fixed prescale.
#[derive(Clone, Debug, PartialEq)]
pub struct ToyTrigger {
    pub name: String,
    pub ht_threshold: f64,
    pub prescale: i64,
}

impl ToyTrigger {
    pub fn new(name: &str, ht_threshold: f64, prescale: i64) -> Self {
        Self {
            name: name.to_string(),
            ht_threshold,
            prescale,
        }
    }

    pub fn fires(&self, ht: f64) -> bool {
        ht >= self.ht_threshold
    }
}

/// Two unprescaled HT triggers and a prescaled low-threshold one.
pub fn default_triggers() -> Vec<ToyTrigger> {
    vec![
        ToyTrigger::new("L1_HTT280er", 280.0, 1),
        ToyTrigger::new("L1_HTT360er", 360.0, 1),
        ToyTrigger::new("L1_HTT120er", 120.0, 100),
    ]
}

#[derive(Clone, Debug, PartialEq)]
struct ToyEvent {
    lumi: i64,
    ht: f64,
    lead_jet_et: f64,
    scores: Vec<f64>,
}

impl ToyEvent {
    const SCORE_BOUNDS: (f64, f64) = (0.0, 1024.0);
    const HT_BOUNDS: (f64, f64) = (0.0, 2000.0);
    const LUMI_MAX: i64 = 500;
    const TAU_SCORE_SIG: f64 = 120.0;
    const TAU_SCORE_BKG: f64 = 15.0;
    const TAU_HT_SIG: f64 = 220.0;
    const TAU_HT_BKG: f64 = 45.0;
    const P_NO_JET: f64 = 0.1;

    fn generate<R: Rng>(rng: &mut R, event_type: EventType, n_versions: usize) -> Self {
        let (tau_score, tau_ht) = match event_type {
            EventType::Signal => (ToyEvent::TAU_SCORE_SIG, ToyEvent::TAU_HT_SIG),
            EventType::Background => (ToyEvent::TAU_SCORE_BKG, ToyEvent::TAU_HT_BKG),
        };
        let ht = ToyEvent::gen_exponential(rng, ToyEvent::HT_BOUNDS, tau_ht);
        let scores = (0..n_versions)
            .map(|i| {
                let tau = tau_score * (1.0 + 0.1 * i as f64);
                ToyEvent::gen_exponential(rng, ToyEvent::SCORE_BOUNDS, tau)
            })
            .collect();
        let lead_jet_et = if rng.gen_bool(ToyEvent::P_NO_JET) {
            -1.0
        } else {
            ht * rng.sample(Uniform::new(0.3, 1.0))
        };
        ToyEvent {
            lumi: rng.gen_range(1..=ToyEvent::LUMI_MAX),
            ht,
            lead_jet_et,
            scores,
        }
    }

    /// Truncated exponential by accept-reject.
    fn gen_exponential<R: Rng>(rng: &mut R, bounds: (f64, f64), tau: f64) -> f64 {
        let u_x = Uniform::new(bounds.0, bounds.1);
        let u_p = Uniform::new(0.0, 1.0 / tau);
        loop {
            let x_star = rng.sample(u_x);
            if f64::exp(-x_star / tau) / tau >= rng.sample(u_p) {
                return x_star;
            }
        }
    }
}

/// A generated sample, ready to be written as an ntuple table.
#[derive(Clone, Debug)]
pub struct ToySample {
    versions: Vec<String>,
    triggers: Vec<ToyTrigger>,
    events: Vec<ToyEvent>,
}

impl ToySample {
    pub fn generate(
        n_events: usize,
        event_type: EventType,
        seed: u64,
        versions: &[String],
        triggers: &[ToyTrigger],
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let events = (0..n_events)
            .map(|_| ToyEvent::generate(&mut rng, event_type, versions.len()))
            .collect();
        Self {
            versions: versions.to_vec(),
            triggers: triggers.to_vec(),
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Columns: `lumi`, `HT`, `leadJetEt`, `<version>_score`, and per trigger
    /// the bit and its `_prescale`.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let mut columns = vec![
            Series::new("lumi", self.events.iter().map(|e| e.lumi).collect::<Vec<_>>()),
            Series::new("HT", self.events.iter().map(|e| e.ht).collect::<Vec<_>>()),
            Series::new(
                "leadJetEt",
                self.events.iter().map(|e| e.lead_jet_et).collect::<Vec<_>>(),
            ),
        ];
        for (i, version) in self.versions.iter().enumerate() {
            columns.push(Series::new(
                &format!("{version}_score"),
                self.events.iter().map(|e| e.scores[i]).collect::<Vec<_>>(),
            ));
        }
        for trigger in &self.triggers {
            columns.push(Series::new(
                &trigger.name,
                self.events
                    .iter()
                    .map(|e| i32::from(trigger.fires(e.ht)))
                    .collect::<Vec<_>>(),
            ));
            columns.push(Series::new(
                &format!("{}_prescale", trigger.name),
                vec![trigger.prescale; self.events.len()],
            ));
        }
        DataFrame::new(columns)
    }

    pub fn write_csv(&self, path: &Path) -> RocResult<PathBuf> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut df = self.to_dataframe()?;
        let file = File::create(path)?;
        CsvWriter::new(file).finish(&mut df)?;
        info!("wrote {} toy events to {}", self.len(), path.display());
        Ok(path.to_path_buf())
    }
}

/// One background-like ntuple per configured background and one signal-like
/// ntuple per name in `signals`, under `<ntuple_dir>/<sample>/`.
pub fn generate_samples(
    config: &AnalysisConfig,
    signals: &[String],
    n_events: usize,
    seed: u64,
) -> RocResult<Vec<PathBuf>> {
    let triggers = default_triggers();
    let samples = config
        .backgrounds
        .iter()
        .map(|name| (name, EventType::Background))
        .chain(signals.iter().map(|name| (name, EventType::Signal)));
    let mut written = Vec::new();
    for (i, (name, event_type)) in samples.enumerate() {
        let sample = ToySample::generate(
            n_events,
            event_type,
            seed.wrapping_add(i as u64),
            &config.cicada_versions,
            &triggers,
        );
        let path = config.ntuple_dir.join(name).join(format!("{name}.csv"));
        written.push(sample.write_csv(&path)?);
    }
    Ok(written)
}
