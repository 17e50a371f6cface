use std::path::{Path, PathBuf};

use cicada_roc::{
    batch, compare, fill,
    report::{self, print_table},
    store::{score_key, HistogramStore, Split},
    toy, AnalysisConfig, SweepAxis,
};
use clap::{CommandFactory, Parser, Subcommand};
use polars::prelude::*;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Analysis configuration (TOML); defaults are used when omitted
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Skip rendering PNG charts
    #[arg(long, global = true)]
    no_plots: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write toy ntuples for every background and the given signals
    Generate {
        #[arg(short, long, value_name = "SIGNAL", default_values_t = [String::from("TT")])]
        signal: Vec<String>,
        #[arg(short, long, value_name = "EVENTS", default_value_t = 10000)]
        events: usize,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Fill and store the histograms of every sample under the ntuple directory
    Fill,
    /// Produce ROC curves and the efficiency table for every job
    Roc,
    /// Unprescaled-trigger and HT-cut efficiency of each stored sample
    Efficiency {
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },
    /// Accept rate vs. threshold of one sample along the score and HT axes
    Rates {
        sample: String,
        /// CICADA version; the first configured one when omitted
        #[arg(long, value_name = "VERSION")]
        cicada: Option<String>,
        /// Only sweep one axis: 0 for the score, 1 for HT
        #[arg(short, long, value_name = "AXIS")]
        axis: Option<usize>,
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },
    /// Normalized score, HT and leading jet Et distributions
    Distributions,
    /// Per-run agreement of unpacked and emulated scores of one sample
    Compare { sample: String },
}

fn write_new(df: &mut DataFrame, out_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Writing result to {:?}", out_path);
    let file = std::fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(out_path)?;
    report::write_tsv(df, file)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = AnalysisConfig::load_or_default(cli.config.as_deref())?;
    if cli.no_plots {
        config.plots = false;
    }
    match cli.command {
        Some(Commands::Generate {
            signal,
            events,
            seed,
        }) => {
            let written = toy::generate_samples(&config, &signal, events, seed)?;
            info!("wrote {} toy ntuples", written.len());
        }
        Some(Commands::Fill) => {
            let summary = fill::run(&config)?;
            if summary.failed > 0 {
                return Err(format!("{} samples failed to fill", summary.failed).into());
            }
        }
        Some(Commands::Roc) => {
            let summary = batch::run(&config)?;
            let df = report::efficiency_frame(&summary.rows)?;
            print_table(&df);
            if config.plots {
                batch::render_distribution_plots(&config)?;
            }
        }
        Some(Commands::Efficiency { output }) => {
            let store = HistogramStore::from_config(&config);
            let mut df = report::sample_efficiencies(&config, &store)?;
            print_table(&df);
            if let Some(out_path) = output {
                write_new(&mut df, &out_path)?;
            }
        }
        Some(Commands::Rates {
            sample,
            cicada,
            axis,
            output,
        }) => {
            let version = match cicada {
                Some(version) => version,
                None => config
                    .cicada_versions
                    .first()
                    .cloned()
                    .ok_or("no CICADA versions configured")?,
            };
            let split = config.is_split(&sample).then_some(Split::Test);
            let store = HistogramStore::from_config(&config);
            let hist = store.load(&sample, &score_key(&sample, split, &version))?;
            let axes = match axis {
                Some(axis) => vec![SweepAxis::try_from(axis)?],
                None => vec![SweepAxis::Primary, SweepAxis::Auxiliary],
            };
            let mut df = DataFrame::empty();
            for axis in axes {
                let name = match axis {
                    SweepAxis::Primary => "score",
                    SweepAxis::Auxiliary => "HT",
                };
                let rates = report::rate_frame(&hist, axis, config.rate_scale_factor)?
                    .lazy()
                    .with_column(lit(name).alias("Axis"))
                    .collect()?;
                if df.width() == 0 {
                    df = rates;
                } else {
                    df.vstack_mut(&rates)?;
                }
            }
            print_table(&df);
            if let Some(out_path) = output {
                write_new(&mut df, &out_path)?;
            }
        }
        Some(Commands::Distributions) => {
            let written = batch::render_distribution_plots(&config)?;
            info!("wrote {} distribution plots", written.len());
        }
        Some(Commands::Compare { sample }) => {
            let path = compare::compare_sample(&config, &sample)?;
            println!("Wrote run agreement to {:?}", path);
        }
        None => Cli::command().print_help()?,
    }
    Ok(())
}
