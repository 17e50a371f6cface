//! Chart models and their plotters rendering.
//!
//! The models are plain data so they can be built and checked without a
//! drawing backend; `render` is the only part that touches plotters.

use std::error::Error;
use std::path::Path;

use plotters::prelude::*;
use tracing::debug;

use crate::error::{RocError, RocResult};
use crate::histogram::BinnedHistogram;
use crate::sweep::{EfficiencyPoint, OrAxis, ThresholdCurve};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mark {
    Line,
    Point,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlotSeries {
    pub label: String,
    pub mark: Mark,
    pub points: Vec<(f64, f64)>,
}

/// `ROC_HT_<bkg>_<version>_<signal>.png` or `ROC_L1_...`.
pub fn roc_file_name(or_axis: OrAxis, background: &str, version: &str, signal: &str) -> String {
    let kind = match or_axis {
        OrAxis::Auxiliary => "HT",
        OrAxis::Flag => "L1",
    };
    format!("ROC_{kind}_{background}_{version}_{signal}.png")
}

pub fn score_file_name(version: &str) -> String {
    format!("scores_{version}.png")
}

pub const HT_FILE_NAME: &str = "ht.png";
pub const JET_ET_FILE_NAME: &str = "jetEt.png";

fn plot_error(err: Box<dyn Error>) -> RocError {
    RocError::Plot(err.to_string())
}

/// Signal efficiency against background rate (or FPR).
#[derive(Debug, Clone, PartialEq)]
pub struct RocPlot {
    pub title: String,
    pub x_desc: String,
    pub y_desc: String,
    pub x_max: f64,
    pub y_max: f64,
    /// Multiplies every background efficiency before drawing.
    pub x_scale: f64,
    pub series: Vec<PlotSeries>,
}

impl RocPlot {
    pub fn new(title: impl Into<String>, x_desc: impl Into<String>, x_scale: f64) -> Self {
        Self {
            title: title.into(),
            x_desc: x_desc.into(),
            y_desc: "Signal Efficiency".to_string(),
            x_max: 1.0,
            y_max: 1.2,
            x_scale,
            series: Vec::new(),
        }
    }

    /// Display ranges in efficiency units; the x range is scaled like the data.
    pub fn with_ranges(mut self, x_max: f64, y_max: f64) -> Self {
        self.x_max = x_max;
        self.y_max = y_max;
        self
    }

    /// Adds a curve, dropping the points after nothing is accepted.
    pub fn with_curve(mut self, label: impl Into<String>, curve: &ThresholdCurve) -> Self {
        self.series.push(PlotSeries {
            label: label.into(),
            mark: Mark::Line,
            points: curve.trimmed().points(self.x_scale),
        });
        self
    }

    pub fn with_point(mut self, label: impl Into<String>, point: EfficiencyPoint) -> Self {
        self.series.push(PlotSeries {
            label: label.into(),
            mark: Mark::Point,
            points: vec![(point.fpr * self.x_scale, point.tpr)],
        });
        self
    }

    pub fn render(&self, path: &Path, size: (u32, u32)) -> RocResult<()> {
        self.draw(path, size).map_err(plot_error)?;
        debug!("wrote {}", path.display());
        Ok(())
    }

    fn draw(&self, path: &Path, size: (u32, u32)) -> Result<(), Box<dyn Error>> {
        let root = BitMapBackend::new(path, size).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .caption(&self.title, ("sans-serif", 24))
            .margin(10)
            .x_label_area_size(50)
            .y_label_area_size(60)
            .build_cartesian_2d(0.0..self.x_max * self.x_scale, 0.0..self.y_max)?;

        chart
            .configure_mesh()
            .x_desc(self.x_desc.as_str())
            .y_desc(self.y_desc.as_str())
            .draw()?;

        for (i, series) in self.series.iter().enumerate() {
            let color = Palette99::pick(i).mix(0.9);
            match series.mark {
                Mark::Line => chart
                    .draw_series(LineSeries::new(series.points.iter().copied(), &color))?
                    .label(series.label.as_str())
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color)),
                Mark::Point => chart
                    .draw_series(
                        series
                            .points
                            .iter()
                            .map(|&p| Circle::new(p, 5, color.filled())),
                    )?
                    .label(series.label.as_str())
                    .legend(move |(x, y)| Circle::new((x + 10, y), 5, color.filled())),
            };
        }

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::LowerRight)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;

        root.present()?;
        Ok(())
    }
}

/// Normalized distributions of one variable on a log scale.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionPlot {
    pub title: String,
    pub x_desc: String,
    pub x_range: (f64, f64),
    pub series: Vec<PlotSeries>,
}

impl DistributionPlot {
    pub fn new(title: impl Into<String>, x_desc: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            x_desc: x_desc.into(),
            x_range: (0.0, 1.0),
            series: Vec::new(),
        }
    }

    /// Adds the projection of `hist` onto `axis`, normalized to its total.
    ///
    /// Empty bins are left out since they cannot be drawn on a log axis.
    pub fn with_histogram(
        mut self,
        label: impl Into<String>,
        hist: &BinnedHistogram,
        axis: usize,
    ) -> RocResult<Self> {
        let projection = hist.project(axis)?;
        let axis = hist.require_axis(axis)?;
        let total = hist.total();
        if total == 0.0 {
            return Err(RocError::DegenerateHistogram {
                name: hist.name().to_string(),
            });
        }
        let points = (1..=axis.n_bins())
            .filter(|&bin| projection[bin] > 0.0)
            .filter_map(|bin| Some((axis.center(bin)?, projection[bin] / total)))
            .collect();
        self.x_range = (axis.min(), axis.max());
        self.series.push(PlotSeries {
            label: label.into(),
            mark: Mark::Line,
            points,
        });
        Ok(self)
    }

    /// Smallest drawn fraction, halved, for the bottom of the log axis.
    pub fn y_min(&self) -> f64 {
        self.series
            .iter()
            .flat_map(|s| s.points.iter().map(|p| p.1))
            .fold(1.0, f64::min)
            / 2.0
    }

    pub fn render(&self, path: &Path, size: (u32, u32)) -> RocResult<()> {
        self.draw(path, size).map_err(plot_error)?;
        debug!("wrote {}", path.display());
        Ok(())
    }

    fn draw(&self, path: &Path, size: (u32, u32)) -> Result<(), Box<dyn Error>> {
        let root = BitMapBackend::new(path, size).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .caption(&self.title, ("sans-serif", 24))
            .margin(10)
            .x_label_area_size(50)
            .y_label_area_size(70)
            .build_cartesian_2d(
                self.x_range.0..self.x_range.1,
                (self.y_min()..1.0).log_scale(),
            )?;

        chart
            .configure_mesh()
            .x_desc(self.x_desc.as_str())
            .y_desc("Fraction of Events")
            .draw()?;

        for (i, series) in self.series.iter().enumerate() {
            let color = Palette99::pick(i).mix(0.9);
            chart
                .draw_series(LineSeries::new(series.points.iter().copied(), &color))?
                .label(series.label.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
        }

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;

        root.present()?;
        Ok(())
    }
}
