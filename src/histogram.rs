use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::{RocError, RocResult};

/// Bin edges of one histogram axis.
///
/// An axis with `n` regular bins stores `n + 1` strictly increasing edges.
/// Bin indices follow the ROOT convention: `0` is underflow, `1..=n` are the
/// regular bins and `n + 1` is overflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    edges: Vec<f64>,
}

impl Axis {
    pub fn uniform(n_bins: usize, min: f64, max: f64) -> RocResult<Self> {
        if n_bins == 0 {
            return Err(RocError::InvalidArgument(
                "axis needs at least one bin".into(),
            ));
        }
        if !(min < max) {
            return Err(RocError::InvalidArgument(format!(
                "axis range [{min}, {max}) is empty"
            )));
        }
        let width = max - min;
        let edges = (0..=n_bins)
            .map(|i| min + width * i as f64 / n_bins as f64)
            .collect();
        Self::from_edges(edges)
    }

    pub fn from_edges(edges: Vec<f64>) -> RocResult<Self> {
        if edges.len() < 2 {
            return Err(RocError::InvalidArgument(
                "axis needs at least two edges".into(),
            ));
        }
        if !edges.windows(2).all(|w| w[0] < w[1]) {
            return Err(RocError::InvalidArgument(
                "axis edges must be strictly increasing".into(),
            ));
        }
        Ok(Self { edges })
    }

    pub fn n_bins(&self) -> usize {
        self.edges.len() - 1
    }

    /// Number of storage cells including underflow and overflow.
    pub fn n_cells(&self) -> usize {
        self.edges.len() + 1
    }

    pub fn min(&self) -> f64 {
        self.edges[0]
    }

    pub fn max(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn center(&self, bin: usize) -> Option<f64> {
        if bin == 0 || bin > self.n_bins() {
            return None;
        }
        Some(0.5 * (self.edges[bin - 1] + self.edges[bin]))
    }

    /// Bin holding `x`: the number of edges `<= x`.
    ///
    /// Values equal to an edge land in the bin above it, `max` lands in
    /// overflow and NaN lands in underflow.
    pub fn find_bin(&self, x: f64) -> usize {
        self.edges.partition_point(|&e| e <= x)
    }
}

/// Binned counts over one to three axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinnedHistogram {
    name: String,
    axes: Vec<Axis>,
    contents: Vec<f64>,
    entries: u64,
}

impl BinnedHistogram {
    pub const MAX_DIMS: usize = 3;

    pub fn new(name: impl Into<String>, axes: Vec<Axis>) -> RocResult<Self> {
        if axes.is_empty() || axes.len() > Self::MAX_DIMS {
            return Err(RocError::InvalidArgument(format!(
                "histograms have 1 to {} axes, got {}",
                Self::MAX_DIMS,
                axes.len()
            )));
        }
        let n_cells = axes.iter().map(Axis::n_cells).product();
        Ok(Self {
            name: name.into(),
            axes,
            contents: vec![0.0; n_cells],
            entries: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn n_dims(&self) -> usize {
        self.axes.len()
    }

    pub fn axis(&self, index: usize) -> Option<&Axis> {
        self.axes.get(index)
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    pub fn entries(&self) -> u64 {
        self.entries
    }

    pub fn same_binning(&self, other: &BinnedHistogram) -> bool {
        self.axes == other.axes
    }

    pub fn fill(&mut self, values: &[f64]) -> RocResult<()> {
        self.fill_weighted(values, 1.0)
    }

    pub fn fill_weighted(&mut self, values: &[f64], weight: f64) -> RocResult<()> {
        if values.len() != self.axes.len() {
            return Err(RocError::InvalidArgument(format!(
                "{} expects {} coordinates, got {}",
                self.name,
                self.axes.len(),
                values.len()
            )));
        }
        let mut flat = 0;
        let mut stride = 1;
        for (axis, &x) in self.axes.iter().zip(values) {
            flat += axis.find_bin(x) * stride;
            stride *= axis.n_cells();
        }
        self.contents[flat] += weight;
        self.entries += 1;
        Ok(())
    }

    fn unflatten(&self, mut flat: usize, bins: &mut [usize]) {
        for (axis, bin) in self.axes.iter().zip(bins.iter_mut()) {
            *bin = flat % axis.n_cells();
            flat /= axis.n_cells();
        }
    }

    /// Sum over every cell, underflow and overflow included.
    pub fn total(&self) -> f64 {
        self.contents.iter().sum()
    }

    /// Sum over inclusive bin ranges, one per axis.
    ///
    /// Axes without a range are integrated over their full extent. Bin indices
    /// past overflow (`n + 1`) match no cell, so an out-of-range bound selects
    /// nothing beyond the axis.
    pub fn integral(&self, ranges: &[RangeInclusive<usize>]) -> RocResult<f64> {
        if ranges.len() > self.axes.len() {
            return Err(RocError::InvalidArgument(format!(
                "{} has {} axes, got {} ranges",
                self.name,
                self.axes.len(),
                ranges.len()
            )));
        }
        let mut bins = vec![0; self.axes.len()];
        let mut sum = 0.0;
        for (flat, &value) in self.contents.iter().enumerate() {
            self.unflatten(flat, &mut bins);
            if ranges.iter().zip(&bins).all(|(r, b)| r.contains(b)) {
                sum += value;
            }
        }
        Ok(sum)
    }

    /// Contents summed onto one axis, indexed by bin (`0..=n + 1`).
    pub fn project(&self, axis: usize) -> RocResult<Vec<f64>> {
        let target = self.require_axis(axis)?;
        let mut out = vec![0.0; target.n_cells()];
        let mut bins = vec![0; self.axes.len()];
        for (flat, &value) in self.contents.iter().enumerate() {
            self.unflatten(flat, &mut bins);
            out[bins[axis]] += value;
        }
        Ok(out)
    }

    /// Contents summed onto two axes; `a` is the fast index of the result.
    pub fn project_pair(&self, a: usize, b: usize) -> RocResult<Vec<f64>> {
        if a == b {
            return Err(RocError::InvalidArgument(format!(
                "cannot project {} onto axis {a} twice",
                self.name
            )));
        }
        let na = self.require_axis(a)?.n_cells();
        let nb = self.require_axis(b)?.n_cells();
        let mut out = vec![0.0; na * nb];
        let mut bins = vec![0; self.axes.len()];
        for (flat, &value) in self.contents.iter().enumerate() {
            self.unflatten(flat, &mut bins);
            out[bins[a] + na * bins[b]] += value;
        }
        Ok(out)
    }

    pub(crate) fn require_axis(&self, axis: usize) -> RocResult<&Axis> {
        self.axes.get(axis).ok_or_else(|| {
            RocError::InvalidArgument(format!(
                "{} has no axis {axis} ({} axes)",
                self.name,
                self.axes.len()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score_ht() -> BinnedHistogram {
        BinnedHistogram::new(
            "score_ht",
            vec![
                Axis::uniform(4, 0.0, 4.0).unwrap(),
                Axis::uniform(2, 0.0, 200.0).unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_find_bin_follows_root_convention() {
        let axis = Axis::uniform(4, 0.0, 4.0).unwrap();
        assert_eq!(axis.find_bin(-0.5), 0);
        assert_eq!(axis.find_bin(0.0), 1);
        assert_eq!(axis.find_bin(0.99), 1);
        assert_eq!(axis.find_bin(1.0), 2);
        assert_eq!(axis.find_bin(3.5), 4);
        assert_eq!(axis.find_bin(4.0), 5);
        assert_eq!(axis.find_bin(1e9), 5);
        assert_eq!(axis.find_bin(f64::NAN), 0);
    }

    #[test]
    fn test_centers_of_regular_bins() {
        let axis = Axis::uniform(2, 0.0, 2.0).unwrap();
        assert_eq!(axis.edges(), &[0.0, 1.0, 2.0]);
        assert_eq!(axis.center(0), None);
        assert_eq!(axis.center(2), Some(1.5));
        assert_eq!(axis.center(3), None);
    }

    #[test]
    fn test_axis_rejects_bad_edges() {
        assert!(Axis::uniform(0, 0.0, 1.0).is_err());
        assert!(Axis::uniform(3, 1.0, 1.0).is_err());
        assert!(Axis::from_edges(vec![0.0]).is_err());
        assert!(Axis::from_edges(vec![0.0, 2.0, 1.0]).is_err());
        assert!(Axis::from_edges(vec![0.0, 1.0, 5.0]).is_ok());
    }

    #[test]
    fn test_total_matches_entries() {
        let mut hist = score_ht();
        let points = [
            [0.5, 10.0],
            [3.5, 150.0],
            [-1.0, 50.0],
            [10.0, 500.0],
            [2.0, -3.0],
        ];
        for p in points {
            hist.fill(&p).unwrap();
        }
        assert_eq!(hist.entries(), 5);
        assert_eq!(hist.total(), 5.0);

        let sub = hist.integral(&[1..=4, 1..=2]).unwrap();
        assert_eq!(sub, 2.0);
        assert!(sub <= hist.total());
        assert_eq!(hist.integral(&[]).unwrap(), hist.total());
        assert_eq!(hist.integral(&[0..=0, 1..=1]).unwrap(), 1.0);
        assert_eq!(hist.integral(&[5..=5, 3..=3]).unwrap(), 1.0);
        // bounds past overflow add nothing
        assert_eq!(hist.integral(&[5..=99]).unwrap(), 1.0);
        assert_eq!(hist.integral(&[6..=9]).unwrap(), 0.0);
        assert!(hist.integral(&[0..=5, 0..=3, 0..=0]).is_err());
    }

    #[test]
    fn test_fill_checks_dimension() {
        let mut hist = score_ht();
        assert!(matches!(
            hist.fill(&[1.0]),
            Err(RocError::InvalidArgument(_))
        ));
        assert_eq!(hist.entries(), 0);
    }

    #[test]
    fn test_projections_preserve_total() {
        let mut hist = score_ht();
        for (s, ht) in [(0.5, 10.0), (1.5, 110.0), (1.7, 120.0), (9.0, 0.0)] {
            hist.fill(&[s, ht]).unwrap();
        }
        let px = hist.project(0).unwrap();
        assert_eq!(px, vec![0.0, 1.0, 2.0, 0.0, 0.0, 1.0]);
        let py = hist.project(1).unwrap();
        assert_eq!(py, vec![0.0, 2.0, 2.0, 0.0]);
        let pxy = hist.project_pair(0, 1).unwrap();
        assert_eq!(pxy.iter().sum::<f64>(), hist.total());
        assert_eq!(pxy[2 + 6 * 2], 2.0);
        assert!(hist.project(2).is_err());
        assert!(hist.project_pair(1, 1).is_err());
    }

    #[test]
    fn test_serde_keeps_contents() {
        let mut hist = score_ht();
        hist.fill_weighted(&[1.2, 30.0], 2.5).unwrap();
        let json = serde_json::to_string(&hist).unwrap();
        let back: BinnedHistogram = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hist);
        assert!(back.same_binning(&hist));
    }
}
