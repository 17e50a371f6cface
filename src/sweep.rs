//! Threshold sweeps over binned histograms.
//!
//! Every efficiency here is a ratio of histogram integrals: the events at or
//! above a threshold bin (overflow included) over every event in the
//! histogram (underflow and overflow included). Signal histograms give the
//! true positive rate, background histograms the false positive rate.

use crate::error::{RocError, RocResult};
use crate::histogram::BinnedHistogram;

/// Axis swept by [`threshold_curve`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SweepAxis {
    /// Anomaly score.
    Primary,
    /// HT.
    Auxiliary,
}

impl SweepAxis {
    pub fn index(self) -> usize {
        match self {
            SweepAxis::Primary => 0,
            SweepAxis::Auxiliary => 1,
        }
    }
}

impl TryFrom<usize> for SweepAxis {
    type Error = RocError;

    fn try_from(value: usize) -> RocResult<Self> {
        match value {
            0 => Ok(SweepAxis::Primary),
            1 => Ok(SweepAxis::Auxiliary),
            _ => Err(RocError::InvalidArgument(format!(
                "sweep axis must be 0 or 1, got {value}"
            ))),
        }
    }
}

/// Axis holding the fixed condition of an OR combination.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OrAxis {
    /// HT above a fixed cut.
    Auxiliary,
    /// Passed any unprescaled L1 trigger (two-bin flag axis).
    Flag,
}

impl OrAxis {
    pub fn index(self) -> usize {
        match self {
            OrAxis::Auxiliary => 1,
            OrAxis::Flag => 2,
        }
    }
}

impl TryFrom<usize> for OrAxis {
    type Error = RocError;

    fn try_from(value: usize) -> RocResult<Self> {
        match value {
            1 => Ok(OrAxis::Auxiliary),
            2 => Ok(OrAxis::Flag),
            _ => Err(RocError::InvalidArgument(format!(
                "OR axis must be 1 or 2, got {value}"
            ))),
        }
    }
}

/// Background and signal acceptance for each swept threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdCurve {
    pub thresholds: Vec<f64>,
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
}

impl ThresholdCurve {
    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }

    /// `(fpr * rate_scale, tpr)` pairs, ready to draw.
    pub fn points(&self, rate_scale: f64) -> Vec<(f64, f64)> {
        self.fpr
            .iter()
            .zip(&self.tpr)
            .map(|(&f, &t)| (f * rate_scale, t))
            .collect()
    }

    /// Drops the tail after the first threshold where nothing is accepted.
    pub fn trimmed(&self) -> ThresholdCurve {
        let end = self
            .fpr
            .iter()
            .zip(&self.tpr)
            .position(|(&f, &t)| f == 0.0 && t == 0.0)
            .map_or(self.len(), |i| i + 1);
        ThresholdCurve {
            thresholds: self.thresholds[..end].to_vec(),
            fpr: self.fpr[..end].to_vec(),
            tpr: self.tpr[..end].to_vec(),
        }
    }
}

/// A single `(fpr, tpr)` operating point.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EfficiencyPoint {
    pub fpr: f64,
    pub tpr: f64,
}

impl EfficiencyPoint {
    /// Applies the same efficiency to background and signal.
    pub fn measure<F>(
        bkg: &BinnedHistogram,
        sig: &BinnedHistogram,
        efficiency: F,
    ) -> RocResult<Self>
    where
        F: Fn(&BinnedHistogram) -> RocResult<f64>,
    {
        Ok(Self {
            fpr: efficiency(bkg)?,
            tpr: efficiency(sig)?,
        })
    }
}

/// Accepted fraction of one histogram for each threshold along an axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptRatio {
    pub thresholds: Vec<f64>,
    pub ratio: Vec<f64>,
    pub uncertainty: Vec<f64>,
}

fn nonzero_total(hist: &BinnedHistogram) -> RocResult<f64> {
    let total = hist.total();
    if total == 0.0 {
        return Err(RocError::DegenerateHistogram {
            name: hist.name().to_string(),
        });
    }
    Ok(total)
}

fn check_pair(bkg: &BinnedHistogram, sig: &BinnedHistogram) -> RocResult<()> {
    if !bkg.same_binning(sig) {
        return Err(RocError::InvalidArgument(format!(
            "{} and {} have different binning",
            bkg.name(),
            sig.name()
        )));
    }
    Ok(())
}

/// `tail[i]` is the sum of `cells[i..]`.
fn tail_sums(cells: &[f64]) -> Vec<f64> {
    let mut tail = vec![0.0; cells.len() + 1];
    for i in (0..cells.len()).rev() {
        tail[i] = tail[i + 1] + cells[i];
    }
    tail
}

/// Tail sums along `axis` for the threshold bins `1..=n + 1`.
fn axis_tails(hist: &BinnedHistogram, axis: usize) -> RocResult<Vec<f64>> {
    let tail = tail_sums(&hist.project(axis)?);
    Ok(tail[1..tail.len() - 1].to_vec())
}

/// ROC curve from sweeping a threshold along one axis.
///
/// One entry per edge of the swept axis, ascending; the threshold bin of edge
/// `i` is `i + 1`, so the last entry keeps only the overflow bin.
pub fn threshold_curve(
    bkg: &BinnedHistogram,
    sig: &BinnedHistogram,
    axis: SweepAxis,
) -> RocResult<ThresholdCurve> {
    check_pair(bkg, sig)?;
    let axis_index = axis.index();
    let thresholds = sig.require_axis(axis_index)?.edges().to_vec();
    let total_bkg = nonzero_total(bkg)?;
    let total_sig = nonzero_total(sig)?;

    let fpr = axis_tails(bkg, axis_index)?
        .into_iter()
        .map(|n| n / total_bkg)
        .collect();
    let tpr = axis_tails(sig, axis_index)?
        .into_iter()
        .map(|n| n / total_sig)
        .collect();

    Ok(ThresholdCurve {
        thresholds,
        fpr,
        tpr,
    })
}

/// Accepted counts of `primary >= t OR or_axis >= cut` for each primary edge.
fn or_accepted(hist: &BinnedHistogram, or_axis: usize, cut_bin: usize) -> RocResult<Vec<f64>> {
    let nx = hist.require_axis(0)?.n_cells();
    let ny = hist.require_axis(or_axis)?.n_cells();
    let cells = hist.project_pair(0, or_axis)?;

    let primary = tail_sums(&hist.project(0)?);
    let above_cut: Vec<f64> = (0..nx)
        .map(|x| (cut_bin..ny).map(|y| cells[x + nx * y]).sum())
        .collect();
    let overlap = tail_sums(&above_cut);
    let fixed = overlap[0];

    Ok((1..nx)
        .map(|bin| primary[bin] + fixed - overlap[bin])
        .collect())
}

/// ROC curve of `primary >= threshold OR or_axis >= fixed_cut`.
///
/// The overlap of the two conditions is subtracted once so events passing
/// both are not double counted.
pub fn or_curve(
    bkg: &BinnedHistogram,
    sig: &BinnedHistogram,
    or_axis: OrAxis,
    fixed_cut: f64,
) -> RocResult<ThresholdCurve> {
    check_pair(bkg, sig)?;
    let or_index = or_axis.index();
    let cut_bin = sig.require_axis(or_index)?.find_bin(fixed_cut);
    let thresholds = sig.require_axis(0)?.edges().to_vec();
    let total_bkg = nonzero_total(bkg)?;
    let total_sig = nonzero_total(sig)?;

    let fpr = or_accepted(bkg, or_index, cut_bin)?
        .into_iter()
        .map(|n| n / total_bkg)
        .collect();
    let tpr = or_accepted(sig, or_index, cut_bin)?
        .into_iter()
        .map(|n| n / total_sig)
        .collect();

    Ok(ThresholdCurve {
        thresholds,
        fpr,
        tpr,
    })
}

/// Integral of `hist` restricted to `bins` along `axis`.
fn integral_along(
    hist: &BinnedHistogram,
    axis: usize,
    bins: std::ops::RangeInclusive<usize>,
) -> RocResult<f64> {
    hist.require_axis(axis)?;
    let mut ranges: Vec<_> = hist.axes()[..axis]
        .iter()
        .map(|a| 0..=a.n_cells() - 1)
        .collect();
    ranges.push(bins);
    hist.integral(&ranges)
}

/// Fraction of events at or above `cut` along `axis`.
pub fn cut_efficiency(hist: &BinnedHistogram, axis: usize, cut: f64) -> RocResult<f64> {
    let target = hist.require_axis(axis)?;
    let bin = target.find_bin(cut);
    let total = nonzero_total(hist)?;
    Ok(integral_along(hist, axis, bin..=target.n_cells() - 1)? / total)
}

/// Fraction of events in the pass bin of a two-bin flag axis.
pub fn flag_efficiency(hist: &BinnedHistogram, axis: usize) -> RocResult<f64> {
    let flag = hist.require_axis(axis)?;
    if flag.n_bins() != 2 {
        return Err(RocError::InvalidArgument(format!(
            "axis {axis} of {} has {} bins, a flag axis has 2",
            hist.name(),
            flag.n_bins()
        )));
    }
    let total = nonzero_total(hist)?;
    Ok(integral_along(hist, axis, 2..=2)? / total)
}

/// Accepted fraction of `hist` for each edge of `axis`, with its Poisson error.
pub fn accept_ratio(hist: &BinnedHistogram, axis: SweepAxis) -> RocResult<AcceptRatio> {
    let axis_index = axis.index();
    let thresholds = hist.require_axis(axis_index)?.edges().to_vec();
    let total = nonzero_total(hist)?;
    let tails = axis_tails(hist, axis_index)?;
    Ok(AcceptRatio {
        thresholds,
        ratio: tails.iter().map(|n| n / total).collect(),
        uncertainty: tails.iter().map(|n| n.sqrt() / total).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::Axis;

    fn hist_1d(name: &str, counts: &[f64]) -> BinnedHistogram {
        let axis = Axis::uniform(counts.len(), 0.0, counts.len() as f64).unwrap();
        let mut hist = BinnedHistogram::new(name, vec![axis]).unwrap();
        for (bin, &n) in counts.iter().enumerate() {
            if n > 0.0 {
                hist.fill_weighted(&[bin as f64 + 0.5], n).unwrap();
            }
        }
        hist
    }

    /// Score in 0..4 (4 bins), HT in 0..400 (4 bins), L1 flag (2 bins).
    fn hist_3d(name: &str, events: &[(f64, f64, f64)]) -> BinnedHistogram {
        let mut hist = BinnedHistogram::new(
            name,
            vec![
                Axis::uniform(4, 0.0, 4.0).unwrap(),
                Axis::uniform(4, 0.0, 400.0).unwrap(),
                Axis::uniform(2, -0.5, 1.5).unwrap(),
            ],
        )
        .unwrap();
        for &(s, ht, l1) in events {
            hist.fill(&[s, ht, l1]).unwrap();
        }
        hist
    }

    fn assert_non_increasing(values: &[f64]) {
        assert!(
            values.windows(2).all(|w| w[1] <= w[0]),
            "not non-increasing: {values:?}"
        );
    }

    #[test]
    fn test_four_bin_scenario() {
        let bkg = hist_1d("bkg", &[10.0, 0.0, 0.0, 0.0]);
        let sig = hist_1d("sig", &[0.0, 0.0, 5.0, 5.0]);
        let curve = threshold_curve(&bkg, &sig, SweepAxis::Primary).unwrap();

        assert_eq!(curve.thresholds, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!((curve.fpr[0], curve.tpr[0]), (1.0, 1.0));
        assert_eq!((curve.fpr[2], curve.tpr[2]), (0.0, 1.0));
        assert_eq!((curve.fpr[3], curve.tpr[3]), (0.0, 0.5));
        assert_eq!((curve.fpr[4], curve.tpr[4]), (0.0, 0.0));
    }

    #[test]
    fn test_boundaries_with_under_and_overflow() {
        let mut sig = hist_1d("sig", &[1.0, 1.0, 1.0, 1.0]);
        let bkg = hist_1d("bkg", &[1.0, 1.0, 1.0, 1.0]);
        let curve = threshold_curve(&bkg, &sig, SweepAxis::Primary).unwrap();
        assert_eq!(curve.tpr[0], 1.0);
        assert_eq!(*curve.tpr.last().unwrap(), 0.0);

        // underflow never passes, overflow always does
        sig.fill(&[-1.0]).unwrap();
        sig.fill(&[100.0]).unwrap();
        let curve = threshold_curve(&bkg, &sig, SweepAxis::Primary).unwrap();
        assert_eq!(curve.tpr[0], 5.0 / 6.0);
        assert_eq!(*curve.tpr.last().unwrap(), 1.0 / 6.0);
    }

    #[test]
    fn test_curves_are_monotonic_and_bounded() {
        let bkg = hist_3d(
            "bkg",
            &[(0.2, 20.0, 0.0), (0.7, 50.0, 0.0), (1.5, 90.0, 1.0), (2.9, 310.0, 0.0)],
        );
        let sig = hist_3d(
            "sig",
            &[(1.1, 120.0, 1.0), (2.5, 220.0, 0.0), (3.7, 390.0, 1.0), (9.0, 900.0, 1.0)],
        );
        for axis in [SweepAxis::Primary, SweepAxis::Auxiliary] {
            let curve = threshold_curve(&bkg, &sig, axis).unwrap();
            assert_eq!(curve.len(), 5);
            assert_non_increasing(&curve.fpr);
            assert_non_increasing(&curve.tpr);
            assert!(curve
                .fpr
                .iter()
                .chain(&curve.tpr)
                .all(|v| (0.0..=1.0).contains(v)));
        }
        let ht = threshold_curve(&bkg, &sig, SweepAxis::Auxiliary).unwrap();
        assert_eq!(ht.thresholds, vec![0.0, 100.0, 200.0, 300.0, 400.0]);
        assert_eq!(ht.tpr, vec![1.0, 1.0, 0.75, 0.5, 0.25]);
        assert_eq!(ht.fpr, vec![1.0, 0.25, 0.25, 0.25, 0.0]);
    }

    #[test]
    fn test_curve_is_reproducible() {
        let bkg = hist_3d("bkg", &[(0.3, 10.0, 0.0), (1.3, 30.0, 1.0), (2.3, 330.0, 0.0)]);
        let sig = hist_3d("sig", &[(3.3, 10.0, 1.0), (1.9, 230.0, 0.0)]);
        let first = or_curve(&bkg, &sig, OrAxis::Auxiliary, 200.0).unwrap();
        let second = or_curve(&bkg, &sig, OrAxis::Auxiliary, 200.0).unwrap();
        assert_eq!(first, second);
        for (a, b) in first.tpr.iter().zip(&second.tpr) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_or_with_cut_passing_all_signal() {
        // every signal event has HT >= 200, no background event does
        let bkg = hist_3d(
            "bkg",
            &[(0.5, 10.0, 0.0), (1.5, 50.0, 0.0), (2.5, 150.0, 1.0), (3.5, 190.0, 0.0)],
        );
        let sig = hist_3d(
            "sig",
            &[(0.5, 210.0, 0.0), (1.5, 250.0, 1.0), (3.5, 390.0, 0.0)],
        );
        let or = or_curve(&bkg, &sig, OrAxis::Auxiliary, 200.0).unwrap();
        let score = threshold_curve(&bkg, &sig, SweepAxis::Primary).unwrap();

        assert!(or.tpr.iter().all(|&t| t == 1.0));
        assert_eq!(or.fpr, score.fpr);
        assert_eq!(or.thresholds, score.thresholds);
    }

    #[test]
    fn test_or_dominates_each_condition() {
        let events_bkg = [
            (0.1, 20.0, 0.0),
            (0.9, 250.0, 0.0),
            (1.4, 80.0, 1.0),
            (2.2, 210.0, 1.0),
            (3.1, 40.0, 0.0),
            (7.0, 800.0, 1.0),
        ];
        let events_sig = [(1.1, 320.0, 1.0), (2.4, 110.0, 0.0), (3.6, 230.0, 1.0)];
        let bkg = hist_3d("bkg", &events_bkg);
        let sig = hist_3d("sig", &events_sig);
        let score = threshold_curve(&bkg, &sig, SweepAxis::Primary).unwrap();

        let ht_or = or_curve(&bkg, &sig, OrAxis::Auxiliary, 200.0).unwrap();
        let ht_bkg = cut_efficiency(&bkg, 1, 200.0).unwrap();
        let ht_sig = cut_efficiency(&sig, 1, 200.0).unwrap();
        for i in 0..score.len() {
            assert!(ht_or.fpr[i] >= score.fpr[i] && ht_or.fpr[i] >= ht_bkg);
            assert!(ht_or.tpr[i] >= score.tpr[i] && ht_or.tpr[i] >= ht_sig);
        }

        let l1_or = or_curve(&bkg, &sig, OrAxis::Flag, 1.0).unwrap();
        let l1_bkg = flag_efficiency(&bkg, 2).unwrap();
        for i in 0..score.len() {
            assert!(l1_or.fpr[i] >= score.fpr[i] && l1_or.fpr[i] >= l1_bkg);
        }
        // only the overflow score bin is left, and its event is flagged too
        assert_eq!(*l1_or.fpr.last().unwrap(), 3.0 / 6.0);
        assert_eq!(l1_bkg, 3.0 / 6.0);
        // explicit inclusion-exclusion at the score >= 2 threshold
        let expected = (3.0 + 3.0 - 2.0) / 6.0;
        assert_eq!(l1_or.fpr[2], expected);
    }

    #[test]
    fn test_single_point_efficiencies() {
        let bkg = hist_3d(
            "bkg",
            &[(0.5, 10.0, 0.0), (1.5, 250.0, 1.0), (2.5, 50.0, 0.0), (0.5, 300.0, 0.0)],
        );
        let sig = hist_3d("sig", &[(3.5, 210.0, 1.0), (2.5, 90.0, 1.0)]);
        assert_eq!(flag_efficiency(&bkg, 2).unwrap(), 0.25);
        assert_eq!(flag_efficiency(&sig, 2).unwrap(), 1.0);
        assert_eq!(cut_efficiency(&bkg, 1, 200.0).unwrap(), 0.5);

        let point =
            EfficiencyPoint::measure(&bkg, &sig, |h| cut_efficiency(h, 1, 200.0)).unwrap();
        assert_eq!(point, EfficiencyPoint { fpr: 0.5, tpr: 0.5 });
        assert!(matches!(
            flag_efficiency(&bkg, 1),
            Err(RocError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_invalid_selectors() {
        assert!(matches!(SweepAxis::try_from(2), Err(RocError::InvalidArgument(_))));
        assert!(matches!(OrAxis::try_from(0), Err(RocError::InvalidArgument(_))));
        assert!(matches!(OrAxis::try_from(3), Err(RocError::InvalidArgument(_))));
        assert_eq!(OrAxis::try_from(2).unwrap(), OrAxis::Flag);

        let bkg = hist_1d("bkg", &[1.0, 2.0]);
        let sig = hist_1d("sig", &[2.0, 1.0]);
        assert!(matches!(
            threshold_curve(&bkg, &sig, SweepAxis::Auxiliary),
            Err(RocError::InvalidArgument(_))
        ));
        assert!(matches!(
            or_curve(&bkg, &sig, OrAxis::Auxiliary, 1.0),
            Err(RocError::InvalidArgument(_))
        ));

        let other = hist_1d("other", &[1.0, 1.0, 1.0]);
        assert!(matches!(
            threshold_curve(&bkg, &other, SweepAxis::Primary),
            Err(RocError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_empty_histogram_is_degenerate() {
        let bkg = hist_1d("bkg", &[3.0, 1.0]);
        let empty = hist_1d("empty", &[0.0, 0.0]);
        match threshold_curve(&bkg, &empty, SweepAxis::Primary) {
            Err(RocError::DegenerateHistogram { name }) => assert_eq!(name, "empty"),
            other => panic!("expected a degenerate histogram error, got {other:?}"),
        }
        assert!(matches!(
            threshold_curve(&empty, &bkg, SweepAxis::Primary),
            Err(RocError::DegenerateHistogram { .. })
        ));
        assert!(matches!(
            accept_ratio(&empty, SweepAxis::Primary),
            Err(RocError::DegenerateHistogram { .. })
        ));
    }

    #[test]
    fn test_accept_ratio_and_trim() {
        let hist = hist_1d("zb", &[4.0, 0.0, 0.0, 0.0]);
        let ratio = accept_ratio(&hist, SweepAxis::Primary).unwrap();
        assert_eq!(ratio.ratio, vec![1.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(ratio.uncertainty[0], 0.5);

        let sig = hist_1d("sig", &[0.0, 2.0, 0.0, 0.0]);
        let curve = threshold_curve(&hist, &sig, SweepAxis::Primary).unwrap();
        let trimmed = curve.trimmed();
        assert_eq!(trimmed.len(), 3);
        assert_eq!(trimmed.points(10.0), vec![(10.0, 1.0), (0.0, 1.0), (0.0, 0.0)]);
    }
}
