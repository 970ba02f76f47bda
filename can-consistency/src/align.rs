//! Window aligner
//!
//! Finds the one time window in which the upper-layer and bus traces describe
//! the same event sequence. The two clocks are not synchronized, so only value
//! order and interval ratios are compared; absolute offsets are never judged.
//!
//! For each anchor signal present in both traces the shorter trend is the
//! query and the longer the haystack. Candidates are order-preserving
//! embeddings of the query values into the haystack; a candidate qualifies if
//! every step's proportional interval error is within tolerance, and the
//! qualifying candidate with the lowest mean error wins. When both trends have
//! the same length the only candidate is the full trend on both sides and each
//! step's error is taken relative to the smaller of the two intervals, so the
//! result does not depend on which trace is called "upper".

use crate::config::EngineConfig;
use crate::trend::{SignalTrend, TrendSet};
use crate::types::{values_equal, AlignmentWindow, Orientation, Timestamp, RATIO_EPSILON};

/// Reference intervals shorter than this (seconds) are clamped to it
pub const INTERVAL_EPSILON: f64 = 1e-3;

/// Why no window was produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlignmentFailure {
    /// No signal has at least two events in both traces
    NoAnchorSignal,
    /// Every anchor was tried and none produced a qualifying candidate
    NoQualifyingWindow { anchors_tried: Vec<String> },
}

/// Proportional interval error of one aligned step
pub fn interval_error(candidate_interval: f64, reference_interval: f64) -> f64 {
    (candidate_interval - reference_interval).abs() / reference_interval.max(INTERVAL_EPSILON)
}

/// A qualifying placement of the query inside the haystack
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    /// Haystack index of each query event
    pub indices: Vec<usize>,
    pub mean_error: f64,
    pub max_error: f64,
}

#[derive(Debug, Clone, Copy)]
struct Cell {
    sum: f64,
    max: f64,
    start: usize,
    prev: usize,
}

/// Aligns trend sets with a fixed interval tolerance
#[derive(Debug, Clone, Copy)]
pub struct WindowAligner {
    tolerance: f64,
}

impl WindowAligner {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.interval_tolerance_ratio)
    }

    fn qualifies(&self, error: f64) -> bool {
        error <= self.tolerance + RATIO_EPSILON
    }

    /// Signals with at least two events in both sets, in upper-layer first-seen order
    pub fn anchor_candidates<'t>(upper: &'t TrendSet, bus: &TrendSet) -> Vec<&'t str> {
        upper
            .iter()
            .filter(|u| u.len() >= 2)
            .filter(|u| bus.get(u.name()).map_or(false, |b| b.len() >= 2))
            .map(|u| u.name())
            .collect()
    }

    /// Find the best window across all anchors
    ///
    /// Anchors compete on mean interval error; ties go to the earlier
    /// upper-layer start, then to the anchor tried first.
    pub fn align(
        &self,
        upper: &TrendSet,
        bus: &TrendSet,
    ) -> std::result::Result<AlignmentWindow, AlignmentFailure> {
        let anchors = Self::anchor_candidates(upper, bus);
        if anchors.is_empty() {
            log::debug!("No anchor signal with two or more events in both traces");
            return Err(AlignmentFailure::NoAnchorSignal);
        }

        let mut best: Option<AlignmentWindow> = None;
        for &anchor in &anchors {
            let (Some(u), Some(b)) = (upper.get(anchor), bus.get(anchor)) else {
                continue;
            };
            match self.align_anchor(u, b) {
                Some(window) => {
                    log::debug!(
                        "Anchor '{}' qualifies: mean error {:.4}, offset {:.3}s",
                        anchor,
                        window.mean_interval_error,
                        window.offset()
                    );
                    let replace = match &best {
                        None => true,
                        Some(current) => {
                            window.mean_interval_error < current.mean_interval_error
                                || (window.mean_interval_error == current.mean_interval_error
                                    && window.upper_range.0 < current.upper_range.0)
                        }
                    };
                    if replace {
                        best = Some(window);
                    }
                }
                None => log::debug!("Anchor '{}' has no qualifying window", anchor),
            }
        }

        best.ok_or_else(|| AlignmentFailure::NoQualifyingWindow {
            anchors_tried: anchors.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Align one anchor signal's two trends
    pub fn align_anchor(&self, upper: &SignalTrend, bus: &SignalTrend) -> Option<AlignmentWindow> {
        if upper.len() < 2 || bus.len() < 2 {
            return None;
        }

        let anchor = upper.name().to_string();
        let upper_times: Vec<Timestamp> = upper.timestamps().collect();
        let bus_times: Vec<Timestamp> = bus.timestamps().collect();

        if upper.len() == bus.len() {
            let (mean_error, max_error) = self.equal_length_errors(upper, bus)?;
            return Some(AlignmentWindow {
                upper_range: (upper_times[0], upper_times[upper_times.len() - 1]),
                bus_range: (bus_times[0], bus_times[bus_times.len() - 1]),
                anchor_signal: anchor,
                orientation: Orientation::UpperInBus,
                mean_interval_error: mean_error,
                max_interval_error: max_error,
            });
        }

        if upper.len() < bus.len() {
            let found = self.best_embedding(upper, bus)?;
            Some(AlignmentWindow {
                upper_range: (upper_times[0], upper_times[upper_times.len() - 1]),
                bus_range: span(&bus_times, &found.indices),
                anchor_signal: anchor,
                orientation: Orientation::UpperInBus,
                mean_interval_error: found.mean_error,
                max_interval_error: found.max_error,
            })
        } else {
            let found = self.best_embedding(bus, upper)?;
            Some(AlignmentWindow {
                upper_range: span(&upper_times, &found.indices),
                bus_range: (bus_times[0], bus_times[bus_times.len() - 1]),
                anchor_signal: anchor,
                orientation: Orientation::BusInUpper,
                mean_interval_error: found.mean_error,
                max_interval_error: found.max_error,
            })
        }
    }

    /// Errors of the identity mapping between equally long trends
    fn equal_length_errors(&self, a: &SignalTrend, b: &SignalTrend) -> Option<(f64, f64)> {
        let same_values = a
            .values()
            .iter()
            .zip(b.values())
            .all(|(x, y)| values_equal(*x, *y));
        if !same_values {
            return None;
        }

        let mut sum = 0.0;
        let mut max: f64 = 0.0;
        for (&ia, &ib) in a.intervals().iter().zip(b.intervals()) {
            let error = interval_error(ia.max(ib), ia.min(ib));
            if !self.qualifies(error) {
                return None;
            }
            sum += error;
            max = max.max(error);
        }
        Some((sum / a.intervals().len() as f64, max))
    }

    /// Lowest-mean-error qualifying embedding of `query` in `haystack`
    ///
    /// Dynamic programming over (query index, haystack index): each cell keeps
    /// the best partial embedding ending there, ordered by error sum and then by
    /// haystack start time. Haystack timestamps are sorted, so the backward scan
    /// over predecessors stops once the interval grows past the tolerance.
    pub fn best_embedding(&self, query: &SignalTrend, haystack: &SignalTrend) -> Option<Embedding> {
        let m = query.len();
        let n = haystack.len();
        if m < 2 || n < m {
            return None;
        }

        let q_values = query.values();
        let q_intervals = query.intervals();
        let h_values = haystack.values();
        let h_times: Vec<Timestamp> = haystack.timestamps().collect();

        let better = |cand: &Cell, current: &Option<Cell>| match current {
            None => true,
            Some(cur) => {
                cand.sum < cur.sum || (cand.sum == cur.sum && h_times[cand.start] < h_times[cur.start])
            }
        };

        let mut layers: Vec<Vec<Option<Cell>>> = Vec::with_capacity(m);
        layers.push(
            (0..n)
                .map(|i| {
                    values_equal(h_values[i], q_values[0]).then_some(Cell {
                        sum: 0.0,
                        max: 0.0,
                        start: i,
                        prev: usize::MAX,
                    })
                })
                .collect(),
        );

        for k in 1..m {
            let reference = q_intervals[k - 1];
            let reach = (self.tolerance + 2.0 * RATIO_EPSILON) * reference.max(INTERVAL_EPSILON);
            let (low, high) = (reference - reach, reference + reach);

            let previous = &layers[k - 1];
            let mut layer: Vec<Option<Cell>> = vec![None; n];
            for i in k..n {
                if !values_equal(h_values[i], q_values[k]) {
                    continue;
                }
                let mut best: Option<Cell> = None;
                for j in (k - 1..i).rev() {
                    let dt = h_times[i] - h_times[j];
                    if dt > high {
                        break;
                    }
                    if dt < low {
                        continue;
                    }
                    let Some(cell) = previous[j] else {
                        continue;
                    };
                    let error = interval_error(dt, reference);
                    if !self.qualifies(error) {
                        continue;
                    }
                    let candidate = Cell {
                        sum: cell.sum + error,
                        max: cell.max.max(error),
                        start: cell.start,
                        prev: j,
                    };
                    if better(&candidate, &best) {
                        best = Some(candidate);
                    }
                }
                layer[i] = best;
            }

            if layer.iter().all(Option::is_none) {
                return None;
            }
            layers.push(layer);
        }

        // Lowest sum, then earliest start, then earliest end
        let mut end: Option<(usize, Cell)> = None;
        for (i, cell) in layers[m - 1].iter().enumerate() {
            let Some(cell) = cell else { continue };
            let replace = match &end {
                None => true,
                Some((_, cur)) => {
                    cell.sum < cur.sum
                        || (cell.sum == cur.sum && h_times[cell.start] < h_times[cur.start])
                }
            };
            if replace {
                end = Some((i, *cell));
            }
        }
        let (last, final_cell) = end?;

        let mut indices = vec![0; m];
        let mut idx = last;
        for k in (0..m).rev() {
            indices[k] = idx;
            if k > 0 {
                idx = layers[k][idx].map(|c| c.prev)?;
            }
        }

        Some(Embedding {
            indices,
            mean_error: final_cell.sum / (m - 1) as f64,
            max_error: final_cell.max,
        })
    }
}

fn span(times: &[Timestamp], indices: &[usize]) -> (Timestamp, Timestamp) {
    let first = indices.first().map(|&i| times[i]).unwrap_or(0.0);
    let last = indices.last().map(|&i| times[i]).unwrap_or(first);
    (first, last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, SignalEvent, Source};

    fn trend(source: Source, name: &str, points: &[(f64, f64)]) -> SignalTrend {
        let events = points
            .iter()
            .map(|&(t, v)| SignalEvent::new(t, source, name, v, Direction::Downlink))
            .collect();
        SignalTrend::new(name, source, events)
    }

    fn set(source: Source, trends: &[(&str, &[(f64, f64)])]) -> TrendSet {
        let events: Vec<SignalEvent> = trends
            .iter()
            .flat_map(|(name, points)| {
                points
                    .iter()
                    .map(move |&(t, v)| SignalEvent::new(t, source, *name, v, Direction::Downlink))
            })
            .collect();
        TrendSet::build(source, &events)
    }

    #[test]
    fn test_interval_error() {
        assert!((interval_error(0.12, 0.1) - 0.2).abs() < 1e-9);
        // zero reference interval is clamped
        assert!((interval_error(0.0005, 0.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_embedding_inside_longer_haystack() {
        let aligner = WindowAligner::new(0.30);
        let query = trend(Source::UpperLayer, "A", &[(0.0, 2.0), (1.0, 3.0), (2.0, 4.0)]);
        let hay = trend(
            Source::Bus,
            "A",
            &[(10.0, 1.0), (11.0, 2.0), (12.1, 3.0), (13.0, 4.0), (14.0, 5.0)],
        );
        let found = aligner.best_embedding(&query, &hay).unwrap();
        assert_eq!(found.indices, vec![1, 2, 3]);
        assert!((found.mean_error - 0.1).abs() < 1e-9);
        assert!((found.max_error - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_order_preserving_embedding_skips_events() {
        let aligner = WindowAligner::new(0.30);
        let query = trend(Source::UpperLayer, "A", &[(0.0, 0.0), (1.0, 1.0)]);
        // the 7 glitch between 0 and 1 is skipped
        let hay = trend(Source::Bus, "A", &[(5.0, 0.0), (5.5, 7.0), (6.0, 1.0)]);
        let found = aligner.best_embedding(&query, &hay).unwrap();
        assert_eq!(found.indices, vec![0, 2]);
    }

    #[test]
    fn test_lowest_mean_error_wins_then_earliest_start() {
        let aligner = WindowAligner::new(0.30);
        let query = trend(Source::UpperLayer, "A", &[(0.0, 0.0), (1.0, 1.0)]);
        let hay = trend(
            Source::Bus,
            "A",
            &[(0.0, 0.0), (1.2, 1.0), (3.0, 0.0), (4.05, 1.0), (6.0, 0.0), (7.05, 1.0)],
        );
        let found = aligner.best_embedding(&query, &hay).unwrap();
        // 0.05 error beats 0.2; the two 0.05 candidates tie and the earlier wins
        assert_eq!(found.indices, vec![2, 3]);
    }

    #[test]
    fn test_tolerance_boundary() {
        let aligner = WindowAligner::new(0.30);
        let query = trend(Source::UpperLayer, "A", &[(0.0, 0.0), (1.0, 1.0)]);

        let exact = trend(Source::Bus, "A", &[(4.0, 5.0), (5.0, 0.0), (6.3, 1.0)]);
        let found = aligner.best_embedding(&query, &exact).unwrap();
        assert!((found.max_error - 0.30).abs() < 1e-9);

        let over = trend(Source::Bus, "A", &[(4.0, 5.0), (5.0, 0.0), (6.301, 1.0)]);
        assert!(aligner.best_embedding(&query, &over).is_none());
    }

    #[test]
    fn test_equal_length_uses_smaller_interval_as_reference() {
        let aligner = WindowAligner::new(0.30);
        let upper = trend(Source::UpperLayer, "A", &[(0.0, 0.0), (1.0, 1.0)]);
        let exact = trend(Source::Bus, "A", &[(5.0, 0.0), (6.3, 1.0)]);
        let over = trend(Source::Bus, "A", &[(5.0, 0.0), (6.301, 1.0)]);

        assert!(aligner.align_anchor(&upper, &exact).is_some());
        assert!(aligner.align_anchor(&exact, &upper).is_some());
        assert!(aligner.align_anchor(&upper, &over).is_none());
        assert!(aligner.align_anchor(&over, &upper).is_none());
    }

    #[test]
    fn test_window_symmetry() {
        let aligner = WindowAligner::new(0.30);
        let long = [(0.0, 1.0), (1.0, 2.0), (2.0, 3.0), (3.1, 4.0), (4.0, 5.0)];
        let short = [(20.0, 2.0), (21.05, 3.0), (22.1, 4.0)];

        let a = aligner
            .align(
                &set(Source::UpperLayer, &[("A", &long)]),
                &set(Source::Bus, &[("A", &short)]),
            )
            .unwrap();
        let b = aligner
            .align(
                &set(Source::UpperLayer, &[("A", &short)]),
                &set(Source::Bus, &[("A", &long)]),
            )
            .unwrap();

        assert_eq!(a.upper_range, b.bus_range);
        assert_eq!(a.bus_range, b.upper_range);
        assert_eq!(a.orientation, Orientation::BusInUpper);
        assert_eq!(b.orientation, Orientation::UpperInBus);
        assert!((a.mean_interval_error - b.mean_interval_error).abs() < 1e-12);
        assert_eq!(a.upper_range, (1.0, 3.1));
    }

    #[test]
    fn test_no_anchor_and_no_window() {
        let aligner = WindowAligner::new(0.30);
        let upper = set(Source::UpperLayer, &[("A", &[(0.0, 0.0), (1.0, 1.0)])]);

        let bus_single = set(Source::Bus, &[("A", &[(5.0, 0.0)])]);
        assert_eq!(
            aligner.align(&upper, &bus_single),
            Err(AlignmentFailure::NoAnchorSignal)
        );

        let bus_far = set(Source::Bus, &[("A", &[(5.0, 0.0), (9.0, 1.0)])]);
        assert_eq!(
            aligner.align(&upper, &bus_far),
            Err(AlignmentFailure::NoQualifyingWindow {
                anchors_tried: vec!["A".to_string()]
            })
        );
    }

    #[test]
    fn test_best_anchor_across_signals() {
        let aligner = WindowAligner::new(0.30);
        let upper = set(
            Source::UpperLayer,
            &[
                ("A", &[(0.0, 0.0), (1.0, 1.0)]),
                ("B", &[(0.5, 0.0), (1.5, 1.0)]),
            ],
        );
        let bus = set(
            Source::Bus,
            &[
                ("A", &[(10.0, 0.0), (11.2, 1.0)]),
                ("B", &[(10.5, 0.0), (11.52, 1.0)]),
            ],
        );
        let window = aligner.align(&upper, &bus).unwrap();
        assert_eq!(window.anchor_signal, "B");
    }
}
