use serde::{Deserialize, Serialize};

use crate::config::FrameThresholds;
use crate::types::FrameDurationSample;

/// Number of frames rendered during the window.
pub const TOTAL_FRAME_COUNT: &str = "total_frame_count";
/// Number of frames slower than the slow-frame threshold.
pub const SLOW_RENDERING_COUNT: &str = "slow_rendering_count";
/// Share of slow frames, in percent.
pub const SLOW_RENDERING_RATIO: &str = "slow_rendering_ratio";
/// Number of frames slower than the frozen-frame threshold.
pub const FROZEN_FRAME_COUNT: &str = "frozen_frame_count";
/// Share of frozen frames, in percent.
pub const FROZEN_FRAME_RATIO: &str = "frozen_frame_ratio";

/// Counter names in emission order.
pub const METRIC_NAMES: [&str; 5] = [
    TOTAL_FRAME_COUNT,
    SLOW_RENDERING_COUNT,
    SLOW_RENDERING_RATIO,
    FROZEN_FRAME_COUNT,
    FROZEN_FRAME_RATIO,
];

/// Summary counters computed from one drained frame histogram.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DerivedMetrics {
    pub total_frame_count: u64,
    pub slow_rendering_count: u64,
    pub slow_rendering_ratio: u64,
    pub frozen_frame_count: u64,
    pub frozen_frame_ratio: u64,
}

impl DerivedMetrics {
    pub fn from_samples<I>(samples: I, thresholds: &FrameThresholds) -> Self
    where
        I: IntoIterator<Item = FrameDurationSample>,
    {
        let mut metrics = Self::default();

        for sample in samples {
            metrics.total_frame_count = metrics.total_frame_count.saturating_add(sample.count);

            // Frozen frames are also slow frames; the two counts overlap.
            if sample.duration_ms > thresholds.slow_frame_ms {
                metrics.slow_rendering_count =
                    metrics.slow_rendering_count.saturating_add(sample.count);
            }
            if sample.duration_ms > thresholds.frozen_frame_ms {
                metrics.frozen_frame_count =
                    metrics.frozen_frame_count.saturating_add(sample.count);
            }
        }

        metrics.slow_rendering_ratio =
            percentage(metrics.slow_rendering_count, metrics.total_frame_count);
        metrics.frozen_frame_ratio =
            percentage(metrics.frozen_frame_count, metrics.total_frame_count);
        metrics
    }

    /// Named counters worth reporting, in emission order.
    ///
    /// Zero-valued counters are left out entirely.
    pub fn counters(&self) -> Vec<(&'static str, u64)> {
        [
            (TOTAL_FRAME_COUNT, self.total_frame_count),
            (SLOW_RENDERING_COUNT, self.slow_rendering_count),
            (SLOW_RENDERING_RATIO, self.slow_rendering_ratio),
            (FROZEN_FRAME_COUNT, self.frozen_frame_count),
            (FROZEN_FRAME_RATIO, self.frozen_frame_ratio),
        ]
        .into_iter()
        .filter(|(_, value)| *value > 0)
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.total_frame_count == 0
    }
}

/// `part / total * 100`, truncated. Zero unless both sides are positive.
fn percentage(part: u64, total: u64) -> u64 {
    if part == 0 || total == 0 {
        return 0;
    }

    (u128::from(part) * 100 / u128::from(total)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(buckets: &[(u64, u64)]) -> Vec<FrameDurationSample> {
        buckets
            .iter()
            .copied()
            .map(FrameDurationSample::from)
            .collect()
    }

    #[test]
    fn test_mixed_histogram_produces_all_counters() {
        let metrics = DerivedMetrics::from_samples(
            samples(&[(5, 100), (20, 10), (800, 2)]),
            &FrameThresholds::default(),
        );

        assert_eq!(metrics.total_frame_count, 112);
        assert_eq!(metrics.slow_rendering_count, 12);
        assert_eq!(metrics.frozen_frame_count, 2);
        assert_eq!(metrics.slow_rendering_ratio, 10);
        assert_eq!(metrics.frozen_frame_ratio, 1);
    }

    #[test]
    fn test_fast_histogram_only_reports_total() {
        let metrics =
            DerivedMetrics::from_samples(samples(&[(5, 50)]), &FrameThresholds::default());

        assert_eq!(metrics.counters(), vec![(TOTAL_FRAME_COUNT, 50)]);
    }

    #[test]
    fn test_thresholds_are_exclusive() {
        let metrics = DerivedMetrics::from_samples(
            samples(&[(16, 3), (700, 4)]),
            &FrameThresholds::default(),
        );

        assert_eq!(metrics.total_frame_count, 7);
        assert_eq!(metrics.slow_rendering_count, 4);
        assert_eq!(metrics.frozen_frame_count, 0);
    }

    #[test]
    fn test_empty_histogram_reports_nothing() {
        let metrics = DerivedMetrics::from_samples(Vec::new(), &FrameThresholds::default());

        assert!(metrics.is_empty());
        assert!(metrics.counters().is_empty());
    }

    #[test]
    fn test_custom_thresholds_shift_classification() {
        let thresholds = FrameThresholds {
            slow_frame_ms: 33,
            frozen_frame_ms: 500,
        };
        let metrics =
            DerivedMetrics::from_samples(samples(&[(20, 10), (40, 5), (600, 5)]), &thresholds);

        assert_eq!(metrics.slow_rendering_count, 10);
        assert_eq!(metrics.frozen_frame_count, 5);
        assert_eq!(metrics.slow_rendering_ratio, 50);
        assert_eq!(metrics.frozen_frame_ratio, 25);
    }

    #[test]
    fn test_counters_keep_emission_order() {
        let metrics = DerivedMetrics::from_samples(
            samples(&[(5, 100), (20, 10), (800, 2)]),
            &FrameThresholds::default(),
        );

        let names: Vec<_> = metrics.counters().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, METRIC_NAMES.to_vec());
    }

    #[test]
    fn test_counts_saturate_instead_of_overflowing() {
        let metrics = DerivedMetrics::from_samples(
            samples(&[(900, u64::MAX), (900, 10)]),
            &FrameThresholds::default(),
        );

        assert_eq!(metrics.total_frame_count, u64::MAX);
        assert_eq!(metrics.frozen_frame_ratio, 100);
    }
}
