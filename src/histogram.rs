//! Equal-width histogram binning with log compression, used to summarize the
//! anomaly severity distribution.

/// Raw histogram: per-bin counts plus the matching bin left edges. The
/// trailing right edge of the partition is dropped so both vectors have
/// `bin_count` entries.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub counts: Vec<u64>,
    pub left_edges: Vec<f64>,
}

/// Partition `[min, max]` of the observed values into `bin_count` equal-width
/// intervals, half-open except the last, which includes the maximum.
///
/// Non-finite values are ignored. An empty input bins over [0, 1]; an
/// all-equal input widens the range to half a unit on either side so the bin
/// width stays positive.
pub fn build(values: &[f64], bin_count: usize) -> Histogram {
    let bin_count = bin_count.max(1);
    let finite = values.iter().copied().filter(|v| v.is_finite());

    let (lo, hi) = finite.clone().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let (lo, hi) = if lo > hi {
        (0.0, 1.0)
    } else if lo == hi {
        (lo - 0.5, hi + 0.5)
    } else {
        (lo, hi)
    };

    let width = (hi - lo) / bin_count as f64;
    let mut counts = vec![0u64; bin_count];
    for v in finite {
        let idx = (((v - lo) / width) as usize).min(bin_count - 1);
        counts[idx] += 1;
    }
    let left_edges = (0..bin_count).map(|i| lo + i as f64 * width).collect();

    Histogram { counts, left_edges }
}

/// Natural-log compression of bin counts. Zero counts map to 0 explicitly
/// (never through `ln(0)`), and any negative result (counts of 0 < n < 1 do
/// not arise for integer counts, but the clamp is kept for parity with the
/// plotting contract) is clamped to 0, so the output is always ≥ 0.
pub fn log_compress(counts: &[u64]) -> Vec<f64> {
    counts
        .iter()
        .map(|&c| {
            if c == 0 {
                0.0
            } else {
                (c as f64).ln().max(0.0)
            }
        })
        .collect()
}
