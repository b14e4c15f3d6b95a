//! Buffered time ranges and the multi-stream intersection
//!
//! Each attached stream reports an ordered, non-overlapping list of
//! [`BufferedRange`]s. The player reports only the spans every stream can
//! play, which is what [`intersection_of_buffered_ranges`] computes.

use serde::{Deserialize, Serialize};

/// Largest gap, in seconds, between two frames that still counts as
/// contiguous data.
pub const DEFAULT_GAP_TOLERANCE: f64 = 0.15;

/// A half-open span `[start, end)` of presentation time, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BufferedRange {
    /// Start of the span
    pub start: f64,
    /// End of the span (exclusive)
    pub end: f64,
}

impl BufferedRange {
    /// Create a new range
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Length of the range in seconds
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    /// True for zero-length (or inverted) ranges
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Check whether `time` falls inside the range
    pub fn contains(&self, time: f64) -> bool {
        self.start <= time && time < self.end
    }
}

/// Compute the spans covered by every list in `sources`.
///
/// Zero inputs give an empty result. A single input is returned as-is, minus
/// zero-length ranges. Otherwise start/end events are swept in time order; a
/// span is emitted while the coverage count equals the number of inputs.
pub fn intersection_of_buffered_ranges(sources: &[Vec<BufferedRange>]) -> Vec<BufferedRange> {
    match sources.len() {
        0 => return Vec::new(),
        1 => {
            return sources[0]
                .iter()
                .filter(|range| !range.is_empty())
                .copied()
                .collect()
        }
        _ => {}
    }

    let mut events: Vec<(f64, i32)> = sources
        .iter()
        .flat_map(|ranges| ranges.iter())
        .filter(|range| !range.is_empty())
        .flat_map(|range| [(range.start, 1), (range.end, -1)])
        .collect();
    // Ends sort before starts at the same instant so touching ranges from
    // different streams never produce a zero-length overlap.
    events.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    let needed = sources.len() as i32;
    let mut coverage = 0;
    let mut open_at = None;
    let mut result: Vec<BufferedRange> = Vec::new();
    for (time, delta) in events {
        coverage += delta;
        if delta > 0 && coverage == needed {
            open_at = Some(time);
        } else if delta < 0 && coverage == needed - 1 {
            if let Some(start) = open_at.take() {
                push_merged(&mut result, BufferedRange::new(start, time));
            }
        }
    }
    result
}

/// Merge frame spans (sorted by start) into buffered ranges, joining spans
/// separated by at most `gap_tolerance` seconds.
pub fn merge_frame_spans<I>(spans: I, gap_tolerance: f64) -> Vec<BufferedRange>
where
    I: IntoIterator<Item = BufferedRange>,
{
    let mut result: Vec<BufferedRange> = Vec::new();
    for span in spans {
        match result.last_mut() {
            Some(last) if span.start <= last.end + gap_tolerance => {
                last.end = last.end.max(span.end);
            }
            _ => result.push(span),
        }
    }
    result
}

/// Find the range the play head is in.
///
/// A range starting up to `gap_tolerance` after `time` still counts, so a play
/// head sitting just before the first frame is considered buffered.
pub fn find_range(ranges: &[BufferedRange], time: f64, gap_tolerance: f64) -> Option<BufferedRange> {
    ranges
        .iter()
        .find(|range| range.start <= time + gap_tolerance && time < range.end)
        .copied()
}

/// Seconds of contiguous data available from `time` onwards.
pub fn buffered_ahead(ranges: &[BufferedRange], time: f64, gap_tolerance: f64) -> f64 {
    find_range(ranges, time, gap_tolerance)
        .map(|range| range.end - time)
        .unwrap_or(0.0)
}

fn push_merged(result: &mut Vec<BufferedRange>, range: BufferedRange) {
    if range.is_empty() {
        return;
    }
    if let Some(last) = result.last_mut() {
        if last.end >= range.start {
            last.end = last.end.max(range.end);
            return;
        }
    }
    result.push(range);
}
