//! Blocked segment index
//!
//! Holds the validated ranges of a media item that playback must not enter.
//! Lookups are a binary search over the sorted, disjoint ranges.

use crate::{types::TimeRange, Error, Result};

/// Sorted, disjoint set of half-open blocked ranges
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockedSegments {
    ranges: Vec<TimeRange>,
}

impl BlockedSegments {
    /// Validate and build an index from ranges in timeline order.
    ///
    /// Every range must be finite with `start < end`, ranges must be sorted
    /// by start and must not overlap. Touching ranges (`a.end == b.start`)
    /// are accepted.
    pub fn new(ranges: Vec<TimeRange>) -> Result<Self> {
        for (index, range) in ranges.iter().enumerate() {
            if !range.start.is_finite() || !range.end.is_finite() {
                return Err(Error::MalformedMetadata(format!(
                    "blocked segment {} {} is not finite",
                    index, range
                )));
            }
            if range.start >= range.end {
                return Err(Error::MalformedMetadata(format!(
                    "blocked segment {} {} is empty or inverted",
                    index, range
                )));
            }
        }

        for (index, pair) in ranges.windows(2).enumerate() {
            let (prev, next) = (pair[0], pair[1]);
            if next.start < prev.start {
                return Err(Error::MalformedMetadata(format!(
                    "blocked segments are unsorted: {} follows {}",
                    next, prev
                )));
            }
            if next.start < prev.end {
                return Err(Error::MalformedMetadata(format!(
                    "blocked segments {} and {} overlap at index {}",
                    prev,
                    next,
                    index + 1
                )));
            }
        }

        Ok(Self { ranges })
    }

    /// Index with no blocked ranges
    pub fn empty() -> Self {
        Self::default()
    }

    /// Find the range containing a position, if any
    pub fn find(&self, position: f64) -> Option<&TimeRange> {
        // First range whose end lies after the position; it is the only candidate.
        let index = self.ranges.partition_point(|range| range.end <= position);
        self.ranges
            .get(index)
            .filter(|range| range.contains(position))
    }

    /// Check if a position is blocked
    pub fn is_blocked(&self, position: f64) -> bool {
        self.find(position).is_some()
    }

    pub fn ranges(&self) -> &[TimeRange] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total blocked duration in seconds
    pub fn total_duration(&self) -> f64 {
        self.ranges.iter().map(TimeRange::duration).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(ranges: &[(f64, f64)]) -> Result<BlockedSegments> {
        BlockedSegments::new(
            ranges
                .iter()
                .map(|&(start, end)| TimeRange::new(start, end))
                .collect(),
        )
    }

    #[test]
    fn test_find_boundaries() {
        let segments = index(&[(10.0, 20.0), (30.0, 40.0)]).unwrap();

        assert!(segments.find(9.99).is_none());
        assert_eq!(segments.find(10.0), Some(&TimeRange::new(10.0, 20.0)));
        assert!(segments.is_blocked(15.0));
        assert!(!segments.is_blocked(20.0));
        assert!(!segments.is_blocked(25.0));
        assert_eq!(segments.find(30.0), Some(&TimeRange::new(30.0, 40.0)));
        assert!(!segments.is_blocked(40.0));
        assert!(!segments.is_blocked(1000.0));
    }

    #[test]
    fn test_adjacent_ranges_accepted() {
        let segments = index(&[(10.0, 20.0), (20.0, 30.0)]).unwrap();
        assert_eq!(segments.find(20.0), Some(&TimeRange::new(20.0, 30.0)));
        assert_eq!(segments.total_duration(), 20.0);
    }

    #[test]
    fn test_rejects_inverted_range() {
        let err = index(&[(20.0, 10.0)]).unwrap_err();
        assert_eq!(err.error_code(), "MALFORMED_METADATA");
    }

    #[test]
    fn test_rejects_empty_range() {
        assert!(index(&[(10.0, 10.0)]).is_err());
    }

    #[test]
    fn test_rejects_unsorted_ranges() {
        assert!(index(&[(30.0, 40.0), (10.0, 20.0)]).is_err());
    }

    #[test]
    fn test_rejects_overlapping_ranges() {
        assert!(index(&[(10.0, 20.0), (15.0, 25.0)]).is_err());
    }

    #[test]
    fn test_rejects_non_finite() {
        assert!(index(&[(10.0, f64::INFINITY)]).is_err());
        assert!(index(&[(f64::NAN, 10.0)]).is_err());
    }

    #[test]
    fn test_matches_linear_scan() {
        let ranges = [(1.0, 2.5), (4.0, 4.5), (7.0, 9.0), (9.0, 12.0), (20.0, 21.0)];
        let segments = index(&ranges).unwrap();

        let mut position = 0.0;
        while position < 25.0 {
            let expected = ranges
                .iter()
                .any(|&(start, end)| position >= start && position < end);
            assert_eq!(segments.is_blocked(position), expected, "position {}", position);
            position += 0.25;
        }
    }

    #[test]
    fn test_empty_index() {
        let segments = BlockedSegments::empty();
        assert!(segments.is_empty());
        assert!(!segments.is_blocked(0.0));
    }
}
