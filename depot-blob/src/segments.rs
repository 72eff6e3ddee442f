//! Bookkeeping of which bytes of an upload session have arrived.
//!
//! A session's segments are pairwise disjoint; the complement of their union
//! over `[0, total_length)` is the set of missing ranges, reported as holes
//! between segments followed by an optional tail.

use crate::ByteRange;

/// Number of trailing bytes tolerated as missing when deciding completion.
///
/// Zero: the last byte of a file needs a segment like any other byte.
pub const TRAILING_GAP_SLACK: u64 = 0;

/// Compute the missing ranges of `total_length` bytes given the received
/// segments. Result is ordered by `from` and pairwise disjoint.
pub fn missing_ranges(segments: &[ByteRange], total_length: u64) -> Vec<ByteRange> {
    let mut sorted = segments.to_vec();
    sorted.sort_by_key(|segment| segment.from);

    let mut missing = Vec::new();
    let mut current = 0u64;

    for segment in sorted {
        if segment.from > current {
            missing.push(ByteRange {
                from: current,
                to: segment.from - 1,
            });
        }
        current = current.max(segment.to.saturating_add(1));
    }

    if current.saturating_add(TRAILING_GAP_SLACK) < total_length {
        missing.push(ByteRange {
            from: current,
            to: total_length - 1,
        });
    }

    missing
}

/// A candidate is acceptable only if it fits inside a single missing range.
///
/// Anything overlapping received bytes or spanning two holes is refused.
pub fn is_acceptable(candidate: &ByteRange, missing: &[ByteRange]) -> bool {
    missing.iter().any(|gap| gap.contains(candidate))
}

/// Total bytes covered by the received segments
pub fn received_bytes(segments: &[ByteRange]) -> u64 {
    segments.iter().map(ByteRange::len).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(from: u64, to: u64) -> ByteRange {
        ByteRange { from, to }
    }

    #[test]
    fn nothing_received_means_everything_missing() {
        assert_eq!(missing_ranges(&[], 10), vec![r(0, 9)]);
    }

    #[test]
    fn holes_and_tail_are_reported_in_order() {
        let segments = [r(7, 8), r(2, 3)];
        assert_eq!(
            missing_ranges(&segments, 12),
            vec![r(0, 1), r(4, 6), r(9, 11)]
        );
    }

    #[test]
    fn last_byte_needs_its_own_segment() {
        assert_eq!(missing_ranges(&[r(0, 8)], 10), vec![r(9, 9)]);
        assert!(missing_ranges(&[r(0, 9)], 10).is_empty());
    }

    #[test]
    fn head_segment_leaves_tail_missing() {
        let missing = missing_ranges(&[r(0, 4)], 10);
        assert_eq!(missing, vec![r(5, 9)]);

        assert!(!is_acceptable(&r(3, 7), &missing));
        assert!(is_acceptable(&r(5, 9), &missing));
        assert!(is_acceptable(&r(6, 7), &missing));
    }

    #[test]
    fn candidates_spanning_two_holes_are_refused() {
        let missing = missing_ranges(&[r(4, 5)], 10);
        assert_eq!(missing, vec![r(0, 3), r(6, 9)]);
        assert!(!is_acceptable(&r(2, 7), &missing));
        assert!(is_acceptable(&r(0, 3), &missing));
    }

    #[test]
    fn received_bytes_sums_segment_lengths() {
        assert_eq!(received_bytes(&[r(0, 4), r(10, 10)]), 6);
        assert_eq!(received_bytes(&[]), 0);
    }
}
