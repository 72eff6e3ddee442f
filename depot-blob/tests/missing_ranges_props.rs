use depot_blob::segments::{is_acceptable, missing_ranges, received_bytes};
use depot_blob::ByteRange;
use proptest::prelude::*;

/// A file length, a partition of it into consecutive pieces and which of the
/// pieces were received.
fn upload_strategy() -> impl Strategy<Value = (u64, Vec<ByteRange>, Vec<bool>)> {
    (1u64..=5_000)
        .prop_flat_map(|total| {
            (
                Just(total),
                prop::collection::vec(0..total, 0..16),
            )
        })
        .prop_map(|(total, mut cuts)| {
            cuts.sort_unstable();
            cuts.dedup();
            let mut pieces = Vec::new();
            let mut start = 0;
            for cut in cuts.into_iter().filter(|cut| *cut > 0) {
                pieces.push(ByteRange { from: start, to: cut - 1 });
                start = cut;
            }
            pieces.push(ByteRange { from: start, to: total - 1 });
            (total, pieces)
        })
        .prop_flat_map(|(total, pieces)| {
            let count = pieces.len();
            (
                Just(total),
                Just(pieces),
                prop::collection::vec(any::<bool>(), count),
            )
        })
}

fn received(pieces: &[ByteRange], kept: &[bool]) -> Vec<ByteRange> {
    let mut segments: Vec<_> = pieces
        .iter()
        .zip(kept)
        .filter(|(_, keep)| **keep)
        .map(|(piece, _)| *piece)
        .collect();
    // arrival order must not matter
    segments.reverse();
    segments
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn missing_and_received_partition_the_file((total, pieces, kept) in upload_strategy()) {
        let segments = received(&pieces, &kept);
        let missing = missing_ranges(&segments, total);

        prop_assert_eq!(received_bytes(&segments) + received_bytes(&missing), total);
        for window in missing.windows(2) {
            prop_assert!(window[0].to < window[1].from);
        }
        for gap in &missing {
            prop_assert!(gap.to < total);
            for segment in &segments {
                prop_assert!(!gap.overlaps(segment));
            }
        }
    }

    #[test]
    fn gaps_are_acceptable_and_received_pieces_are_not((total, pieces, kept) in upload_strategy()) {
        let segments = received(&pieces, &kept);
        let missing = missing_ranges(&segments, total);

        for gap in &missing {
            prop_assert!(is_acceptable(gap, &missing));
        }
        for segment in &segments {
            prop_assert!(!is_acceptable(segment, &missing));
        }
    }

    #[test]
    fn complete_exactly_when_every_piece_arrived((total, pieces, kept) in upload_strategy()) {
        let segments = received(&pieces, &kept);
        let missing = missing_ranges(&segments, total);
        prop_assert_eq!(missing.is_empty(), kept.iter().all(|keep| *keep));
    }
}
