use webwatch_common::geometry::BoundingBox;

/// Merge boxes that overlap or sit within `distance` pixels of each other.
///
/// Each incoming box absorbs every existing group it is near, and the grown
/// union is re-checked until nothing else is in range, so the returned boxes
/// are pairwise further apart than `distance`. Which box absorbs which
/// depends on input order; the covered area does not.
pub fn group_boxes(boxes: impl IntoIterator<Item = BoundingBox>, distance: u32) -> Vec<BoundingBox> {
    let mut groups: Vec<BoundingBox> = Vec::new();

    for bbox in boxes {
        let mut merged = bbox;
        while let Some(i) = groups.iter().position(|g| g.is_near(&merged, distance)) {
            merged = merged.union(&groups.swap_remove(i));
        }
        groups.push(merged);
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(mut boxes: Vec<BoundingBox>) -> Vec<BoundingBox> {
        boxes.sort_by_key(|b| (b.x, b.y, b.width, b.height));
        boxes
    }

    #[test]
    fn empty_input() {
        assert!(group_boxes(Vec::new(), 4).is_empty());
    }

    #[test]
    fn distant_boxes_stay_separate() {
        let boxes = vec![BoundingBox::new(0, 0, 5, 5), BoundingBox::new(50, 50, 5, 5)];
        assert_eq!(group_boxes(boxes.clone(), 4), boxes);
    }

    #[test]
    fn overlapping_boxes_merge() {
        let grouped = group_boxes(
            vec![BoundingBox::new(0, 0, 10, 10), BoundingBox::new(5, 5, 10, 10)],
            0,
        );
        assert_eq!(grouped, vec![BoundingBox::new(0, 0, 15, 15)]);
    }

    #[test]
    fn chain_merges_through_grown_union() {
        // The third box bridges the first two only once they are considered together.
        let boxes = vec![
            BoundingBox::new(0, 0, 4, 4),
            BoundingBox::new(20, 0, 4, 4),
            BoundingBox::new(6, 0, 12, 2),
        ];
        assert_eq!(group_boxes(boxes, 2), vec![BoundingBox::new(0, 0, 24, 4)]);
    }

    #[test]
    fn result_is_order_independent_in_coverage() {
        let a = vec![
            BoundingBox::new(0, 0, 3, 3),
            BoundingBox::new(4, 0, 3, 3),
            BoundingBox::new(40, 40, 3, 3),
            BoundingBox::new(8, 0, 3, 3),
        ];
        let mut b = a.clone();
        b.reverse();
        assert_eq!(sorted(group_boxes(a, 1)), sorted(group_boxes(b, 1)));
    }

    #[test]
    fn output_is_pairwise_disjoint() {
        let boxes: Vec<BoundingBox> = (0..20)
            .map(|i| BoundingBox::new((i * 7) % 60, (i * 13) % 60, 6, 6))
            .collect();
        let grouped = group_boxes(boxes, 0);
        for (i, a) in grouped.iter().enumerate() {
            for b in &grouped[i + 1..] {
                assert!(!a.intersects(b), "{a} overlaps {b}");
            }
        }
    }
}
