//! Visual difference pipeline: find the regions that changed between two
//! captures and paint them as a translucent overlay.

pub mod detector;
pub mod error;
pub mod group;
pub mod overlay;

pub use detector::RegionDetector;
pub use error::DiffError;
pub use overlay::OverlayRenderer;

use webwatch_common::geometry::BoundingBox;

/// Grouped, pairwise-disjoint boxes describing where two captures differ.
/// Order carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DifferenceSet {
    boxes: Vec<BoundingBox>,
}

impl DifferenceSet {
    pub fn new(boxes: Vec<BoundingBox>) -> Self {
        Self { boxes }
    }

    pub fn boxes(&self) -> &[BoundingBox] {
        &self.boxes
    }

    pub fn into_boxes(self) -> Vec<BoundingBox> {
        self.boxes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BoundingBox> {
        self.boxes.iter()
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Total pixel area covered by the boxes.
    pub fn covered_area(&self) -> u64 {
        self.boxes.iter().map(BoundingBox::area).sum()
    }
}

impl<'a> IntoIterator for &'a DifferenceSet {
    type Item = &'a BoundingBox;
    type IntoIter = std::slice::Iter<'a, BoundingBox>;

    fn into_iter(self) -> Self::IntoIter {
        self.boxes.iter()
    }
}
