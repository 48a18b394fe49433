use webwatch_common::geometry::{BoundingBox, Region};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiffError {
    #[error("images are not comparable: {left_width}x{left_height} vs {right_width}x{right_height}")]
    DimensionMismatch {
        left_width: u32,
        left_height: u32,
        right_width: u32,
        right_height: u32,
    },
    #[error("region {region} does not fit inside a {width}x{height} image")]
    InvalidRegion {
        region: Region,
        width: u32,
        height: u32,
    },
    #[error("bounding box {bbox} is empty or outside a {width}x{height} image")]
    InvalidBoundingBox {
        bbox: BoundingBox,
        width: u32,
        height: u32,
    },
}
