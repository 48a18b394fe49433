use image::{DynamicImage, GenericImageView, GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType, Contour};
use tracing::debug;
use webwatch_common::config::{ComparisonMode, DetectConfig};
use webwatch_common::geometry::{BoundingBox, Region};

use crate::error::DiffError;
use crate::group::group_boxes;
use crate::DifferenceSet;

const MASK_ON: u8 = 255;
/// The contour tracer never starts a border in the outermost column.
const MASK_BORDER: u32 = 1;

/// Finds the regions where a newer capture differs from a baseline.
///
/// Algorithm:
/// 1. Convert both images to luminance, cropped to the region of interest
/// 2. Subtract per pixel according to the comparison mode
/// 3. Mark pixels whose difference exceeds the noise threshold, in a mask
///    with a one-pixel empty border so components on the image edge are traced
/// 4. Take the bounding rectangle of every external contour of the mask
/// 5. Merge rectangles that overlap or are within `merge_distance`
/// 6. Translate back into full-image coordinates
#[derive(Debug, Clone)]
pub struct RegionDetector {
    mode: ComparisonMode,
    noise_threshold: u8,
    merge_distance: u32,
}

impl Default for RegionDetector {
    fn default() -> Self {
        Self::from_config(&DetectConfig::default())
    }
}

impl RegionDetector {
    pub fn new(mode: ComparisonMode, noise_threshold: u8, merge_distance: u32) -> Self {
        Self {
            mode,
            noise_threshold,
            merge_distance,
        }
    }

    pub fn from_config(config: &DetectConfig) -> Self {
        Self::new(config.mode, config.noise_threshold, config.merge_distance)
    }

    pub fn mode(&self) -> ComparisonMode {
        self.mode
    }

    /// Compare `baseline` against `current`, optionally restricted to `roi`.
    pub fn detect(
        &self,
        baseline: &DynamicImage,
        current: &DynamicImage,
        roi: Option<Region>,
    ) -> Result<DifferenceSet, DiffError> {
        let (width, height) = baseline.dimensions();
        let (cur_width, cur_height) = current.dimensions();
        if (width, height) != (cur_width, cur_height) {
            return Err(DiffError::DimensionMismatch {
                left_width: width,
                left_height: height,
                right_width: cur_width,
                right_height: cur_height,
            });
        }

        let area = match roi {
            Some(region) => {
                if region.is_empty() || !region.fits_within(width, height) {
                    return Err(DiffError::InvalidRegion {
                        region,
                        width,
                        height,
                    });
                }
                region
            }
            None => Region::new(0, 0, width, height),
        };
        if area.is_empty() {
            return Ok(DifferenceSet::default());
        }

        let before = luminance(baseline, area);
        let after = luminance(current, area);
        let mask = self.change_mask(&before, &after);

        let raw: Vec<BoundingBox> = find_contours::<u32>(&mask)
            .iter()
            .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
            .filter_map(bounding_rect)
            .collect();
        let raw_count = raw.len();

        let boxes: Vec<BoundingBox> = group_boxes(raw, self.merge_distance)
            .into_iter()
            .map(|b| b.translate(area.x, area.y))
            .collect();

        debug!(
            mode = ?self.mode,
            roi = %area,
            contours = raw_count,
            regions = boxes.len(),
            "region detection"
        );

        Ok(DifferenceSet::new(boxes))
    }

    /// Mask of changed pixels, offset by `MASK_BORDER` on every side.
    fn change_mask(&self, before: &GrayImage, after: &GrayImage) -> GrayImage {
        let mut mask = GrayImage::new(
            before.width() + 2 * MASK_BORDER,
            before.height() + 2 * MASK_BORDER,
        );
        for ((x, y, b), a) in before.enumerate_pixels().zip(after.pixels()) {
            let (old, new) = (b.0[0], a.0[0]);
            let delta = match self.mode {
                ComparisonMode::Increase => new.saturating_sub(old),
                ComparisonMode::Decrease => old.saturating_sub(new),
                ComparisonMode::Absolute => old.abs_diff(new),
            };
            if delta > self.noise_threshold {
                mask.put_pixel(x + MASK_BORDER, y + MASK_BORDER, Luma([MASK_ON]));
            }
        }
        mask
    }
}

fn luminance(img: &DynamicImage, area: Region) -> GrayImage {
    if area.x == 0 && area.y == 0 && (area.width, area.height) == img.dimensions() {
        img.to_luma8()
    } else {
        img.crop_imm(area.x, area.y, area.width, area.height)
            .to_luma8()
    }
}

/// Bounding box of a contour traced on the bordered mask, in unbordered coordinates.
fn bounding_rect(contour: &Contour<u32>) -> Option<BoundingBox> {
    let first = contour.points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in &contour.points[1..] {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    // Set pixels never lie on the empty border, so every coordinate is >= MASK_BORDER.
    Some(BoundingBox::from_corners(
        min_x - MASK_BORDER,
        min_y - MASK_BORDER,
        max_x - MASK_BORDER,
        max_y - MASK_BORDER,
    ))
}
