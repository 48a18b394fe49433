use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use tracing::debug;
use webwatch_common::config::OverlayConfig;
use webwatch_common::geometry::BoundingBox;

use crate::error::DiffError;
use crate::DifferenceSet;

/// Paints translucent highlights over detected regions.
#[derive(Debug, Clone)]
pub struct OverlayRenderer {
    padding: u32,
    color: [u8; 3],
    /// Fill opacity in 0..=255.
    alpha: u8,
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::from_config(&OverlayConfig::default())
    }
}

impl OverlayRenderer {
    pub fn new(padding: u32, color: [u8; 3], alpha: f32) -> Self {
        Self {
            padding,
            color,
            alpha: (alpha.clamp(0.0, 1.0) * 255.0).round() as u8,
        }
    }

    pub fn from_config(config: &OverlayConfig) -> Self {
        Self::new(config.padding, config.color, config.alpha)
    }

    /// Build the transparent highlight layer for `diffs` on a `width` x `height` image.
    ///
    /// Overlapping padded boxes are painted with the same color into a single
    /// layer, so the result does not depend on box order.
    pub fn layer(&self, width: u32, height: u32, diffs: &DifferenceSet) -> Result<RgbaImage, DiffError> {
        let mut layer = RgbaImage::new(width, height);
        let fill = Rgba([self.color[0], self.color[1], self.color[2], self.alpha]);

        for bbox in diffs.iter() {
            if bbox.is_empty() || bbox.x >= width || bbox.y >= height {
                return Err(DiffError::InvalidBoundingBox {
                    bbox: *bbox,
                    width,
                    height,
                });
            }
            let padded = bbox.padded(self.padding, width, height);
            draw_filled_rect_mut(&mut layer, to_rect(&padded), fill);
        }

        Ok(layer)
    }

    /// Return an opaque RGBA copy of `base` with every box in `diffs` highlighted.
    pub fn render(&self, base: &DynamicImage, diffs: &DifferenceSet) -> Result<RgbaImage, DiffError> {
        let (width, height) = base.dimensions();
        let layer = self.layer(width, height, diffs)?;

        let mut out = base.to_rgba8();
        for (dst, src) in out.pixels_mut().zip(layer.pixels()) {
            dst.0[3] = u8::MAX;
            composite_over(dst, src);
        }

        debug!(
            regions = diffs.len(),
            padding = self.padding,
            alpha = self.alpha,
            "rendered overlay"
        );
        Ok(out)
    }
}

fn to_rect(bbox: &BoundingBox) -> Rect {
    Rect::at(bbox.x as i32, bbox.y as i32).of_size(bbox.width, bbox.height)
}

/// "Source over" onto an opaque destination pixel.
fn composite_over(dst: &mut Rgba<u8>, src: &Rgba<u8>) {
    let a = src.0[3] as u32;
    if a == 0 {
        return;
    }
    for c in 0..3 {
        let blended = src.0[c] as u32 * a + dst.0[c] as u32 * (255 - a);
        dst.0[c] = ((blended + 127) / 255) as u8;
    }
}
