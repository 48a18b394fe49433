use image::{DynamicImage, GenericImageView};

/// Window size requested from a capture provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// A rendered snapshot of a target with capture metadata.
///
/// Providers decode whatever the browser hands back (PNG screenshots in
/// practice) into an in-memory image; everything downstream works on pixels.
#[derive(Debug, Clone)]
pub struct Capture {
    pub image: DynamicImage,
    pub captured_at_ms: i64,
    pub seq: u64,
}

impl Capture {
    pub fn new(image: DynamicImage, captured_at_ms: i64, seq: u64) -> Self {
        Self {
            image,
            captured_at_ms,
            seq,
        }
    }

    /// Decode an encoded screenshot. The format is sniffed from the bytes.
    pub fn decode(data: &[u8], captured_at_ms: i64, seq: u64) -> Result<Self, CaptureDecodeError> {
        if data.is_empty() {
            return Err(CaptureDecodeError::Empty);
        }
        let image = image::load_from_memory(data)
            .map_err(|e| CaptureDecodeError::Image(e.to_string()))?;
        Ok(Self::new(image, captured_at_ms, seq))
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Relative path for an archived copy of an artifact derived from this capture.
    /// e.g. "2026-02-18/20260218T093000000Z_000042.png"
    pub fn archive_name(&self) -> String {
        let dt = chrono::DateTime::from_timestamp_millis(self.captured_at_ms)
            .unwrap_or_else(chrono::Utc::now);
        let date = dt.format("%Y-%m-%d");
        let ts = dt.format("%Y%m%dT%H%M%S%3fZ");
        format!("{date}/{ts}_{seq:06}.png", seq = self.seq)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureDecodeError {
    #[error("screenshot payload is empty")]
    Empty,
    #[error("failed to decode screenshot: {0}")]
    Image(String),
}
