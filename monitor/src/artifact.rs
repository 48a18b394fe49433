use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbaImage};
use tracing::{debug, warn};
use webwatch_common::capture::Capture;

/// Writes the highlighted artifact to its fixed path, plus an optional
/// timestamped copy per capture under a history directory.
pub struct ArtifactStore {
    path: PathBuf,
    history_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("failed to encode artifact as PNG: {0}")]
    Encode(String),
    #[error("failed to write artifact {path}: {reason}")]
    Write { path: String, reason: String },
}

impl ArtifactStore {
    pub fn new(path: impl Into<PathBuf>, history_dir: Option<PathBuf>) -> Self {
        Self {
            path: path.into(),
            history_dir,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the artifact with `image`. The previous file stays intact if
    /// encoding or writing fails.
    pub async fn persist(&self, image: &RgbaImage, capture: &Capture) -> Result<(), PersistenceError> {
        let png = encode_png(image)?;
        write_atomic(&self.path, &png).await?;
        debug!(path = %self.path.display(), bytes = png.len(), seq = capture.seq, "artifact written");

        if let Some(dir) = &self.history_dir {
            let archived = dir.join(capture.archive_name());
            if let Err(e) = write_atomic(&archived, &png).await {
                warn!(error = %e, "failed to archive artifact copy");
            }
        }
        Ok(())
    }
}

fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, PersistenceError> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| PersistenceError::Encode(e.to_string()))?;
    Ok(buf.into_inner())
}

/// Write to a sibling temp file, then rename over the target.
async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), PersistenceError> {
    let write_err = |e: std::io::Error| PersistenceError::Write {
        path: path.display().to_string(),
        reason: e.to_string(),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".into());
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    tokio::fs::write(&tmp, data).await.map_err(write_err)?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(write_err(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba};

    fn capture(seq: u64) -> Capture {
        Capture::new(DynamicImage::new_rgb8(2, 2), 1708300000000, seq)
    }

    #[tokio::test]
    async fn persist_overwrites_fixed_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("differences.png"), None);

        let first = RgbaImage::from_pixel(3, 3, Rgba([255, 0, 0, 255]));
        store.persist(&first, &capture(1)).await.unwrap();
        let second = RgbaImage::from_pixel(3, 3, Rgba([0, 255, 0, 128]));
        store.persist(&second, &capture(2)).await.unwrap();

        let read = image::open(store.path()).unwrap().to_rgba8();
        assert_eq!(read, second, "alpha channel survives the round trip");

        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1, "no temp files left behind");
    }

    #[tokio::test]
    async fn persist_creates_parent_dirs_and_history() {
        let dir = tempfile::tempdir().unwrap();
        let history = dir.path().join("history");
        let store = ArtifactStore::new(dir.path().join("out/latest.png"), Some(history.clone()));

        let img = RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255]));
        let cap = capture(9);
        store.persist(&img, &cap).await.unwrap();

        assert!(store.path().is_file());
        assert!(history.join(cap.archive_name()).is_file());
    }

    #[tokio::test]
    async fn failed_write_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where a parent directory is needed.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        let store = ArtifactStore::new(blocker.join("differences.png"), None);

        let err = store
            .persist(&RgbaImage::new(1, 1), &capture(1))
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::Write { .. }));
    }
}
