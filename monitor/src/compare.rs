use tracing::info;
use webwatch_capture::{CaptureError, CaptureProvider};
use webwatch_common::capture::Viewport;
use webwatch_common::geometry::Region;
use webwatch_diff::{DiffError, DifferenceSet, OverlayRenderer, RegionDetector};

use crate::artifact::{ArtifactStore, PersistenceError};

/// Two targets to capture once each and compare.
pub struct ComparePlan<'a> {
    pub first: &'a str,
    pub second: &'a str,
    pub viewport: Viewport,
    pub full_page: bool,
    pub roi: Option<Region>,
}

#[derive(Debug, thiserror::Error)]
pub enum CompareError {
    #[error("capture of {target} failed: {source}")]
    Capture { target: String, source: CaptureError },
    #[error(transparent)]
    Diff(#[from] DiffError),
    #[error(transparent)]
    Persist(#[from] PersistenceError),
}

/// Capture both targets, highlight where the second differs from the first
/// and write the annotated second capture to the artifact path.
pub async fn compare_targets<P: CaptureProvider>(
    provider: &mut P,
    plan: &ComparePlan<'_>,
    detector: &RegionDetector,
    renderer: &OverlayRenderer,
    artifacts: &ArtifactStore,
) -> Result<DifferenceSet, CompareError> {
    let mut captures = Vec::with_capacity(2);
    for target in [plan.first, plan.second] {
        let capture = provider
            .capture(target, plan.viewport, plan.full_page)
            .await
            .map_err(|source| CompareError::Capture {
                target: target.to_string(),
                source,
            })?;
        captures.push(capture);
    }
    let (first, second) = (&captures[0], &captures[1]);

    let regions = detector.detect(&first.image, &second.image, plan.roi)?;
    let annotated = renderer.render(&second.image, &regions)?;
    artifacts.persist(&annotated, second).await?;

    info!(
        first = plan.first,
        second = plan.second,
        regions = regions.len(),
        path = %artifacts.path().display(),
        "comparison written"
    );
    Ok(regions)
}
