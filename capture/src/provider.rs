use std::future::Future;

use webwatch_common::capture::{Capture, Viewport};

use crate::error::CaptureError;

/// Source of rendered captures for a target.
///
/// Implementations own whatever long-lived resource rendering needs (a
/// browser profile, a remote session) and give it back in `close`.
pub trait CaptureProvider: Send {
    /// Render `target` at `viewport` and return the decoded image.
    /// With `full_page`, the capture extends past the viewport height to
    /// cover the whole page.
    fn capture(
        &mut self,
        target: &str,
        viewport: Viewport,
        full_page: bool,
    ) -> impl Future<Output = Result<Capture, CaptureError>> + Send;

    /// Release the provider's resources. No captures are possible afterwards.
    fn close(self) -> impl Future<Output = Result<(), CaptureError>> + Send
    where
        Self: Sized;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}
