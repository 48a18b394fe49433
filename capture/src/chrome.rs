use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotParams, NavigateParams};
use chromiumoxide::Page;
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webwatch_common::capture::{Capture, Viewport};
use webwatch_common::config::CaptureConfig;

use crate::error::CaptureError;
use crate::provider::CaptureProvider;

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

const PAGE_HEIGHT_JS: &str = "document.body ? document.body.scrollHeight : 0";

/// Headless Chromium capture session driven over the DevTools protocol.
///
/// One browser process and one tab live for the whole session; every capture
/// navigates that tab. The browser runs with a private profile directory that
/// is removed on `close`, or on drop if `close` was never reached.
pub struct ChromeSession {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Page,
    name: String,
    timeout: Duration,
    full_page_height: u32,
    profile_dir: PathBuf,
    seq: u64,
    closed: bool,
}

impl ChromeSession {
    /// Start the browser and open the tab used for captures.
    pub async fn launch(config: &CaptureConfig) -> Result<Self, CaptureError> {
        let spawn_err = |reason: String| CaptureError::Spawn {
            browser: config.browser.clone(),
            reason,
        };

        let profile_dir = std::env::temp_dir().join(format!(
            "webwatch-profile-{}-{}-{}",
            std::process::id(),
            chrono::Utc::now().timestamp_millis(),
            SESSION_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::create_dir_all(&profile_dir).await.map_err(|e| {
            spawn_err(format!(
                "cannot create profile dir {}: {e}",
                profile_dir.display()
            ))
        })?;

        let timeout = Duration::from_secs(config.timeout_secs);
        let launched = match browser_config(config, &profile_dir, timeout) {
            Ok(cfg) => match tokio::time::timeout(timeout, Browser::launch(cfg)).await {
                Ok(Ok(pair)) => Ok(pair),
                Ok(Err(e)) => Err(spawn_err(e.to_string())),
                Err(_) => Err(spawn_err(format!(
                    "no DevTools endpoint after {}s",
                    timeout.as_secs()
                ))),
            },
            Err(reason) => Err(spawn_err(reason)),
        };
        let (mut browser, mut handler) = match launched {
            Ok(pair) => pair,
            Err(e) => {
                remove_profile(&profile_dir);
                return Err(e);
            }
        };

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "devtools handler event");
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                let _ = browser.wait().await;
                handler.abort();
                remove_profile(&profile_dir);
                return Err(spawn_err(format!("cannot open tab: {e}")));
            }
        };
        let version = browser
            .version()
            .await
            .map(|v| v.product)
            .unwrap_or_else(|_| "unknown".into());

        info!(
            browser = config.browser,
            version,
            profile = %profile_dir.display(),
            "browser session started"
        );

        Ok(Self {
            browser,
            handler,
            page,
            name: config.browser.clone(),
            timeout,
            full_page_height: config.full_page_height,
            profile_dir,
            seq: 0,
            closed: false,
        })
    }

    pub fn profile_dir(&self) -> &Path {
        &self.profile_dir
    }
}

fn browser_config(
    config: &CaptureConfig,
    profile_dir: &Path,
    timeout: Duration,
) -> Result<BrowserConfig, String> {
    BrowserConfig::builder()
        .chrome_executable(&config.browser)
        .user_data_dir(profile_dir)
        .window_size(config.width, config.height)
        .request_timeout(timeout)
        .args(["--hide-scrollbars", "--disable-gpu", "--no-first-run"])
        .args(config.extra_args.iter().map(String::as_str))
        .build()
}

/// Load `target` in `page` and screenshot it.
async fn render(
    page: &Page,
    target: &str,
    viewport: Viewport,
    full_page: bool,
    max_height: u32,
) -> Result<Vec<u8>, CaptureError> {
    set_metrics(page, viewport.width, viewport.height).await?;

    let nav = page
        .execute(NavigateParams::new(target))
        .await
        .map_err(|e| navigation_failed(target, e.to_string()))?;
    if let Some(reason) = nav.result.error_text.clone() {
        return Err(navigation_failed(target, reason));
    }
    page.wait_for_navigation()
        .await
        .map_err(|e| navigation_failed(target, e.to_string()))?;

    if full_page {
        let scroll_height: f64 = page
            .evaluate(PAGE_HEIGHT_JS)
            .await
            .map_err(protocol)?
            .into_value()
            .map_err(|e| CaptureError::Protocol(format!("page height: {e}")))?;
        let height = page_height(scroll_height, viewport.height, max_height);
        set_metrics(page, viewport.width, height).await?;
    }

    page.screenshot(CaptureScreenshotParams::default())
        .await
        .map_err(protocol)
}

async fn set_metrics(page: &Page, width: u32, height: u32) -> Result<(), CaptureError> {
    page.execute(SetDeviceMetricsOverrideParams::new(
        width as i64,
        height as i64,
        1.0,
        false,
    ))
    .await
    .map_err(protocol)?;
    Ok(())
}

/// Full-page height: the document's scroll height, never shorter than the
/// viewport and never taller than `max_height`.
fn page_height(scroll_height: f64, viewport_height: u32, max_height: u32) -> u32 {
    let measured = if scroll_height.is_finite() && scroll_height > 0.0 {
        scroll_height.ceil().min(u32::MAX as f64) as u32
    } else {
        0
    };
    measured
        .max(viewport_height)
        .min(max_height.max(viewport_height))
}

fn navigation_failed(target: &str, reason: String) -> CaptureError {
    CaptureError::Navigation {
        target: target.to_string(),
        reason,
    }
}

fn protocol(e: chromiumoxide::error::CdpError) -> CaptureError {
    CaptureError::Protocol(e.to_string())
}

fn remove_profile(profile_dir: &Path) {
    if let Err(e) = std::fs::remove_dir_all(profile_dir) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(profile = %profile_dir.display(), error = %e, "failed to remove browser profile");
        }
    }
}

impl CaptureProvider for ChromeSession {
    async fn capture(
        &mut self,
        target: &str,
        viewport: Viewport,
        full_page: bool,
    ) -> Result<Capture, CaptureError> {
        if self.closed || self.handler.is_finished() {
            return Err(CaptureError::Closed);
        }
        self.seq += 1;
        let seq = self.seq;

        let png = match tokio::time::timeout(
            self.timeout,
            render(&self.page, target, viewport, full_page, self.full_page_height),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(CaptureError::Timeout {
                    target: target.to_string(),
                    secs: self.timeout.as_secs(),
                })
            }
        };
        let captured_at_ms = chrono::Utc::now().timestamp_millis();

        let capture = Capture::decode(&png, captured_at_ms, seq)?;
        let (width, height) = capture.dimensions();
        debug!(url = target, seq, width, height, bytes = png.len(), "captured page");
        Ok(capture)
    }

    async fn close(mut self) -> Result<(), CaptureError> {
        self.closed = true;
        let shutdown = self
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| CaptureError::Release(format!("browser close: {e}")));
        if let Err(e) = self.browser.wait().await {
            warn!(error = %e, "failed to reap browser process");
        }
        self.handler.abort();

        let removed = match tokio::fs::remove_dir_all(&self.profile_dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CaptureError::Release(format!(
                "{}: {e}",
                self.profile_dir.display()
            ))),
        };
        info!(profile = %self.profile_dir.display(), captures = self.seq, "browser session closed");
        shutdown.and(removed)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        // The browser kills its process on drop; only the handler and profile are ours.
        self.handler.abort();
        remove_profile(&self.profile_dir);
    }
}
