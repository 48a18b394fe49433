mod artifact;
mod compare;
mod monitor;
mod viewer;

use std::path::PathBuf;
use std::process::ExitCode;

use artifact::ArtifactStore;
use clap::Parser;
use compare::{compare_targets, ComparePlan};
use monitor::{Monitor, MonitorSettings};
use tokio::sync::watch;
use tracing::{error, info, warn};
use viewer::Viewer;
use webwatch_capture::{CaptureProvider, ChromeSession};
use webwatch_common::capture::Viewport;
use webwatch_common::config::Config;
use webwatch_common::geometry::Region;
use webwatch_diff::{OverlayRenderer, RegionDetector};

/// Watch a web page and highlight regions that change between captures.
#[derive(Parser, Debug)]
#[command(name = "webwatch", version, about)]
struct Args {
    /// URL to monitor for changes.
    url: String,
    /// TOML config file; built-in defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Seconds between captures.
    #[arg(long)]
    interval: Option<f64>,
    /// Where to write the highlighted image.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Only compare this area, given as x,y,width,height.
    #[arg(long)]
    roi: Option<Region>,
    /// Command to open the artifact with after each update.
    #[arg(long)]
    viewer: Option<String>,
    /// Compare URL against this second URL once and exit.
    #[arg(long, value_name = "URL")]
    compare_with: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(interval) = self.interval {
            config.monitor.interval_secs = interval;
        }
        if let Some(output) = &self.output {
            config.monitor.artifact_path = output.display().to_string();
        }
        if let Some(roi) = self.roi {
            config.detect.roi = Some(roi);
        }
        if let Some(viewer) = &self.viewer {
            config.monitor.viewer = Some(viewer.clone());
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config from {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };
    args.apply(&mut config);
    let settings = match config
        .validate()
        .and_then(|()| MonitorSettings::from_config(&args.url, &config))
    {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        url = args.url,
        browser = config.capture.browser,
        width = config.capture.width,
        height = config.capture.height,
        full_page = config.capture.full_page,
        mode = ?config.detect.mode,
        interval_secs = config.monitor.interval_secs,
        artifact = config.monitor.artifact_path,
        "starting webwatch"
    );

    let session = match ChromeSession::launch(&config.capture).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to start browser session");
            return ExitCode::FAILURE;
        }
    };

    let detector = RegionDetector::from_config(&config.detect);
    let renderer = OverlayRenderer::from_config(&config.overlay);
    let artifacts = ArtifactStore::new(
        &config.monitor.artifact_path,
        config.monitor.history_dir.as_ref().map(PathBuf::from),
    );

    if let Some(other) = &args.compare_with {
        return run_compare(
            session, &args.url, other, &config, &detector, &renderer, &artifacts,
        )
        .await;
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, stopping after the current tick");
                let _ = stop_tx.send(true);
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for Ctrl-C; stop the process with a signal instead");
                // Keep the sender alive so the monitor does not read this as a stop.
                std::future::pending::<()>().await;
            }
        }
    });

    let monitor = Monitor::new(
        session,
        settings,
        detector,
        renderer,
        artifacts,
        config.monitor.viewer.as_deref().and_then(Viewer::parse),
    );

    match monitor.run(stop_rx).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "monitor terminated");
            ExitCode::FAILURE
        }
    }
}

async fn run_compare(
    mut session: ChromeSession,
    first: &str,
    second: &str,
    config: &Config,
    detector: &RegionDetector,
    renderer: &OverlayRenderer,
    artifacts: &ArtifactStore,
) -> ExitCode {
    let plan = ComparePlan {
        first,
        second,
        viewport: Viewport::new(config.capture.width, config.capture.height),
        full_page: config.capture.full_page,
        roi: config.detect.roi,
    };

    let result = compare_targets(&mut session, &plan, detector, renderer, artifacts).await;
    if let Err(e) = session.close().await {
        warn!(error = %e, "failed to release browser session");
    }

    match result {
        Ok(regions) => {
            for bbox in &regions {
                info!(region = %bbox, "changed region");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "comparison failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_config() {
        let args = Args::try_parse_from([
            "webwatch",
            "https://example.com",
            "--interval",
            "2.5",
            "--output",
            "/tmp/out.png",
            "--roi",
            "1500,100,300,600",
        ])
        .unwrap();
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(args.url, "https://example.com");
        assert_eq!(config.monitor.interval_secs, 2.5);
        assert_eq!(config.monitor.artifact_path, "/tmp/out.png");
        assert_eq!(config.detect.roi, Some(Region::new(1500, 100, 300, 600)));
        assert!(args.compare_with.is_none());
    }

    #[test]
    fn huge_interval_is_a_config_error() {
        let args =
            Args::try_parse_from(["webwatch", "https://example.com", "--interval", "1e20"]).unwrap();
        let mut config = Config::default();
        args.apply(&mut config);
        assert!(config.validate().is_err());
        assert!(MonitorSettings::from_config(&args.url, &config).is_err());
    }

    #[test]
    fn url_is_required() {
        assert!(Args::try_parse_from(["webwatch"]).is_err());
    }

    #[test]
    fn malformed_roi_is_rejected() {
        assert!(Args::try_parse_from(["webwatch", "https://example.com", "--roi", "1,2"]).is_err());
    }
}
