use std::path::Path;

use tokio::process::Command;
use tracing::debug;

/// External program shown the artifact after it changes, e.g. `xdg-open`.
///
/// The configured string is split on whitespace; the first word is the
/// program, the rest are leading arguments, and the artifact path goes last.
#[derive(Debug, Clone)]
pub struct Viewer {
    program: String,
    args: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("failed to start viewer '{program}': {reason}")]
    Spawn { program: String, reason: String },
    #[error("viewer '{program}' exited with {status}")]
    Failed { program: String, status: String },
}

impl Viewer {
    /// `None` for an empty command.
    pub fn parse(command: &str) -> Option<Self> {
        let mut words = command.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self {
            program,
            args: words.collect(),
        })
    }

    pub async fn open(&self, path: &Path) -> Result<(), ViewerError> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(std::process::Stdio::null())
            .status()
            .await
            .map_err(|e| ViewerError::Spawn {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        if !status.success() {
            return Err(ViewerError::Failed {
                program: self.program.clone(),
                status: status.to_string(),
            });
        }
        debug!(program = self.program, path = %path.display(), "viewer notified");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_program_and_args() {
        let viewer = Viewer::parse("feh --reload 1").unwrap();
        assert_eq!(viewer.program, "feh");
        assert_eq!(viewer.args, vec!["--reload", "1"]);
        assert!(Viewer::parse("   ").is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_status_is_reported() {
        let path = Path::new("differences.png");
        Viewer::parse("true").unwrap().open(path).await.unwrap();
        let err = Viewer::parse("false").unwrap().open(path).await.unwrap_err();
        assert!(matches!(err, ViewerError::Failed { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let err = Viewer::parse("webwatch-no-such-viewer")
            .unwrap()
            .open(Path::new("differences.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, ViewerError::Spawn { .. }));
    }
}
