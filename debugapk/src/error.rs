use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::environment::EnvironmentError;
use crate::manifest::ManifestError;
use crate::pipeline::Stage;
use crate::tool::{CapturedOutput, ToolError};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Why a single pipeline stage failed.
#[derive(Error, Debug)]
pub enum StageFailure {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid config {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to create temporary directory: {0}")]
    Workspace(#[source] io::Error),

    #[error("{stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: StageFailure,
    },
}

impl Error {
    /// A missing input package ends the run without a failure status.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::NotFound(_))
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Tool output captured in debug mode, if the failing invocation kept any.
    pub fn captured(&self) -> Option<&CapturedOutput> {
        match self {
            Error::Stage {
                source: StageFailure::Tool(err),
                ..
            } => err.captured(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_not_found_is_non_fatal() {
        assert!(!Error::NotFound(PathBuf::from("app.apk")).is_fatal());
        assert!(Error::Workspace(io::Error::other("boom")).is_fatal());
        assert!(
            Error::Environment(EnvironmentError::VersionMismatch {
                required: "2.5.0".into(),
                found: "2.9.3".into(),
            })
            .is_fatal()
        );
    }

    #[test]
    fn environment_errors_carry_no_captured_output() {
        let err = Error::Environment(EnvironmentError::VersionQuery {
            tool: "apktool".into(),
            source: ToolError::Launch {
                tool: "apktool".into(),
                source: io::Error::from(io::ErrorKind::NotFound),
            },
        });
        assert!(err.captured().is_none());
    }

    #[test]
    fn stage_error_names_the_stage() {
        let err = Error::Stage {
            stage: Stage::Repacking,
            source: StageFailure::Manifest(ManifestError::MissingApplication {
                path: PathBuf::from("AndroidManifest.xml"),
            }),
        };

        assert_eq!(err.stage(), Some(Stage::Repacking));
        assert!(err.to_string().starts_with("Repacking failed:"));
        assert!(err.captured().is_none());
    }
}
