use crate::artifact::ArtifactError;
use crate::config::ConfigError;
use crate::manifest::ManifestError;
use jv_bridge::{BridgeError, EmitError};
use jv_diagnostics::{codes, InteropDiagnostic, IntoDiagnostic};
use jv_guard::{GuardError, PolicyConflict, PolicyError};
use jv_isolation::{IsolationConflict, ViewError, INDEX_FILE_NAME};
use jv_mediation::ScopeViolation;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal outcome of a run step. Each variant maps onto one stable
/// diagnostic through [`IntoDiagnostic`].
#[derive(Debug, Error)]
pub enum InteropError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    PolicyConflict(#[from] PolicyConflict),
    #[error(transparent)]
    Isolation(#[from] IsolationConflict),
    #[error(transparent)]
    Scope(#[from] ScopeViolation),
    #[error(transparent)]
    Guard(#[from] GuardError),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error("failed to persist interop outputs: {0}")]
    View(#[from] ViewError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    Emit(#[from] EmitError),
    #[error("failed to publish interop output {path}: {source}")]
    Publish {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl InteropError {
    pub fn code(&self) -> String {
        self.to_diagnostic().code
    }
}

impl IntoDiagnostic for InteropError {
    fn to_diagnostic(&self) -> InteropDiagnostic {
        match self {
            InteropError::Config(error) => {
                InteropDiagnostic::error(codes::INVALID_CONFIG, error.to_string())
            }
            InteropError::Manifest(error) => error.to_diagnostic(),
            InteropError::Policy(error) => error.to_diagnostic(),
            InteropError::PolicyConflict(conflict) => conflict.to_diagnostic(),
            InteropError::Isolation(conflict) => conflict.to_diagnostic(),
            InteropError::Scope(violation) => violation.to_diagnostic(),
            InteropError::Guard(error) => error.to_diagnostic(),
            InteropError::Bridge(error) => error.to_diagnostic(),
            InteropError::View(error) => {
                InteropDiagnostic::error(codes::OUTPUT_UNWRITABLE, self.to_string()).with_context(
                    "output",
                    match error {
                        ViewError::Io { path, .. } => path.display().to_string(),
                        ViewError::Json(_) => INDEX_FILE_NAME.to_string(),
                    },
                )
            }
            InteropError::Artifact(error) => {
                InteropDiagnostic::error(codes::OUTPUT_UNWRITABLE, error.to_string())
                    .with_context("output", error.path.display())
            }
            InteropError::Emit(EmitError::Io { path, .. }) | InteropError::Publish { path, .. } => {
                InteropDiagnostic::error(codes::OUTPUT_UNWRITABLE, self.to_string())
                    .with_context("output", path.display())
            }
        }
    }
}
