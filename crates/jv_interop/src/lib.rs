//! Run orchestration for JVM interop.
//!
//! An [`InteropSession`] ties the pipeline together for one run: index the
//! program output and library classpath, mediate one version per library
//! coordinate, validate the loading topology against the program namespace,
//! then authorize and bridge call targets. [`InteropSession::finish`] writes
//! `class-index.json` and the [`RunArtifact`] to the configured output
//! directory.

mod artifact;
mod config;
mod error;
pub mod logging;
mod manifest;
mod session;

pub use artifact::{ArtifactError, RunArtifact, ARTIFACT_FILE_NAME};
pub use config::{AuditConfig, ConfigError, InteropConfig, DEFAULT_TARGET_RELEASE};
pub use error::InteropError;
pub use logging::init_tracing;
pub use manifest::{CallManifest, ManifestError, DEFAULT_PROGRAM_LOCATION};
pub use session::{InteropRequest, InteropSession, RunSummary, BRIDGE_SOURCE_DIR};

pub use jv_bridge::{
    ArgumentShape, CallTarget, InteropValue, InvocationError, Invoker, JvmValue, ResolvedBinding,
};
pub use jv_diagnostics::{codes, InteropDiagnostic, IntoDiagnostic};
pub use jv_guard::{PolicyDecision, PolicyMode, PolicyOverrides, PolicySettings};
pub use jv_isolation::IsolationMode;
pub use jv_mediation::ClasspathUsage;
