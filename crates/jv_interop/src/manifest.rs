use jv_bridge::{CallTarget, TargetParseError};
use jv_classpath::parse_properties;
use jv_diagnostics::{codes, InteropDiagnostic, IntoDiagnostic};
use jv_guard::parse_list;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Location recorded for generated program classes when the manifest has none.
pub const DEFAULT_PROGRAM_LOCATION: &str = "<program>";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read call manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse call manifest {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Target(#[from] TargetParseError),
}

impl IntoDiagnostic for ManifestError {
    fn to_diagnostic(&self) -> InteropDiagnostic {
        match self {
            ManifestError::Target(error) => {
                InteropDiagnostic::error(codes::INVALID_TARGET, error.to_string())
                    .with_context("target", error.target())
            }
            ManifestError::Io { path, .. } | ManifestError::Json { path, .. } => {
                InteropDiagnostic::error(codes::INVALID_CONFIG, self.to_string())
                    .with_context("manifest", path.display())
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawManifest {
    targets: Vec<String>,
    program_classes: Vec<String>,
    location: Option<String>,
}

/// What the emitter hands to a run: the interop call targets the program
/// uses and the class names it generates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallManifest {
    pub targets: Vec<CallTarget>,
    pub program_classes: Vec<String>,
    pub location: String,
}

impl Default for CallManifest {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            program_classes: Vec::new(),
            location: DEFAULT_PROGRAM_LOCATION.to_string(),
        }
    }
}

impl CallManifest {
    /// Targets keep declaration order; repeats are dropped.
    pub fn from_targets<I, S>(targets: I) -> Result<Self, ManifestError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut manifest = Self::default();
        for raw in targets {
            manifest.push_target(CallTarget::parse(raw.as_ref().trim())?);
        }
        Ok(manifest)
    }

    pub fn with_program_classes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.program_classes.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn push_target(&mut self, target: CallTarget) {
        if !self.targets.contains(&target) {
            self.targets.push(target);
        }
    }

    /// JSON object form: `{"targets": [...], "programClasses": [...], "location": "..."}`.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let raw: RawManifest = serde_json::from_str(text)?;
        Self::from_raw(raw).map_err(serde::de::Error::custom)
    }

    /// Properties form: comma separated `targets` and `programClasses`.
    pub fn from_properties(text: &str) -> Result<Self, ManifestError> {
        let mut raw = RawManifest::default();
        for (key, value) in parse_properties(text) {
            match key.as_str() {
                "targets" => raw.targets.extend(parse_list(&value)),
                "programClasses" => raw.program_classes.extend(parse_list(&value)),
                "location" => raw.location = Some(value),
                other => tracing::debug!(key = other, "ignoring call manifest key"),
            }
        }
        Self::from_raw(raw)
    }

    /// Load by extension: `.json` is JSON, anything else is properties.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let text = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if path.extension().is_some_and(|extension| extension == "json") {
            Self::from_json(&text).map_err(|source| ManifestError::Json {
                path: path.to_path_buf(),
                source,
            })
        } else {
            Self::from_properties(&text)
        }
    }

    /// Owner classes of every target, in target order without repeats.
    pub fn owner_classes(&self) -> Vec<&str> {
        let mut owners: Vec<&str> = Vec::new();
        for target in &self.targets {
            if !owners.contains(&target.owner()) {
                owners.push(target.owner());
            }
        }
        owners
    }

    fn from_raw(raw: RawManifest) -> Result<Self, ManifestError> {
        let manifest = Self::from_targets(&raw.targets)?.with_program_classes(raw.program_classes);
        Ok(match raw.location {
            Some(location) => manifest.with_location(location),
            None => manifest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jv_bridge::BindingKind;

    #[test]
    fn properties_manifest_lists_targets_in_order() {
        let manifest = CallManifest::from_properties(
            "targets=java.lang.Math#max, java.util.ArrayList#$new,java.lang.Math#max\nprogramClasses=app.Main,app.Util\n",
        )
        .expect("manifest");

        let rendered: Vec<String> = manifest.targets.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["java.lang.Math#max", "java.util.ArrayList#$new"]);
        assert_eq!(manifest.targets[1].kind(), BindingKind::Constructor);
        assert_eq!(manifest.program_classes, vec!["app.Main", "app.Util"]);
        assert_eq!(manifest.location, DEFAULT_PROGRAM_LOCATION);
        assert_eq!(manifest.owner_classes(), vec!["java.lang.Math", "java.util.ArrayList"]);
    }

    #[test]
    fn json_manifest_carries_location() {
        let manifest = CallManifest::from_json(
            r#"{"targets":["demo.Point#$instance$get$x"],"programClasses":["app.Main"],"location":"out/classes"}"#,
        )
        .expect("manifest");
        assert_eq!(manifest.targets[0].kind(), BindingKind::InstanceGet);
        assert_eq!(manifest.location, "out/classes");
    }

    #[test]
    fn malformed_target_is_an_invalid_target() {
        let error = CallManifest::from_targets(["java.lang.Math"]).expect_err("no separator");
        let diagnostic = error.to_diagnostic();
        assert_eq!(diagnostic.code, codes::INVALID_TARGET);
        assert_eq!(diagnostic.context_value("target"), Some("java.lang.Math"));
    }
}
