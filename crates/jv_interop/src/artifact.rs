use chrono::{SecondsFormat, Utc};
use indexmap::IndexMap;
use jv_bridge::ResolvedBinding;
use jv_isolation::{ClassView, IsolationMode};
use jv_mediation::{ClasspathUsage, DependencyScope, MediationOutcome};
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

pub const ARTIFACT_FILE_NAME: &str = "interop-run.properties";
const FORMAT_VERSION: &str = "0.1";

#[derive(Debug, Error)]
#[error("failed to write run artifact {path}: {source}")]
pub struct ArtifactError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Ordered key/value record of one run, persisted as a `.properties` file.
///
/// List-valued facts use a `<prefix>.count` key followed by zero-based
/// `<prefix>.<n>` keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunArtifact {
    records: IndexMap<String, String>,
}

impl RunArtifact {
    pub fn new() -> Self {
        let mut artifact = Self::default();
        artifact.insert("formatVersion", FORMAT_VERSION);
        artifact.insert(
            "generatedAt",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        artifact
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        self.records.insert(key.into(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.records.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.records
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Mediated classpath, usage and mediation decisions.
    pub fn record_classpath(&mut self, mediation: &MediationOutcome, isolation: IsolationMode) {
        let entries = mediation.mediated_entries();
        self.insert("interopClasspath.count", entries.len());
        for (index, entry) in entries.iter().enumerate() {
            self.insert(format!("interopClasspath.{index}"), entry.location());
        }

        self.insert("interopClasspath.scope.usage", mediation.usage());
        self.insert(
            "interopClasspath.scope.allowed",
            allowed_scopes(mediation.usage()).join(","),
        );
        self.insert("interopClasspath.classloaderIsolation", isolation);

        let decisions = mediation.decisions();
        self.insert("interopClasspath.mediation.count", decisions.len());
        for (index, decision) in decisions.iter().enumerate() {
            let prefix = format!("interopClasspath.mediation.{index}.");
            self.insert(format!("{prefix}artifact"), &decision.coordinate);
            self.insert(format!("{prefix}selectedVersion"), &decision.selected_version);
            self.insert(format!("{prefix}selectedPath"), &decision.selected_location);
            self.insert(format!("{prefix}rejectedVersion"), &decision.rejected.version);
            self.insert(format!("{prefix}rejectedPath"), &decision.rejected.location);
            self.insert(format!("{prefix}rule"), decision.rule.as_str());
        }

        let exclusions = mediation.scope_exclusions();
        self.insert("interopClasspath.scopeExclusion.count", exclusions.len());
        for (index, exclusion) in exclusions.iter().enumerate() {
            let prefix = format!("interopClasspath.scopeExclusion.{index}.");
            self.insert(format!("{prefix}ownerArtifact"), &exclusion.owner_coordinate);
            self.insert(format!("{prefix}ownerVersion"), &exclusion.owner_version);
            self.insert(
                format!("{prefix}dependencyArtifact"),
                &exclusion.dependency_coordinate,
            );
            self.insert(
                format!("{prefix}dependencyVersion"),
                &exclusion.dependency_version,
            );
            self.insert(format!("{prefix}scope"), &exclusion.scope);
            self.insert(format!("{prefix}usage"), exclusion.usage);
            self.insert(format!("{prefix}excludedPath"), &exclusion.excluded_location);
        }
    }

    pub fn record_class_index(&mut self, path: &Path, view: &ClassView) {
        let stats = view.release_stats();
        self.insert("interopClasspath.classIndex.path", path.display());
        self.insert("interopClasspath.classIndex.targetRelease", view.target_release());
        self.insert("interopClasspath.classIndex.symbolCount", view.symbol_count());
        self.insert(
            "interopClasspath.classIndex.duplicateCount",
            view.duplicates().len(),
        );
        self.insert(
            "interopClasspath.classIndex.mrJarWinnerCount",
            stats.mr_jar_winner_count,
        );
        self.insert(
            "interopClasspath.classIndex.mrJarBaseWinnerCount",
            stats.mr_jar_base_winner_count,
        );
        self.insert(
            "interopClasspath.classIndex.mrJarVersionedWinnerCount",
            stats.mr_jar_versioned_winner_count,
        );
    }

    /// Bindings selected during the run, one per distinct member.
    pub fn record_bindings(&mut self, target_count: usize, bindings: &[Arc<ResolvedBinding>]) {
        let mut selected: Vec<&ResolvedBinding> = Vec::new();
        for binding in bindings {
            let seen = selected.iter().any(|existing| {
                existing.target == binding.target && existing.descriptor == binding.descriptor
            });
            if !seen {
                selected.push(binding);
            }
        }

        self.insert("interopBridges.targetCount", target_count);
        self.insert("interopBridges.selectedTargetCount", selected.len());
        for (index, binding) in selected.iter().enumerate() {
            let prefix = format!("interopBridges.selectedTarget.{index}.");
            self.insert(format!("{prefix}target"), &binding.target);
            self.insert(format!("{prefix}owner"), &binding.owner);
            self.insert(format!("{prefix}name"), &binding.name);
            self.insert(format!("{prefix}descriptor"), &binding.descriptor);
            self.insert(format!("{prefix}invokeKind"), binding.invoke_kind.as_str());
        }
    }

    pub fn to_properties(&self) -> String {
        let mut out = String::from("#jv interop run\n");
        for (key, value) in &self.records {
            let _ = writeln!(out, "{}={}", escape(key, true), escape(value, false));
        }
        out
    }

    pub fn write(&self, dir: &Path) -> Result<PathBuf, ArtifactError> {
        let path = dir.join(ARTIFACT_FILE_NAME);
        fs::create_dir_all(dir)
            .and_then(|()| fs::write(&path, self.to_properties()))
            .map_err(|source| ArtifactError {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}

fn allowed_scopes(usage: ClasspathUsage) -> Vec<&'static str> {
    [
        DependencyScope::Compile,
        DependencyScope::Runtime,
        DependencyScope::Provided,
        DependencyScope::Test,
    ]
    .iter()
    .filter(|scope| usage.allows(scope))
    .map(|scope| match scope {
        DependencyScope::Compile => "compile",
        DependencyScope::Runtime => "runtime",
        DependencyScope::Provided => "provided",
        _ => "test",
    })
    .collect()
}

fn escape(raw: &str, key: bool) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '=' | ':' | ' ' if key => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}
