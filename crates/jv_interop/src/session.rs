use crate::artifact::{RunArtifact, ARTIFACT_FILE_NAME};
use crate::config::InteropConfig;
use crate::error::InteropError;
use crate::manifest::CallManifest;
use chrono::Utc;
use jv_bridge::{
    ArgumentShape, BridgeSourceEmitter, CallTarget, InteropValue, InvocationBridge, Invoker,
    ResolvedBinding,
};
use jv_classpath::{
    ClasspathEntry, ClasspathIndex, ClasspathIndexer, EntryOwner, IndexCache, IndexContext,
    IndexFingerprint,
};
use jv_diagnostics::{InteropDiagnostic, IntoDiagnostic};
use jv_guard::{
    merge_policies, Actor, AuditLog, EffectivePolicy, GuardError, InteropGate, PolicyDecision,
    PolicyOverrides, PolicySource,
};
use jv_isolation::{ClassView, IsolationManager, IsolationMode, ProgramNamespace, INDEX_FILE_NAME};
use jv_mediation::{mediate_index, ClasspathUsage, MediationOutcome};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Directory under the output dir that receives generated bridge classes.
pub const BRIDGE_SOURCE_DIR: &str = "bridge-src";

/// Inputs of one run that do not come from configuration.
#[derive(Debug, Clone, Default)]
pub struct InteropRequest {
    /// Compiled program output, scanned as program-owned entries ahead of the classpath.
    pub program_dirs: Vec<PathBuf>,
    /// Library classpath elements in declaration order. An element may hold
    /// several paths joined with the platform separator.
    pub classpath: Vec<String>,
    pub manifest: CallManifest,
    pub overrides: PolicyOverrides,
}

impl InteropRequest {
    pub fn new(manifest: CallManifest) -> Self {
        Self {
            manifest,
            ..Self::default()
        }
    }

    pub fn program_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.program_dirs.push(dir.into());
        self
    }

    pub fn classpath<I, S>(mut self, elements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.classpath.extend(elements.into_iter().map(Into::into));
        self
    }

    pub fn overrides(mut self, overrides: PolicyOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}

/// What [`InteropSession::finish`] persisted.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub artifact_path: PathBuf,
    pub class_index_path: PathBuf,
    /// Generated Java bridge classes, empty unless a bridge package is configured.
    pub bridge_sources: Vec<PathBuf>,
    pub artifact: RunArtifact,
    /// Non-fatal diagnostics: indexing, release mismatches and audit fallbacks.
    pub warnings: Vec<InteropDiagnostic>,
    pub decisions: Vec<PolicyDecision>,
}

/// One interop run: the mediated classpath, its class view and the
/// governed bridge that call targets go through.
///
/// [`InteropSession::prepare`] does all fallible classpath work up front and
/// authorizes every manifest target. Nothing is written to the output
/// directory until [`InteropSession::finish`].
pub struct InteropSession {
    config: InteropConfig,
    run_id: String,
    manifest: CallManifest,
    index: ClasspathIndex,
    mediation: MediationOutcome,
    bridge: InvocationBridge,
    gate: InteropGate,
    actor: Actor,
    authorized: Mutex<BTreeSet<String>>,
    warnings: Vec<InteropDiagnostic>,
}

impl InteropSession {
    pub fn prepare(config: InteropConfig, request: InteropRequest) -> Result<Self, InteropError> {
        config.validate()?;
        let InteropRequest {
            program_dirs,
            classpath,
            manifest,
            overrides,
        } = request;

        let policy = load_policy(&config, &overrides)?;
        let usage = policy.classpath_scope.unwrap_or(config.usage);
        let isolation = policy.classloader_isolation.unwrap_or(config.isolation);

        let mut entries: Vec<ClasspathEntry> = program_dirs
            .iter()
            .enumerate()
            .map(|(ordinal, dir)| ClasspathEntry::directory(ordinal, dir, EntryOwner::Program))
            .collect();
        entries.extend(ClasspathEntry::discover(
            &classpath,
            EntryOwner::Library,
            entries.len(),
        ));

        let index = build_index(&config, &entries);
        let mediation = mediate_index(&index, usage);
        let mut warnings = index.diagnostics();
        warnings.extend(
            index
                .select_variants(config.target_release)
                .mismatches
                .iter()
                .filter(|mismatch| mediation.is_mediated(mismatch.entry))
                .map(IntoDiagnostic::to_diagnostic),
        );
        mediation.check_scope(&index, manifest.owner_classes())?;

        let mut namespace = ProgramNamespace::from_index(&index);
        namespace.extend(ProgramNamespace::from_manifest(
            &manifest.program_classes,
            &manifest.location,
        ));
        let view = IsolationManager::new(isolation, config.target_release).check(
            &namespace,
            &index,
            &mediation,
        )?;
        for duplicate in view.duplicates() {
            tracing::debug!(
                class = %duplicate.qualified_name,
                rule = %duplicate.rule,
                winner = %duplicate.winner,
                shadowed = %duplicate.shadowed,
                "duplicate class shadowed"
            );
        }

        let run_id = config.audit.run_id.clone().unwrap_or_else(generate_run_id);
        let actor = Actor::from_policy(&policy);
        let mut gate = InteropGate::new(policy);
        if let Some(log) = &config.audit.log {
            let mut audit = AuditLog::open(log, run_id.clone()).map_err(GuardError::from)?;
            if let Some(aggregate) = &config.audit.aggregate {
                audit = audit.with_aggregate(aggregate);
            }
            gate = gate.with_audit(Arc::new(audit));
        }

        tracing::info!(
            run = %run_id,
            entries = entries.len(),
            mediated = mediation.mediated_entries().len(),
            usage = %usage,
            isolation = %isolation,
            targets = manifest.targets.len(),
            "interop run prepared"
        );

        let session = Self {
            config,
            run_id,
            manifest,
            index,
            mediation,
            bridge: InvocationBridge::new(Arc::new(view)),
            gate,
            actor,
            authorized: Mutex::new(BTreeSet::new()),
            warnings,
        };
        for target in &session.manifest.targets {
            session.authorize(target)?;
        }
        Ok(session)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// The mediated classpath in call order.
    pub fn classpath(&self) -> &[ClasspathEntry] {
        self.mediation.mediated_entries()
    }

    pub fn index(&self) -> &ClasspathIndex {
        &self.index
    }

    pub fn mediation(&self) -> &MediationOutcome {
        &self.mediation
    }

    pub fn usage(&self) -> ClasspathUsage {
        self.mediation.usage()
    }

    pub fn isolation(&self) -> IsolationMode {
        self.bridge.view().mode()
    }

    pub fn view(&self) -> &ClassView {
        self.bridge.view()
    }

    pub fn policy(&self) -> &EffectivePolicy {
        self.gate.policy()
    }

    pub fn manifest(&self) -> &CallManifest {
        &self.manifest
    }

    pub fn bridge(&self) -> &InvocationBridge {
        &self.bridge
    }

    pub fn warnings(&self) -> &[InteropDiagnostic] {
        &self.warnings
    }

    pub fn decisions(&self) -> Vec<PolicyDecision> {
        self.gate.decisions()
    }

    /// Authorize a target once per run. Allowed targets are remembered;
    /// denials are not, so a denied target is reported on every attempt.
    pub fn authorize(&self, target: &CallTarget) -> Result<(), InteropError> {
        let key = target.to_string();
        if self.is_authorized(&key) {
            return Ok(());
        }
        self.gate.authorize(&key, &self.actor)?;
        self.authorized
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key);
        Ok(())
    }

    pub fn resolve(
        &self,
        target: &CallTarget,
        receiver_class: Option<&str>,
        shapes: Vec<ArgumentShape>,
    ) -> Result<Arc<ResolvedBinding>, InteropError> {
        self.authorize(target)?;
        Ok(self.bridge.resolve(target, receiver_class, shapes)?)
    }

    pub fn invoke(
        &self,
        invoker: &dyn Invoker,
        target: &CallTarget,
        receiver: Option<&InteropValue>,
        arguments: &[InteropValue],
    ) -> Result<InteropValue, InteropError> {
        self.authorize(target)?;
        Ok(self.bridge.call(invoker, target, receiver, arguments)?)
    }

    /// Persist `class-index.json`, bridge sources and the run artifact to the
    /// output directory.
    ///
    /// Outputs are written to a staging directory first and moved into place
    /// together, the artifact last. A failed write leaves none of them behind.
    pub fn finish(self) -> Result<RunSummary, InteropError> {
        let output_dir = self.config.output_dir.clone();
        let staging = output_dir.join(staging_dir_name(&self.run_id));
        let staged = match self.stage_outputs(&staging, &output_dir) {
            Ok(staged) => staged,
            Err(error) => {
                discard(&staging);
                return Err(error);
            }
        };
        let published = publish(&staging, &output_dir, &staged.files);
        discard(&staging);
        published?;

        let StagedOutputs {
            bridge_sources,
            artifact,
            warnings,
            ..
        } = staged;
        let artifact_path = output_dir.join(ARTIFACT_FILE_NAME);
        let bridge_root = output_dir.join(BRIDGE_SOURCE_DIR);
        let bridge_sources = bridge_sources
            .iter()
            .map(|relative| bridge_root.join(relative))
            .collect();

        tracing::info!(
            run = %self.run_id,
            artifact = %artifact_path.display(),
            warnings = warnings.len(),
            "interop run finished"
        );
        Ok(RunSummary {
            run_id: self.run_id.clone(),
            artifact_path,
            class_index_path: output_dir.join(INDEX_FILE_NAME),
            bridge_sources,
            artifact,
            warnings,
            decisions: self.gate.decisions(),
        })
    }

    /// Write every output under `staging`, recording final paths under `output_dir`.
    fn stage_outputs(&self, staging: &Path, output_dir: &Path) -> Result<StagedOutputs, InteropError> {
        let mut files = Vec::new();
        self.view().write_index_file(staging)?;
        files.push(PathBuf::from(INDEX_FILE_NAME));

        let mut artifact = RunArtifact::new();
        artifact.insert("runId", &self.run_id);
        artifact.insert("interopPolicy", self.policy().mode);
        artifact.record_classpath(&self.mediation, self.isolation());
        artifact.record_class_index(&output_dir.join(INDEX_FILE_NAME), self.view());
        artifact.record_bindings(self.manifest.targets.len(), &self.bridge.cache().resolved());

        let mut bridge_sources = Vec::new();
        if let Some(package) = &self.config.bridge_package {
            let root = staging.join(BRIDGE_SOURCE_DIR);
            for source in BridgeSourceEmitter::new(package).emit(&self.manifest.targets) {
                source.write_to(&root)?;
                files.push(Path::new(BRIDGE_SOURCE_DIR).join(&source.relative_path));
                bridge_sources.push(source.relative_path);
            }
            artifact.insert("interopBridges.package", package);
            artifact.insert("interopBridges.sourceCount", bridge_sources.len());
            let final_root = output_dir.join(BRIDGE_SOURCE_DIR);
            for (index, relative) in bridge_sources.iter().enumerate() {
                artifact.insert(
                    format!("interopBridges.source.{index}"),
                    final_root.join(relative).display(),
                );
            }
        }

        let mut warnings = self.warnings.clone();
        if let Some(audit) = self.gate.audit() {
            let fallbacks = audit.fallbacks();
            artifact.insert("interopAudit.log", audit.path().display());
            artifact.insert("interopAudit.fallbackCount", fallbacks.len());
            warnings.extend(fallbacks);
        }
        artifact.write(staging)?;
        files.push(PathBuf::from(ARTIFACT_FILE_NAME));

        Ok(StagedOutputs {
            files,
            bridge_sources,
            artifact,
            warnings,
        })
    }

    fn is_authorized(&self, key: &str) -> bool {
        self.authorized
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }
}

fn load_policy(
    config: &InteropConfig,
    overrides: &PolicyOverrides,
) -> Result<EffectivePolicy, InteropError> {
    let project = match (&config.project_policy, &config.project_root) {
        (Some(path), _) => Some(PolicySource::load(path)?),
        (None, Some(root)) => PolicySource::discover_project(root)?,
        (None, None) => None,
    };
    let global = match &config.global_policy {
        Some(path) => Some(PolicySource::load(path)?),
        None if config.discover_global_policy => PolicySource::discover_global()?,
        None => None,
    };
    Ok(merge_policies(project.as_ref(), global.as_ref(), overrides)?)
}

/// Index the entries, going through the on-disk cache when one is configured.
/// Cache failures only cost a rebuild.
fn build_index(config: &InteropConfig, entries: &[ClasspathEntry]) -> ClasspathIndex {
    let mut context = match &config.runtime_image {
        Some(image) => IndexContext::default().with_runtime_image(image),
        None => IndexContext::detect(),
    };
    context.parallel = config.parallel;
    let indexer = ClasspathIndexer::new(&context);

    let Some(cache_dir) = &config.cache_dir else {
        return indexer.build(entries);
    };
    let cache = IndexCache::new(cache_dir);
    let fingerprint = match IndexFingerprint::capture(entries, context.runtime_image.as_deref()) {
        Ok(fingerprint) => fingerprint,
        Err(error) => {
            warn_cache(cache_dir, &error);
            return indexer.build(entries);
        }
    };
    match cache.load(&fingerprint) {
        Ok(Some(index)) => {
            tracing::debug!(cache = %cache_dir.display(), "classpath index cache hit");
            return index;
        }
        Ok(None) => {}
        Err(error) => warn_cache(cache_dir, &error),
    }

    let index = indexer.build(entries);
    if let Err(error) = cache.store(&fingerprint, &index) {
        warn_cache(cache_dir, &error);
    }
    index
}

fn warn_cache(cache_dir: &Path, error: &dyn std::error::Error) {
    tracing::warn!(
        cache = %cache_dir.display(),
        error = %error,
        "classpath index cache unusable; indexing without it"
    );
}

struct StagedOutputs {
    /// Paths relative to the staging and output directories, in publish order.
    files: Vec<PathBuf>,
    /// Relative to [`BRIDGE_SOURCE_DIR`].
    bridge_sources: Vec<PathBuf>,
    artifact: RunArtifact,
    warnings: Vec<InteropDiagnostic>,
}

fn staging_dir_name(run_id: &str) -> String {
    let safe: String = run_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!(".{safe}.staging")
}

/// Move staged files into `output_dir`. On failure the files already moved,
/// and directories left empty by them, are removed again.
fn publish(staging: &Path, output_dir: &Path, files: &[PathBuf]) -> Result<(), InteropError> {
    let mut moved: Vec<PathBuf> = Vec::new();
    for relative in files {
        let to = output_dir.join(relative);
        let result = match to.parent() {
            Some(parent) => fs::create_dir_all(parent),
            None => Ok(()),
        }
        .and_then(|()| fs::rename(staging.join(relative), &to));
        if let Err(source) = result {
            for path in &moved {
                let _ = fs::remove_file(path);
                for parent in path.ancestors().skip(1) {
                    if parent == output_dir || fs::remove_dir(parent).is_err() {
                        break;
                    }
                }
            }
            return Err(InteropError::Publish { path: to, source });
        }
        moved.push(to);
    }
    Ok(())
}

fn discard(staging: &Path) {
    if let Err(error) = fs::remove_dir_all(staging) {
        if error.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(
                path = %staging.display(),
                error = %error,
                "failed to remove interop staging directory"
            );
        }
    }
}

fn generate_run_id() -> String {
    format!(
        "run-{}-{}",
        Utc::now().format("%Y%m%dT%H%M%S%3fZ"),
        std::process::id()
    )
}
