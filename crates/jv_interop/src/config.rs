use jv_isolation::IsolationMode;
use jv_mediation::ClasspathUsage;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Release used when the configuration does not name one.
pub const DEFAULT_TARGET_RELEASE: u16 = 21;
const MIN_TARGET_RELEASE: u16 = 8;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read interop config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse interop config {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("target release {0} is below the supported minimum of {MIN_TARGET_RELEASE}")]
    UnsupportedRelease(u16),
    #[error(
        "centralized interop audit aggregation requires a local fallback log; set `audit.log` together with `audit.aggregate`"
    )]
    AggregateWithoutLog,
}

/// Audit destinations for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AuditConfig {
    /// Per-run JSON lines log. Every gate decision is appended here.
    pub log: Option<PathBuf>,
    /// Optional fleet-wide sink; failures fall back to `log`.
    pub aggregate: Option<PathBuf>,
    /// Identifier written on every audit line. Generated when absent.
    pub run_id: Option<String>,
}

/// Settings for one interop run.
///
/// Policy files decide governance. The `usage` and `isolation` values here
/// are only fallbacks for runs whose policy leaves `interop.classpathScope`
/// or `interop.classloaderIsolation` unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct InteropConfig {
    pub target_release: u16,
    pub usage: ClasspathUsage,
    pub isolation: IsolationMode,
    /// Start directory for project policy discovery.
    pub project_root: Option<PathBuf>,
    /// Explicit project policy file; disables discovery when set.
    pub project_policy: Option<PathBuf>,
    /// Explicit global policy file; disables discovery when set.
    pub global_policy: Option<PathBuf>,
    pub discover_global_policy: bool,
    pub audit: AuditConfig,
    pub output_dir: PathBuf,
    /// Index cache directory. Indexing is not cached when absent.
    pub cache_dir: Option<PathBuf>,
    /// JDK home for `jrt:/` entries. Detected from `JAVA_HOME` or `java` on `PATH` when absent.
    pub runtime_image: Option<PathBuf>,
    pub parallel: bool,
    pub log_level: String,
    /// Package for generated Java bridge classes. No sources are written when absent.
    pub bridge_package: Option<String>,
}

impl Default for InteropConfig {
    fn default() -> Self {
        Self {
            target_release: DEFAULT_TARGET_RELEASE,
            usage: ClasspathUsage::default(),
            isolation: IsolationMode::default(),
            project_root: None,
            project_policy: None,
            global_policy: None,
            discover_global_policy: true,
            audit: AuditConfig::default(),
            output_dir: PathBuf::from("./out"),
            cache_dir: None,
            runtime_image: None,
            parallel: true,
            log_level: "info".to_string(),
            bridge_package: None,
        }
    }
}

impl InteropConfig {
    /// Config with every output placed under `output_dir` and no ambient
    /// policy discovery.
    pub fn isolated(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            discover_global_policy: false,
            ..Self::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_release < MIN_TARGET_RELEASE {
            return Err(ConfigError::UnsupportedRelease(self.target_release));
        }
        if self.audit.aggregate.is_some() && self.audit.log.is_none() {
            return Err(ConfigError::AggregateWithoutLog);
        }
        Ok(())
    }

    /// Install the stderr subscriber at `log-level` unless `JV_LOG` is set.
    pub fn init_logging(&self) -> bool {
        crate::logging::init_tracing(&self.log_level)
    }
}
