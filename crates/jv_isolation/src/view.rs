use crate::mode::IsolationMode;
use crate::namespace::ClassOrigin;
use jv_classpath::{ReleaseMismatch, ReleaseVariant, SkippedMember, SymbolRecord};
use jv_diagnostics::{codes, InteropDiagnostic, IntoDiagnostic};
use jv_mediation::ScopeViolation;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const INDEX_FILE_NAME: &str = "class-index.json";
const INDEX_FORMAT_VERSION: &str = "0.1";

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("failed to write class index {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode class index: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateRule {
    /// A program class shadowed by the mediated library class.
    MediatedOrder,
    /// Two classpath entries of the same owner; the earlier entry wins.
    ClasspathOrder,
}

impl DuplicateRule {
    pub fn as_str(self) -> &'static str {
        match self {
            DuplicateRule::MediatedOrder => "mediated-order",
            DuplicateRule::ClasspathOrder => "classpath-order",
        }
    }
}

impl fmt::Display for DuplicateRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One shadowed occurrence of a class name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateSymbol {
    pub qualified_name: String,
    pub mode: IsolationMode,
    pub rule: DuplicateRule,
    pub winner: ClassOrigin,
    pub shadowed: ClassOrigin,
}

/// Multi-release winners among the selected records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseStats {
    pub mr_jar_winner_count: usize,
    pub mr_jar_base_winner_count: usize,
    pub mr_jar_versioned_winner_count: usize,
}

/// Why a name known to the index is absent from the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unavailable {
    ScopeExcluded(ScopeViolation),
    Skipped(SkippedMember),
    ReleaseMismatch(ReleaseMismatch),
}

impl IntoDiagnostic for Unavailable {
    fn to_diagnostic(&self) -> InteropDiagnostic {
        match self {
            Unavailable::ScopeExcluded(violation) => violation.to_diagnostic(),
            Unavailable::Skipped(skipped) => InteropDiagnostic::error(
                codes::UNREADABLE_SYMBOL,
                format!(
                    "interop target class `{}` could not be read from `{}`: {}",
                    skipped.qualified_name.as_deref().unwrap_or(&skipped.member),
                    skipped.location,
                    skipped.reason
                ),
            )
            .with_context("entry", &skipped.location)
            .with_context("member", &skipped.member)
            .with_context("reason", &skipped.reason),
            Unavailable::ReleaseMismatch(mismatch) => InteropDiagnostic::error(
                codes::RELEASE_MISMATCH,
                format!(
                    "interop target class `{}` requires release {} but the target release is {}",
                    mismatch.qualified_name, mismatch.lowest_release, mismatch.target_release
                ),
            )
            .with_context("qualifiedName", &mismatch.qualified_name)
            .with_context("entry", &mismatch.location)
            .with_context("lowestRelease", mismatch.lowest_release)
            .with_context("targetRelease", mismatch.target_release),
        }
    }
}

/// The class namespace a run resolves call targets against: one record per
/// name after variant selection, mediation and isolation.
#[derive(Debug, Clone, Default)]
pub struct ClassView {
    pub(crate) mode: IsolationMode,
    pub(crate) target_release: u16,
    pub(crate) library: BTreeMap<String, SymbolRecord>,
    pub(crate) program: BTreeMap<String, SymbolRecord>,
    pub(crate) duplicates: Vec<DuplicateSymbol>,
    pub(crate) unavailable: BTreeMap<String, Unavailable>,
}

impl ClassView {
    pub fn mode(&self) -> IsolationMode {
        self.mode
    }

    pub fn target_release(&self) -> u16 {
        self.target_release
    }

    /// Library classes take precedence over program classes of the same name.
    pub fn lookup(&self, qualified_name: &str) -> Option<&SymbolRecord> {
        self.library
            .get(qualified_name)
            .or_else(|| self.program.get(qualified_name))
    }

    pub fn contains(&self, qualified_name: &str) -> bool {
        self.lookup(qualified_name).is_some()
    }

    pub fn explain_missing(&self, qualified_name: &str) -> Option<&Unavailable> {
        self.unavailable.get(qualified_name)
    }

    pub fn duplicates(&self) -> &[DuplicateSymbol] {
        &self.duplicates
    }

    /// Selected records sorted by name.
    pub fn symbols(&self) -> Vec<&SymbolRecord> {
        let mut merged: BTreeMap<&str, &SymbolRecord> = self
            .program
            .iter()
            .map(|(name, record)| (name.as_str(), record))
            .collect();
        for (name, record) in &self.library {
            merged.insert(name.as_str(), record);
        }
        merged.into_values().collect()
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols().len()
    }

    pub fn release_stats(&self) -> ReleaseStats {
        let mut stats = ReleaseStats::default();
        for record in self.symbols() {
            if !record.multi_release {
                continue;
            }
            stats.mr_jar_winner_count += 1;
            match record.variant {
                ReleaseVariant::Base => stats.mr_jar_base_winner_count += 1,
                ReleaseVariant::Versioned(_) => stats.mr_jar_versioned_winner_count += 1,
            }
        }
        stats
    }

    pub fn to_index_json(&self) -> Result<String, serde_json::Error> {
        let symbols = self
            .symbols()
            .into_iter()
            .map(|record| IndexSymbol {
                qualified_name: &record.qualified_name,
                variant: match record.variant {
                    ReleaseVariant::Base => "base".to_string(),
                    ReleaseVariant::Versioned(release) => release.to_string(),
                },
                origin: ClassOrigin::from_record(record),
            })
            .collect::<Vec<_>>();
        let file = IndexFile {
            format_version: INDEX_FORMAT_VERSION,
            isolation_mode: self.mode,
            target_release: self.target_release,
            symbol_count: symbols.len(),
            duplicate_count: self.duplicates.len(),
            release: self.release_stats(),
            symbols,
            duplicates: &self.duplicates,
        };
        serde_json::to_string_pretty(&file)
    }

    /// Write `class-index.json` under `dir` and return its path.
    pub fn write_index_file(&self, dir: &Path) -> Result<PathBuf, ViewError> {
        let json = self.to_index_json()?;
        fs::create_dir_all(dir).map_err(|source| ViewError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(INDEX_FILE_NAME);
        fs::write(&path, json).map_err(|source| ViewError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IndexFile<'a> {
    format_version: &'static str,
    isolation_mode: IsolationMode,
    target_release: u16,
    symbol_count: usize,
    duplicate_count: usize,
    release: ReleaseStats,
    symbols: Vec<IndexSymbol<'a>>,
    duplicates: &'a [DuplicateSymbol],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IndexSymbol<'a> {
    qualified_name: &'a str,
    variant: String,
    origin: ClassOrigin,
}
