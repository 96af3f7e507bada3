use crate::gate::PolicyDecision;
use chrono::{DateTime, Utc};
use jv_diagnostics::{codes, InteropDiagnostic, IntoDiagnostic};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// 集約ログ 1 行の `schema` 値。
pub const AGGREGATE_SCHEMA: &str = "jv.interop.audit.v1";

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to write interop audit log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode interop audit record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl IntoDiagnostic for AuditError {
    fn to_diagnostic(&self) -> InteropDiagnostic {
        let diagnostic = InteropDiagnostic::error(codes::AUDIT_UNWRITABLE, self.to_string());
        match self {
            AuditError::Io { path, .. } => diagnostic.with_context("auditLog", path.display()),
            AuditError::Encode(_) => diagnostic,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuditRecord<'a> {
    ts: DateTime<Utc>,
    run: &'a str,
    target: &'a str,
    decision: &'a str,
    code: &'a str,
    message: &'a str,
    scope: &'a str,
    actor_roles: &'a [String],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AggregateRecord<'a> {
    schema: &'static str,
    #[serde(flatten)]
    record: &'a AuditRecord<'a>,
    outcome: &'a str,
}

/// 実行ごとの JSON lines 監査ログ。
///
/// 1 レコードは 1 回の `write_all` で追記し、ファイルはミューテックスで直列化する。
/// 集約シンクは任意で、書けなければ主ログに警告レコードを残して判定はそのまま通す。
pub struct AuditLog {
    run: String,
    path: PathBuf,
    primary: Mutex<File>,
    aggregate: Option<AggregateSink>,
    fallbacks: Mutex<Vec<InteropDiagnostic>>,
}

struct AggregateSink {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl AuditLog {
    pub fn open(path: &Path, run: impl Into<String>) -> Result<Self, AuditError> {
        let file = open_append(path).map_err(|source| AuditError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            run: run.into(),
            path: path.to_path_buf(),
            primary: Mutex::new(file),
            aggregate: None,
            fallbacks: Mutex::new(Vec::new()),
        })
    }

    /// 集約シンクは最初の書き込み時に開く。
    pub fn with_aggregate(mut self, path: impl Into<PathBuf>) -> Self {
        self.aggregate = Some(AggregateSink {
            path: path.into(),
            file: Mutex::new(None),
        });
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run(&self) -> &str {
        &self.run
    }

    /// 集約シンクへの書き込み失敗で発生した警告。
    pub fn fallbacks(&self) -> Vec<InteropDiagnostic> {
        self.fallbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn record(&self, decision: &PolicyDecision) -> Result<(), AuditError> {
        let scope = decision.role_context.scope.as_str();
        let record = AuditRecord {
            ts: decision.timestamp,
            run: &self.run,
            target: &decision.target,
            decision: decision.decision.as_str(),
            code: decision.reason_code.as_deref().unwrap_or_default(),
            message: &decision.message,
            scope,
            actor_roles: &decision.role_context.actor_roles,
        };
        self.append_primary(&record)?;

        let Some(aggregate) = &self.aggregate else {
            return Ok(());
        };
        let outcome = if decision.is_allowed() { "success" } else { "failure" };
        let line = encode_line(&AggregateRecord {
            schema: AGGREGATE_SCHEMA,
            record: &record,
            outcome,
        })?;
        if let Err(error) = aggregate.append(&line) {
            self.fall_back(decision, aggregate, &error)?;
        }
        Ok(())
    }

    fn fall_back(
        &self,
        decision: &PolicyDecision,
        aggregate: &AggregateSink,
        error: &io::Error,
    ) -> Result<(), AuditError> {
        let message = format!("centralized audit sink unavailable: {error} (fallback=local)");
        tracing::warn!(
            path = %aggregate.path.display(),
            error = %error,
            "interop audit aggregate unwritable; keeping local log only"
        );
        let warning = AuditRecord {
            ts: Utc::now(),
            run: &self.run,
            target: &decision.target,
            decision: "warn",
            code: codes::AUDIT_AGGREGATE_FALLBACK,
            message: &message,
            scope: decision.role_context.scope.as_str(),
            actor_roles: &decision.role_context.actor_roles,
        };
        self.append_primary(&warning)?;

        let diagnostic = InteropDiagnostic::warning(codes::AUDIT_AGGREGATE_FALLBACK, message)
            .with_context("aggregateAudit", aggregate.path.display())
            .with_context("auditLog", self.path.display())
            .with_context("target", &decision.target);
        self.fallbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(diagnostic);
        Ok(())
    }

    fn append_primary(&self, record: &AuditRecord<'_>) -> Result<(), AuditError> {
        let line = encode_line(record)?;
        let mut file = self.primary.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(line.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|source| AuditError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

impl AggregateSink {
    fn append(&self, line: &str) -> io::Result<()> {
        let mut slot = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(open_append(&self.path)?);
        }
        match slot.as_mut() {
            Some(file) => file.write_all(line.as_bytes()).and_then(|()| file.flush()),
            None => Ok(()),
        }
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn encode_line(record: &impl Serialize) -> Result<String, AuditError> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    Ok(line)
}
