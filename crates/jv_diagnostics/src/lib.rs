//! インターロップエンジン全体で共有する診断コードと構造化コンテキスト。
//!
//! 各クレートは独自の `thiserror` ベースのエラー型を持ち、
//! [`IntoDiagnostic`] を通じて安定したコード付きの [`InteropDiagnostic`] に変換する。

mod catalog;

pub use catalog::{codes, descriptor, DiagnosticDescriptor, DESCRIPTORS};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 診断の重大度。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 機械可読なコードと構造化コンテキストを持つ診断。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteropDiagnostic {
    pub code: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub context: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remedy: Option<String>,
}

impl InteropDiagnostic {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Error, message)
    }

    pub fn warning(code: &str, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Warning, message)
    }

    fn new(code: &str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            severity,
            message: message.into(),
            context: IndexMap::new(),
            remedy: None,
        }
    }

    /// コンテキストフィールドを追加する。挿入順はそのまま出力順になる。
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    pub fn with_remedy(mut self, remedy: impl Into<String>) -> Self {
        self.remedy = Some(remedy.into());
        self
    }

    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(String::as_str)
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Error
    }

    /// 登録済みディスクリプタのタイトル。未登録コードでは `None`。
    pub fn title(&self) -> Option<&'static str> {
        descriptor(&self.code).map(|desc| desc.title)
    }

    /// 1 行のログ表現 (`JV5404: message [key=value, ...]`)。
    pub fn render_line(&self) -> String {
        let mut line = format!("{}: {}", self.code, self.message);
        if !self.context.is_empty() {
            let fields = self
                .context
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>()
                .join(", ");
            line.push_str(" [");
            line.push_str(&fields);
            line.push(']');
        }
        if let Some(remedy) = &self.remedy {
            line.push_str(" (");
            line.push_str(remedy);
            line.push(')');
        }
        line
    }
}

impl fmt::Display for InteropDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_line())
    }
}

/// ドメインエラーを安定コード付き診断へ変換する。
pub trait IntoDiagnostic {
    fn to_diagnostic(&self) -> InteropDiagnostic;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_line_keeps_context_order() {
        let diagnostic = InteropDiagnostic::error(codes::RBAC_DENIED, "role missing")
            .with_context("scope", "sensitive")
            .with_context("requiredRoles", "admin")
            .with_remedy("grant one of the required roles");

        assert_eq!(
            diagnostic.render_line(),
            "JV5404: role missing [scope=sensitive, requiredRoles=admin] (grant one of the required roles)"
        );
        assert_eq!(diagnostic.title(), Some("interop call denied by RBAC"));
        assert!(diagnostic.is_fatal());
    }

    #[test]
    fn serializes_without_empty_fields() {
        let diagnostic = InteropDiagnostic::warning(codes::AUDIT_AGGREGATE_FALLBACK, "fallback");
        let json = serde_json::to_string(&diagnostic).expect("serialize diagnostic");
        assert_eq!(
            json,
            r#"{"code":"JV5406","severity":"warning","message":"fallback"}"#
        );
    }
}
