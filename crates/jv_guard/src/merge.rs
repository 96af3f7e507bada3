use crate::policy::{PolicyKey, PolicyMode, PolicySettings, PolicySource};
use indexmap::IndexMap;
use jv_diagnostics::{codes, InteropDiagnostic, IntoDiagnostic};
use jv_isolation::IsolationMode;
use jv_mediation::ClasspathUsage;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// コマンドラインなどで明示された値。マージでは常に最優先される。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyOverrides {
    pub settings: PolicySettings,
    /// 呼び出し側が提示する承認トークン。ポリシー値ではないので衝突判定の対象外。
    pub approval: Option<String>,
}

/// 各設定の値がどこから来たか。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingOrigin {
    Default,
    Global,
    Project,
    Override,
}

impl SettingOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            SettingOrigin::Default => "default",
            SettingOrigin::Global => "global",
            SettingOrigin::Project => "project",
            SettingOrigin::Override => "override",
        }
    }
}

impl fmt::Display for SettingOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// マージ済みの実効ポリシー。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectivePolicy {
    pub mode: PolicyMode,
    pub ack_risk: bool,
    pub actor_roles: Vec<String>,
    pub required_roles: Vec<String>,
    pub sensitive_targets: Vec<String>,
    pub sensitive_required_roles: Vec<String>,
    pub approval_required: bool,
    /// 承認対象を機密対象 (`sensitive_targets`) の中で絞り込む。空なら機密対象すべて。
    /// 機密対象に含まれないパターンは承認を要求しない。
    pub approval_targets: Vec<String>,
    pub approval_token: Option<String>,
    pub provided_approval: Option<String>,
    pub classloader_isolation: Option<IsolationMode>,
    pub classpath_scope: Option<ClasspathUsage>,
    pub denylist: Vec<String>,
    pub allowlist: Vec<String>,
    #[serde(skip)]
    origins: IndexMap<PolicyKey, SettingOrigin>,
}

impl EffectivePolicy {
    pub fn origin(&self, key: PolicyKey) -> SettingOrigin {
        self.origins.get(&key).copied().unwrap_or(SettingOrigin::Default)
    }
}

/// プロジェクトとグローバルで同じ設定が食い違った。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error(
    "conflicting interop policy setting `{key}`: project `{project_value}` ({}) vs global `{global_value}` ({})",
    .project_path.display(),
    .global_path.display()
)]
pub struct PolicyConflict {
    pub key: PolicyKey,
    pub project_value: String,
    pub project_path: PathBuf,
    pub global_value: String,
    pub global_path: PathBuf,
}

impl IntoDiagnostic for PolicyConflict {
    fn to_diagnostic(&self) -> InteropDiagnostic {
        InteropDiagnostic::error(codes::POLICY_CONFLICT, self.to_string())
            .with_context("setting", self.key)
            .with_context("projectValue", &self.project_value)
            .with_context("projectPolicyPath", self.project_path.display())
            .with_context("globalValue", &self.global_value)
            .with_context("globalPolicyPath", self.global_path.display())
            .with_context("flag", self.key.flag())
            .with_remedy(format!(
                "Align the policy files or pass `{}` to select one value explicitly.",
                self.key.flag()
            ))
    }
}

/// プロジェクト・グローバル・明示値を合成する全域関数。
///
/// 設定ごとに、明示値があればそれを採用する。なければ一致する値 (または片方だけの値)
/// を通し、食い違えば [`PolicyConflict`] を返す。後勝ちの暗黙上書きはしない。
pub fn merge_policies(
    project: Option<&PolicySource>,
    global: Option<&PolicySource>,
    overrides: &PolicyOverrides,
) -> Result<EffectivePolicy, PolicyConflict> {
    let mut merger = Merger {
        project,
        global,
        overrides: &overrides.settings,
        origins: IndexMap::new(),
    };

    let mut policy = EffectivePolicy {
        mode: merger
            .resolve(PolicyKey::Mode, |s| s.mode.as_ref())?
            .unwrap_or_default(),
        ack_risk: merger
            .resolve(PolicyKey::AckRisk, |s| s.ack_risk.as_ref())?
            .unwrap_or(false),
        actor_roles: merger
            .resolve(PolicyKey::ActorRoles, |s| s.actor_roles.as_ref())?
            .unwrap_or_default(),
        required_roles: merger
            .resolve(PolicyKey::RequiredRoles, |s| s.required_roles.as_ref())?
            .unwrap_or_default(),
        sensitive_targets: merger
            .resolve(PolicyKey::SensitiveTargets, |s| s.sensitive_targets.as_ref())?
            .unwrap_or_default(),
        sensitive_required_roles: merger
            .resolve(PolicyKey::SensitiveRequiredRoles, |s| {
                s.sensitive_required_roles.as_ref()
            })?
            .unwrap_or_default(),
        approval_required: merger
            .resolve(PolicyKey::ApprovalRequired, |s| s.approval_required.as_ref())?
            .unwrap_or(false),
        approval_targets: merger
            .resolve(PolicyKey::ApprovalTargets, |s| s.approval_targets.as_ref())?
            .unwrap_or_default(),
        approval_token: merger.resolve(PolicyKey::ApprovalToken, |s| s.approval_token.as_ref())?,
        provided_approval: overrides
            .approval
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string),
        classloader_isolation: merger.resolve(PolicyKey::ClassloaderIsolation, |s| {
            s.classloader_isolation.as_ref()
        })?,
        classpath_scope: merger.resolve(PolicyKey::ClasspathScope, |s| s.classpath_scope.as_ref())?,
        denylist: merger
            .resolve(PolicyKey::Denylist, |s| s.denylist.as_ref())?
            .unwrap_or_default(),
        allowlist: merger
            .resolve(PolicyKey::Allowlist, |s| s.allowlist.as_ref())?
            .unwrap_or_default(),
        origins: IndexMap::new(),
    };
    policy.origins = merger.origins;
    tracing::debug!(
        mode = %policy.mode,
        mode_origin = %policy.origin(PolicyKey::Mode),
        "interop policy merged"
    );
    Ok(policy)
}

struct Merger<'a> {
    project: Option<&'a PolicySource>,
    global: Option<&'a PolicySource>,
    overrides: &'a PolicySettings,
    origins: IndexMap<PolicyKey, SettingOrigin>,
}

impl<'a> Merger<'a> {
    fn resolve<T: PolicyValue>(
        &mut self,
        key: PolicyKey,
        read: impl Fn(&PolicySettings) -> Option<&T>,
    ) -> Result<Option<T>, PolicyConflict> {
        if let Some(value) = read(self.overrides) {
            self.origins.insert(key, SettingOrigin::Override);
            return Ok(Some(value.clone()));
        }
        let project = self
            .project
            .and_then(|source| read(&source.settings).map(|value| (source, value)));
        let global = self
            .global
            .and_then(|source| read(&source.settings).map(|value| (source, value)));

        let (value, origin) = match (project, global) {
            (Some((project, project_value)), Some((global, global_value))) => {
                if !project_value.agrees(global_value) {
                    return Err(PolicyConflict {
                        key,
                        project_value: project_value.render(),
                        project_path: project.path.clone(),
                        global_value: global_value.render(),
                        global_path: global.path.clone(),
                    });
                }
                (project_value, SettingOrigin::Project)
            }
            (Some((_, value)), None) => (value, SettingOrigin::Project),
            (None, Some((_, value))) => (value, SettingOrigin::Global),
            (None, None) => return Ok(None),
        };
        self.origins.insert(key, origin);
        Ok(Some(value.clone()))
    }
}

trait PolicyValue: Clone + PartialEq {
    fn render(&self) -> String;

    fn agrees(&self, other: &Self) -> bool {
        self == other
    }
}

impl PolicyValue for bool {
    fn render(&self) -> String {
        self.to_string()
    }
}

impl PolicyValue for String {
    fn render(&self) -> String {
        self.clone()
    }
}

impl PolicyValue for PolicyMode {
    fn render(&self) -> String {
        self.to_string()
    }
}

impl PolicyValue for IsolationMode {
    fn render(&self) -> String {
        self.to_string()
    }
}

impl PolicyValue for ClasspathUsage {
    fn render(&self) -> String {
        self.to_string()
    }
}

// リストは集合として比較する。順序違いは衝突ではない。
impl PolicyValue for Vec<String> {
    fn render(&self) -> String {
        self.join(",")
    }

    fn agrees(&self, other: &Self) -> bool {
        self.iter().collect::<BTreeSet<_>>() == other.iter().collect::<BTreeSet<_>>()
    }
}
