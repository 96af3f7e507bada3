use crate::audit::{AuditError, AuditLog};
use crate::merge::EffectivePolicy;
use crate::pattern::PatternSet;
use crate::policy::PolicyMode;
use chrono::{DateTime, Utc};
use jv_diagnostics::{codes, descriptor, InteropDiagnostic, IntoDiagnostic};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// 呼び出し主体。ロールと提示された承認トークン。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Actor {
    pub roles: Vec<String>,
    pub approval: Option<String>,
}

impl Actor {
    pub fn new(roles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
            approval: None,
        }
    }

    pub fn with_approval(mut self, token: impl Into<String>) -> Self {
        self.approval = Some(token.into());
        self
    }

    /// 実効ポリシーの `rbac.roles` と提示トークンから作る。
    pub fn from_policy(policy: &EffectivePolicy) -> Self {
        Self {
            roles: policy.actor_roles.clone(),
            approval: policy.provided_approval.clone(),
        }
    }

    fn has_any(&self, required: &[String]) -> bool {
        required.iter().any(|role| {
            self.roles
                .iter()
                .any(|actor_role| actor_role.eq_ignore_ascii_case(role))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Deny => "deny",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleScope {
    General,
    Sensitive,
}

impl RoleScope {
    pub fn as_str(self) -> &'static str {
        match self {
            RoleScope::General => "general",
            RoleScope::Sensitive => "sensitive",
        }
    }
}

impl fmt::Display for RoleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleContext {
    pub scope: RoleScope,
    pub actor_roles: Vec<String>,
    pub required_roles: Vec<String>,
}

/// 1 つの呼び出し対象に対する許可/拒否の記録。作成後は変更しない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDecision {
    pub target: String,
    pub decision: Decision,
    pub reason_code: Option<String>,
    pub message: String,
    pub role_context: RoleContext,
    pub timestamp: DateTime<Utc>,
}

impl PolicyDecision {
    fn allow(target: &str, role_context: RoleContext) -> Self {
        Self {
            target: target.to_string(),
            decision: Decision::Allow,
            reason_code: None,
            message: String::new(),
            role_context,
            timestamp: Utc::now(),
        }
    }

    fn deny(target: &str, role_context: RoleContext, denial: &GateDenial) -> Self {
        Self {
            target: target.to_string(),
            decision: Decision::Deny,
            reason_code: Some(denial.code().to_string()),
            message: denial.to_string(),
            role_context,
            timestamp: Utc::now(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.decision == Decision::Allow
    }
}

/// ゲートが呼び出しを拒否した理由。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GateDenial {
    #[error("interop target `{target}` is blocked by denylist pattern `{pattern}`")]
    Denylisted { target: String, pattern: String },
    #[error("strict interop policy: `{target}` is not declared in the interop allowlist")]
    Undeclared { target: String },
    #[error("broad interop policy requires risk acknowledgement before calling `{target}`")]
    RiskNotAcknowledged { target: String },
    #[error(
        "interop authorization failed for `{target}`: missing role for `{scope}` scope (required: {})",
        .required_roles.join(",")
    )]
    RoleMissing {
        target: String,
        scope: RoleScope,
        required_roles: Vec<String>,
        actor_roles: Vec<String>,
    },
    #[error("sensitive interop target `{target}` requires approval")]
    ApprovalRequired {
        target: String,
        expected: Option<String>,
        provided: Option<String>,
    },
}

impl GateDenial {
    pub fn code(&self) -> &'static str {
        match self {
            GateDenial::Denylisted { .. } => codes::DENYLISTED,
            GateDenial::Undeclared { .. } => codes::STRICT_UNDECLARED,
            GateDenial::RiskNotAcknowledged { .. } => codes::RISK_NOT_ACKNOWLEDGED,
            GateDenial::RoleMissing { .. } => codes::RBAC_DENIED,
            GateDenial::ApprovalRequired { .. } => codes::APPROVAL_REQUIRED,
        }
    }

    pub fn target(&self) -> &str {
        match self {
            GateDenial::Denylisted { target, .. }
            | GateDenial::Undeclared { target }
            | GateDenial::RiskNotAcknowledged { target }
            | GateDenial::RoleMissing { target, .. }
            | GateDenial::ApprovalRequired { target, .. } => target,
        }
    }
}

impl IntoDiagnostic for GateDenial {
    fn to_diagnostic(&self) -> InteropDiagnostic {
        let mut diagnostic = InteropDiagnostic::error(self.code(), self.to_string());
        match self {
            GateDenial::Denylisted { target, pattern } => {
                diagnostic = diagnostic
                    .with_context("target", target)
                    .with_context("pattern", pattern);
            }
            GateDenial::Undeclared { target } => {
                diagnostic = diagnostic
                    .with_context("target", target)
                    .with_context("interopPolicy", PolicyMode::Strict);
            }
            GateDenial::RiskNotAcknowledged { target } => {
                diagnostic = diagnostic
                    .with_context("target", target)
                    .with_context("interopPolicy", PolicyMode::Broad);
            }
            GateDenial::RoleMissing {
                target,
                scope,
                required_roles,
                actor_roles,
            } => {
                diagnostic = diagnostic
                    .with_context("scope", scope)
                    .with_context("requiredRoles", required_roles.join(","))
                    .with_context("actorRoles", actor_roles.join(","))
                    .with_context("target", target);
            }
            GateDenial::ApprovalRequired {
                target,
                expected,
                provided,
            } => {
                diagnostic = diagnostic
                    .with_context("target", target)
                    .with_context("expectedApproval", expected.as_deref().unwrap_or_default())
                    .with_context("providedApproval", provided.as_deref().unwrap_or_default());
            }
        }
        match descriptor(self.code()) {
            Some(desc) => diagnostic.with_remedy(desc.help),
            None => diagnostic,
        }
    }
}

#[derive(Debug, Error)]
pub enum GuardError {
    #[error(transparent)]
    Denied(#[from] GateDenial),
    #[error(transparent)]
    Audit(#[from] AuditError),
}

impl IntoDiagnostic for GuardError {
    fn to_diagnostic(&self) -> InteropDiagnostic {
        match self {
            GuardError::Denied(denial) => denial.to_diagnostic(),
            GuardError::Audit(error) => error.to_diagnostic(),
        }
    }
}

/// 呼び出し対象ごとの認可ゲート。
///
/// 判定順: denylist → モード (strict の許可リスト / broad のリスク承認) →
/// RBAC (一般ロール、次に機密ロール) → 承認。最初に失敗した段で拒否する。
/// 判定は許可・拒否とも監査ログに追記される。
pub struct InteropGate {
    policy: EffectivePolicy,
    denylist: PatternSet,
    allowlist: PatternSet,
    sensitive: PatternSet,
    approval_targets: PatternSet,
    audit: Option<Arc<AuditLog>>,
    decisions: Mutex<Vec<PolicyDecision>>,
}

impl InteropGate {
    pub fn new(policy: EffectivePolicy) -> Self {
        Self {
            denylist: PatternSet::parse(&policy.denylist),
            allowlist: PatternSet::parse(&policy.allowlist),
            sensitive: PatternSet::parse(&policy.sensitive_targets),
            approval_targets: PatternSet::parse(&policy.approval_targets),
            policy,
            audit: None,
            decisions: Mutex::new(Vec::new()),
        }
    }

    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn policy(&self) -> &EffectivePolicy {
        &self.policy
    }

    pub fn audit(&self) -> Option<&AuditLog> {
        self.audit.as_deref()
    }

    /// これまでの判定 (追記順)。
    pub fn decisions(&self) -> Vec<PolicyDecision> {
        self.decisions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn authorize(&self, target: &str, actor: &Actor) -> Result<PolicyDecision, GuardError> {
        let (role_context, outcome) = self.evaluate(target, actor);
        let decision = match &outcome {
            Ok(()) => {
                tracing::debug!(call_target = target, "interop call allowed");
                PolicyDecision::allow(target, role_context)
            }
            Err(denial) => {
                tracing::warn!(
                    call_target = target,
                    code = denial.code(),
                    error = %denial,
                    "interop call denied"
                );
                PolicyDecision::deny(target, role_context, denial)
            }
        };

        if let Some(audit) = &self.audit {
            audit.record(&decision)?;
        }
        self.decisions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(decision.clone());
        outcome.map(|()| decision).map_err(GuardError::from)
    }

    fn evaluate(&self, target: &str, actor: &Actor) -> (RoleContext, Result<(), GateDenial>) {
        let sensitive = self.sensitive.matches(target);
        let mut required_roles = self.policy.required_roles.clone();
        if sensitive {
            for role in &self.policy.sensitive_required_roles {
                if !required_roles.contains(role) {
                    required_roles.push(role.clone());
                }
            }
        }
        let role_context = RoleContext {
            scope: if sensitive {
                RoleScope::Sensitive
            } else {
                RoleScope::General
            },
            actor_roles: actor.roles.clone(),
            required_roles,
        };
        let outcome = self.check(target, actor, sensitive);
        (role_context, outcome)
    }

    fn check(&self, target: &str, actor: &Actor, sensitive: bool) -> Result<(), GateDenial> {
        if let Some(pattern) = self.denylist.first_match(target) {
            return Err(GateDenial::Denylisted {
                target: target.to_string(),
                pattern: pattern.to_string(),
            });
        }

        match self.policy.mode {
            PolicyMode::Strict if !self.allowlist.matches(target) => {
                return Err(GateDenial::Undeclared {
                    target: target.to_string(),
                });
            }
            PolicyMode::Broad if !self.policy.ack_risk => {
                return Err(GateDenial::RiskNotAcknowledged {
                    target: target.to_string(),
                });
            }
            _ => {}
        }

        let general = &self.policy.required_roles;
        if !general.is_empty() && !actor.has_any(general) {
            return Err(self.role_missing(target, RoleScope::General, general, actor));
        }
        let stricter = &self.policy.sensitive_required_roles;
        if sensitive && !stricter.is_empty() && !actor.has_any(stricter) {
            return Err(self.role_missing(target, RoleScope::Sensitive, stricter, actor));
        }

        if self.needs_approval(target, sensitive) && !self.approval_matches(actor) {
            return Err(GateDenial::ApprovalRequired {
                target: target.to_string(),
                expected: self.policy.approval_token.clone(),
                provided: actor.approval.clone(),
            });
        }
        Ok(())
    }

    fn role_missing(&self, target: &str, scope: RoleScope, required: &[String], actor: &Actor) -> GateDenial {
        GateDenial::RoleMissing {
            target: target.to_string(),
            scope,
            required_roles: required.to_vec(),
            actor_roles: actor.roles.clone(),
        }
    }

    // 承認は機密対象だけ。`approval.targets` は機密対象をさらに絞るだけで、
    // `rbac.sensitiveTargets` 外のエントリは承認を要求しない。
    fn needs_approval(&self, target: &str, sensitive: bool) -> bool {
        self.policy.approval_required
            && sensitive
            && (self.approval_targets.is_empty() || self.approval_targets.matches(target))
    }

    // 期待トークン未設定なら空でない提示があれば通す。
    fn approval_matches(&self, actor: &Actor) -> bool {
        let Some(provided) = actor.approval.as_deref().filter(|token| !token.trim().is_empty()) else {
            return false;
        };
        match self.policy.approval_token.as_deref() {
            Some(expected) if !expected.trim().is_empty() => expected == provided,
            _ => true,
        }
    }
}
