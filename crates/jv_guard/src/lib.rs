//! インターロップ呼び出しのガードレールと監査。
//!
//! プロジェクトとグローバルのポリシーファイルを [`merge_policies`] で合成し
//! (食い違いは暗黙に上書きせず衝突として報告する)、[`InteropGate`] が呼び出し対象ごとに
//! denylist・モード・RBAC・承認を順に検査する。判定はすべて [`AuditLog`] に追記される。

mod audit;
mod gate;
mod merge;
mod pattern;
mod policy;


pub use audit::{AuditError, AuditLog, AGGREGATE_SCHEMA};
pub use gate::{
    Actor, Decision, GateDenial, GuardError, InteropGate, PolicyDecision, RoleContext, RoleScope,
};
pub use merge::{merge_policies, EffectivePolicy, PolicyConflict, PolicyOverrides, SettingOrigin};
pub use pattern::{PatternSet, TargetPattern};
pub use policy::{
    global_policy_path, parse_list, PolicyError, PolicyKey, PolicyMode, PolicySettings,
    PolicySource, UnknownPolicyMode, GLOBAL_POLICY_ENV, POLICY_DIR, POLICY_FILE_NAMES,
};
