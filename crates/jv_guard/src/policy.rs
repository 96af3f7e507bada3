use jv_classpath::parse_properties;
use jv_diagnostics::{codes, descriptor, InteropDiagnostic, IntoDiagnostic};
use jv_isolation::IsolationMode;
use jv_mediation::ClasspathUsage;
use serde::{Deserialize, Serialize};
use std::env;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// プロジェクト/ホーム配下のポリシーディレクトリ。
pub const POLICY_DIR: &str = ".jv";
/// 探索するファイル名。先に見つかったものを使う。
pub const POLICY_FILE_NAMES: &[&str] = &["interop-policy.properties", "interop-policy.toml"];
/// グローバルポリシーの場所を上書きする環境変数。
pub const GLOBAL_POLICY_ENV: &str = "JV_INTEROP_GLOBAL_POLICY";

const KEY_PREFIX: &str = "interop.";

/// インターロップ呼び出しの基本方針。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    /// 許可リストに宣言された対象だけを呼べる。
    #[default]
    Strict,
    /// 任意の対象を呼べるが、リスク承認が必要。
    Broad,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown interop policy `{0}` (expected `strict` or `broad`)")]
pub struct UnknownPolicyMode(pub String);

impl PolicyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyMode::Strict => "strict",
            PolicyMode::Broad => "broad",
        }
    }
}

impl fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyMode {
    type Err = UnknownPolicyMode;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "strict" => Ok(PolicyMode::Strict),
            "broad" => Ok(PolicyMode::Broad),
            other => Err(UnknownPolicyMode(other.to_string())),
        }
    }
}

/// ポリシーファイルで認識するキー。マージ衝突の報告にも使う。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PolicyKey {
    Mode,
    AckRisk,
    ActorRoles,
    RequiredRoles,
    SensitiveTargets,
    SensitiveRequiredRoles,
    ApprovalRequired,
    ApprovalTargets,
    ApprovalToken,
    ClassloaderIsolation,
    ClasspathScope,
    Denylist,
    Allowlist,
}

impl PolicyKey {
    pub const ALL: [PolicyKey; 13] = [
        PolicyKey::Mode,
        PolicyKey::AckRisk,
        PolicyKey::ActorRoles,
        PolicyKey::RequiredRoles,
        PolicyKey::SensitiveTargets,
        PolicyKey::SensitiveRequiredRoles,
        PolicyKey::ApprovalRequired,
        PolicyKey::ApprovalTargets,
        PolicyKey::ApprovalToken,
        PolicyKey::ClassloaderIsolation,
        PolicyKey::ClasspathScope,
        PolicyKey::Denylist,
        PolicyKey::Allowlist,
    ];

    /// `interop.` を除いたキー名。
    pub fn name(self) -> &'static str {
        match self {
            PolicyKey::Mode => "policy",
            PolicyKey::AckRisk => "ackRisk",
            PolicyKey::ActorRoles => "rbac.roles",
            PolicyKey::RequiredRoles => "rbac.requiredRoles",
            PolicyKey::SensitiveTargets => "rbac.sensitiveTargets",
            PolicyKey::SensitiveRequiredRoles => "rbac.sensitiveRequiredRoles",
            PolicyKey::ApprovalRequired => "approval.required",
            PolicyKey::ApprovalTargets => "approval.targets",
            PolicyKey::ApprovalToken => "approval.token",
            PolicyKey::ClassloaderIsolation => "classloaderIsolation",
            PolicyKey::ClasspathScope => "classpathScope",
            PolicyKey::Denylist => "denylist",
            PolicyKey::Allowlist => "allowlist",
        }
    }

    pub fn key(self) -> String {
        format!("{KEY_PREFIX}{}", self.name())
    }

    /// 値を明示的に選ぶコマンドラインフラグ。
    pub fn flag(self) -> &'static str {
        match self {
            PolicyKey::Mode => "--interop-policy",
            PolicyKey::AckRisk => "--ack-interop-risk",
            PolicyKey::ActorRoles => "--interop-role",
            PolicyKey::RequiredRoles => "--interop-required-role",
            PolicyKey::SensitiveTargets => "--interop-sensitive-target",
            PolicyKey::SensitiveRequiredRoles => "--interop-sensitive-role",
            PolicyKey::ApprovalRequired => "--interop-approval-required",
            PolicyKey::ApprovalTargets => "--interop-approval-target",
            PolicyKey::ApprovalToken => "--interop-approval-token",
            PolicyKey::ClassloaderIsolation => "--classloader-isolation",
            PolicyKey::ClasspathScope => "--classpath-usage",
            PolicyKey::Denylist => "--interop-denylist",
            PolicyKey::Allowlist => "--interop-allow",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.name() == name)
    }
}

impl fmt::Display for PolicyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{KEY_PREFIX}{}", self.name())
    }
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to read interop policy {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse interop policy {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value `{value}` for `{key}` in {path} (expected {expected})")]
    InvalidValue {
        path: PathBuf,
        key: PolicyKey,
        value: String,
        expected: &'static str,
    },
}

impl IntoDiagnostic for PolicyError {
    fn to_diagnostic(&self) -> InteropDiagnostic {
        let mut diagnostic = InteropDiagnostic::error(codes::INVALID_POLICY, self.to_string());
        match self {
            PolicyError::Io { path, .. } | PolicyError::Toml { path, .. } => {
                diagnostic = diagnostic.with_context("policyPath", path.display());
            }
            PolicyError::InvalidValue {
                path,
                key,
                value,
                expected,
            } => {
                diagnostic = diagnostic
                    .with_context("policyPath", path.display())
                    .with_context("setting", key)
                    .with_context("value", value)
                    .with_context("expected", expected);
            }
        }
        match descriptor(codes::INVALID_POLICY) {
            Some(desc) => diagnostic.with_remedy(desc.help),
            None => diagnostic,
        }
    }
}

/// 1 つのソースが明示した設定。未指定は `None` のまま残し、マージで区別する。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySettings {
    pub mode: Option<PolicyMode>,
    pub ack_risk: Option<bool>,
    pub actor_roles: Option<Vec<String>>,
    pub required_roles: Option<Vec<String>>,
    pub sensitive_targets: Option<Vec<String>>,
    pub sensitive_required_roles: Option<Vec<String>>,
    pub approval_required: Option<bool>,
    /// `interop.approval.targets`。`rbac.sensitiveTargets` と重なる部分だけが有効。
    pub approval_targets: Option<Vec<String>>,
    pub approval_token: Option<String>,
    pub classloader_isolation: Option<IsolationMode>,
    pub classpath_scope: Option<ClasspathUsage>,
    pub denylist: Option<Vec<String>>,
    pub allowlist: Option<Vec<String>>,
}

impl PolicySettings {
    /// `interop.*` のキーと値の組から設定を作る。未知のキーは無視する。
    pub fn from_pairs(
        path: &Path,
        pairs: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, PolicyError> {
        let mut settings = PolicySettings::default();
        for (raw_key, value) in pairs {
            let Some(name) = raw_key.strip_prefix(KEY_PREFIX) else {
                continue;
            };
            let Some(key) = PolicyKey::from_name(name) else {
                tracing::debug!(path = %path.display(), key = %raw_key, "ignoring unknown interop policy key");
                continue;
            };
            let invalid = |expected: &'static str| PolicyError::InvalidValue {
                path: path.to_path_buf(),
                key,
                value: value.clone(),
                expected,
            };
            match key {
                PolicyKey::Mode => {
                    settings.mode = Some(value.parse().map_err(|_| invalid("`strict` or `broad`"))?)
                }
                PolicyKey::AckRisk => {
                    settings.ack_risk = Some(parse_flag(&value).ok_or_else(|| invalid("`true` or `false`"))?)
                }
                PolicyKey::ApprovalRequired => {
                    settings.approval_required =
                        Some(parse_flag(&value).ok_or_else(|| invalid("`true` or `false`"))?)
                }
                PolicyKey::ClassloaderIsolation => {
                    settings.classloader_isolation = Some(
                        value
                            .parse()
                            .map_err(|_| invalid("`shared` or `app-isolated`"))?,
                    )
                }
                PolicyKey::ClasspathScope => {
                    settings.classpath_scope = Some(
                        parse_scope(&value).ok_or_else(|| invalid("`compile`, `runtime` or `provided`"))?,
                    )
                }
                PolicyKey::ApprovalToken => {
                    let token = value.trim();
                    settings.approval_token = (!token.is_empty()).then(|| token.to_string());
                }
                PolicyKey::ActorRoles => settings.actor_roles = Some(parse_list(&value)),
                PolicyKey::RequiredRoles => settings.required_roles = Some(parse_list(&value)),
                PolicyKey::SensitiveTargets => settings.sensitive_targets = Some(parse_list(&value)),
                PolicyKey::SensitiveRequiredRoles => {
                    settings.sensitive_required_roles = Some(parse_list(&value))
                }
                PolicyKey::ApprovalTargets => settings.approval_targets = Some(parse_list(&value)),
                PolicyKey::Denylist => settings.denylist = Some(parse_list(&value)),
                PolicyKey::Allowlist => settings.allowlist = Some(parse_list(&value)),
            }
        }
        Ok(settings)
    }

    pub fn is_empty(&self) -> bool {
        self == &PolicySettings::default()
    }
}

/// 読み込まれたポリシーファイル。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySource {
    pub path: PathBuf,
    pub settings: PolicySettings,
}

impl PolicySource {
    pub fn new(path: impl Into<PathBuf>, settings: PolicySettings) -> Self {
        Self {
            path: path.into(),
            settings,
        }
    }

    /// 拡張子が `.toml` なら TOML、それ以外は properties 形式として読む。
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let text = fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let pairs = if path.extension().is_some_and(|ext| ext == "toml") {
            let table = toml::from_str::<toml::Table>(&text).map_err(|source| PolicyError::Toml {
                path: path.to_path_buf(),
                source,
            })?;
            let mut pairs = Vec::new();
            for (key, value) in &table {
                flatten_toml(key, value, &mut pairs);
            }
            pairs
        } else {
            parse_properties(&text)
        };
        let settings = PolicySettings::from_pairs(path, pairs)?;
        tracing::debug!(path = %path.display(), "loaded interop policy");
        Ok(Self::new(path, settings))
    }

    /// `start` (ファイルならその親) から祖先へ `.jv/interop-policy.*` を探す。
    pub fn discover_project(start: &Path) -> Result<Option<Self>, PolicyError> {
        let start = if start.is_file() {
            start.parent().unwrap_or(start)
        } else {
            start
        };
        for dir in start.ancestors() {
            if let Some(candidate) = policy_file_in(dir) {
                return Self::load(&candidate).map(Some);
            }
        }
        Ok(None)
    }

    /// `JV_INTEROP_GLOBAL_POLICY`、なければ `~/.jv/interop-policy.*`。
    pub fn discover_global() -> Result<Option<Self>, PolicyError> {
        Self::discover_global_from(env::var_os(GLOBAL_POLICY_ENV), dirs::home_dir())
    }

    /// 環境変数の値とホームディレクトリを明示して探す。
    pub fn discover_global_from(
        explicit: Option<OsString>,
        home: Option<PathBuf>,
    ) -> Result<Option<Self>, PolicyError> {
        let Some(path) = global_policy_path(explicit, home) else {
            return Ok(None);
        };
        if !path.is_file() {
            tracing::debug!(path = %path.display(), "global interop policy not present");
            return Ok(None);
        }
        Self::load(&path).map(Some)
    }
}

/// グローバルポリシーのパスを決める。環境変数が空でなければそれを優先する。
pub fn global_policy_path(explicit: Option<OsString>, home: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(explicit) = explicit.filter(|value| !value.is_empty()) {
        return Some(PathBuf::from(explicit));
    }
    let home = home?;
    Some(policy_file_in(&home).unwrap_or_else(|| home.join(POLICY_DIR).join(POLICY_FILE_NAMES[0])))
}

fn policy_file_in(dir: &Path) -> Option<PathBuf> {
    POLICY_FILE_NAMES
        .iter()
        .map(|name| dir.join(POLICY_DIR).join(name))
        .find(|candidate| candidate.is_file())
}

/// カンマ区切り。空要素を除き、最初の出現順で重複を落とす。
pub fn parse_list(raw: &str) -> Vec<String> {
    let mut values: Vec<String> = Vec::new();
    for segment in raw.split(',') {
        let trimmed = segment.trim();
        if !trimmed.is_empty() && !values.iter().any(|existing| existing == trimmed) {
            values.push(trimmed.to_string());
        }
    }
    values
}

fn parse_flag(raw: &str) -> Option<bool> {
    let normalized = raw.trim();
    if normalized.eq_ignore_ascii_case("true") {
        Some(true)
    } else if normalized.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

// `provided` はコンパイル時ビューと同じ可視性になる。
fn parse_scope(raw: &str) -> Option<ClasspathUsage> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "compile" | "provided" => Some(ClasspathUsage::Compile),
        "runtime" => Some(ClasspathUsage::Runtime),
        _ => None,
    }
}

fn flatten_toml(prefix: &str, value: &toml::Value, out: &mut Vec<(String, String)>) {
    match value {
        toml::Value::Table(table) => {
            for (key, nested) in table {
                flatten_toml(&format!("{prefix}.{key}"), nested, out);
            }
        }
        toml::Value::Array(items) => {
            let joined = items.iter().map(toml_scalar).collect::<Vec<_>>().join(",");
            out.push((prefix.to_string(), joined));
        }
        other => out.push((prefix.to_string(), toml_scalar(other))),
    }
}

fn toml_scalar(value: &toml::Value) -> String {
    match value {
        toml::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use test_case::test_case;

    #[test_case(" strict ", Ok(PolicyMode::Strict) ; "strict")]
    #[test_case("broad", Ok(PolicyMode::Broad) ; "broad")]
    #[test_case("open", Err(UnknownPolicyMode("open".into())) ; "unknown")]
    fn parse_mode(raw: &str, expected: Result<PolicyMode, UnknownPolicyMode>) {
        assert_eq!(raw.parse::<PolicyMode>(), expected);
    }

    #[test]
    fn lists_are_trimmed_and_deduplicated() {
        assert_eq!(parse_list(" admin, ops ,,admin,"), vec!["admin", "ops"]);
        assert!(parse_list(" , ").is_empty());
    }

    #[test]
    fn properties_policy_loads_every_key() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("interop-policy.properties");
        fs::write(
            &path,
            "# fleet policy\n\
             interop.policy=broad\n\
             interop.ackRisk=TRUE\n\
             interop.rbac.roles=dev\n\
             interop.rbac.requiredRoles=dev,ops\n\
             interop.rbac.sensitiveTargets=java.lang.Runtime\n\
             interop.rbac.sensitiveRequiredRoles=admin\n\
             interop.approval.required=true\n\
             interop.approval.targets=java.lang.Runtime#exec\n\
             interop.approval.token=ticket-42\n\
             interop.classloaderIsolation=app-isolated\n\
             interop.classpathScope=provided\n\
             interop.denylist=java.io.*\n\
             interop.allowlist=java.lang.Math\n\
             interop.unknown=ignored\n\
             other.key=ignored\n",
        )
        .expect("write policy");

        let source = PolicySource::load(&path).expect("load");
        let settings = source.settings;
        assert_eq!(settings.mode, Some(PolicyMode::Broad));
        assert_eq!(settings.ack_risk, Some(true));
        assert_eq!(settings.required_roles, Some(vec!["dev".into(), "ops".into()]));
        assert_eq!(settings.approval_token.as_deref(), Some("ticket-42"));
        assert_eq!(settings.classloader_isolation, Some(IsolationMode::AppIsolated));
        assert_eq!(settings.classpath_scope, Some(ClasspathUsage::Compile));
        assert_eq!(settings.denylist, Some(vec!["java.io.*".into()]));
        assert_eq!(settings.allowlist, Some(vec!["java.lang.Math".into()]));
    }

    #[test]
    fn toml_policy_flattens_tables_and_arrays() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("interop-policy.toml");
        fs::write(
            &path,
            "[interop]\npolicy = \"broad\"\nackRisk = true\n\n[interop.rbac]\nrequiredRoles = [\"dev\", \"ops\"]\n",
        )
        .expect("write policy");

        let settings = PolicySource::load(&path).expect("load").settings;
        assert_eq!(settings.mode, Some(PolicyMode::Broad));
        assert_eq!(settings.ack_risk, Some(true));
        assert_eq!(settings.required_roles, Some(vec!["dev".into(), "ops".into()]));
        assert_eq!(settings.actor_roles, None);
    }

    #[test]
    fn invalid_values_name_the_setting() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("interop-policy.properties");
        fs::write(&path, "interop.ackRisk=maybe\n").expect("write policy");

        let error = PolicySource::load(&path).expect_err("invalid flag");
        let diagnostic = error.to_diagnostic();
        assert_eq!(diagnostic.code, codes::INVALID_POLICY);
        assert_eq!(diagnostic.context_value("setting"), Some("interop.ackRisk"));
        assert_eq!(diagnostic.context_value("value"), Some("maybe"));
    }

    #[test]
    fn project_policy_is_found_in_an_ancestor() {
        let dir = tempfile::tempdir().expect("temp dir");
        let policy_dir = dir.path().join(POLICY_DIR);
        fs::create_dir_all(&policy_dir).expect("policy dir");
        fs::write(policy_dir.join(POLICY_FILE_NAMES[0]), "interop.policy=strict\n").expect("write");
        let nested = dir.path().join("src/app");
        fs::create_dir_all(&nested).expect("nested");
        let entry = nested.join("main.jv");
        fs::write(&entry, "").expect("entry");

        let source = PolicySource::discover_project(&entry)
            .expect("discover")
            .expect("policy found");
        assert_eq!(source.path, policy_dir.join(POLICY_FILE_NAMES[0]));
        assert_eq!(source.settings.mode, Some(PolicyMode::Strict));
    }

    #[test]
    fn global_path_prefers_the_environment() {
        let explicit = global_policy_path(Some("/etc/jv/policy.properties".into()), Some("/home/dev".into()));
        assert_eq!(explicit, Some(PathBuf::from("/etc/jv/policy.properties")));

        let blank = global_policy_path(Some(OsString::new()), Some("/home/dev".into()));
        assert_eq!(
            blank,
            Some(PathBuf::from("/home/dev/.jv/interop-policy.properties"))
        );
        assert_eq!(global_policy_path(None, None), None);
    }

    #[test]
    fn global_policy_is_found_under_home() {
        let home = tempfile::tempdir().expect("temp home");
        assert!(PolicySource::discover_global_from(None, Some(home.path().into()))
            .expect("discover")
            .is_none());

        let policy_dir = home.path().join(POLICY_DIR);
        fs::create_dir_all(&policy_dir).expect("policy dir");
        let toml = policy_dir.join(POLICY_FILE_NAMES[1]);
        fs::write(&toml, "[interop]\npolicy = \"broad\"\n").expect("write");
        let source = PolicySource::discover_global_from(None, Some(home.path().into()))
            .expect("discover")
            .expect("policy found");
        assert_eq!(source.path, toml);
        assert_eq!(source.settings.mode, Some(PolicyMode::Broad));

        let fleet = home.path().join("fleet.properties");
        fs::write(&fleet, "interop.policy=strict\n").expect("write");
        let source = PolicySource::discover_global_from(
            Some(fleet.clone().into_os_string()),
            Some(home.path().into()),
        )
        .expect("discover")
        .expect("explicit policy");
        assert_eq!(source.path, fleet);
        assert_eq!(source.settings.mode, Some(PolicyMode::Strict));
    }
}
