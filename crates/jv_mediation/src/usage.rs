use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// クラスパスを解決する文脈。スコープの可視性を決める。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClasspathUsage {
    #[default]
    Compile,
    Runtime,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown classpath usage `{0}` (expected `compile` or `runtime`)")]
pub struct UnknownUsage(pub String);

impl ClasspathUsage {
    pub fn as_str(self) -> &'static str {
        match self {
            ClasspathUsage::Compile => "compile",
            ClasspathUsage::Runtime => "runtime",
        }
    }

    /// compile は `{compile, runtime, provided}`、runtime は `{compile, runtime}` を許可する。
    /// `test` はどちらでも不可視。
    pub fn allows(self, scope: &DependencyScope) -> bool {
        match scope {
            DependencyScope::Compile | DependencyScope::Runtime => true,
            DependencyScope::Provided => self == ClasspathUsage::Compile,
            DependencyScope::Test => false,
            DependencyScope::Other(_) => true,
        }
    }
}

impl fmt::Display for ClasspathUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClasspathUsage {
    type Err = UnknownUsage;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compile" => Ok(ClasspathUsage::Compile),
            "runtime" => Ok(ClasspathUsage::Runtime),
            other => Err(UnknownUsage(other.to_string())),
        }
    }
}

/// `pom.xml` に宣言された依存スコープ。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyScope {
    Compile,
    Runtime,
    Provided,
    Test,
    /// `system` や `import` など。可視性の判定では compile と同じ扱い。
    Other(String),
}

impl DependencyScope {
    /// 空のスコープは compile とみなす。
    pub fn parse(raw: Option<&str>) -> Self {
        let normalized = raw.map(|value| value.trim().to_ascii_lowercase());
        match normalized.as_deref() {
            None | Some("") | Some("compile") => DependencyScope::Compile,
            Some("runtime") => DependencyScope::Runtime,
            Some("provided") => DependencyScope::Provided,
            Some("test") => DependencyScope::Test,
            Some(other) => DependencyScope::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DependencyScope::Compile => "compile",
            DependencyScope::Runtime => "runtime",
            DependencyScope::Provided => "provided",
            DependencyScope::Test => "test",
            DependencyScope::Other(other) => other.as_str(),
        }
    }
}

impl fmt::Display for DependencyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ClasspathUsage::Compile, None, true ; "absent scope is compile")]
    #[test_case(ClasspathUsage::Compile, Some("provided"), true ; "provided at compile")]
    #[test_case(ClasspathUsage::Runtime, Some("provided"), false ; "provided at runtime")]
    #[test_case(ClasspathUsage::Runtime, Some("RUNTIME"), true ; "runtime is case insensitive")]
    #[test_case(ClasspathUsage::Compile, Some("test"), false ; "test at compile")]
    #[test_case(ClasspathUsage::Runtime, Some("test"), false ; "test at runtime")]
    #[test_case(ClasspathUsage::Runtime, Some("system"), true ; "unknown scope passes")]
    fn scope_visibility(usage: ClasspathUsage, scope: Option<&str>, expected: bool) {
        assert_eq!(usage.allows(&DependencyScope::parse(scope)), expected);
    }

    #[test]
    fn usage_round_trips_through_strings() {
        for usage in [ClasspathUsage::Compile, ClasspathUsage::Runtime] {
            assert_eq!(usage.to_string().parse::<ClasspathUsage>(), Ok(usage));
        }
        assert!("deploy".parse::<ClasspathUsage>().is_err());
    }
}
