use std::fmt;

/// 呼び出し対象 (`owner#binding`) に対するパターン。
///
/// - `java.io.*` / `java.io*`: 前方一致
/// - `java.lang.Runtime#exec`: 完全一致
/// - `java.lang.Runtime`: クラス自身と `java.lang.Runtime#...` の全メンバー
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetPattern {
    Prefix(String),
    Exact(String),
    Owner(String),
}

impl TargetPattern {
    /// 空白だけのパターンは `None`。
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Some(prefix) = trimmed.strip_suffix('*') {
            return Some(TargetPattern::Prefix(prefix.to_string()));
        }
        if trimmed.contains('#') {
            return Some(TargetPattern::Exact(trimmed.to_string()));
        }
        Some(TargetPattern::Owner(trimmed.to_string()))
    }

    pub fn matches(&self, target: &str) -> bool {
        match self {
            TargetPattern::Prefix(prefix) => target.starts_with(prefix.as_str()),
            TargetPattern::Exact(exact) => target == exact,
            TargetPattern::Owner(owner) => {
                target == owner
                    || target
                        .strip_prefix(owner.as_str())
                        .is_some_and(|rest| rest.starts_with('#'))
            }
        }
    }
}

impl fmt::Display for TargetPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetPattern::Prefix(prefix) => write!(f, "{prefix}*"),
            TargetPattern::Exact(value) | TargetPattern::Owner(value) => f.write_str(value),
        }
    }
}

/// 宣言順を保ったパターン集合。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternSet {
    patterns: Vec<TargetPattern>,
}

impl PatternSet {
    pub fn parse<'s>(raw: impl IntoIterator<Item = &'s String>) -> Self {
        Self {
            patterns: raw
                .into_iter()
                .filter_map(|pattern| TargetPattern::parse(pattern))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches(&self, target: &str) -> bool {
        self.first_match(target).is_some()
    }

    pub fn first_match(&self, target: &str) -> Option<&TargetPattern> {
        self.patterns.iter().find(|pattern| pattern.matches(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("java.io.*", "java.io.File#$new", true ; "dotted prefix")]
    #[test_case("java.io*", "java.iox.Thing#run", true ; "bare prefix")]
    #[test_case("java.io.*", "java.iox.Thing#run", false ; "dotted prefix keeps the dot")]
    #[test_case("java.lang.Runtime#exec", "java.lang.Runtime#exec", true ; "exact")]
    #[test_case("java.lang.Runtime#exec", "java.lang.Runtime#execAll", false ; "exact only")]
    #[test_case("java.lang.Runtime", "java.lang.Runtime#$instance$exec", true ; "owner member")]
    #[test_case("java.lang.Runtime", "java.lang.Runtime", true ; "owner itself")]
    #[test_case("java.lang.Runtime", "java.lang.RuntimeException#$new", false ; "owner is not a prefix")]
    fn pattern_matching(pattern: &str, target: &str, expected: bool) {
        let pattern = TargetPattern::parse(pattern).expect("pattern");
        assert_eq!(pattern.matches(target), expected);
    }

    #[test]
    fn blank_patterns_are_dropped() {
        let raw = vec![" ".to_string(), "demo.*".to_string()];
        let set = PatternSet::parse(&raw);
        assert_eq!(set.first_match("demo.Util#run").map(ToString::to_string), Some("demo.*".into()));
        assert!(!set.matches("other.Util#run"));
    }
}
