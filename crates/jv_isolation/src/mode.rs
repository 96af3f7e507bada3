use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Loading topology for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationMode {
    /// Program and libraries share one namespace; the mediated library wins.
    #[default]
    Shared,
    /// Program classes load in their own namespace; collisions are fatal.
    AppIsolated,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid classloader isolation `{0}` (expected `shared` or `app-isolated`)")]
pub struct UnknownIsolationMode(pub String);

impl IsolationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            IsolationMode::Shared => "shared",
            IsolationMode::AppIsolated => "app-isolated",
        }
    }
}

impl fmt::Display for IsolationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IsolationMode {
    type Err = UnknownIsolationMode;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "shared" => Ok(IsolationMode::Shared),
            "app-isolated" => Ok(IsolationMode::AppIsolated),
            other => Err(UnknownIsolationMode(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("shared", Ok(IsolationMode::Shared) ; "shared")]
    #[test_case(" app-isolated ", Ok(IsolationMode::AppIsolated) ; "trimmed")]
    #[test_case("isolated", Err(UnknownIsolationMode("isolated".into())) ; "unknown")]
    fn parse_mode(raw: &str, expected: Result<IsolationMode, UnknownIsolationMode>) {
        assert_eq!(raw.parse::<IsolationMode>(), expected);
    }

    #[test]
    fn display_round_trips() {
        for mode in [IsolationMode::Shared, IsolationMode::AppIsolated] {
            assert_eq!(mode.to_string().parse::<IsolationMode>(), Ok(mode));
        }
    }
}
