use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

/// Prefix of runtime-image module references (`jrt:/java.base`).
pub const RUNTIME_MODULE_PREFIX: &str = "jrt:/";

/// Which namespace an entry feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryOwner {
    Program,
    Library,
}

impl EntryOwner {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryOwner::Program => "program",
            EntryOwner::Library => "library",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Directory,
    Archive,
    RuntimeModule,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Directory => "directory",
            SourceKind::Archive => "archive",
            SourceKind::RuntimeModule => "runtime-module",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryKind {
    Directory,
    Archive,
    RuntimeModule { module: String },
}

impl EntryKind {
    pub fn source_kind(&self) -> SourceKind {
        match self {
            EntryKind::Directory => SourceKind::Directory,
            EntryKind::Archive => SourceKind::Archive,
            EntryKind::RuntimeModule { .. } => SourceKind::RuntimeModule,
        }
    }
}

/// One resolvable unit of the classpath. `ordinal` is the caller-declared
/// position and never changes after discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClasspathEntry {
    pub ordinal: usize,
    pub kind: EntryKind,
    pub path: PathBuf,
    pub owner: EntryOwner,
}

impl ClasspathEntry {
    pub fn directory(ordinal: usize, path: impl Into<PathBuf>, owner: EntryOwner) -> Self {
        Self {
            ordinal,
            kind: EntryKind::Directory,
            path: path.into(),
            owner,
        }
    }

    pub fn archive(ordinal: usize, path: impl Into<PathBuf>, owner: EntryOwner) -> Self {
        Self {
            ordinal,
            kind: EntryKind::Archive,
            path: path.into(),
            owner,
        }
    }

    pub fn runtime_module(ordinal: usize, module: impl Into<String>) -> Self {
        let module = module.into();
        Self {
            ordinal,
            path: PathBuf::from(format!("{RUNTIME_MODULE_PREFIX}{module}")),
            kind: EntryKind::RuntimeModule { module },
            owner: EntryOwner::Library,
        }
    }

    /// Classify raw classpath elements in caller order. Ordinals continue
    /// from `first_ordinal` so program and library lists can be concatenated.
    pub fn discover<I, S>(raw: I, owner: EntryOwner, first_ordinal: usize) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        expand_classpath(raw)
            .into_iter()
            .enumerate()
            .map(|(offset, element)| Self::classify(first_ordinal + offset, &element, owner))
            .collect()
    }

    fn classify(ordinal: usize, element: &str, owner: EntryOwner) -> Self {
        if let Some(module) = element.strip_prefix(RUNTIME_MODULE_PREFIX) {
            let mut entry = Self::runtime_module(ordinal, module.trim_matches('/'));
            entry.owner = owner;
            return entry;
        }
        let path = PathBuf::from(element);
        if path.is_dir() || !is_archive(&path) && path.extension().is_none() {
            Self::directory(ordinal, path, owner)
        } else {
            Self::archive(ordinal, path, owner)
        }
    }

    /// Display form used in origins and diagnostics.
    pub fn location(&self) -> String {
        match &self.kind {
            EntryKind::RuntimeModule { module } => format!("{RUNTIME_MODULE_PREFIX}{module}"),
            _ => self.path.display().to_string(),
        }
    }

    pub fn module_name(&self) -> Option<&str> {
        match &self.kind {
            EntryKind::RuntimeModule { module } => Some(module.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for ClasspathEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.ordinal, self.location())
    }
}

/// Split `a.jar:b.jar` style elements, dropping blanks.
pub fn expand_classpath<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let separator = if cfg!(windows) { ';' } else { ':' };
    let mut result = Vec::new();
    for entry in raw {
        let entry = entry.as_ref();
        if entry.trim().is_empty() {
            continue;
        }
        if entry.starts_with(RUNTIME_MODULE_PREFIX) {
            result.push(entry.trim().to_string());
            continue;
        }
        for part in entry.split(separator) {
            if part.trim().is_empty() {
                continue;
            }
            result.push(part.trim().to_string());
        }
    }
    result
}

pub(crate) fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| {
            ["jar", "zip", "jmod"]
                .iter()
                .any(|candidate| ext.eq_ignore_ascii_case(candidate))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_classifies_elements_in_order() {
        let entries = ClasspathEntry::discover(
            ["libs/a.jar:libs/b.jar", "jrt:/java.base", "", "out/classes"],
            EntryOwner::Library,
            3,
        );

        let ordinals: Vec<_> = entries.iter().map(|entry| entry.ordinal).collect();
        assert_eq!(ordinals, vec![3, 4, 5, 6]);
        assert_eq!(entries[0].kind, EntryKind::Archive);
        assert_eq!(entries[1].path, PathBuf::from("libs/b.jar"));
        assert_eq!(
            entries[2].kind,
            EntryKind::RuntimeModule {
                module: "java.base".to_string()
            }
        );
        assert_eq!(entries[2].location(), "jrt:/java.base");
        assert_eq!(entries[3].kind, EntryKind::Directory);
    }
}
