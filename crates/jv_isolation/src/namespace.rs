use jv_classpath::{ClasspathIndex, EntryOwner, SymbolOrigin, SymbolRecord};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Serializable origin used in the index file and conflict reports.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassOrigin {
    pub owner: String,
    pub source_kind: String,
    pub location: String,
    pub entry: String,
    pub module_name: String,
    pub package_name: String,
}

impl ClassOrigin {
    pub fn from_record(record: &SymbolRecord) -> Self {
        Self::from_origin(&record.origin)
    }

    pub fn from_origin(origin: &SymbolOrigin) -> Self {
        Self {
            owner: origin.owner.as_str().to_string(),
            source_kind: origin.source_kind.as_str().to_string(),
            location: origin.location.clone(),
            entry: origin.member.clone(),
            module_name: origin.module.clone().unwrap_or_default(),
            package_name: origin.package.clone(),
        }
    }

    /// Origin of a class the emitter reports without a compiled record.
    pub fn generated(qualified_name: &str, location: &str) -> Self {
        Self {
            owner: EntryOwner::Program.as_str().to_string(),
            source_kind: "generated".to_string(),
            location: location.to_string(),
            entry: format!("{}.class", qualified_name.replace('.', "/")),
            module_name: String::new(),
            package_name: qualified_name
                .rsplit_once('.')
                .map(|(package, _)| package.to_string())
                .unwrap_or_default(),
        }
    }
}

impl fmt::Display for ClassOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.location, self.entry)
    }
}

/// Class names defined by the generated program, with their origin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramNamespace {
    classes: BTreeMap<String, ClassOrigin>,
}

impl ProgramNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Program-owned records of the index. The first occurrence of a name wins.
    pub fn from_index(index: &ClasspathIndex) -> Self {
        let mut namespace = Self::new();
        for (name, records) in index.symbols() {
            if let Some(record) = records
                .iter()
                .find(|record| record.origin.owner == EntryOwner::Program)
            {
                namespace
                    .classes
                    .insert(name.to_string(), ClassOrigin::from_record(record));
            }
        }
        namespace
    }

    /// Names taken from an emitter manifest.
    pub fn from_manifest<I, S>(names: I, location: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut namespace = Self::new();
        for name in names {
            namespace.insert_generated(name.as_ref(), location);
        }
        namespace
    }

    pub fn insert_generated(&mut self, qualified_name: &str, location: &str) {
        self.classes
            .entry(qualified_name.to_string())
            .or_insert_with(|| ClassOrigin::generated(qualified_name, location));
    }

    /// Merge names from `other` that are not yet present.
    pub fn extend(&mut self, other: ProgramNamespace) {
        for (name, origin) in other.classes {
            self.classes.entry(name).or_insert(origin);
        }
    }

    pub fn contains(&self, qualified_name: &str) -> bool {
        self.classes.contains_key(qualified_name)
    }

    pub fn origin(&self, qualified_name: &str) -> Option<&ClassOrigin> {
        self.classes.get(qualified_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ClassOrigin)> {
        self.classes
            .iter()
            .map(|(name, origin)| (name.as_str(), origin))
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
