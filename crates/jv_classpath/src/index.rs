use crate::entry::ClasspathEntry;
use crate::metadata::ArchiveMetadata;
use crate::record::SymbolRecord;
use jv_diagnostics::{codes, InteropDiagnostic, IntoDiagnostic};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-entry summary produced while scanning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryReport {
    pub entry: ClasspathEntry,
    pub metadata: Option<ArchiveMetadata>,
    pub multi_release: bool,
    pub module: Option<String>,
    pub class_count: usize,
}

/// A class member that could not be parsed. Not fatal until a call target
/// needs the class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedMember {
    pub entry: usize,
    pub location: String,
    pub member: String,
    pub qualified_name: Option<String>,
    pub reason: String,
}

impl IntoDiagnostic for SkippedMember {
    fn to_diagnostic(&self) -> InteropDiagnostic {
        InteropDiagnostic::warning(
            codes::MEMBER_SKIPPED,
            format!("Skipped unreadable member `{}`: {}", self.member, self.reason),
        )
        .with_context("entry", &self.location)
        .with_context("member", &self.member)
        .with_context("reason", &self.reason)
    }
}

/// An entry that could not be opened at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadableEntry {
    pub entry: usize,
    pub location: String,
    pub reason: String,
}

impl IntoDiagnostic for UnreadableEntry {
    fn to_diagnostic(&self) -> InteropDiagnostic {
        InteropDiagnostic::warning(
            codes::ENTRY_UNREADABLE,
            format!("Classpath entry `{}` could not be read: {}", self.location, self.reason),
        )
        .with_context("entry", &self.location)
        .with_context("reason", &self.reason)
    }
}

/// Descriptive multimap of every class occurrence on the classpath.
///
/// Records under one name keep caller entry order, then base before versioned
/// variants in ascending release. No duplicate is resolved here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClasspathIndex {
    entries: Vec<EntryReport>,
    symbols: BTreeMap<String, Vec<SymbolRecord>>,
    skipped: Vec<SkippedMember>,
    unreadable: Vec<UnreadableEntry>,
}

impl ClasspathIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[EntryReport] {
        &self.entries
    }

    pub fn entry(&self, ordinal: usize) -> Option<&EntryReport> {
        self.entries
            .iter()
            .find(|report| report.entry.ordinal == ordinal)
    }

    pub fn records(&self, qualified_name: &str) -> &[SymbolRecord] {
        self.symbols
            .get(qualified_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.symbols.keys().map(String::as_str)
    }

    pub fn symbols(&self) -> impl Iterator<Item = (&str, &[SymbolRecord])> {
        self.symbols
            .iter()
            .map(|(name, records)| (name.as_str(), records.as_slice()))
    }

    /// Distinct qualified names.
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn record_count(&self) -> usize {
        self.symbols.values().map(Vec::len).sum()
    }

    pub fn skipped(&self) -> &[SkippedMember] {
        &self.skipped
    }

    pub fn skipped_for(&self, qualified_name: &str) -> Option<&SkippedMember> {
        self.skipped
            .iter()
            .find(|skipped| skipped.qualified_name.as_deref() == Some(qualified_name))
    }

    pub fn unreadable_entries(&self) -> &[UnreadableEntry] {
        &self.unreadable
    }

    /// Non-fatal indexing diagnostics in entry order.
    pub fn diagnostics(&self) -> Vec<InteropDiagnostic> {
        let mut diagnostics: Vec<(usize, InteropDiagnostic)> = self
            .unreadable
            .iter()
            .map(|entry| (entry.entry, entry.to_diagnostic()))
            .chain(
                self.skipped
                    .iter()
                    .map(|member| (member.entry, member.to_diagnostic())),
            )
            .collect();
        diagnostics.sort_by_key(|(entry, _)| *entry);
        diagnostics
            .into_iter()
            .map(|(_, diagnostic)| diagnostic)
            .collect()
    }

    /// Stable JSON dump of the descriptive index.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub(crate) fn push_entry(
        &mut self,
        report: EntryReport,
        records: Vec<SymbolRecord>,
        skipped: Vec<SkippedMember>,
        unreadable: Option<UnreadableEntry>,
    ) {
        for record in records {
            self.symbols
                .entry(record.qualified_name.clone())
                .or_default()
                .push(record);
        }
        self.skipped.extend(skipped);
        self.unreadable.extend(unreadable);
        self.entries.push(report);
    }
}
