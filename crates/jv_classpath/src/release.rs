//! Multi-release variant selection.
//!
//! The index keeps every variant of a multi-release archive. Selection happens
//! here, once a target release is known.

use crate::index::ClasspathIndex;
use crate::record::{ReleaseVariant, SymbolRecord};
use jv_diagnostics::{codes, InteropDiagnostic, IntoDiagnostic};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Oldest release that may appear under `META-INF/versions/`.
pub const MIN_VERSIONED_RELEASE: u16 = 9;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseMismatch {
    pub qualified_name: String,
    pub entry: usize,
    pub location: String,
    pub lowest_release: u16,
    pub target_release: u16,
}

impl IntoDiagnostic for ReleaseMismatch {
    fn to_diagnostic(&self) -> InteropDiagnostic {
        InteropDiagnostic::warning(
            codes::RELEASE_MISMATCH,
            format!(
                "`{}` in `{}` only has variants for release {} and above (target {})",
                self.qualified_name, self.location, self.lowest_release, self.target_release
            ),
        )
        .with_context("qualifiedName", &self.qualified_name)
        .with_context("entry", &self.location)
        .with_context("lowestRelease", self.lowest_release)
        .with_context("targetRelease", self.target_release)
    }
}

/// Pick the winning variant among records of one entry: the highest
/// versioned release `<= target`, falling back to the base entry.
pub fn select_variant<'a>(
    candidates: &[&'a SymbolRecord],
    target_release: u16,
) -> Result<&'a SymbolRecord, ReleaseMismatch> {
    let mut best_versioned: Option<(u16, &'a SymbolRecord)> = None;
    let mut base: Option<&'a SymbolRecord> = None;
    let mut lowest_incompatible: Option<u16> = None;

    for candidate in candidates.iter().copied() {
        match candidate.variant {
            ReleaseVariant::Base => {
                base.get_or_insert(candidate);
            }
            ReleaseVariant::Versioned(release) if release <= target_release => {
                if best_versioned.map_or(true, |(known, _)| release > known) {
                    best_versioned = Some((release, candidate));
                }
            }
            ReleaseVariant::Versioned(release) => {
                lowest_incompatible =
                    Some(lowest_incompatible.map_or(release, |known| known.min(release)));
            }
        }
    }

    if let Some((_, record)) = best_versioned {
        return Ok(record);
    }
    if let Some(record) = base {
        return Ok(record);
    }

    let first = candidates.first().copied();
    Err(ReleaseMismatch {
        qualified_name: first
            .map(|record| record.qualified_name.clone())
            .unwrap_or_default(),
        entry: first.map(|record| record.origin.entry).unwrap_or_default(),
        location: first
            .map(|record| record.origin.location.clone())
            .unwrap_or_default(),
        lowest_release: lowest_incompatible.unwrap_or(target_release),
        target_release,
    })
}

/// Index view with one record per (name, entry) after variant selection.
#[derive(Debug, Clone, Default)]
pub struct SelectedVariants {
    pub target_release: u16,
    pub symbols: BTreeMap<String, Vec<SymbolRecord>>,
    pub mismatches: Vec<ReleaseMismatch>,
}

impl ClasspathIndex {
    pub fn select_variants(&self, target_release: u16) -> SelectedVariants {
        let mut selected = SelectedVariants {
            target_release,
            ..SelectedVariants::default()
        };

        for (name, records) in self.symbols() {
            let mut per_entry: Vec<(usize, Vec<&SymbolRecord>)> = Vec::new();
            for record in records {
                let same_entry = per_entry
                    .last()
                    .map_or(false, |(entry, _)| *entry == record.origin.entry);
                if !same_entry {
                    per_entry.push((record.origin.entry, Vec::new()));
                }
                if let Some((_, group)) = per_entry.last_mut() {
                    group.push(record);
                }
            }

            let mut winners = Vec::with_capacity(per_entry.len());
            for (_, group) in per_entry {
                match select_variant(&group, target_release) {
                    Ok(record) => winners.push(record.clone()),
                    Err(mismatch) => {
                        tracing::debug!(
                            class = %mismatch.qualified_name,
                            entry = %mismatch.location,
                            lowest_release = mismatch.lowest_release,
                            "no multi-release variant for target"
                        );
                        selected.mismatches.push(mismatch);
                    }
                }
            }
            if !winners.is_empty() {
                selected.symbols.insert(name.to_string(), winners);
            }
        }

        selected
    }
}
