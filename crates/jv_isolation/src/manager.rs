use crate::mode::IsolationMode;
use crate::namespace::{ClassOrigin, ProgramNamespace};
use crate::view::{ClassView, DuplicateRule, DuplicateSymbol, Unavailable};
use jv_classpath::{ClasspathIndex, EntryOwner, SymbolRecord};
use jv_diagnostics::{codes, InteropDiagnostic, IntoDiagnostic};
use jv_mediation::{MediationOutcome, ScopeViolation};
use std::collections::BTreeMap;
use thiserror::Error;

/// A program class whose name is also defined by a mediated library.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error(
    "classloader isolation conflict under mode `{mode}`: class `{qualified_name}` exists in both program output `{program_origin}` and library `{library_origin}`"
)]
pub struct IsolationConflict {
    pub qualified_name: String,
    pub program_origin: ClassOrigin,
    pub library_origin: ClassOrigin,
    pub mode: IsolationMode,
}

impl IntoDiagnostic for IsolationConflict {
    fn to_diagnostic(&self) -> InteropDiagnostic {
        InteropDiagnostic::error(codes::ISOLATION_CONFLICT, self.to_string())
            .with_context("qualifiedName", &self.qualified_name)
            .with_context("programOrigin", &self.program_origin)
            .with_context("libraryOrigin", &self.library_origin)
            .with_context("mode", self.mode)
            .with_remedy(
                "rename the program class or run with classloader isolation `shared`",
            )
    }
}

pub struct IsolationManager {
    mode: IsolationMode,
    target_release: u16,
}

impl IsolationManager {
    pub fn new(mode: IsolationMode, target_release: u16) -> Self {
        Self {
            mode,
            target_release,
        }
    }

    pub fn mode(&self) -> IsolationMode {
        self.mode
    }

    /// Build the class view for the mediated classpath and validate it
    /// against the program namespace.
    pub fn check(
        &self,
        program: &ProgramNamespace,
        index: &ClasspathIndex,
        mediation: &MediationOutcome,
    ) -> Result<ClassView, IsolationConflict> {
        let selected = index.select_variants(self.target_release);
        let mut view = ClassView {
            mode: self.mode,
            target_release: self.target_release,
            ..ClassView::default()
        };

        for (name, records) in &selected.symbols {
            let visible = |owner: EntryOwner| {
                records
                    .iter()
                    .filter(move |record| {
                        record.origin.owner == owner && mediation.is_mediated(record.origin.entry)
                    })
                    .collect::<Vec<&SymbolRecord>>()
            };
            let libraries = visible(EntryOwner::Library);
            let programs = visible(EntryOwner::Program);

            if let Some((winner, shadowed)) = libraries.split_first() {
                self.record_shadowed(&mut view, name, winner, shadowed);
                view.library.insert(name.clone(), (*winner).clone());
            }
            if let Some((winner, shadowed)) = programs.split_first() {
                self.record_shadowed(&mut view, name, winner, shadowed);
                view.program.insert(name.clone(), (*winner).clone());
            }
        }

        for (name, program_origin) in program.iter() {
            let Some(library) = view.library.get(name) else {
                continue;
            };
            let library_origin = ClassOrigin::from_record(library);
            match self.mode {
                IsolationMode::AppIsolated => {
                    let conflict = IsolationConflict {
                        qualified_name: name.to_string(),
                        program_origin: program_origin.clone(),
                        library_origin,
                        mode: self.mode,
                    };
                    tracing::error!(
                        class = name,
                        program = %conflict.program_origin,
                        library = %conflict.library_origin,
                        "classloader isolation conflict"
                    );
                    return Err(conflict);
                }
                IsolationMode::Shared => {
                    tracing::debug!(class = name, library = %library_origin, "library class shadows program class");
                    view.duplicates.push(DuplicateSymbol {
                        qualified_name: name.to_string(),
                        mode: self.mode,
                        rule: DuplicateRule::MediatedOrder,
                        winner: library_origin,
                        shadowed: program_origin.clone(),
                    });
                }
            }
        }

        view.duplicates.sort_by(|left, right| {
            left.qualified_name
                .cmp(&right.qualified_name)
                .then_with(|| left.shadowed.location.cmp(&right.shadowed.location))
                .then_with(|| left.shadowed.entry.cmp(&right.shadowed.entry))
        });

        collect_unavailable(&mut view, index, mediation, &selected.mismatches);
        tracing::debug!(
            mode = %self.mode,
            symbols = view.symbol_count(),
            duplicates = view.duplicates.len(),
            "class view assembled"
        );
        Ok(view)
    }

    fn record_shadowed(
        &self,
        view: &mut ClassView,
        name: &str,
        winner: &SymbolRecord,
        shadowed: &[&SymbolRecord],
    ) {
        for record in shadowed {
            view.duplicates.push(DuplicateSymbol {
                qualified_name: name.to_string(),
                mode: self.mode,
                rule: DuplicateRule::ClasspathOrder,
                winner: ClassOrigin::from_record(winner),
                shadowed: ClassOrigin::from_record(record),
            });
        }
    }
}

/// Explanations for names the index knows but the view does not serve.
/// Scope exclusion takes precedence over unreadable members, which take
/// precedence over release mismatches.
fn collect_unavailable(
    view: &mut ClassView,
    index: &ClasspathIndex,
    mediation: &MediationOutcome,
    mismatches: &[jv_classpath::ReleaseMismatch],
) {
    let mut unavailable: BTreeMap<String, Unavailable> = BTreeMap::new();

    for name in index.names() {
        if view.contains(name) {
            continue;
        }
        if let Some(exclusion) = mediation.excluded_holder(index, name) {
            unavailable.insert(
                name.to_string(),
                Unavailable::ScopeExcluded(ScopeViolation {
                    target_class: name.to_string(),
                    exclusion: exclusion.clone(),
                }),
            );
        }
    }

    for skipped in index.skipped() {
        let Some(name) = skipped.qualified_name.as_deref() else {
            continue;
        };
        if view.contains(name) || !mediation.is_mediated(skipped.entry) {
            continue;
        }
        unavailable
            .entry(name.to_string())
            .or_insert_with(|| Unavailable::Skipped(skipped.clone()));
    }

    for mismatch in mismatches {
        if view.contains(&mismatch.qualified_name) || !mediation.is_mediated(mismatch.entry) {
            continue;
        }
        unavailable
            .entry(mismatch.qualified_name.clone())
            .or_insert_with(|| Unavailable::ReleaseMismatch(mismatch.clone()));
    }

    view.unavailable = unavailable;
}
