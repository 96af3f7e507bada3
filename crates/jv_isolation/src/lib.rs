//! Classloader isolation: two disjoint symbol tables (program and mediated
//! libraries) joined by an explicit conflict pass.

mod manager;
mod mode;
mod namespace;
mod view;

#[cfg(test)]
mod tests;

pub use manager::{IsolationConflict, IsolationManager};
pub use mode::{IsolationMode, UnknownIsolationMode};
pub use namespace::{ClassOrigin, ProgramNamespace};
pub use view::{
    ClassView, DuplicateRule, DuplicateSymbol, ReleaseStats, Unavailable, ViewError,
    INDEX_FILE_NAME,
};
