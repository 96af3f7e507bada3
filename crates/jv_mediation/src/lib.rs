//! 依存調停 (dependency mediation)。
//!
//! 埋め込み Maven メタデータからグラフを組み立て、座標ごとに 1 バージョンを
//! nearest-wins 規則で選ぶ。スコープで落とした依存は [`ScopeExclusion`] として残し、
//! 呼び出し対象がそこにしか無い場合の診断に使う。

mod graph;
mod mediator;
mod usage;


pub use graph::{DependencyEdge, DependencyGraph, GraphNode};
pub use mediator::{
    DependencyNode, MediationDecision, MediationOutcome, MediationRule, Mediator,
    RejectedVersion, ScopeExclusion, ScopeViolation,
};
pub use usage::{ClasspathUsage, DependencyScope, UnknownUsage};

use jv_classpath::ClasspathIndex;

/// グラフ構築と調停をまとめて行う。
pub fn mediate_index(index: &ClasspathIndex, usage: ClasspathUsage) -> MediationOutcome {
    let graph = DependencyGraph::from_index(index, usage);
    Mediator::mediate(&graph)
}
