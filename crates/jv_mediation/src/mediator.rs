use crate::graph::DependencyGraph;
use crate::usage::{ClasspathUsage, DependencyScope};
use indexmap::IndexMap;
use jv_classpath::{ClasspathEntry, ClasspathIndex, LibraryCoordinate};
use jv_diagnostics::{codes, InteropDiagnostic, IntoDiagnostic};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use thiserror::Error;

/// 勝者と敗者を分けた規則。左から順に評価される。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediationRule {
    Nearest,
    RootOrder,
    DiscoveryOrder,
    Deterministic,
}

impl MediationRule {
    pub fn as_str(self) -> &'static str {
        match self {
            MediationRule::Nearest => "nearest",
            MediationRule::RootOrder => "root-order",
            MediationRule::DiscoveryOrder => "discovery-order",
            MediationRule::Deterministic => "deterministic",
        }
    }

    fn classify(winner: &DependencyNode, rejected: &DependencyNode) -> Self {
        if winner.depth < rejected.depth {
            MediationRule::Nearest
        } else if winner.root_index < rejected.root_index {
            MediationRule::RootOrder
        } else if winner.discovery_order < rejected.discovery_order {
            MediationRule::DiscoveryOrder
        } else {
            MediationRule::Deterministic
        }
    }
}

impl fmt::Display for MediationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 幅優先走査で到達した候補 1 件。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyNode {
    pub coordinate: LibraryCoordinate,
    pub version: String,
    pub entry: usize,
    pub location: String,
    /// 到達に使ったエッジのスコープ。ルートは compile。
    pub scope: DependencyScope,
    pub depth: usize,
    pub root_index: usize,
    pub discovery_order: usize,
}

impl DependencyNode {
    /// `(depth, rootIndex, discoveryOrder, path)` の全順序。
    fn mediation_order(&self, other: &Self) -> Ordering {
        self.depth
            .cmp(&other.depth)
            .then(self.root_index.cmp(&other.root_index))
            .then(self.discovery_order.cmp(&other.discovery_order))
            .then_with(|| self.location.cmp(&other.location))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedVersion {
    pub version: String,
    pub entry: usize,
    pub location: String,
}

/// 競合したバージョン 1 件ごとの調停記録。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediationDecision {
    pub coordinate: LibraryCoordinate,
    pub selected_version: String,
    pub selected_entry: usize,
    pub selected_location: String,
    pub rejected: RejectedVersion,
    pub rule: MediationRule,
}

/// 現在の用途では不可視なスコープのために落とされた依存エッジ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeExclusion {
    pub owner_coordinate: LibraryCoordinate,
    pub owner_version: String,
    pub dependency_coordinate: LibraryCoordinate,
    pub dependency_version: String,
    pub scope: DependencyScope,
    pub usage: ClasspathUsage,
    pub excluded_entry: usize,
    pub excluded_location: String,
}

/// 対象クラスが除外スコープ経由でしか到達できない。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error(
    "interop target class `{target_class}` is reachable only through dependency scope `{}`, which is excluded for `{}` classpath resolution",
    .exclusion.scope,
    .exclusion.usage
)]
pub struct ScopeViolation {
    pub target_class: String,
    pub exclusion: ScopeExclusion,
}

impl IntoDiagnostic for ScopeViolation {
    fn to_diagnostic(&self) -> InteropDiagnostic {
        let help = jv_diagnostics::descriptor(codes::SCOPE_VIOLATION)
            .map(|descriptor| descriptor.help)
            .unwrap_or_default();
        InteropDiagnostic::error(codes::SCOPE_VIOLATION, self.to_string())
            .with_context("targetClass", &self.target_class)
            .with_context("scope", &self.exclusion.scope)
            .with_context("usage", self.exclusion.usage)
            .with_context("excludedEntry", &self.exclusion.excluded_location)
            .with_context("ownerCoordinate", &self.exclusion.owner_coordinate)
            .with_remedy(help)
    }
}

/// 調停結果。呼び出し順の調停済みクラスパスと、その説明一式を持つ。
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediationOutcome {
    usage: ClasspathUsage,
    mediated: Vec<ClasspathEntry>,
    decisions: Vec<MediationDecision>,
    exclusions: Vec<ScopeExclusion>,
    candidates: Vec<DependencyNode>,
}

impl MediationOutcome {
    pub fn usage(&self) -> ClasspathUsage {
        self.usage
    }

    /// 調停対象外エントリと各座標の勝者。呼び出し順。
    pub fn mediated_entries(&self) -> &[ClasspathEntry] {
        &self.mediated
    }

    pub fn is_mediated(&self, ordinal: usize) -> bool {
        self.mediated.iter().any(|entry| entry.ordinal == ordinal)
    }

    pub fn decisions(&self) -> &[MediationDecision] {
        &self.decisions
    }

    pub fn scope_exclusions(&self) -> &[ScopeExclusion] {
        &self.exclusions
    }

    /// 走査で得た候補。発見順。
    pub fn candidates(&self) -> &[DependencyNode] {
        &self.candidates
    }

    /// 調停済みクラスパスから外れ、かつ `qualified_name` を含む除外エントリ。
    pub fn excluded_holder(
        &self,
        index: &ClasspathIndex,
        qualified_name: &str,
    ) -> Option<&ScopeExclusion> {
        let records = index.records(qualified_name);
        self.exclusions.iter().find(|exclusion| {
            !self.is_mediated(exclusion.excluded_entry)
                && records
                    .iter()
                    .any(|record| record.origin.entry == exclusion.excluded_entry)
        })
    }

    /// 呼び出し対象のクラスがすべて調停済みクラスパスから見えることを確認する。
    /// 見えないクラスのうち除外エントリにあるものだけがスコープ違反になる。
    pub fn check_scope<'a, I>(&self, index: &ClasspathIndex, classes: I) -> Result<(), ScopeViolation>
    where
        I: IntoIterator<Item = &'a str>,
    {
        if self.exclusions.is_empty() {
            return Ok(());
        }
        for class in classes {
            let visible = index
                .records(class)
                .iter()
                .any(|record| self.is_mediated(record.origin.entry));
            if visible {
                continue;
            }
            if let Some(exclusion) = self.excluded_holder(index, class) {
                return Err(ScopeViolation {
                    target_class: class.to_string(),
                    exclusion: exclusion.clone(),
                });
            }
        }
        Ok(())
    }
}

/// 最近接優先 (nearest-wins) の調停器。
pub struct Mediator;

impl Mediator {
    pub fn mediate(graph: &DependencyGraph) -> MediationOutcome {
        let usage = graph.usage();
        let mut queue: VecDeque<(usize, usize, usize, DependencyScope)> = graph
            .roots()
            .iter()
            .enumerate()
            .map(|(root_index, node)| (*node, root_index, 0, DependencyScope::Compile))
            .collect();

        let mut best_depth: HashMap<(usize, usize), usize> = HashMap::new();
        let mut candidates: Vec<DependencyNode> = Vec::new();
        let mut exclusions: IndexMap<(usize, LibraryCoordinate, usize), ScopeExclusion> =
            IndexMap::new();

        while let Some((position, root_index, depth, scope)) = queue.pop_front() {
            // 同じルートから既により浅く (または同じ深さで) 訪問済みなら飛ばす。
            if best_depth
                .get(&(root_index, position))
                .is_some_and(|known| *known <= depth)
            {
                continue;
            }
            best_depth.insert((root_index, position), depth);

            let node = graph.node(position);
            candidates.push(DependencyNode {
                coordinate: node.coordinate.clone(),
                version: node.version.clone(),
                entry: node.entry.ordinal,
                location: node.location(),
                scope,
                depth,
                root_index,
                discovery_order: candidates.len(),
            });

            for edge in graph.edges_from(position) {
                if usage.allows(&edge.scope) {
                    queue.push_back((edge.to, root_index, depth + 1, edge.scope.clone()));
                    continue;
                }
                let target = graph.node(edge.to);
                exclusions
                    .entry((node.entry.ordinal, target.coordinate.clone(), edge.to))
                    .or_insert_with(|| {
                        tracing::debug!(
                            owner = %node.coordinate,
                            dependency = %target.coordinate,
                            scope = %edge.scope,
                            usage = %usage,
                            "dependency edge excluded by scope"
                        );
                        ScopeExclusion {
                            owner_coordinate: node.coordinate.clone(),
                            owner_version: node.version.clone(),
                            dependency_coordinate: target.coordinate.clone(),
                            dependency_version: target.version.clone(),
                            scope: edge.scope.clone(),
                            usage,
                            excluded_entry: target.entry.ordinal,
                            excluded_location: target.location(),
                        }
                    });
            }
        }

        let mut by_coordinate: IndexMap<LibraryCoordinate, Vec<&DependencyNode>> = IndexMap::new();
        for candidate in &candidates {
            by_coordinate
                .entry(candidate.coordinate.clone())
                .or_default()
                .push(candidate);
        }

        let mut winners = BTreeSet::new();
        let mut decisions = Vec::new();
        for (coordinate, group) in &by_coordinate {
            let Some(winner) = group
                .iter()
                .copied()
                .min_by(|left, right| left.mediation_order(right))
            else {
                continue;
            };
            winners.insert(winner.entry);

            let mut best_by_version: IndexMap<&str, &DependencyNode> = IndexMap::new();
            for candidate in group.iter().copied() {
                let slot = best_by_version
                    .entry(candidate.version.as_str())
                    .or_insert(candidate);
                if candidate.mediation_order(*slot) == Ordering::Less {
                    *slot = candidate;
                }
            }

            for (version, rejected) in best_by_version {
                if version == winner.version {
                    continue;
                }
                let rule = MediationRule::classify(winner, rejected);
                tracing::info!(
                    artifact = %coordinate,
                    selected = %winner.version,
                    rejected = %version,
                    rule = %rule,
                    "dependency version mediated"
                );
                decisions.push(MediationDecision {
                    coordinate: coordinate.clone(),
                    selected_version: winner.version.clone(),
                    selected_entry: winner.entry,
                    selected_location: winner.location.clone(),
                    rejected: RejectedVersion {
                        version: version.to_string(),
                        entry: rejected.entry,
                        location: rejected.location.clone(),
                    },
                    rule,
                });
            }
        }

        let mut mediated: Vec<ClasspathEntry> = graph
            .exempt_entries()
            .iter()
            .cloned()
            .chain(
                graph
                    .nodes()
                    .iter()
                    .filter(|node| winners.contains(&node.entry.ordinal))
                    .map(|node| node.entry.clone()),
            )
            .collect();
        mediated.sort_by_key(|entry| entry.ordinal);

        MediationOutcome {
            usage,
            mediated,
            decisions,
            exclusions: exclusions.into_values().collect(),
            candidates,
        }
    }
}
