//! インデックス済みアーカイブのメタデータから依存グラフを組み立てる。

use crate::usage::{ClasspathUsage, DependencyScope};
use indexmap::IndexMap;
use jv_classpath::{ClasspathEntry, ClasspathIndex, DeclaredDependency, EntryOwner, LibraryCoordinate};
use serde::Serialize;

/// 座標メタデータを持つライブラリエントリ 1 件。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    pub entry: ClasspathEntry,
    pub coordinate: LibraryCoordinate,
    pub version: String,
}

impl GraphNode {
    pub fn location(&self) -> String {
        self.entry.location()
    }
}

/// 宣言された依存 1 件が指す候補ノード。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyEdge {
    pub from: usize,
    pub to: usize,
    pub scope: DependencyScope,
    /// 所有者の `pom.xml` 内での宣言順。
    pub declaration_order: usize,
}

/// 調停の入力となる依存グラフ。
///
/// ノードは呼び出し順のメタデータ付きライブラリエントリ。エッジはスコープに関係なく
/// すべて保持し、可視性の判定は走査時に [`ClasspathUsage`] で行う。
#[derive(Debug, Clone, Default, Serialize)]
pub struct DependencyGraph {
    usage: ClasspathUsage,
    nodes: Vec<GraphNode>,
    edges: Vec<Vec<DependencyEdge>>,
    roots: Vec<usize>,
    /// メタデータを持たない (調停対象外の) エントリ。
    exempt: Vec<ClasspathEntry>,
}

impl DependencyGraph {
    pub fn from_index(index: &ClasspathIndex, usage: ClasspathUsage) -> Self {
        let mut nodes = Vec::new();
        let mut exempt = Vec::new();
        for report in index.entries() {
            match (&report.metadata, report.entry.owner) {
                (Some(metadata), EntryOwner::Library) => nodes.push((
                    GraphNode {
                        entry: report.entry.clone(),
                        coordinate: metadata.coordinate.clone(),
                        version: metadata.version.clone(),
                    },
                    metadata.dependencies.clone(),
                )),
                _ => exempt.push(report.entry.clone()),
            }
        }

        let mut by_coordinate: IndexMap<LibraryCoordinate, Vec<usize>> = IndexMap::new();
        for (position, (node, _)) in nodes.iter().enumerate() {
            by_coordinate
                .entry(node.coordinate.clone())
                .or_default()
                .push(position);
        }

        let mut edges = Vec::with_capacity(nodes.len());
        let mut incoming = vec![0usize; nodes.len()];
        for (from, (_, dependencies)) in nodes.iter().enumerate() {
            let mut outgoing = Vec::new();
            for (declaration_order, dependency) in dependencies.iter().enumerate() {
                for to in candidates_for(dependency, &by_coordinate, &nodes) {
                    incoming[to] += 1;
                    outgoing.push(DependencyEdge {
                        from,
                        to,
                        scope: DependencyScope::parse(dependency.scope.as_deref()),
                        declaration_order,
                    });
                }
            }
            edges.push(outgoing);
        }

        let mut roots: Vec<usize> = (0..nodes.len()).filter(|node| incoming[*node] == 0).collect();
        if roots.is_empty() {
            roots = (0..nodes.len()).collect();
        }

        tracing::debug!(
            nodes = nodes.len(),
            roots = roots.len(),
            exempt = exempt.len(),
            usage = %usage,
            "dependency graph assembled"
        );

        Self {
            usage,
            nodes: nodes.into_iter().map(|(node, _)| node).collect(),
            edges,
            roots,
            exempt,
        }
    }

    pub fn usage(&self) -> ClasspathUsage {
        self.usage
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn node(&self, position: usize) -> &GraphNode {
        &self.nodes[position]
    }

    pub fn edges_from(&self, position: usize) -> &[DependencyEdge] {
        self.edges.get(position).map(Vec::as_slice).unwrap_or(&[])
    }

    /// ルートノードの位置 (呼び出し順)。
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn exempt_entries(&self) -> &[ClasspathEntry] {
        &self.exempt
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// `group:artifact` が一致し、バージョン指定があればそれも一致するノード。パス順。
fn candidates_for(
    dependency: &DeclaredDependency,
    by_coordinate: &IndexMap<LibraryCoordinate, Vec<usize>>,
    nodes: &[(GraphNode, Vec<DeclaredDependency>)],
) -> Vec<usize> {
    let Some(positions) = by_coordinate.get(&dependency.coordinate) else {
        return Vec::new();
    };
    let mut matched: Vec<usize> = positions
        .iter()
        .copied()
        .filter(|position| {
            dependency
                .version
                .as_deref()
                .map_or(true, |version| nodes[*position].0.version == version)
        })
        .collect();
    matched.sort_by(|left, right| {
        let left = nodes[*left].0.entry.path.to_string_lossy();
        let right = nodes[*right].0.entry.path.to_string_lossy();
        left.cmp(&right)
    });
    matched
}
