//! Schema join graph.
//!
//! Tables are nodes, declared foreign keys (plus overlay-injected manual
//! edges) are undirected weighted edges. The graph is stored as an arena of
//! index-based nodes and edges, so self-referencing and cyclic foreign keys
//! are structurally harmless.
//!
//! Path resolution is deterministic: shortest paths are compared by
//! (total weight, hop count, lexicographic sequence of table names), and the
//! multi-table case uses greedy Steiner augmentation with the same ordering.
//! The lexicographic tie-break is a documented design choice - it guarantees
//! reproducible plans, not a globally minimal Steiner tree.
//!
//! The returned edge sequence is rooted at the plan's anchor table (the one
//! every other plan table ultimately references, like `patient` in a star
//! schema) and walks outward, so `FROM` starts at the primary entity and
//! each edge lists the already-joined side first.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};

use super::errors::SchemaCatalogError;
use super::metadata::SchemaMetadata;

/// One traversal step in a resolved join plan, oriented in walk order:
/// `table_a` is already part of the plan, `table_b` is being joined in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPathEdge {
    pub table_a: String,
    pub column_a: String,
    pub table_b: String,
    pub column_b: String,
    pub weight: u32,
}

impl JoinPathEdge {
    pub fn join_condition(&self) -> String {
        format!(
            "{}.{} = {}.{}",
            self.table_a, self.column_a, self.table_b, self.column_b
        )
    }
}

/// A resolved join plan: an ordered edge walk plus every table it touches
/// (requested tables and any bridge tables pulled in between them).
#[derive(Debug, Clone, Default)]
pub struct JoinPlan {
    pub tables: BTreeSet<String>,
    pub edges: Vec<JoinPathEdge>,
}

impl JoinPlan {
    pub fn is_single_table(&self) -> bool {
        self.edges.is_empty()
    }

    /// Render the `FROM ... JOIN ...` clause handed to the SQL generator.
    pub fn join_clause(&self) -> String {
        let anchor = match self.edges.first() {
            Some(edge) => edge.table_a.clone(),
            None => match self.tables.iter().next() {
                Some(table) => table.clone(),
                None => return String::new(),
            },
        };
        let mut lines = vec![format!("FROM {}", anchor)];
        for edge in &self.edges {
            lines.push(format!("JOIN {} ON {}", edge.table_b, edge.join_condition()));
        }
        lines.join("\n")
    }
}

#[derive(Debug)]
struct Node {
    name: String,
}

#[derive(Debug)]
struct Edge {
    a: usize,
    a_column: String,
    b: usize,
    b_column: String,
    weight: u32,
}

impl Edge {
    fn other(&self, node: usize) -> usize {
        if self.a == node { self.b } else { self.a }
    }

    /// Columns oriented so the first element belongs to `from`.
    fn oriented(&self, from: usize) -> (&str, &str) {
        if self.a == from {
            (&self.a_column, &self.b_column)
        } else {
            (&self.b_column, &self.a_column)
        }
    }
}

/// Immutable join graph over the schema. Built once, shared by all sessions;
/// a schema reload builds a fresh instance.
#[derive(Debug)]
pub struct SchemaGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    adjacency: Vec<Vec<usize>>,
    by_name: HashMap<String, usize>,
}

/// Dijkstra bookkeeping: comparison order is exactly the resolution policy -
/// total weight, then hops, then the lexicographic table-name sequence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct PathState {
    cost: u64,
    hops: u32,
    names: Vec<String>,
}

impl SchemaGraph {
    /// Construct the graph from schema metadata. Fails if any declared
    /// relationship references a table or column the metadata does not have.
    pub fn build(metadata: &SchemaMetadata) -> Result<Self, SchemaCatalogError> {
        if metadata.tables.is_empty() {
            return Err(SchemaCatalogError::EmptySchema);
        }

        let mut by_name = HashMap::new();
        let mut nodes = Vec::with_capacity(metadata.tables.len());
        for table in &metadata.tables {
            if by_name.insert(table.name.clone(), nodes.len()).is_some() {
                return Err(SchemaCatalogError::DuplicateTable {
                    table: table.name.clone(),
                });
            }
            nodes.push(Node {
                name: table.name.clone(),
            });
        }

        let mut edges = Vec::with_capacity(metadata.foreign_keys.len());
        let mut adjacency = vec![Vec::new(); nodes.len()];
        for fk in &metadata.foreign_keys {
            let a = *by_name.get(&fk.table).ok_or_else(|| {
                SchemaCatalogError::UnknownTableInForeignKey {
                    table: fk.table.clone(),
                }
            })?;
            let b = *by_name.get(&fk.referenced_table).ok_or_else(|| {
                SchemaCatalogError::UnknownTableInForeignKey {
                    table: fk.referenced_table.clone(),
                }
            })?;
            for (table, column) in [(&fk.table, &fk.column), (&fk.referenced_table, &fk.referenced_column)] {
                let meta = metadata.table(table).ok_or_else(|| {
                    SchemaCatalogError::UnknownTableInForeignKey {
                        table: table.clone(),
                    }
                })?;
                if meta.column(column).is_none() {
                    return Err(SchemaCatalogError::UnknownColumnInForeignKey {
                        table: table.clone(),
                        column: column.clone(),
                    });
                }
            }
            let edge_idx = edges.len();
            edges.push(Edge {
                a,
                a_column: fk.column.clone(),
                b,
                b_column: fk.referenced_column.clone(),
                weight: fk.weight.max(1),
            });
            adjacency[a].push(edge_idx);
            if a != b {
                adjacency[b].push(edge_idx);
            }
        }

        Ok(Self {
            nodes,
            edges,
            adjacency,
            by_name,
        })
    }

    pub fn table_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Fast pre-check: is there a direct foreign-key edge between two tables?
    pub fn validate_edge(&self, table_a: &str, table_b: &str) -> bool {
        let (Some(&a), Some(&b)) = (self.by_name.get(table_a), self.by_name.get(table_b)) else {
            return false;
        };
        self.adjacency[a]
            .iter()
            .any(|&edge_idx| self.edges[edge_idx].other(a) == b)
    }

    /// Resolve a join plan connecting every requested table.
    ///
    /// 0 or 1 tables yield an empty-edge plan. Two tables get the
    /// minimum-weight path. More than two get a greedy Steiner
    /// approximation: seed with the shortest path between the two
    /// lexicographically smallest requested tables, then repeatedly attach
    /// the uncovered requested table with the globally cheapest path from
    /// anything already in the plan. The collected edges are then re-rooted
    /// at the anchor table and emitted in outward walk order.
    ///
    /// Never returns a partial plan: if any requested table cannot be
    /// reached from the rest, the call fails naming exactly those tables.
    pub fn resolve_join_path(
        &self,
        required: &BTreeSet<String>,
    ) -> Result<JoinPlan, SchemaCatalogError> {
        if required.len() <= 1 {
            return Ok(JoinPlan {
                tables: required.clone(),
                edges: Vec::new(),
            });
        }

        self.check_reachability(required)?;

        // BTreeSet iteration is sorted, so the first two requested tables
        // are the lexicographically smallest pair.
        let mut sorted: Vec<&String> = required.iter().collect();
        let seed_from = self.by_name[sorted.remove(0)];
        let seed_to = self.by_name[sorted.remove(0)];

        let mut plan = JoinPlan::default();
        let mut covered: HashSet<usize> = HashSet::new();
        let mut used_edges: HashSet<usize> = HashSet::new();

        let walk = self.shortest_path(&[seed_from], seed_to).ok_or_else(|| {
            // Reachability was checked above; treat a miss as no path
            // rather than panicking on an internal inconsistency.
            SchemaCatalogError::NoJoinPath {
                unreachable: vec![self.nodes[seed_to].name.clone()],
            }
        })?;
        self.extend_plan(&mut plan, &mut covered, &mut used_edges, walk);

        loop {
            let uncovered: Vec<usize> = required
                .iter()
                .map(|name| self.by_name[name])
                .filter(|idx| !covered.contains(idx))
                .collect();
            if uncovered.is_empty() {
                break;
            }

            let sources: Vec<usize> = covered.iter().copied().collect();
            let unreachable_fallback = || SchemaCatalogError::NoJoinPath {
                unreachable: uncovered
                    .iter()
                    .map(|&idx| self.nodes[idx].name.clone())
                    .collect(),
            };
            // Globally cheapest augmenting path; target name breaks any
            // remaining tie between equally cheap candidates.
            let best = uncovered
                .iter()
                .filter_map(|&target| {
                    self.shortest_path(&sources, target)
                        .map(|walk| (walk, self.nodes[target].name.clone()))
                })
                .min_by(|(walk_a, name_a), (walk_b, name_b)| {
                    walk_a
                        .state
                        .cmp(&walk_b.state)
                        .then_with(|| name_a.cmp(name_b))
                })
                .ok_or_else(unreachable_fallback)?;
            self.extend_plan(&mut plan, &mut covered, &mut used_edges, best.0);
        }

        let mut used: Vec<usize> = used_edges.into_iter().collect();
        used.sort_unstable();
        plan.edges = self.order_edges_from_anchor(&used);
        Ok(plan)
    }

    /// Re-root the collected Steiner tree at its anchor table and emit the
    /// edges in outward walk order, already-joined side first.
    ///
    /// The anchor is the plan table that sits on the referenced side of
    /// every plan edge it touches: in a star schema that is the primary
    /// entity the mapping tables point at. When several qualify (or a
    /// foreign-key cycle leaves none), the lexicographically smallest name
    /// wins.
    fn order_edges_from_anchor(&self, used: &[usize]) -> Vec<JoinPathEdge> {
        if used.is_empty() {
            return Vec::new();
        }

        let mut plan_nodes: HashSet<usize> = HashSet::new();
        let mut referencing: HashSet<usize> = HashSet::new();
        for &edge_idx in used {
            let edge = &self.edges[edge_idx];
            plan_nodes.insert(edge.a);
            plan_nodes.insert(edge.b);
            referencing.insert(edge.a);
        }

        let anchor = plan_nodes
            .iter()
            .copied()
            .filter(|idx| !referencing.contains(idx))
            .min_by_key(|&idx| self.nodes[idx].name.as_str())
            .or_else(|| {
                plan_nodes
                    .iter()
                    .copied()
                    .min_by_key(|&idx| self.nodes[idx].name.as_str())
            });
        let Some(anchor) = anchor else {
            return Vec::new();
        };

        let mut ordered = Vec::with_capacity(used.len());
        let mut visited: HashSet<usize> = HashSet::from([anchor]);
        let mut remaining: Vec<usize> = used.to_vec();
        while !remaining.is_empty() {
            let next = remaining
                .iter()
                .enumerate()
                .filter_map(|(pos, &edge_idx)| {
                    let edge = &self.edges[edge_idx];
                    let from = if visited.contains(&edge.a) && !visited.contains(&edge.b) {
                        edge.a
                    } else if visited.contains(&edge.b) && !visited.contains(&edge.a) {
                        edge.b
                    } else {
                        return None;
                    };
                    Some((pos, edge_idx, from))
                })
                // Walk order: the edge bringing in the lexicographically
                // smallest new table goes first; edge index settles exact
                // duplicates (parallel foreign keys).
                .min_by_key(|&(_, edge_idx, from)| {
                    let edge = &self.edges[edge_idx];
                    let to = edge.other(from);
                    (
                        self.nodes[to].name.as_str(),
                        self.nodes[from].name.as_str(),
                        edge_idx,
                    )
                });

            match next {
                Some((pos, edge_idx, from)) => {
                    remaining.swap_remove(pos);
                    let edge = &self.edges[edge_idx];
                    let to = edge.other(from);
                    visited.insert(to);
                    let (from_column, to_column) = edge.oriented(from);
                    ordered.push(JoinPathEdge {
                        table_a: self.nodes[from].name.clone(),
                        column_a: from_column.to_string(),
                        table_b: self.nodes[to].name.clone(),
                        column_b: to_column.to_string(),
                        weight: edge.weight,
                    });
                }
                None => {
                    // Augmenting paths only ever touch the covered set at
                    // their start, so the collected edges form a tree; a
                    // leftover both-visited edge would be a cycle closer and
                    // carries no new table.
                    let before = remaining.len();
                    remaining.retain(|&edge_idx| {
                        let edge = &self.edges[edge_idx];
                        !(visited.contains(&edge.a) && visited.contains(&edge.b))
                    });
                    if remaining.len() == before {
                        break;
                    }
                }
            }
        }

        ordered
    }

    /// Partition requested tables into the connected component holding the
    /// majority of them; everything outside is unreachable.
    fn check_reachability(&self, required: &BTreeSet<String>) -> Result<(), SchemaCatalogError> {
        let components = self.connected_components();

        // Unknown tables count as unreachable rather than a distinct error:
        // the orchestrator treats both the same way (drop and annotate).
        let mut groups: HashMap<usize, Vec<&String>> = HashMap::new();
        let mut unknown: Vec<&String> = Vec::new();
        for name in required {
            match self.by_name.get(name) {
                Some(&idx) => groups.entry(components[idx]).or_default().push(name),
                None => unknown.push(name),
            }
        }

        let main_group = groups
            .values()
            .max_by(|a, b| {
                a.len()
                    .cmp(&b.len())
                    // Larger group wins; between equal sizes prefer the one
                    // holding the lexicographically smallest table.
                    .then_with(|| b[0].cmp(a[0]))
            })
            .cloned()
            .unwrap_or_default();

        let main_set: HashSet<&String> = main_group.into_iter().collect();
        let mut unreachable: Vec<String> = required
            .iter()
            .filter(|name| !main_set.contains(name))
            .cloned()
            .collect();
        unreachable.sort();

        if unreachable.is_empty() {
            Ok(())
        } else {
            Err(SchemaCatalogError::NoJoinPath { unreachable })
        }
    }

    fn connected_components(&self) -> Vec<usize> {
        let mut component = vec![usize::MAX; self.nodes.len()];
        let mut next_id = 0;
        for start in 0..self.nodes.len() {
            if component[start] != usize::MAX {
                continue;
            }
            let mut stack = vec![start];
            component[start] = next_id;
            while let Some(node) = stack.pop() {
                for &edge_idx in &self.adjacency[node] {
                    let neighbor = self.edges[edge_idx].other(node);
                    if component[neighbor] == usize::MAX {
                        component[neighbor] = next_id;
                        stack.push(neighbor);
                    }
                }
            }
            next_id += 1;
        }
        component
    }

    /// Multi-source Dijkstra to a single target with full deterministic
    /// ordering. Returns `None` when the target is unreachable.
    fn shortest_path(&self, sources: &[usize], target: usize) -> Option<Walk> {
        #[derive(PartialEq, Eq, PartialOrd, Ord)]
        struct HeapEntry {
            state: PathState,
            node: usize,
            // (edge index, node the walk entered the edge from), in order
            edges: Vec<(usize, usize)>,
        }

        let mut best: HashMap<usize, PathState> = HashMap::new();
        let mut heap: BinaryHeap<Reverse<HeapEntry>> = BinaryHeap::new();

        for &source in sources {
            let state = PathState {
                cost: 0,
                hops: 0,
                names: vec![self.nodes[source].name.clone()],
            };
            if best
                .get(&source)
                .map(|existing| state < *existing)
                .unwrap_or(true)
            {
                best.insert(source, state.clone());
                heap.push(Reverse(HeapEntry {
                    state,
                    node: source,
                    edges: Vec::new(),
                }));
            }
        }

        while let Some(Reverse(entry)) = heap.pop() {
            if best
                .get(&entry.node)
                .map(|known| entry.state > *known)
                .unwrap_or(false)
            {
                continue;
            }
            if entry.node == target {
                return Some(Walk {
                    state: entry.state,
                    edges: entry.edges,
                });
            }
            for &edge_idx in &self.adjacency[entry.node] {
                let edge = &self.edges[edge_idx];
                let neighbor = edge.other(entry.node);
                if neighbor == entry.node {
                    // Self-referencing foreign key; useless for pathfinding.
                    continue;
                }
                let mut names = entry.state.names.clone();
                names.push(self.nodes[neighbor].name.clone());
                let candidate = PathState {
                    cost: entry.state.cost + u64::from(edge.weight),
                    hops: entry.state.hops + 1,
                    names,
                };
                if best
                    .get(&neighbor)
                    .map(|existing| candidate < *existing)
                    .unwrap_or(true)
                {
                    best.insert(neighbor, candidate.clone());
                    let mut edges = entry.edges.clone();
                    edges.push((edge_idx, entry.node));
                    heap.push(Reverse(HeapEntry {
                        state: candidate,
                        node: neighbor,
                        edges,
                    }));
                }
            }
        }

        None
    }

    fn extend_plan(
        &self,
        plan: &mut JoinPlan,
        covered: &mut HashSet<usize>,
        used_edges: &mut HashSet<usize>,
        walk: Walk,
    ) {
        if walk.edges.is_empty() {
            // Single-node walk: the target was already a source.
            if let Some(name) = walk.state.names.first() {
                if let Some(&idx) = self.by_name.get(name) {
                    covered.insert(idx);
                    plan.tables.insert(name.clone());
                }
            }
            return;
        }
        for (edge_idx, from) in walk.edges {
            let edge = &self.edges[edge_idx];
            let to = edge.other(from);
            covered.insert(from);
            covered.insert(to);
            plan.tables.insert(self.nodes[from].name.clone());
            plan.tables.insert(self.nodes[to].name.clone());
            used_edges.insert(edge_idx);
        }
    }
}

struct Walk {
    state: PathState,
    edges: Vec<(usize, usize)>,
}
