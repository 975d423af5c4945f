//! Subtask DAG: validation and structural analysis.
//!
//! The graph is stored as a flat array of subtasks; edges are the
//! dependency lists. Dependents are derived on demand from the forward
//! edges, so there is no cyclic ownership anywhere in the model.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tier::Complexity;

/// A single planner-produced unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTask {
    pub id: u32,
    pub description: String,
    pub complexity: Complexity,
    #[serde(default)]
    pub dependencies: Vec<u32>,
}

/// Validation failures for a planner-produced graph. All of these are
/// fatal: an invalid graph never reaches the allocator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("task graph contains no subtasks")]
    Empty,

    #[error("subtask {subtask} declared more than once")]
    DuplicateId { subtask: u32 },

    #[error("subtask {subtask} depends on non-existent subtask {dependency}")]
    UnknownDependency { subtask: u32, dependency: u32 },

    #[error("subtask {subtask} depends on itself")]
    SelfDependency { subtask: u32 },

    #[error("cycle detected involving subtask {subtask}")]
    Cycle { subtask: u32 },
}

/// Ordered sequence of subtasks forming a DAG. Immutable once planned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskGraph {
    pub subtasks: Vec<SubTask>,
}

impl TaskGraph {
    pub fn new(subtasks: Vec<SubTask>) -> Self {
        Self { subtasks }
    }

    pub fn len(&self) -> usize {
        self.subtasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subtasks.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&SubTask> {
        self.subtasks.iter().find(|s| s.id == id)
    }

    /// Check reference integrity and acyclicity. Cycle detection is DFS
    /// with visited/on-stack marking per node.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.subtasks.is_empty() {
            return Err(GraphError::Empty);
        }

        let mut ids = std::collections::HashSet::new();
        for s in &self.subtasks {
            if !ids.insert(s.id) {
                return Err(GraphError::DuplicateId { subtask: s.id });
            }
        }
        for s in &self.subtasks {
            for &dep in &s.dependencies {
                if dep == s.id {
                    return Err(GraphError::SelfDependency { subtask: s.id });
                }
                if !ids.contains(&dep) {
                    return Err(GraphError::UnknownDependency {
                        subtask: s.id,
                        dependency: dep,
                    });
                }
            }
        }

        let adj: HashMap<u32, &[u32]> = self
            .subtasks
            .iter()
            .map(|s| (s.id, s.dependencies.as_slice()))
            .collect();

        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            OnStack,
            Done,
        }

        let mut marks: HashMap<u32, Mark> = adj.keys().map(|&id| (id, Mark::New)).collect();

        fn dfs(
            node: u32,
            adj: &HashMap<u32, &[u32]>,
            marks: &mut HashMap<u32, Mark>,
        ) -> Result<(), GraphError> {
            match marks[&node] {
                Mark::OnStack => return Err(GraphError::Cycle { subtask: node }),
                Mark::Done => return Ok(()),
                Mark::New => {}
            }
            marks.insert(node, Mark::OnStack);
            for &dep in adj[&node] {
                dfs(dep, adj, marks)?;
            }
            marks.insert(node, Mark::Done);
            Ok(())
        }

        for s in &self.subtasks {
            dfs(s.id, &adj, &mut marks)?;
        }
        Ok(())
    }

    /// Reverse adjacency: dependency id → ids that depend on it.
    pub fn dependents(&self) -> HashMap<u32, Vec<u32>> {
        let mut out: HashMap<u32, Vec<u32>> = HashMap::new();
        for s in &self.subtasks {
            for &dep in &s.dependencies {
                out.entry(dep).or_default().push(s.id);
            }
        }
        out
    }

    /// Deterministic execution order: Kahn's algorithm with ascending-id
    /// tie-break. Two runs over the same graph always yield the same
    /// sequence regardless of subtask insertion order.
    pub fn topo_order(&self) -> Vec<u32> {
        let mut in_degree: HashMap<u32, usize> = self
            .subtasks
            .iter()
            .map(|s| (s.id, s.dependencies.len()))
            .collect();
        let dependents = self.dependents();

        let mut ready: BinaryHeap<Reverse<u32>> = in_degree
            .iter()
            .filter(|&(_, &deg)| deg == 0)
            .map(|(&id, _)| Reverse(id))
            .collect();

        let mut order = Vec::with_capacity(self.subtasks.len());
        while let Some(Reverse(id)) = ready.pop() {
            order.push(id);
            if let Some(children) = dependents.get(&id) {
                for &child in children {
                    let deg = in_degree.get_mut(&child).unwrap();
                    *deg -= 1;
                    if *deg == 0 {
                        ready.push(Reverse(child));
                    }
                }
            }
        }
        order
    }

    /// The terminal (user-visible deliverable) subtask: last in
    /// topological order.
    pub fn terminal_id(&self) -> Option<u32> {
        self.topo_order().last().copied()
    }

    /// Critical depth per subtask: the longest path from the subtask to
    /// any sink. Sinks have depth 0. Subtasks closer to the deliverable
    /// are more critical and are degraded last.
    pub fn critical_depths(&self) -> HashMap<u32, u32> {
        let dependents = self.dependents();
        let mut cache: HashMap<u32, u32> = HashMap::new();

        fn depth(
            id: u32,
            dependents: &HashMap<u32, Vec<u32>>,
            cache: &mut HashMap<u32, u32>,
        ) -> u32 {
            if let Some(&d) = cache.get(&id) {
                return d;
            }
            let d = match dependents.get(&id) {
                None => 0,
                Some(children) if children.is_empty() => 0,
                Some(children) => {
                    1 + children
                        .iter()
                        .map(|&c| depth(c, dependents, cache))
                        .max()
                        .unwrap_or(0)
                }
            };
            cache.insert(id, d);
            d
        }

        for s in &self.subtasks {
            depth(s.id, &dependents, &mut cache);
        }
        cache
    }

    /// Subtask ids sorted least critical first; ties broken by id. A
    /// node far from every sink is the least critical; sinks (the
    /// synthesis nodes) come last so they are degraded last.
    pub fn criticality_order(&self) -> Vec<u32> {
        let depths = self.critical_depths();
        let mut ids: Vec<u32> = self.subtasks.iter().map(|s| s.id).collect();
        ids.sort_by_key(|id| (Reverse(depths[id]), *id));
        ids
    }

    /// Longest chain through the graph, in edges.
    pub fn max_depth(&self) -> u32 {
        let by_id: HashMap<u32, &SubTask> = self.subtasks.iter().map(|s| (s.id, s)).collect();
        let mut cache: HashMap<u32, u32> = HashMap::new();

        fn depth(id: u32, by_id: &HashMap<u32, &SubTask>, cache: &mut HashMap<u32, u32>) -> u32 {
            if let Some(&d) = cache.get(&id) {
                return d;
            }
            let deps = &by_id[&id].dependencies;
            let d = if deps.is_empty() {
                0
            } else {
                1 + deps.iter().map(|&p| depth(p, by_id, cache)).max().unwrap()
            };
            cache.insert(id, d);
            d
        }

        self.subtasks
            .iter()
            .map(|s| depth(s.id, &by_id, &mut cache))
            .max()
            .unwrap_or(0)
    }

    /// Number of source subtasks (no dependencies); these could run
    /// concurrently.
    pub fn source_count(&self) -> usize {
        self.subtasks
            .iter()
            .filter(|s| s.dependencies.is_empty())
            .count()
    }

    pub fn complexity_distribution(&self) -> HashMap<String, usize> {
        let mut dist: HashMap<String, usize> = [
            ("low".to_string(), 0),
            ("medium".to_string(), 0),
            ("high".to_string(), 0),
        ]
        .into_iter()
        .collect();
        for s in &self.subtasks {
            *dist.entry(s.complexity.as_str().to_string()).or_default() += 1;
        }
        dist
    }
}
