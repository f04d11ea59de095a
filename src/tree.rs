//! Branch forest construction.
//!
//! A branch is nested under the nearest other branch whose tip precedes its
//! own tip. Branch B precedes branch A when B's tip is a strict ancestor of
//! A's tip, or when both point at the same commit and B's name sorts first.
//! Branches nothing precedes become roots.

use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet, HashMap},
};

use git2::Oid;

use crate::error::AncestryError;

/// A local branch and the commit it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub name: String,
    /// `None` when the ref does not peel to a readable commit.
    pub tip: Option<Oid>,
}

#[cfg(test)]
impl Branch {
    pub fn new(name: impl Into<String>, tip: Oid) -> Self {
        Self {
            name: name.into(),
            tip: Some(tip),
        }
    }

    pub fn without_tip(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tip: None,
        }
    }
}

/// Read-only commit ancestry queries.
pub trait CommitGraph {
    /// Whether `ancestor` is reachable from `descendant`. A commit is its own
    /// ancestor.
    fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> Result<bool, git2::Error>;

    /// Number of commits reachable from `descendant` but not from `ancestor`.
    fn distance(&self, ancestor: Oid, descendant: Oid) -> Result<usize, git2::Error>;

    /// Walk every commit reachable from `tip`, failing if any of them cannot
    /// be read.
    fn verify_history(&self, tip: Oid) -> Result<(), git2::Error>;
}

/// Caches ancestry answers and history checks for the lifetime of one forest
/// build.
struct Memoized<'g, G: ?Sized> {
    graph: &'g G,
    ancestry: RefCell<HashMap<(Oid, Oid), bool>>,
    histories: RefCell<HashMap<Oid, Result<(), git2::Error>>>,
}

impl<'g, G: CommitGraph + ?Sized> Memoized<'g, G> {
    fn new(graph: &'g G) -> Self {
        Self {
            graph,
            ancestry: RefCell::new(HashMap::new()),
            histories: RefCell::new(HashMap::new()),
        }
    }
}

fn copy_error(error: &git2::Error) -> git2::Error {
    git2::Error::new(error.code(), error.class(), error.message())
}

impl<G: CommitGraph + ?Sized> CommitGraph for Memoized<'_, G> {
    fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> Result<bool, git2::Error> {
        if let Some(&known) = self.ancestry.borrow().get(&(ancestor, descendant)) {
            return Ok(known);
        }
        let answer = self.graph.is_ancestor(ancestor, descendant)?;
        self.ancestry
            .borrow_mut()
            .insert((ancestor, descendant), answer);
        Ok(answer)
    }

    fn distance(&self, ancestor: Oid, descendant: Oid) -> Result<usize, git2::Error> {
        self.graph.distance(ancestor, descendant)
    }

    fn verify_history(&self, tip: Oid) -> Result<(), git2::Error> {
        if let Some(known) = self.histories.borrow().get(&tip) {
            return known.as_ref().map(|_| ()).map_err(copy_error);
        }
        let result = self.graph.verify_history(tip);
        let cached = result.as_ref().map(|_| ()).map_err(copy_error);
        self.histories.borrow_mut().insert(tip, cached);
        result
    }
}

fn precedes<G: CommitGraph + ?Sized>(
    graph: &G,
    (earlier_name, earlier_tip): (&str, Oid),
    (later_name, later_tip): (&str, Oid),
) -> Result<bool, git2::Error> {
    if earlier_tip == later_tip {
        return Ok(earlier_name < later_name);
    }
    graph.is_ancestor(earlier_tip, later_tip)
}

/// Decide who a failed query between `branch` and `candidate` belongs to.
///
/// If `branch`'s own history is unreadable the branch cannot be placed at
/// all. Otherwise the candidate is at fault and is only dropped.
fn blame_failed_query<G: CommitGraph + ?Sized>(
    graph: &G,
    branch: &Branch,
    tip: Oid,
    candidate: &Branch,
    error: git2::Error,
) -> Result<(), AncestryError> {
    graph
        .verify_history(tip)
        .map_err(|source| AncestryError::Query {
            branch: branch.name.clone(),
            source,
        })?;
    tracing::warn!(
        branch = %branch.name,
        candidate = %candidate.name,
        %error,
        "Ignoring candidate ancestor whose history could not be read"
    );
    Ok(())
}

/// Find the branch `branch` should be nested under, if any.
///
/// Candidates are the branches preceding `branch`; a candidate that precedes
/// another candidate is not the nearest one. If several candidates remain
/// (the branch merged two lines of work), the one fewest commits away wins,
/// then the lexicographically smaller name.
///
/// A query that fails fails `branch` only when `branch`'s own history is
/// unreadable; a candidate with unreadable history is left out instead.
pub fn resolve_ancestor<'b, G: CommitGraph + ?Sized>(
    graph: &G,
    branches: &'b [Branch],
    branch: &Branch,
) -> Result<Option<&'b Branch>, AncestryError> {
    let tip = branch.tip.ok_or_else(|| AncestryError::UnresolvedTip {
        branch: branch.name.clone(),
    })?;

    let mut candidates: Vec<(&'b Branch, Oid)> = Vec::new();
    for other in branches {
        let Some(other_tip) = other.tip else {
            continue;
        };
        if other.name == branch.name {
            continue;
        }
        match precedes(graph, (other.name.as_str(), other_tip), (branch.name.as_str(), tip)) {
            Ok(true) => candidates.push((other, other_tip)),
            Ok(false) => {}
            Err(error) => blame_failed_query(graph, branch, tip, other, error)?,
        }
    }

    let mut nearest = Vec::new();
    for &(candidate, candidate_tip) in &candidates {
        let mut shadowed = false;
        for &(other, other_tip) in &candidates {
            if other.name == candidate.name {
                continue;
            }
            match precedes(
                graph,
                (candidate.name.as_str(), candidate_tip),
                (other.name.as_str(), other_tip),
            ) {
                Ok(false) => {}
                Ok(true) => {
                    shadowed = true;
                    break;
                }
                Err(error) => {
                    if graph.verify_history(candidate_tip).is_err() {
                        tracing::warn!(
                            branch = %branch.name,
                            candidate = %candidate.name,
                            %error,
                            "Ignoring candidate ancestor whose history could not be read"
                        );
                        shadowed = true;
                        break;
                    }
                    // `other` is the unreadable one; it is dropped on its own turn.
                }
            }
        }
        if !shadowed {
            nearest.push((candidate, candidate_tip));
        }
    }

    if nearest.len() <= 1 {
        return Ok(nearest.first().map(|&(candidate, _)| candidate));
    }

    let mut best: Option<(usize, &'b Branch)> = None;
    for (candidate, candidate_tip) in nearest {
        let distance = match graph.distance(candidate_tip, tip) {
            Ok(distance) => distance,
            Err(error) => {
                blame_failed_query(graph, branch, tip, candidate, error)?;
                continue;
            }
        };
        tracing::debug!(
            branch = %branch.name,
            candidate = %candidate.name,
            distance,
            "Comparing equally near ancestor branches"
        );
        let closer = match best {
            None => true,
            Some((best_distance, best_branch)) => {
                (distance, &candidate.name) < (best_distance, &best_branch.name)
            }
        };
        if closer {
            best = Some((distance, candidate));
        }
    }
    Ok(best.map(|(_, candidate)| candidate))
}

/// One branch in the forest.
#[derive(Debug)]
pub struct Node {
    pub branch: Branch,
    pub parent: Option<String>,
    /// Child branch names, sorted.
    pub children: Vec<String>,
    /// Set when the branch could not be placed; such branches are roots.
    pub error: Option<AncestryError>,
}

/// Local branches grouped into trees, ordered by name at every level.
#[derive(Debug, Default)]
pub struct Forest {
    nodes: BTreeMap<String, Node>,
    roots: Vec<String>,
    current: Option<String>,
}

type Placement = Result<Option<String>, AncestryError>;

impl Forest {
    fn assemble(branches: Vec<Branch>, mut placements: BTreeMap<String, Placement>) -> Self {
        let mut nodes: BTreeMap<String, Node> = branches
            .into_iter()
            .map(|branch| {
                let node = Node {
                    branch: branch.clone(),
                    parent: None,
                    children: Vec::new(),
                    error: None,
                };
                (branch.name, node)
            })
            .collect();

        let names: Vec<String> = nodes.keys().cloned().collect();
        for name in &names {
            match placements.remove(name) {
                Some(Ok(Some(parent))) => {
                    let Some(parent_node) = nodes.get_mut(&parent) else {
                        continue;
                    };
                    parent_node.children.push(name.clone());
                    if let Some(node) = nodes.get_mut(name) {
                        node.parent = Some(parent);
                    }
                }
                Some(Err(error)) => {
                    tracing::warn!(branch = %name, %error, "Showing branch as a root");
                    if let Some(node) = nodes.get_mut(name) {
                        node.error = Some(error);
                    }
                }
                Some(Ok(None)) | None => {}
            }
        }

        let roots = nodes
            .values()
            .filter(|node| node.parent.is_none())
            .map(|node| node.branch.name.clone())
            .collect();

        Self {
            nodes,
            roots,
            current: None,
        }
    }

    /// Mark the checked-out branch.
    pub fn with_current(mut self, current: Option<String>) -> Self {
        self.current = current;
        self
    }

    pub fn is_current(&self, name: &str) -> bool {
        self.current.as_deref() == Some(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> impl Iterator<Item = &Node> {
        self.roots.iter().filter_map(|name| self.nodes.get(name))
    }

    pub fn children<'a>(&'a self, node: &'a Node) -> impl Iterator<Item = &'a Node> {
        node.children
            .iter()
            .filter_map(|name| self.nodes.get(name))
    }

    pub fn failures(&self) -> impl Iterator<Item = &AncestryError> {
        self.nodes.values().filter_map(|node| node.error.as_ref())
    }

    /// True when there are branches and none of them could be placed.
    pub fn all_failed(&self) -> bool {
        !self.is_empty() && self.nodes.values().all(|node| node.error.is_some())
    }
}

#[cfg(test)]
impl Forest {
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    /// Parent chain of `name`, nearest first.
    pub fn ancestors(&self, name: &str) -> Vec<&str> {
        let mut chain = Vec::new();
        let mut cursor = self.nodes.get(name).and_then(|node| node.parent.as_deref());
        while let Some(parent) = cursor {
            if chain.len() > self.nodes.len() {
                break;
            }
            chain.push(parent);
            cursor = self.nodes.get(parent).and_then(|node| node.parent.as_deref());
        }
        chain
    }
}

fn sorted(branches: &[Branch]) -> Vec<Branch> {
    let mut sorted = branches.to_vec();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    sorted
}

/// Nest every branch under its nearest ancestor branch.
pub fn build_forest<G: CommitGraph + ?Sized>(graph: &G, branches: &[Branch]) -> Forest {
    let graph = Memoized::new(graph);
    let branches = sorted(branches);
    let placements = branches
        .iter()
        .map(|branch| {
            let placement = resolve_ancestor(&graph, &branches, branch)
                .map(|parent| parent.map(|parent| parent.name.clone()));
            (branch.name.clone(), placement)
        })
        .collect();
    Forest::assemble(branches, placements)
}

/// Nest every branch under its configured upstream.
///
/// `upstreams` maps a branch to its upstream when that upstream is itself a
/// local branch. Loops are cut at their lexicographically smallest branch,
/// which becomes an annotated root.
pub fn build_upstream_forest(branches: &[Branch], upstreams: &BTreeMap<String, String>) -> Forest {
    let branches = sorted(branches);
    let names: BTreeSet<&str> = branches.iter().map(|b| b.name.as_str()).collect();

    let mut parents: BTreeMap<String, Option<String>> = branches
        .iter()
        .map(|branch| {
            let upstream = upstreams
                .get(&branch.name)
                .filter(|upstream| **upstream != branch.name && names.contains(upstream.as_str()))
                .cloned();
            (branch.name.clone(), upstream)
        })
        .collect();

    let mut cycles: BTreeMap<String, AncestryError> = BTreeMap::new();
    for start in &names {
        let mut path: Vec<String> = Vec::new();
        let mut cursor = Some(start.to_string());
        while let Some(name) = cursor {
            if let Some(pos) = path.iter().position(|seen| *seen == name) {
                let looped = &path[pos..];
                if let Some((offset, smallest)) =
                    looped.iter().enumerate().min_by(|a, b| a.1.cmp(b.1))
                {
                    let mut cycle: Vec<String> = looped[offset..]
                        .iter()
                        .chain(&looped[..offset])
                        .cloned()
                        .collect();
                    cycle.push(smallest.clone());
                    parents.insert(smallest.clone(), None);
                    cycles.insert(
                        smallest.clone(),
                        AncestryError::UpstreamCycle {
                            branch: smallest.clone(),
                            cycle,
                        },
                    );
                }
                break;
            }
            cursor = parents.get(&name).cloned().flatten();
            path.push(name);
        }
    }

    let placements = parents
        .into_iter()
        .map(|(name, parent)| {
            let placement = match cycles.remove(&name) {
                Some(error) => Err(error),
                None => Ok(parent),
            };
            (name, placement)
        })
        .collect();
    Forest::assemble(branches, placements)
}
