//! Term dependency graph.
//!
//! [`TermGraph`] interns every term reachable from a pipeline's outputs by
//! structural value, so a term mentioned twice becomes one node, and orders
//! the nodes so each appears after everything it reads. The traversal itself
//! is written against the [`Dependencies`] trait and knows nothing about
//! terms.

use crate::error::{EngineError, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use strata_terms::{BoundColumn, Term};

/// A graph that can list the direct dependencies of a node.
pub trait Dependencies {
    /// Node type.
    type Node: Clone + Eq + Hash + fmt::Display;

    /// Direct dependencies of `node`, in evaluation order.
    fn dependencies(&self, node: &Self::Node) -> Vec<Self::Node>;
}

/// Depth-first topological order of everything reachable from `roots`.
///
/// Dependencies come before their consumers, and ties follow the order of
/// `roots` and of each node's dependency list, so the order is deterministic.
/// A cycle fails with [`EngineError::CyclicDependency`] naming the chain.
pub fn topological_order<D: Dependencies>(graph: &D, roots: &[D::Node]) -> Result<Vec<D::Node>> {
    let mut walk = Walk {
        order: Vec::new(),
        done: HashSet::new(),
        in_progress: HashSet::new(),
        stack: Vec::new(),
    };
    for root in roots {
        walk.visit(graph, root)?;
    }
    Ok(walk.order)
}

struct Walk<N> {
    order: Vec<N>,
    done: HashSet<N>,
    in_progress: HashSet<N>,
    stack: Vec<N>,
}

impl<N: Clone + Eq + Hash + fmt::Display> Walk<N> {
    fn visit<D: Dependencies<Node = N>>(&mut self, graph: &D, node: &N) -> Result<()> {
        if self.done.contains(node) {
            return Ok(());
        }
        if self.in_progress.contains(node) {
            let start = self.stack.iter().position(|n| n == node).unwrap_or(0);
            let mut chain: Vec<String> = self.stack[start..].iter().map(ToString::to_string).collect();
            chain.push(node.to_string());
            return Err(EngineError::CyclicDependency { chain });
        }
        self.in_progress.insert(node.clone());
        self.stack.push(node.clone());
        for dependency in graph.dependencies(node) {
            self.visit(graph, &dependency)?;
        }
        self.stack.pop();
        self.in_progress.remove(node);
        self.done.insert(node.clone());
        self.order.push(node.clone());
        Ok(())
    }
}

/// Dependency of one node on another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// Index of the dependency in [`TermGraph::terms`].
    pub node: usize,
    /// History rows the consumer needs from this dependency beyond its own:
    /// `window_length - 1` for windowed inputs, 0 for elementwise inputs and
    /// for the mask.
    pub extra_rows: usize,
    /// True if this edge is the consumer's mask rather than an input.
    pub is_mask: bool,
}

/// Edges of `term`: its inputs, then its mask. Terms without an explicit
/// mask read the root [`Term::asset_exists`] mask.
fn term_edges(term: &Term) -> Vec<(Term, usize, bool)> {
    if term.is_loadable() {
        return Vec::new();
    }
    let extra = term.window_length().saturating_sub(1);
    let mut edges: Vec<(Term, usize, bool)> = term
        .inputs()
        .iter()
        .map(|input| (input.clone(), extra, false))
        .collect();
    let mask = term.mask().cloned().unwrap_or_else(Term::asset_exists);
    edges.push((mask, 0, true));
    edges
}

#[derive(Debug, Clone, Copy)]
struct TermDependencies;

impl Dependencies for TermDependencies {
    type Node = Term;

    fn dependencies(&self, node: &Term) -> Vec<Term> {
        term_edges(node).into_iter().map(|(term, _, _)| term).collect()
    }
}

/// Deduplicated terms of a pipeline in topological order.
#[derive(Debug, Clone)]
pub struct TermGraph {
    terms: Vec<Term>,
    index: HashMap<Term, usize>,
    edges: Vec<Vec<Edge>>,
    outputs: BTreeMap<String, usize>,
    screen: Option<usize>,
}

impl TermGraph {
    /// Compile the graph of `outputs` and an optional `screen`.
    pub fn new(outputs: &BTreeMap<String, Term>, screen: Option<&Term>) -> Result<Self> {
        let roots: Vec<Term> = outputs.values().chain(screen).cloned().collect();
        let terms = topological_order(&TermDependencies, &roots)?;
        let index: HashMap<Term, usize> = terms
            .iter()
            .enumerate()
            .map(|(i, term)| (term.clone(), i))
            .collect();

        let mut edges = Vec::with_capacity(terms.len());
        for term in &terms {
            let node_edges = term_edges(term)
                .into_iter()
                .filter_map(|(dependency, extra_rows, is_mask)| {
                    index.get(&dependency).map(|&node| Edge {
                        node,
                        extra_rows,
                        is_mask,
                    })
                })
                .collect();
            edges.push(node_edges);
        }

        let outputs = outputs
            .iter()
            .filter_map(|(name, term)| index.get(term).map(|&i| (name.clone(), i)))
            .collect();
        let screen = screen.and_then(|term| index.get(term).copied());

        Ok(Self {
            terms,
            index,
            edges,
            outputs,
            screen,
        })
    }

    /// Number of distinct terms.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// True if the graph has no terms.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Terms in topological order.
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Term at `node`.
    pub fn term(&self, node: usize) -> &Term {
        &self.terms[node]
    }

    /// Node index of `term`, if it is in the graph.
    pub fn index_of(&self, term: &Term) -> Option<usize> {
        self.index.get(term).copied()
    }

    /// Dependencies of `node`: inputs in order, then the mask.
    pub fn edges(&self, node: usize) -> &[Edge] {
        &self.edges[node]
    }

    /// Output name to node.
    pub const fn outputs(&self) -> &BTreeMap<String, usize> {
        &self.outputs
    }

    /// Screen node, if any.
    pub const fn screen(&self) -> Option<usize> {
        self.screen
    }

    /// True if `node` is an output or the screen.
    pub fn is_root(&self, node: usize) -> bool {
        self.screen == Some(node) || self.outputs.values().any(|&i| i == node)
    }

    /// Dataset columns read by the graph, with their nodes.
    pub fn columns(&self) -> impl Iterator<Item = (usize, &BoundColumn)> {
        self.terms
            .iter()
            .enumerate()
            .filter_map(|(i, term)| term.column().map(|column| (i, column)))
    }
}
