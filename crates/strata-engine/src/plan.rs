//! Execution plans: how much history each term needs and in what order to
//! compute the terms.

use crate::error::{EngineError, Result};
use crate::graph::{Edge, TermGraph};
use chrono::NaiveDate;
use strata_terms::Term;

/// A [`TermGraph`] annotated with the extra history rows of every node.
///
/// A term's extra rows are the sessions before the first output date it must
/// be computed for so that every consumer gets full windows:
/// `extra_rows(t) = max over consumers c of extra_rows(c) + c.window_length - 1`
/// (the `- 1` part only for inputs, never for masks), with the outputs
/// themselves at 0.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    graph: TermGraph,
    extra_rows: Vec<usize>,
    levels: Vec<Vec<usize>>,
    consumers: Vec<usize>,
}

impl ExecutionPlan {
    /// Plan `graph` for the sessions `sessions[start_idx..=end_idx]`.
    ///
    /// Fails with [`EngineError::InsufficientHistory`] when some term needs
    /// more sessions before `start_idx` than `sessions` holds. Nothing is
    /// loaded before this check runs.
    pub fn new(graph: TermGraph, sessions: &[NaiveDate], start_idx: usize, end_idx: usize) -> Result<Self> {
        if start_idx > end_idx || end_idx >= sessions.len() {
            return Err(EngineError::InvalidConfig(format!(
                "session range {start_idx}..={end_idx} is outside a calendar of {} sessions",
                sessions.len()
            )));
        }

        let n = graph.len();
        let mut extra_rows = vec![0usize; n];
        for node in (0..n).rev() {
            for edge in graph.edges(node) {
                let needed = extra_rows[node] + edge.extra_rows;
                if needed > extra_rows[edge.node] {
                    extra_rows[edge.node] = needed;
                }
            }
        }

        if let Some((node, &extra)) = extra_rows
            .iter()
            .enumerate()
            .rev()
            .max_by_key(|(_, extra)| **extra)
            .filter(|(_, extra)| **extra > start_idx)
        {
            return Err(EngineError::InsufficientHistory {
                term: graph.term(node).to_string(),
                extra_rows: extra,
                available: start_idx,
            });
        }

        let mut level = vec![0usize; n];
        let mut consumers = vec![0usize; n];
        for node in 0..n {
            let mut deps: Vec<usize> = graph.edges(node).iter().map(|e| e.node).collect();
            deps.sort_unstable();
            deps.dedup();
            for &dep in &deps {
                level[node] = level[node].max(level[dep] + 1);
                consumers[dep] += 1;
            }
        }
        let depth = level.iter().max().map_or(0, |l| l + 1);
        let mut levels = vec![Vec::new(); depth];
        for (node, &l) in level.iter().enumerate() {
            levels[l].push(node);
        }

        Ok(Self {
            graph,
            extra_rows,
            levels,
            consumers,
        })
    }

    /// The planned graph.
    pub const fn graph(&self) -> &TermGraph {
        &self.graph
    }

    /// Number of distinct terms.
    pub fn node_count(&self) -> usize {
        self.graph.len()
    }

    /// Terms in the order they can be computed.
    pub fn execution_order(&self) -> &[Term] {
        self.graph.terms()
    }

    /// Nodes grouped by dependency depth. Nodes in one level do not depend
    /// on each other.
    pub fn levels(&self) -> &[Vec<usize>] {
        &self.levels
    }

    /// Extra rows of `term`, if it is in the plan.
    pub fn extra_rows(&self, term: &Term) -> Option<usize> {
        self.graph.index_of(term).map(|node| self.extra_rows[node])
    }

    /// Extra rows of a node.
    pub fn node_extra_rows(&self, node: usize) -> usize {
        self.extra_rows[node]
    }

    /// Largest extra rows over all nodes.
    pub fn max_extra_rows(&self) -> usize {
        self.extra_rows.iter().copied().max().unwrap_or(0)
    }

    /// Number of distinct nodes reading `node`.
    pub fn consumer_count(&self, node: usize) -> usize {
        self.consumers[node]
    }

    /// Rows of `input`'s array to skip so that its traversal (or block)
    /// lines up with `term`'s first output row.
    pub fn offset(&self, term: &Term, input: &Term) -> Option<usize> {
        let node = self.graph.index_of(term)?;
        let dep = self.graph.index_of(input)?;
        self.graph
            .edges(node)
            .iter()
            .find(|edge| edge.node == dep)
            .map(|edge| self.edge_offset(node, edge))
    }

    /// Offset of one edge of `node`.
    pub fn edge_offset(&self, node: usize, edge: &Edge) -> usize {
        self.extra_rows[edge.node] - self.extra_rows[node] - edge.extra_rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;
    use rstest::rstest;
    use std::collections::BTreeMap;
    use strata_terms::{Factor, builtins, equity_pricing};

    fn close() -> Factor {
        Factor::try_from_term(equity_pricing().column("close").unwrap().term()).unwrap()
    }

    fn sessions(n: u64) -> Vec<NaiveDate> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..n).map(|i| start + Days::new(i)).collect()
    }

    fn graph_of(outputs: Vec<(&str, Term)>) -> TermGraph {
        let outputs: BTreeMap<String, Term> =
            outputs.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        TermGraph::new(&outputs, None).unwrap()
    }

    #[test]
    fn test_extra_rows_take_max_over_consumers() {
        let sma5 = builtins::simple_moving_average(&close(), 5).unwrap();
        let sma3 = builtins::simple_moving_average(&close(), 3).unwrap();
        let graph = graph_of(vec![("a", sma5.term().clone()), ("b", sma3.term().clone())]);
        let plan = ExecutionPlan::new(graph, &sessions(20), 10, 19).unwrap();

        assert_eq!(plan.extra_rows(close().term()), Some(4));
        assert_eq!(plan.extra_rows(sma5.term()), Some(0));
        assert_eq!(plan.offset(sma5.term(), close().term()), Some(0));
        assert_eq!(plan.offset(sma3.term(), close().term()), Some(2));
        assert_eq!(plan.max_extra_rows(), 4);
    }

    #[test]
    fn test_extra_rows_accumulate_through_windows() {
        let sma5 = builtins::simple_moving_average(&close(), 5).unwrap();
        let ranked = sma5.rank(Default::default()).unwrap();
        let smoothed = builtins::simple_moving_average(&ranked, 3).unwrap();
        let graph = graph_of(vec![("x", smoothed.term().clone())]);
        let plan = ExecutionPlan::new(graph, &sessions(20), 10, 19).unwrap();
        assert_eq!(plan.extra_rows(ranked.term()), Some(2));
        assert_eq!(plan.extra_rows(sma5.term()), Some(2));
        assert_eq!(plan.extra_rows(close().term()), Some(6));
    }

    #[rstest]
    #[case(3, true)]
    #[case(4, false)]
    fn test_history_check(#[case] start_idx: usize, #[case] fails: bool) {
        let sma = builtins::simple_moving_average(&close(), 5).unwrap();
        let graph = graph_of(vec![("sma", sma.term().clone())]);
        let result = ExecutionPlan::new(graph, &sessions(10), start_idx, 9);
        match result {
            Err(EngineError::InsufficientHistory {
                term,
                extra_rows,
                available,
            }) => {
                assert!(fails);
                assert_eq!(term, close().term().to_string());
                assert_eq!((extra_rows, available), (4, start_idx));
            }
            Ok(_) => assert!(!fails),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_levels_respect_dependencies() {
        let sma = builtins::simple_moving_average(&close(), 2).unwrap();
        let ranked = sma.rank(Default::default()).unwrap();
        let graph = graph_of(vec![("rank", ranked.term().clone())]);
        let plan = ExecutionPlan::new(graph, &sessions(5), 2, 4).unwrap();

        let graph = plan.graph();
        let level_of = |term: &Term| {
            let node = graph.index_of(term).unwrap();
            plan.levels().iter().position(|l| l.contains(&node)).unwrap()
        };
        assert_eq!(level_of(close().term()), 0);
        assert_eq!(level_of(&Term::asset_exists()), 0);
        assert_eq!(level_of(sma.term()), 1);
        assert_eq!(level_of(ranked.term()), 2);
        assert_eq!(plan.node_count(), 4);
        assert_eq!(plan.execution_order().len(), 4);
        assert_eq!(plan.consumer_count(graph.index_of(&Term::asset_exists()).unwrap()), 2);
    }

    #[test]
    fn test_rejects_bad_session_range() {
        let graph = graph_of(vec![("c", close().term().clone())]);
        assert!(matches!(
            ExecutionPlan::new(graph, &sessions(5), 3, 5),
            Err(EngineError::InvalidConfig(_))
        ));
    }
}
