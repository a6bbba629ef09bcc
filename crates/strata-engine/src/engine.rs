//! The chunked execution loop.

use crate::cancel::CancellationToken;
use crate::config::EngineConfig;
use crate::error::{EngineError, LoadError, Result};
use crate::loader::{LoadRequest, LoaderRegistry, PipelineLoader};
use crate::pipeline::Pipeline;
use crate::plan::ExecutionPlan;
use crate::prescreen::prescreen_assets;
use crate::universe::AssetUniverse;
use chrono::NaiveDate;
use ndarray::{Array2, Axis, s};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use strata_adjusted::{AdjustedArray, ArrayData, ArrayError};
use strata_output::{ColumnValues, PipelineResult};
use strata_terms::{BoundColumn, ComputeContext, Domain, Sid, Term, TermInput, evaluate};
use tracing::{debug, info, info_span, warn};

/// Runs pipelines against registered loaders and an asset universe.
#[derive(Debug, Clone)]
pub struct PipelineEngine {
    loaders: LoaderRegistry,
    universe: Arc<dyn AssetUniverse>,
    default_domain: Domain,
    config: EngineConfig,
}

/// Rows and assets shared by every node of one chunk.
struct Chunk<'a> {
    domain: &'a Domain,
    /// Sessions from the start of the deepest history to the chunk end
    dates: &'a [NaiveDate],
    /// Rows of `dates` before the first output session
    history: usize,
    sids: Vec<Sid>,
    root_mask: Array2<bool>,
}

impl Chunk<'_> {
    /// First row of `dates` covered by a node with `extra_rows` history.
    const fn first_row(&self, extra_rows: usize) -> usize {
        self.history - extra_rows
    }

    fn output_rows(&self) -> usize {
        self.dates.len() - self.history
    }
}

impl PipelineEngine {
    /// Engine over `loaders` and `universe`. Pipelines whose terms are all
    /// generic run on `default_domain`.
    pub fn new(
        loaders: LoaderRegistry,
        universe: Arc<dyn AssetUniverse>,
        default_domain: Domain,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            loaders,
            universe,
            default_domain,
            config,
        })
    }

    /// Engine configuration.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Compute `pipeline` for every session in `start..=end`, in chunks of the
    /// configured size.
    pub fn run_pipeline(&self, pipeline: &Pipeline, start: NaiveDate, end: NaiveDate) -> Result<PipelineResult> {
        self.run_chunked_pipeline(pipeline, start, end, self.config.chunk_size, &CancellationToken::new())
    }

    /// Compute `pipeline` for every session in `start..=end`, `chunk_size`
    /// sessions at a time.
    ///
    /// The result does not depend on `chunk_size`. `cancel` is checked before
    /// each chunk; a cancelled run fails with [`EngineError::Cancelled`] and
    /// returns nothing.
    pub fn run_chunked_pipeline(
        &self,
        pipeline: &Pipeline,
        start: NaiveDate,
        end: NaiveDate,
        chunk_size: usize,
        cancel: &CancellationToken,
    ) -> Result<PipelineResult> {
        let _span = info_span!("run_pipeline", %start, %end, chunk_size).entered();
        if chunk_size == 0 {
            return Err(EngineError::InvalidConfig("chunk_size must be positive".to_string()));
        }
        if start > end {
            return Err(EngineError::InvalidDateRange { start, end });
        }

        let domain = pipeline.domain(&self.default_domain)?;
        let calendar = domain
            .trading_calendar()
            .ok_or_else(|| EngineError::NoCalendar(domain.code().to_string()))?;
        let outside = |date| EngineError::DateOutsideCalendar {
            date,
            calendar: calendar.name().to_string(),
        };
        match (calendar.first_session(), calendar.last_session()) {
            (Some(first), _) if start < first => return Err(outside(start)),
            (_, Some(last)) if end > last => return Err(outside(end)),
            (None, _) | (_, None) => return Err(outside(start)),
            _ => {}
        }

        let graph = pipeline.to_graph()?;
        for (_, column) in graph.columns() {
            self.loaders.loader_for(column)?;
        }

        let sessions = calendar.sessions();
        let range = calendar
            .session_index_on_or_after(start)
            .zip(calendar.session_index_on_or_before(end))
            .filter(|(first, last)| first <= last);
        let Some((start_idx, end_idx)) = range else {
            debug!("no sessions in range");
            return Ok(PipelineResult::empty(graph.outputs().iter().map(|(name, &node)| {
                (name.clone(), graph.term(node).dtype())
            })));
        };

        let plan = ExecutionPlan::new(graph, sessions, start_idx, end_idx)?;
        debug!(
            nodes = plan.node_count(),
            levels = plan.levels().len(),
            max_extra_rows = plan.max_extra_rows(),
            "planned pipeline"
        );

        let mut sids = self.universe.sids();
        if self.config.prescreen
            && let Some(keep) = prescreen_assets(plan.graph())
        {
            sids.retain(|sid| keep.contains(sid));
        }

        let mut parts = Vec::new();
        let mut chunk_start = start_idx;
        while chunk_start <= end_idx {
            if cancel.is_cancelled() {
                warn!(completed_chunks = parts.len(), "pipeline cancelled");
                return Err(EngineError::Cancelled {
                    completed_chunks: parts.len(),
                });
            }
            let chunk_end = chunk_start.saturating_add(chunk_size - 1).min(end_idx);
            let part = self.run_chunk(&plan, &domain, sessions, &sids, chunk_start, chunk_end)?;
            parts.push(part);
            chunk_start = chunk_end + 1;
        }

        let result = PipelineResult::concat(parts)?;
        info!(rows = result.len(), "pipeline complete");
        Ok(result)
    }

    fn run_chunk(
        &self,
        plan: &ExecutionPlan,
        domain: &Domain,
        sessions: &[NaiveDate],
        universe_sids: &[Sid],
        chunk_start: usize,
        chunk_end: usize,
    ) -> Result<PipelineResult> {
        let _span = info_span!(
            "chunk",
            start = %sessions[chunk_start],
            end = %sessions[chunk_end]
        )
        .entered();

        let history = plan.max_extra_rows();
        let dates = &sessions[chunk_start - history..=chunk_end];
        let lifetimes = self.universe.lifetimes(dates, universe_sids);
        let alive: Vec<usize> = (0..universe_sids.len())
            .filter(|&c| lifetimes.column(c).iter().any(|&exists| exists))
            .collect();
        let chunk = Chunk {
            domain,
            dates,
            history,
            sids: alive.iter().map(|&c| universe_sids[c]).collect(),
            root_mask: lifetimes.select(Axis(1), &alive),
        };
        debug!(assets = chunk.sids.len(), rows = dates.len(), "built root mask");

        let graph = plan.graph();
        let mut workspace: Vec<Option<AdjustedArray>> = (0..plan.node_count()).map(|_| None).collect();
        if let Some(node) = graph.index_of(&Term::asset_exists()) {
            let first = chunk.first_row(plan.node_extra_rows(node));
            let mask = chunk.root_mask.slice(s![first.., ..]).to_owned();
            workspace[node] = Some(AdjustedArray::unadjusted(
                ArrayData::Bool(mask),
                graph.term(node).missing_value().clone(),
            )?);
        }
        self.load_columns(plan, &chunk, &mut workspace)?;

        let mut remaining: Vec<usize> = (0..plan.node_count()).map(|n| plan.consumer_count(n)).collect();
        for level in plan.levels() {
            let pending: Vec<usize> = level.iter().copied().filter(|&n| workspace[n].is_none()).collect();
            let compute = |&node: &usize| compute_node(plan, node, &chunk, &workspace).map(|a| (node, a));
            let computed: Vec<(usize, AdjustedArray)> = if self.config.parallel {
                pending.par_iter().map(compute).collect::<Result<_>>()?
            } else {
                pending.iter().map(compute).collect::<Result<_>>()?
            };
            for (node, array) in computed {
                workspace[node] = Some(array);
            }

            if self.config.release_intermediates {
                for &node in level {
                    let mut deps: Vec<usize> = graph.edges(node).iter().map(|e| e.node).collect();
                    deps.sort_unstable();
                    deps.dedup();
                    for dep in deps {
                        remaining[dep] -= 1;
                        if remaining[dep] == 0 && !graph.is_root(dep) {
                            workspace[dep] = None;
                        }
                    }
                }
            }
        }

        assemble(plan, &chunk, &workspace)
    }

    /// Load every column node, one request per loader and history depth.
    fn load_columns(
        &self,
        plan: &ExecutionPlan,
        chunk: &Chunk<'_>,
        workspace: &mut [Option<AdjustedArray>],
    ) -> Result<()> {
        let mut groups: BTreeMap<(usize, usize), Vec<(usize, BoundColumn)>> = BTreeMap::new();
        for (node, column) in plan.graph().columns() {
            let (loader_id, _) = self.loaders.loader_for(column)?;
            groups
                .entry((loader_id, plan.node_extra_rows(node)))
                .or_default()
                .push((node, column.clone()));
        }

        for ((loader_id, extra_rows), members) in groups {
            let Some(loader) = self.loaders.loader(loader_id) else {
                continue;
            };
            let first = chunk.first_row(extra_rows);
            let mask = chunk.root_mask.slice(s![first.., ..]).to_owned();
            let columns: Vec<BoundColumn> = members.iter().map(|(_, column)| column.clone()).collect();
            let request = LoadRequest {
                domain: chunk.domain,
                columns: &columns,
                dates: &chunk.dates[first..],
                sids: &chunk.sids,
                mask: &mask,
            };
            debug!(loader = loader_id, columns = columns.len(), extra_rows, "loading columns");
            let mut arrays = load_with_fallback(loader.as_ref(), &request)?;
            for (node, column) in members {
                let array = arrays.remove(&column).ok_or_else(|| LoadError::Source {
                    columns: vec![column.qualname()],
                    message: "loader did not return the column".to_string(),
                })?;
                check_loaded(&column, &array, request.shape())?;
                workspace[node] = Some(array);
            }
        }
        Ok(())
    }
}

/// Load `request`, retrying column by column when the batch reports
/// [`LoadError::NoData`]. Columns with no data at all become missing.
fn load_with_fallback(
    loader: &dyn PipelineLoader,
    request: &LoadRequest<'_>,
) -> Result<BTreeMap<BoundColumn, AdjustedArray>> {
    match loader.load_adjusted_array(request) {
        Ok(arrays) => Ok(arrays),
        Err(LoadError::NoData { column: reported }) => match request.columns {
            [column] => {
                warn!(column = %reported, "no data for column, filling with missing values");
                let missing = AdjustedArray::missing(column.missing_value().clone(), request.shape());
                Ok(BTreeMap::from([(column.clone(), missing)]))
            }
            columns => {
                let mut out = BTreeMap::new();
                for column in columns {
                    let single = LoadRequest {
                        columns: std::slice::from_ref(column),
                        ..*request
                    };
                    out.extend(load_with_fallback(loader, &single)?);
                }
                Ok(out)
            }
        },
        Err(other) => Err(other.into()),
    }
}

fn check_loaded(column: &BoundColumn, array: &AdjustedArray, expected: (usize, usize)) -> Result<()> {
    if array.shape() != expected {
        return Err(LoadError::Shape {
            column: column.qualname(),
            expected,
            actual: array.shape(),
        }
        .into());
    }
    if array.dtype() != column.dtype() {
        return Err(ArrayError::DTypeMismatch {
            expected: column.dtype(),
            actual: array.dtype().to_string(),
        }
        .into());
    }
    if array.missing_value() != column.missing_value() {
        return Err(LoadError::MissingValue {
            column: column.qualname(),
            expected: column.missing_value().to_string(),
            actual: array.missing_value().to_string(),
        }
        .into());
    }
    Ok(())
}

/// Evaluate one computed node from the arrays of its dependencies.
fn compute_node(
    plan: &ExecutionPlan,
    node: usize,
    chunk: &Chunk<'_>,
    workspace: &[Option<AdjustedArray>],
) -> Result<AdjustedArray> {
    let graph = plan.graph();
    let term = graph.term(node);
    let first = chunk.first_row(plan.node_extra_rows(node));
    let dates = &chunk.dates[first..];
    let nrows = dates.len();
    let window_length = term.window_length();

    let mut mask = chunk.root_mask.slice(s![first.., ..]).to_owned();
    let mut inputs = Vec::with_capacity(term.inputs().len());
    for edge in graph.edges(node) {
        let array = workspace[edge.node]
            .as_ref()
            .ok_or_else(|| EngineError::MissingDependency {
                term: term.to_string(),
                dependency: graph.term(edge.node).to_string(),
            })?;
        let offset = plan.edge_offset(node, edge);
        if edge.is_mask {
            let rows = array.rows_as_of(offset, offset + nrows)?.into_bool()?;
            mask.zip_mut_with(&rows, |m, &r| *m = *m && r);
        } else if window_length == 0 {
            inputs.push(TermInput::Block(array.rows_as_of(offset, offset + nrows)?));
        } else {
            inputs.push(TermInput::Window(array.traverse_with(window_length, offset, 0)?));
        }
    }

    let ctx = ComputeContext {
        dates,
        sids: &chunk.sids,
        mask: &mask,
    };
    let data = evaluate(term, inputs, &ctx)?;
    Ok(AdjustedArray::unadjusted(data, term.missing_value().clone())?)
}

/// Trim outputs to the chunk's sessions and keep the rows passing the screen.
fn assemble(plan: &ExecutionPlan, chunk: &Chunk<'_>, workspace: &[Option<AdjustedArray>]) -> Result<PipelineResult> {
    let graph = plan.graph();
    let nrows = chunk.output_rows();
    let trimmed = |node: usize| -> Result<ArrayData> {
        let array = workspace[node]
            .as_ref()
            .ok_or_else(|| EngineError::MissingDependency {
                term: "pipeline output".to_string(),
                dependency: graph.term(node).to_string(),
            })?;
        let extra = plan.node_extra_rows(node);
        Ok(array.rows_as_of(extra, extra + nrows)?)
    };

    let mut keep = chunk.root_mask.slice(s![chunk.history.., ..]).to_owned();
    if let Some(screen) = graph.screen() {
        let passed = trimmed(screen)?.into_bool()?;
        keep.zip_mut_with(&passed, |k, &p| *k = *k && p);
    }

    let output_dates = &chunk.dates[chunk.history..];
    let mut cells = Vec::new();
    let mut dates = Vec::new();
    let mut sids = Vec::new();
    for (r, row) in keep.rows().into_iter().enumerate() {
        for (c, _) in row.iter().enumerate().filter(|(_, kept)| **kept) {
            cells.push((r, c));
            dates.push(output_dates[r]);
            sids.push(chunk.sids[c]);
        }
    }

    let mut columns = BTreeMap::new();
    for (name, &node) in graph.outputs() {
        columns.insert(name.clone(), ColumnValues::gather(&trimmed(node)?, &cells));
    }
    debug!(rows = cells.len(), "assembled chunk");
    Ok(PipelineResult::new(dates, sids, columns)?)
}
