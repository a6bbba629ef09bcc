//! End-to-end pipeline runs over in-memory data.

use approx::assert_relative_eq;
use chrono::NaiveDate;
use ndarray::{Array2, array};
use polars::prelude::{DataFrame, NamedFrom, Series};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use strata::adjusted::{AdjustedArray, Adjustments};
use strata::engine::{ExecutionPlan, Result as EngineResult};
use strata::output::summarize;
use strata::prelude::*;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn domain() -> Domain {
    Domain::calendar("US", TradingCalendar::weekdays("XNYS", day(1), day(31)))
}

fn sessions() -> Vec<NaiveDate> {
    domain().trading_calendar().unwrap().sessions().to_vec()
}

fn factor(name: &str) -> Factor {
    Factor::try_from_term(equity_pricing().column(name).unwrap().term()).unwrap()
}

const SIDS: [Sid; 4] = [Sid(1), Sid(2), Sid(3), Sid(4)];

/// Every pricing column except volume, `value = 100 * sid + session + offset`
/// with close at offset 0.
fn pricing() -> InMemoryLoader {
    let sessions = sessions();
    let mut loader = InMemoryLoader::new(sessions.clone(), SIDS.to_vec());
    for (offset, name) in ["close", "open", "high", "low"].iter().enumerate() {
        let values = Array2::from_shape_fn((sessions.len(), SIDS.len()), |(r, c)| {
            100.0 * f64::from(SIDS[c].0) + r as f64 + offset as f64 / 10.0
        });
        let column = equity_pricing().column(name).unwrap();
        loader.add_float_column(&column, values).unwrap();
    }
    loader
}

/// Counts calls and optionally cancels a token on the first one.
#[derive(Debug)]
struct Instrumented {
    inner: InMemoryLoader,
    calls: AtomicUsize,
    cancel_on_load: Option<CancellationToken>,
}

impl Instrumented {
    fn new(inner: InMemoryLoader) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            cancel_on_load: None,
        }
    }
}

impl PipelineLoader for Instrumented {
    fn load_adjusted_array(
        &self,
        request: &LoadRequest<'_>,
    ) -> Result<BTreeMap<BoundColumn, AdjustedArray>, LoadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = &self.cancel_on_load {
            token.cancel();
        }
        self.inner.load_adjusted_array(request)
    }
}

fn engine(loader: Arc<dyn PipelineLoader>, config: EngineConfig) -> PipelineEngine {
    let registry = LoaderRegistry::new().with("EquityPricing", loader);
    PipelineEngine::new(registry, Arc::new(AssetLifetimes::always(SIDS)), domain(), config).unwrap()
}

fn default_engine() -> PipelineEngine {
    engine(Arc::new(pricing()), EngineConfig::default())
}

fn value(result: &PipelineResult, date: NaiveDate, sid: u32, column: &str) -> f64 {
    result
        .value(date, Sid(sid), column)
        .and_then(|v| v.as_f64())
        .unwrap()
}

fn research_pipeline() -> EngineResult<Pipeline> {
    let close = factor("close");
    let mut pipeline = Pipeline::new();
    let sma = builtins::simple_moving_average(&close, 5)?;
    pipeline.add("sma_5", sma.clone())?;
    pipeline.add("momentum", builtins::returns(&close, 3)?)?;
    pipeline.add("rank", sma.rank(RankOptions::default())?)?;
    pipeline.add("zscore", close.zscore(GroupOptions::default())?)?;
    pipeline.set_screen(close.gt(150.0)?);
    Ok(pipeline)
}

#[test]
fn test_split_windows_on_adjusted_array() {
    let mut adjustments = Adjustments::new();
    adjustments.insert(1, vec![Adjustment::multiply(0, 1, 0, 0, 0.5).unwrap()]);
    let data = ArrayData::Float64(array![[1.0], [2.0], [3.0], [4.0]]);
    let array = AdjustedArray::new(data, adjustments, Scalar::Float(f64::NAN)).unwrap();

    let windows: Vec<Vec<f64>> = array
        .traverse(2)
        .unwrap()
        .map(|w| w.as_float().unwrap().iter().copied().collect())
        .collect();
    assert_eq!(windows[0], vec![0.5, 1.0]);
    assert_eq!(windows[1], vec![1.0, 3.0]);
}

#[test]
fn test_split_through_engine() {
    let mut loader = pricing();
    let close = equity_pricing().column("close").unwrap();
    // Jan 15 is session 10
    loader
        .add_adjustment(&close, AdjustmentRecord::split(Sid(2), 0.5, day(15)))
        .unwrap();
    let engine = engine(Arc::new(loader), EngineConfig::default());

    let mut pipeline = Pipeline::new();
    pipeline
        .add("sma", builtins::simple_moving_average(&factor("close"), 2).unwrap())
        .unwrap();
    pipeline.add("close", factor("close")).unwrap();
    let result = engine.run_pipeline(&pipeline, day(12), day(15)).unwrap();

    // Before the apply date nothing is restated
    assert_relative_eq!(value(&result, day(12), 2, "sma"), 208.5);
    // On it, the earlier row of the window is halved
    assert_relative_eq!(value(&result, day(15), 2, "sma"), (104.5 + 210.0) / 2.0);
    assert_relative_eq!(value(&result, day(15), 2, "close"), 210.0);
    assert_relative_eq!(value(&result, day(15), 1, "sma"), 109.5);
}

#[test]
fn test_raw_column_sees_same_row_restatement() {
    let mut loader = pricing();
    let close = equity_pricing().column("close").unwrap();
    let record = AdjustmentRecord {
        sid: Sid(1),
        op: AdjustmentOp::Overwrite(Scalar::Float(999.0)),
        start: day(15),
        end: day(15),
        apply_date: day(15),
    };
    loader.add_adjustment(&close, record).unwrap();
    let engine = engine(Arc::new(loader), EngineConfig::default());

    let raw = factor("close");
    let mut pipeline = Pipeline::new();
    pipeline.add("raw", raw.clone()).unwrap();
    pipeline.add("latest", raw.latest().unwrap()).unwrap();
    pipeline.add("doubled", raw.mul(2.0).unwrap()).unwrap();
    let result = engine.run_pipeline(&pipeline, day(12), day(16)).unwrap();

    assert_relative_eq!(value(&result, day(15), 1, "raw"), 999.0);
    assert_relative_eq!(value(&result, day(15), 1, "latest"), 999.0);
    assert_relative_eq!(value(&result, day(15), 1, "doubled"), 1998.0);
    // Neighbouring sessions keep their own values
    assert_relative_eq!(value(&result, day(12), 1, "raw"), 109.0);
    assert_relative_eq!(value(&result, day(16), 1, "raw"), 111.0);
    assert_relative_eq!(value(&result, day(16), 1, "latest"), 111.0);
}

#[test]
fn test_oversized_chunk_runs_as_one_chunk() {
    let pipeline = research_pipeline().unwrap();
    let engine = default_engine();
    let whole = engine.run_pipeline(&pipeline, day(10), day(19)).unwrap();
    let unbounded = engine
        .run_chunked_pipeline(&pipeline, day(10), day(19), usize::MAX, &CancellationToken::new())
        .unwrap();
    assert_eq!(
        whole.export_to_string(ExportFormat::Csv).unwrap(),
        unbounded.export_to_string(ExportFormat::Csv).unwrap()
    );
}

#[test]
fn test_insufficient_history_before_any_load() {
    let loader = Arc::new(Instrumented::new(pricing()));
    let engine = engine(Arc::clone(&loader) as Arc<dyn PipelineLoader>, EngineConfig::default());
    let mut pipeline = Pipeline::new();
    pipeline
        .add("sma", builtins::simple_moving_average(&factor("close"), 5).unwrap())
        .unwrap();

    // Jan 4 has three sessions before it
    let err = engine.run_pipeline(&pipeline, day(4), day(10)).unwrap_err();
    match err {
        EngineError::InsufficientHistory {
            term,
            extra_rows,
            available,
        } => {
            assert_eq!(term, factor("close").term().to_string());
            assert_eq!((extra_rows, available), (4, 3));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(loader.calls.load(Ordering::SeqCst), 0);

    assert!(engine.run_pipeline(&pipeline, day(5), day(10)).is_ok());
}

#[test]
fn test_missing_column_does_not_fail_the_run() {
    let mut pipeline = Pipeline::new();
    for name in ["open", "high", "low", "close", "volume"] {
        pipeline.add(name, factor(name)).unwrap();
    }
    let result = default_engine().run_pipeline(&pipeline, day(8), day(10)).unwrap();
    assert_eq!(result.len(), 3 * SIDS.len());

    let summaries = summarize(&result);
    for summary in &summaries {
        if summary.name == "volume" {
            assert_eq!(summary.count, 0);
            assert_eq!(summary.missing, result.len());
        } else {
            assert_eq!(summary.count, result.len());
        }
    }
    assert_relative_eq!(value(&result, day(8), 1, "open"), 105.1);
}

#[test]
fn test_runs_are_deterministic() {
    let pipeline = research_pipeline().unwrap();
    let serial = engine(Arc::new(pricing()), EngineConfig::default().with_parallel(false));
    let parallel = default_engine();

    let first = parallel.run_pipeline(&pipeline, day(10), day(31)).unwrap();
    let second = parallel.run_pipeline(&pipeline, day(10), day(31)).unwrap();
    let third = serial.run_pipeline(&pipeline, day(10), day(31)).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, third);
    assert_eq!(
        first.export_to_string(ExportFormat::Csv).unwrap(),
        third.export_to_string(ExportFormat::Csv).unwrap()
    );
}

#[test]
fn test_screen_drops_rows_and_orders_by_date_then_sid() {
    let pipeline = research_pipeline().unwrap();
    let result = default_engine().run_pipeline(&pipeline, day(10), day(12)).unwrap();

    // sid 1 never trades above 150
    assert_eq!(result.len(), 3 * 3);
    assert!(result.sids().iter().all(|sid| *sid != Sid(1)));
    for (pair_dates, pair_sids) in result.dates().windows(2).zip(result.sids().windows(2)) {
        assert!(pair_dates[0] < pair_dates[1] || pair_sids[0] < pair_sids[1]);
    }
    // Ranks run over every listed asset, screened or not
    assert_relative_eq!(value(&result, day(10), 4, "rank"), 4.0);
}

#[test]
fn test_equal_terms_are_computed_once() {
    let close = factor("close");
    let a = builtins::simple_moving_average(&close, 3).unwrap();
    let b = builtins::simple_moving_average(&close, 3).unwrap();

    let mut pipeline = Pipeline::new();
    pipeline.add("a", a).unwrap();
    pipeline.add("b", b).unwrap();
    let graph = pipeline.to_graph().unwrap();
    let plan = ExecutionPlan::new(graph, &sessions(), 5, 10).unwrap();
    assert_eq!(plan.node_count(), 3);

    let result = default_engine().run_pipeline(&pipeline, day(8), day(12)).unwrap();
    assert_eq!(result.column("a"), result.column("b"));
}

#[test]
fn test_prescreen_preserves_results() {
    let close = factor("close");
    let universe = builtins::static_assets([Sid(2), Sid(3)]).unwrap();
    let mut pipeline = Pipeline::new();
    pipeline
        .add("sma", builtins::simple_moving_average(&close, 4).unwrap())
        .unwrap();
    pipeline
        .add(
            "rank",
            close.rank(RankOptions::default().mask(&universe)).unwrap(),
        )
        .unwrap();
    pipeline.set_screen(universe.and(&close.gt(0.0).unwrap()).unwrap());

    let narrowed = default_engine().run_pipeline(&pipeline, day(8), day(19)).unwrap();
    let full = engine(Arc::new(pricing()), EngineConfig::default().with_prescreen(false))
        .run_pipeline(&pipeline, day(8), day(19))
        .unwrap();
    assert_eq!(narrowed, full);
    assert!(narrowed.sids().iter().all(|sid| [Sid(2), Sid(3)].contains(sid)));
    assert_relative_eq!(value(&narrowed, day(8), 3, "rank"), 2.0);
}

#[test]
fn test_cancellation_between_chunks() {
    let token = CancellationToken::new();
    let mut loader = Instrumented::new(pricing());
    loader.cancel_on_load = Some(token.clone());
    let engine = engine(Arc::new(loader), EngineConfig::default());

    let mut pipeline = Pipeline::new();
    pipeline.add("close", factor("close")).unwrap();
    let err = engine
        .run_chunked_pipeline(&pipeline, day(8), day(19), 2, &token)
        .unwrap_err();
    assert!(matches!(err, EngineError::Cancelled { completed_chunks: 1 }));
}

#[test]
fn test_frame_loader_end_to_end() {
    let close = equity_pricing().column("close").unwrap();
    let baseline = DataFrame::new(vec![
        Series::new("date".into(), vec!["2024-01-08", "2024-01-09", "2024-01-10", "2024-01-10"]).into(),
        Series::new("sid".into(), vec![1u32, 1, 1, 2]).into(),
        Series::new("value".into(), vec![10.0, 11.0, 12.0, 50.0]).into(),
    ])
    .unwrap();
    let mut loader = FrameLoader::new(sessions(), vec![Sid(1), Sid(2)]);
    loader.add_frame(&close, &baseline).unwrap();

    let registry = LoaderRegistry::new().with("EquityPricing", Arc::new(loader));
    let universe = Arc::new(AssetLifetimes::always([Sid(1), Sid(2)]));
    let engine = PipelineEngine::new(registry, universe, domain(), EngineConfig::default()).unwrap();

    let mut pipeline = Pipeline::new();
    pipeline
        .add("sma", builtins::simple_moving_average(&factor("close"), 2).unwrap())
        .unwrap();
    let result = engine.run_pipeline(&pipeline, day(9), day(10)).unwrap();
    assert_relative_eq!(value(&result, day(10), 1, "sma"), 11.5);
    assert!(value(&result, day(9), 2, "sma").is_nan());
    assert_relative_eq!(value(&result, day(10), 2, "sma"), 50.0);

    let df = result.to_dataframe().unwrap();
    assert_eq!(df.height(), 4);
    assert!(df.column("sma").is_ok());
}
