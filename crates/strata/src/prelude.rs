//! The types needed to define and run a pipeline.

pub use strata_adjusted::{AdjustedArray, Adjustment, AdjustmentOp, ArrayData, DType, Scalar};
pub use strata_engine::{
    AdjustmentRecord, AssetLifetimes, AssetUniverse, CancellationToken, EngineConfig, EngineError,
    FrameLoader, InMemoryLoader, LoadError, LoadRequest, LoaderRegistry, Pipeline, PipelineEngine,
    PipelineLoader,
};
pub use strata_output::{ExportFormat, Exporter, PipelineResult, summarize};
pub use strata_terms::{
    BoundColumn, Classifier, ColumnSpec, DataSet, Domain, Factor, Filter, GroupOptions,
    RankOptions, Sid, Term, TradingCalendar, builtins, equity_pricing,
};
