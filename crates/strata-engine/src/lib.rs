#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/strata/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod loader;
pub mod loaders;
pub mod pipeline;
pub mod plan;
pub mod prescreen;
pub mod universe;

// Re-export main types
pub use cancel::CancellationToken;
pub use config::{DEFAULT_CHUNK_SIZE, EngineConfig};
pub use engine::PipelineEngine;
pub use error::{EngineError, LoadError, Result};
pub use graph::{Dependencies, Edge, TermGraph, topological_order};
pub use loader::{LoadRequest, LoaderRegistry, PipelineLoader};
pub use loaders::{AdjustmentRecord, FrameLoader, InMemoryLoader};
pub use pipeline::Pipeline;
pub use plan::ExecutionPlan;
pub use prescreen::{prescreen_assets, reduce};
pub use universe::{AssetLifetimes, AssetUniverse};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
