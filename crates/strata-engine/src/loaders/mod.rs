//! Built-in loaders.

pub mod frame;
pub mod memory;

pub use frame::FrameLoader;
pub use memory::{AdjustmentRecord, InMemoryLoader};
