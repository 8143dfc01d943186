//! Prelude module for convenient imports.
//!
//! ```rust
//! use nvisy_runtime::prelude::*;
//! ```

pub use crate::engine::{EngineConfig, TaskManager};
pub use crate::error::{RuntimeError, RuntimeResult};
pub use crate::merge::{MergedElement, MergedResult};
pub use crate::quality::QualityEvaluator;
pub use crate::selector::{Strategy, StrategySelector};
pub use crate::task::{Chunk, SubmitRequest, Task, TaskStatus};
pub use crate::workflow::ChunkState;
