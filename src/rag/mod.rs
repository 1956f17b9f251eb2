pub mod pipeline;

pub use pipeline::{PipelineError, RagPipeline, NOT_READY};
