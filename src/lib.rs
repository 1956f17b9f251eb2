pub mod api;
pub mod config;
pub mod database;
pub mod document;
pub mod llm;
pub mod providers;
pub mod rag;

// Re-export commonly used items
pub use config::Settings;
pub use rag::{PipelineError, RagPipeline};
