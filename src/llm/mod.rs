pub mod answer;
pub mod embeddings;

pub use answer::{AnswerGenerator, NO_ANSWER};
pub use embeddings::EmbeddingGenerator;
