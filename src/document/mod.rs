pub mod loader;
pub mod splitter;

pub use loader::{extract_text, load_pdf, Document, DocumentError};
pub use splitter::{Chunk, TextSplitter};
